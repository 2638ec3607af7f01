//! Analysis error taxonomy
//!
//! A missed ray or a cache miss is not an error: casts and lookups return
//! `Option` and callers branch on it.

/// Failure of an analysis step. None of these are fatal to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Fewer usable points than the step needs (polygon vertices, height
    /// field samples, robust plane fit input).
    InsufficientSamples { needed: usize, got: usize },
    /// Boundary too small, collinear fit input, coincident line endpoints.
    DegenerateGeometry(String),
    /// Statistics requested over an empty sequence.
    EmptyInput,
}

impl AnalysisError {
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry(reason.into())
    }

    /// Whether rescanning or adding boundary points may fix this.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InsufficientSamples { .. })
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientSamples { needed, got } => {
                write!(f, "insufficient samples: needed {}, got {}", needed, got)
            }
            Self::DegenerateGeometry(reason) => write!(f, "degenerate geometry: {}", reason),
            Self::EmptyInput => write!(f, "empty input"),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_retry() {
        let err = AnalysisError::InsufficientSamples { needed: 20, got: 7 };
        assert_eq!(err.to_string(), "insufficient samples: needed 20, got 7");
        assert!(err.is_retryable());
        assert!(!AnalysisError::degenerate("area").is_retryable());
    }
}
