//! Robust statistics: median, MAD gating and least-squares plane fits

use bevy::math::{Vec2, Vec3};

use crate::constants::{MIN_ROBUST_FIT_POINTS, OUTLIER_K, PLANE_FIT_EPSILON};
use crate::error::AnalysisError;

/// MAD at or below this is treated as "all values identical"
const MAD_EPSILON: f32 = 1e-9;

/// Median of a sequence (mean of the two middle values for even counts).
pub fn median(values: &[f32]) -> Result<f32, AnalysisError> {
    if values.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

/// Median of |v - median(values)|
pub fn median_absolute_deviation(values: &[f32]) -> Result<f32, AnalysisError> {
    let center = median(values)?;
    let deviations: Vec<f32> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Which values fall within `median ± k·MAD`. All true when MAD ≈ 0.
pub fn outlier_mask(values: &[f32], k: f32) -> Result<Vec<bool>, AnalysisError> {
    let center = median(values)?;
    let mad = median_absolute_deviation(values)?;
    if mad <= MAD_EPSILON {
        return Ok(vec![true; values.len()]);
    }
    let limit = k * mad;
    Ok(values.iter().map(|v| (v - center).abs() <= limit).collect())
}

/// Values within `median ± k·MAD`, in input order.
pub fn outlier_gate(values: &[f32], k: f32) -> Result<Vec<f32>, AnalysisError> {
    let mask = outlier_mask(values, k)?;
    Ok(values
        .iter()
        .zip(mask)
        .filter_map(|(v, keep)| keep.then_some(*v))
        .collect())
}

/// Population standard deviation
pub fn std_dev(values: &[f32]) -> Result<f32, AnalysisError> {
    if values.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Ok(var.sqrt() as f32)
}

/// Plane `y = a·x + b·z + c`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneFit {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    /// Root mean square of vertical residuals over the fitted points
    pub rms_residual: f32,
    pub point_count: usize,
}

impl PlaneFit {
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.a * x + self.b * z + self.c
    }

    /// Uphill gradient (dy/dx, dy/dz)
    pub fn gradient(&self) -> Vec2 {
        Vec2::new(self.a, self.b)
    }

    pub fn slope_percent(&self) -> f32 {
        self.gradient().length() * 100.0
    }

    /// Unit horizontal direction of steepest descent; zero on a level plane
    pub fn downhill(&self) -> Vec2 {
        (-self.gradient()).normalize_or_zero()
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::new(-self.a, 1.0, -self.b).normalize()
    }

    fn residual(&self, p: Vec3) -> f32 {
        p.y - self.height_at(p.x, p.z)
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Least-squares plane through `points` via the normal equations and
/// Cramer's rule. Coordinates are centered first for conditioning.
pub fn fit_plane_least_squares(points: &[Vec3]) -> Result<PlaneFit, AnalysisError> {
    if points.len() < 3 {
        return Err(AnalysisError::InsufficientSamples {
            needed: 3,
            got: points.len(),
        });
    }

    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let mz = points.iter().map(|p| p.z as f64).sum::<f64>() / n;

    let (mut sxx, mut sxz, mut szz, mut sx, mut sz) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let (mut sxy, mut szy, mut sy) = (0.0, 0.0, 0.0);
    for p in points {
        let x = p.x as f64 - mx;
        let z = p.z as f64 - mz;
        let y = p.y as f64;
        sxx += x * x;
        sxz += x * z;
        szz += z * z;
        sx += x;
        sz += z;
        sxy += x * y;
        szy += z * y;
        sy += y;
    }

    let m = [[sxx, sxz, sx], [sxz, szz, sz], [sx, sz, n]];
    let rhs = [sxy, szy, sy];
    let det = det3(m);
    if det.abs() < PLANE_FIT_EPSILON {
        return Err(AnalysisError::degenerate(
            "plane fit input is collinear or too small",
        ));
    }

    let replace = |col: usize| {
        let mut r = m;
        for row in 0..3 {
            r[row][col] = rhs[row];
        }
        det3(r) / det
    };
    let a = replace(0);
    let b = replace(1);
    let c = replace(2) - a * mx - b * mz;

    let mut fit = PlaneFit {
        a: a as f32,
        b: b as f32,
        c: c as f32,
        rms_residual: 0.0,
        point_count: points.len(),
    };
    let sq: f64 = points
        .iter()
        .map(|p| {
            let r = fit.residual(*p) as f64;
            r * r
        })
        .sum();
    fit.rms_residual = (sq / n).sqrt() as f32;
    Ok(fit)
}

/// Least-squares fit, MAD-gate the absolute residuals, refit once on the
/// survivors. Keeps the first fit if too few points survive the gate.
pub fn fit_plane_robust(points: &[Vec3]) -> Result<PlaneFit, AnalysisError> {
    if points.len() < MIN_ROBUST_FIT_POINTS {
        return Err(AnalysisError::InsufficientSamples {
            needed: MIN_ROBUST_FIT_POINTS,
            got: points.len(),
        });
    }

    let first = fit_plane_least_squares(points)?;
    let residuals: Vec<f32> = points.iter().map(|p| first.residual(*p).abs()).collect();
    let mask = outlier_mask(&residuals, OUTLIER_K)?;
    let kept: Vec<Vec3> = points
        .iter()
        .zip(mask)
        .filter_map(|(p, keep)| keep.then_some(*p))
        .collect();

    if kept.len() == points.len() || kept.len() < 3 {
        return Ok(first);
    }
    Ok(fit_plane_least_squares(&kept).unwrap_or(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 5.0, 2.0, 4.0]).unwrap(), 3.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]).unwrap(), 2.5);
        assert_eq!(median(&[]), Err(AnalysisError::EmptyInput));
    }

    #[test]
    fn test_constant_sequence_passes_gate() {
        let values = [0.42; 7];
        assert_eq!(median_absolute_deviation(&values).unwrap(), 0.0);
        assert_eq!(outlier_gate(&values, 2.5).unwrap(), values.to_vec());
    }

    #[test]
    fn test_gate_drops_outlier() {
        let values = [1.0, 1.1, 0.9, 1.05, 0.95, 9.0];
        let kept = outlier_gate(&values, 2.5).unwrap();
        assert_eq!(kept.len(), 5);
        assert!(!kept.contains(&9.0));
    }

    #[test]
    fn test_std_dev_is_population() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-6, "expected 2.0, got {}", sd);
    }

    fn plane_points(a: f32, b: f32, c: f32) -> Vec<Vec3> {
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..4 {
                let x = i as f32 * 0.7 - 1.0;
                let z = j as f32 * 0.9 + 0.3;
                points.push(Vec3::new(x, a * x + b * z + c, z));
            }
        }
        points
    }

    #[test]
    fn test_plane_fit_recovers_coefficients() {
        let fit = fit_plane_least_squares(&plane_points(0.02, 0.03, 1.0)).unwrap();
        assert!((fit.a - 0.02).abs() < 1e-4, "a = {}", fit.a);
        assert!((fit.b - 0.03).abs() < 1e-4, "b = {}", fit.b);
        assert!((fit.c - 1.0).abs() < 1e-4, "c = {}", fit.c);
        assert!(fit.rms_residual < 1e-5);
        assert!((fit.slope_percent() - 3.6056).abs() < 1e-2);
    }

    #[test]
    fn test_plane_fit_rejects_collinear() {
        let line: Vec<Vec3> = (0..6).map(|i| Vec3::new(i as f32, 0.0, i as f32)).collect();
        assert!(matches!(
            fit_plane_least_squares(&line),
            Err(AnalysisError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_robust_fit_ignores_spike() {
        let mut points = plane_points(0.01, -0.02, 0.5);
        points[7].y += 0.5;
        let plain = fit_plane_least_squares(&points).unwrap();
        let robust = fit_plane_robust(&points).unwrap();
        assert!(robust.point_count < points.len());
        assert!((robust.a - 0.01).abs() < (plain.a - 0.01).abs() + 1e-6);
        assert!((robust.a - 0.01).abs() < 1e-3, "a = {}", robust.a);
        assert!((robust.b + 0.02).abs() < 1e-3, "b = {}", robust.b);
    }

    #[test]
    fn test_robust_fit_needs_six_points() {
        let few = &plane_points(0.0, 0.0, 0.0)[..5];
        assert_eq!(
            fit_plane_robust(few),
            Err(AnalysisError::InsufficientSamples { needed: 6, got: 5 })
        );
    }

    #[test]
    fn test_downhill_points_against_gradient() {
        let fit = PlaneFit {
            a: 0.02,
            b: 0.0,
            c: 0.0,
            rms_residual: 0.0,
            point_count: 3,
        };
        assert_eq!(fit.downhill(), Vec2::new(-1.0, 0.0));
        assert!(fit.normal().x < 0.0);
    }
}
