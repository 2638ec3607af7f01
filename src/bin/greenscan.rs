//! Green scanner CLI - run terrain passes over scenario surfaces
//!
//! Usage:
//!   cargo run --bin greenscan -- scenarios/tilted_plane.toml
//!   cargo run --bin greenscan -- scenarios/ --out output/greens
//!   cargo run --bin greenscan -- scenarios/knoll.toml --settings config/analysis_settings.json --json

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use greenslope::analysis::{PassSummary, run_analysis};
use greenslope::config::AnalysisSettings;
use greenslope::raycast::RaycastContext;
use greenslope::render::{RenderSettings, render_pass};
use greenslope::scenario::{Scenario, parse_scenario_file};

const DEFAULT_OUT_DIR: &str = "output";

struct CliConfig {
    inputs: Vec<PathBuf>,
    out_dir: PathBuf,
    settings: Option<PathBuf>,
    json: bool,
}

#[derive(Serialize)]
struct PassReport<'a> {
    id: String,
    scenario: &'a str,
    finished_at: String,
    summary: PassSummary,
    failures: &'a [String],
}

fn parse_args() -> CliConfig {
    let mut config = CliConfig {
        inputs: Vec::new(),
        out_dir: PathBuf::from(DEFAULT_OUT_DIR),
        settings: None,
        json: false,
    };
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => {
                if let Some(value) = args.next() {
                    config.out_dir = PathBuf::from(value);
                }
            }
            "--settings" => {
                if let Some(value) = args.next() {
                    config.settings = Some(PathBuf::from(value));
                }
            }
            "--json" => config.json = true,
            "--help" | "-h" => {
                println!("greenscan <scenario.toml|dir>... [--out DIR] [--settings FILE] [--json]");
                std::process::exit(0);
            }
            other if !other.starts_with('-') => config.inputs.push(PathBuf::from(other)),
            other => eprintln!("Warning: ignoring unknown option {}", other),
        }
    }
    config
}

fn main() {
    let config = parse_args();
    if config.inputs.is_empty() {
        eprintln!("Usage: greenscan <scenario.toml|dir>... [--out DIR] [--settings FILE] [--json]");
        std::process::exit(2);
    }

    let settings = match &config.settings {
        Some(path) => match AnalysisSettings::try_load_from(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Warning: {}, using defaults", e);
                AnalysisSettings::default()
            }
        },
        None => AnalysisSettings::default(),
    };

    let scenarios = discover_scenarios(&config.inputs);
    if scenarios.is_empty() {
        eprintln!("No scenario files found.");
        std::process::exit(1);
    }
    if let Err(e) = fs::create_dir_all(&config.out_dir) {
        eprintln!("Failed to create {}: {}", config.out_dir.display(), e);
        std::process::exit(1);
    }

    let mut passed = 0;
    let mut failed = 0;
    let mut errors = 0;
    for path in &scenarios {
        let scenario = match parse_scenario_file(path) {
            Ok(s) => s,
            Err(e) => {
                println!("  {}", e);
                errors += 1;
                continue;
            }
        };
        match run_scenario(&scenario, &settings, &config) {
            Ok(failures) if failures.is_empty() => passed += 1,
            Ok(_) => failed += 1,
            Err(e) => {
                println!("  {} ERROR", scenario.name);
                println!("    {}", e);
                errors += 1;
            }
        }
    }

    println!("\nResults: {} passed, {} failed, {} errors", passed, failed, errors);
    if failed > 0 || errors > 0 {
        std::process::exit(1);
    }
}

/// Run one scenario, write its image and report, return expectation misses
fn run_scenario(
    scenario: &Scenario,
    settings: &AnalysisSettings,
    config: &CliConfig,
) -> Result<Vec<String>, String> {
    let polygon = scenario.polygon().map_err(|e| e.to_string())?;
    let mut ctx = RaycastContext::new(settings.context_settings());
    let mut caster = scenario.caster();
    let result = run_analysis(&mut ctx, &mut caster, &polygon, &settings.pipeline_settings(), 0.0)
        .map_err(|e| e.to_string())?;

    let summary = result.summary();
    let failures = scenario.check(&result);
    let stamp = Utc::now();
    let base_name = format!("{}_{}", sanitize(&scenario.name), stamp.format("%Y%m%d_%H%M%S"));

    let dots = ".".repeat(40 - scenario.name.len().min(39));
    let verdict = if failures.is_empty() { "PASS" } else { "FAIL" };
    println!(
        "  {} {} {} ({} terrain, {} cells at {:.3} m, slope {:.2}% mean / {:.2}% max, {} platform casts)",
        scenario.name,
        dots,
        verdict,
        summary.tier,
        summary.height_cells,
        summary.step,
        summary.mean_slope,
        summary.max_slope,
        ctx.platform_casts()
    );
    for failure in &failures {
        println!("    {}", failure);
    }

    if let Some(img) = render_pass(&result, &RenderSettings::default()) {
        let image_path = config.out_dir.join(format!("{}.png", base_name));
        img.save(&image_path)
            .map_err(|e| format!("Failed to save {}: {}", image_path.display(), e))?;
    }

    let report = PassReport {
        id: Uuid::new_v4().to_string(),
        scenario: &scenario.name,
        finished_at: stamp.to_rfc3339(),
        summary,
        failures: &failures,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    let report_path = config.out_dir.join(format!("{}.json", base_name));
    fs::write(&report_path, &json)
        .map_err(|e| format!("Failed to write {}: {}", report_path.display(), e))?;
    if config.json {
        println!("{}", json);
    }

    Ok(failures)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn discover_scenarios(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for input in inputs {
        if input.is_dir() {
            discover_recursive(input, &mut found);
        } else {
            found.push(input.clone());
        }
    }
    found.sort();
    found
}

fn discover_recursive(current: &Path, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(current) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            discover_recursive(&path, found);
        } else if path.extension().map(|e| e == "toml").unwrap_or(false) {
            found.push(path);
        }
    }
}
