//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `breathbuddy_core` linkage.
//! - Print the progress snapshot for a JSON history file, evaluated in UTC
//!   at the current time.
//!
//! Usage: `breathbuddy [history.json]`

use breathbuddy_core::{default_catalog, evaluate_progress, EvaluationContext, RawMeasurement};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("breathbuddy_core ping={}", breathbuddy_core::ping());
    println!("breathbuddy_core version={}", breathbuddy_core::core_version());
    println!("breathbuddy_core catalog_size={}", default_catalog().len());

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match print_progress(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn print_progress(path: &str) -> Result<(), String> {
    let raw = std::fs::read_to_string(path).map_err(|err| format!("cannot read `{path}`: {err}"))?;
    let history: Vec<RawMeasurement> =
        serde_json::from_str(&raw).map_err(|err| format!("`{path}` is not a history array: {err}"))?;

    let ctx = EvaluationContext::utc(chrono::Utc::now());
    let catalog = default_catalog();
    let snapshot = evaluate_progress(&history, catalog, &[], &ctx);

    println!(
        "history entries={} skipped={}",
        history.len(),
        snapshot.skipped_records
    );
    for (definition, progress) in catalog.iter().zip(&snapshot.rules) {
        let marker = if progress.is_complete() { "x" } else { " " };
        println!(
            "[{marker}] {:<18} {:>3}/{:<3} {}",
            definition.id, progress.value, progress.target, definition.title
        );
    }
    Ok(())
}
