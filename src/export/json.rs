//! JSONレポート出力

use crate::error::Result;
use road_cost_common::{BatchEntry, BatchOutcome, BatchSummary};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct Report<'a> {
    pub generated_at: &'a str,
    pub fingerprint: &'a str,
    pub summary: &'a BatchSummary,
    pub entries: &'a [BatchEntry],
}

pub fn generate_json(
    outcome: &BatchOutcome,
    summary: &BatchSummary,
    output_path: &Path,
    generated_at: &str,
) -> Result<()> {
    let report = Report {
        generated_at,
        fingerprint: &outcome.fingerprint,
        summary,
        entries: &outcome.entries,
    };
    let json = serde_json::to_string_pretty(&report)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, json)?;
    Ok(())
}
