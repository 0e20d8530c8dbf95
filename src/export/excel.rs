//! Excel生成（CLI版）
//!
//! 共通ライブラリでBOQをバッファに生成し、ファイルに書き出す

use crate::error::{RoadCostError, Result};
use road_cost_common::export::excel_core::generate_boq_buffer;
use road_cost_common::{BatchOutcome, BatchSummary};
use std::path::Path;

pub fn generate_excel(
    outcome: &BatchOutcome,
    summary: &BatchSummary,
    output_path: &Path,
    generated_at: &str,
) -> Result<()> {
    let buffer = generate_boq_buffer(outcome, summary, generated_at)
        .map_err(RoadCostError::ExcelGeneration)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, buffer)?;
    Ok(())
}
