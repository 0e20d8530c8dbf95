pub mod excel;
pub mod json;

use crate::cli::ExportFormat;
use crate::error::Result;
use road_cost_common::{BatchOutcome, BatchSummary};
use std::path::{Path, PathBuf};

impl ExportFormat {
    /// 出力するファイルの拡張子
    fn extensions(&self) -> &'static [&'static str] {
        match self {
            ExportFormat::Json => &["json"],
            ExportFormat::Excel => &["xlsx"],
            ExportFormat::Both => &["json", "xlsx"],
        }
    }
}

/// 出力先を拡張子ごとに決める
///
/// ディレクトリ（または拡張子なし）なら `<dir>/<title>.<ext>`。
/// ファイル指定で1形式ならそのまま、複数形式ならファイル名の語幹を共有する。
fn output_paths(output: &Path, title: &str, extensions: &[&str]) -> Vec<PathBuf> {
    if output.is_dir() || output.extension().is_none() {
        return extensions.iter().map(|ext| output.join(format!("{}.{}", title, ext))).collect();
    }
    if let [_] = extensions {
        return vec![output.to_path_buf()];
    }

    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or(title);
    extensions.iter().map(|ext| parent.join(format!("{}.{}", stem, ext))).collect()
}

/// バッチ結果を出力し、書き出したファイルを返す
pub fn export_outcome(
    outcome: &BatchOutcome,
    summary: &BatchSummary,
    format: &ExportFormat,
    output: &Path,
    title: &str,
) -> Result<Vec<PathBuf>> {
    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let paths = output_paths(output, title, format.extensions());

    for (path, ext) in paths.iter().zip(format.extensions()) {
        if *ext == "xlsx" {
            println!("- Excelを生成中...");
            excel::generate_excel(outcome, summary, path, &generated_at)?;
            println!("✔ Excel出力: {}", path.display());
        } else {
            println!("- JSONを生成中...");
            json::generate_json(outcome, summary, path, &generated_at)?;
            println!("✔ JSON出力: {}", path.display());
        }
    }

    Ok(paths)
}
