//! 入力データの読み込み
//!
//! ルールブック・据付費表・単価表（CSV / XLSX / ディレクトリ）・埋め込みインデックスを読み込み、
//! `Snapshot` を組み立てる。単価表の読み込み失敗は処理を止めず、照合を「該当なし」にする。

use crate::config::Config;
use crate::error::{RoadCostError, Result};
use calamine::{open_workbook, Reader, Xlsx};
use csv::ReaderBuilder;
use road_cost_common::catalog::{Catalog, CatalogState};
use road_cost_common::cost::InstallationRates;
use road_cost_common::matcher::{CandidateSource, SorMatcher};
use road_cost_common::prefilter::{EmbeddingIndex, HashingEmbedder, VectorPrefilter};
use road_cost_common::pipeline::{CancelFlag, Snapshot};
use road_cost_common::rulebook::Rulebook;
use road_cost_common::types::{Warning, WarningKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const TABLE_EXTENSIONS: &[&str] = &["csv", "xlsx"];

/// ヘッダー行とデータ行
pub type Table = (Vec<String>, Vec<Vec<String>>);

fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(RoadCostError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// ルールブックJSONを読み込み
pub fn load_rulebook(path: &Path) -> Result<(Rulebook, Vec<Warning>)> {
    let content = read_text(path)?;
    let (rulebook, warnings) = Rulebook::from_json(&content)
        .map_err(|e| RoadCostError::InvalidRulebook(format!("{}: {}", path.display(), e)))?;

    for (intervention_type, code, error) in rulebook.compile_errors() {
        tracing::warn!(intervention_type, code, %error, "数量式をコンパイルできません");
    }
    tracing::info!(path = %path.display(), types = rulebook.len(), "ルールブック読み込み");
    Ok((rulebook, warnings))
}

/// 据付費JSONを読み込み（ファイルがなければ空の表）
pub fn load_installation(path: &Path) -> Result<(InstallationRates, Vec<Warning>)> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "据付費表がありません。据付費は0で計上します");
        return Ok((InstallationRates::default(), Vec::new()));
    }
    let content = std::fs::read_to_string(path)?;
    let (rates, warnings) = InstallationRates::from_json(&content)?;
    tracing::info!(path = %path.display(), entries = rates.len(), "据付費表読み込み");
    Ok((rates, warnings))
}

/// CSVを読み込み
pub fn read_csv_table(path: &Path) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|v| v.trim().to_string()).collect());
    }
    Ok((headers, rows))
}

/// XLSXの先頭シートを読み込み
pub fn read_xlsx_table(path: &Path) -> Result<Table> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e: calamine::XlsxError| RoadCostError::Excel(format!("{}: {}", path.display(), e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| RoadCostError::Excel(format!("{}: シートがありません", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| RoadCostError::Excel(format!("{}: {}", path.display(), e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| RoadCostError::Excel(format!("{}: ヘッダー行がありません", path.display())))?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .collect();
    Ok((headers, rows))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// 拡張子で形式を判定して読み込み
pub fn read_table(path: &Path) -> Result<Table> {
    match extension_of(path).as_str() {
        "csv" => read_csv_table(path),
        "xlsx" => read_xlsx_table(path),
        other => Err(RoadCostError::InvalidCatalog(format!(
            "未対応の形式です ({}): {}",
            other,
            path.display()
        ))),
    }
}

/// 単価表ファイルの一覧（ディレクトリならパス順に全CSV/XLSX）
pub fn catalog_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(RoadCostError::FileNotFound(path.display().to_string()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && TABLE_EXTENSIONS.contains(&extension_of(p).as_str()))
        .collect();
    files.sort();
    Ok(files)
}

/// 単価表を読み込み（複数ファイルは連結）
///
/// 読めないファイル（必須列なし・形式不正）は警告にして飛ばす。
/// 1ファイルも読めなければエラー。
pub fn load_catalog(path: &Path) -> Result<(Catalog, Vec<Warning>)> {
    let files = catalog_files(path)?;
    if files.is_empty() {
        return Err(RoadCostError::InvalidCatalog(format!(
            "単価表ファイルがありません: {}",
            path.display()
        )));
    }

    let mut catalog = Catalog::default();
    let mut warnings = Vec::new();
    let mut loaded = 0usize;
    let mut last_error = None;

    for file in &files {
        match load_catalog_file(file) {
            Ok((part, mut part_warnings)) => {
                tracing::debug!(file = %file.display(), items = part.len(), "単価表ファイル読み込み");
                catalog.extend(part);
                warnings.append(&mut part_warnings);
                loaded += 1;
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "単価表ファイルを読み飛ばします");
                warnings.push(Warning::new(
                    WarningKind::MalformedCatalogRow,
                    file.display().to_string(),
                    format!("catalog file skipped: {}", e),
                ));
                last_error = Some(e);
            }
        }
    }

    if loaded == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    tracing::info!(
        files = loaded,
        skipped = files.len() - loaded,
        items = catalog.len(),
        missing_rates = catalog.missing_rate_count(),
        "単価表読み込み"
    );
    Ok((catalog, warnings))
}

fn load_catalog_file(file: &Path) -> Result<(Catalog, Vec<Warning>)> {
    let (headers, rows) = read_table(file)?;
    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Catalog::from_rows(&source, &headers, &rows)
        .map_err(|e| RoadCostError::InvalidCatalog(format!("{}: {}", file.display(), e)))
}

/// 単価表を読み込み、失敗時は利用不可状態にする
pub fn load_catalog_state(path: &Path) -> (CatalogState, Vec<Warning>) {
    match load_catalog(path) {
        Ok((catalog, warnings)) => (CatalogState::Available(catalog), warnings),
        Err(e) => {
            tracing::warn!(error = %e, "単価表を読み込めません。照合は全件「該当なし」になります");
            (CatalogState::Unavailable { reason: e.to_string() }, Vec::new())
        }
    }
}

/// 埋め込みインデックスJSONを読み込み
pub fn load_index(path: &Path) -> Result<EmbeddingIndex> {
    let content = read_text(path)?;
    EmbeddingIndex::from_json(&content)
        .map_err(|e| RoadCostError::InvalidIndex(format!("{}: {}", path.display(), e)))
}

/// 候補の生成方法を決定
///
/// インデックスが読めない場合は全件走査に切り替え、警告を返す。
fn candidate_source(config: &Config) -> (CandidateSource, Option<Warning>) {
    let index_path = match (&config.index_path, config.prefilter_top_k) {
        (Some(path), k) if k > 0 => path,
        _ => return (CandidateSource::FullScan, None),
    };

    match load_index(index_path) {
        Ok(index) => {
            let embedder = HashingEmbedder::new(config.embedding_dim);
            let prefilter = VectorPrefilter::new(index, Box::new(embedder), config.prefilter_top_k);
            (CandidateSource::Prefilter(prefilter), None)
        }
        Err(e) => {
            tracing::warn!(error = %e, "埋め込みインデックスを読み込めません。全件走査で照合します");
            let warning = Warning::new(WarningKind::PrefilterFallback, "embedding_index", e.to_string());
            (CandidateSource::FullScan, Some(warning))
        }
    }
}

/// 全データを読み込んでスナップショットを作成
pub fn build_snapshot(config: &Config) -> Result<Snapshot> {
    let (rulebook, mut warnings) = load_rulebook(&config.rulebook_path)?;
    let (installation, mut installation_warnings) = load_installation(&config.installation_path)?;
    let (catalog, mut catalog_warnings) = load_catalog_state(&config.catalog_path);
    let (source, source_warning) = candidate_source(config);

    warnings.append(&mut installation_warnings);
    warnings.append(&mut catalog_warnings);
    warnings.extend(source_warning);

    let matcher = SorMatcher::new(catalog, source, config.match_options());
    Ok(Snapshot::new(rulebook, installation, matcher, warnings))
}

/// スナップショットを別スレッドで読み込む（Ctrl-C または中断フラグで中断）
pub async fn load_snapshot_cancellable(config: Config, cancel: CancelFlag) -> Result<Arc<Snapshot>> {
    let task = tokio::task::spawn_blocking(move || build_snapshot(&config));

    tokio::select! {
        joined = task => {
            let snapshot = joined
                .map_err(|e| RoadCostError::Config(format!("読み込みスレッドが異常終了しました: {}", e)))??;
            if cancel.is_cancelled() {
                return Err(RoadCostError::Cancelled);
            }
            Ok(Arc::new(snapshot))
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            Err(RoadCostError::Cancelled)
        }
    }
}
