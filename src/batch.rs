//! バッチ積算の実行（進捗表示・Ctrl-Cによる中断）

use crate::error::{RoadCostError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use road_cost_common::{BatchOutcome, CancelFlag, CostingEngine, Intervention, MaterialQuantity};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum InterventionFile {
    List(Vec<Intervention>),
    Wrapped { interventions: Vec<Intervention> },
}

/// 対策リストJSONを読み込み
///
/// 配列、または `{"interventions": [...]}` 形式を受け付ける。
pub fn load_interventions(path: &Path) -> Result<Vec<Intervention>> {
    if !path.exists() {
        return Err(RoadCostError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let file: InterventionFile = serde_json::from_str(&content)?;
    Ok(match file {
        InterventionFile::List(list) => list,
        InterventionFile::Wrapped { interventions } => interventions,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaterialsInput {
    Map(serde_json::Map<String, serde_json::Value>),
    List(Vec<MaterialQuantity>),
}

#[derive(Deserialize)]
struct EstimationInput {
    #[serde(alias = "type")]
    intervention_type: String,
    materials: MaterialsInput,
}

/// 算定済み数量JSONを読み込み
///
/// `materials` は `{code: qty}`（記載順を保持）または `estimate` の出力と同じ配列形式。
pub fn load_estimation(path: &Path) -> Result<(String, Vec<MaterialQuantity>)> {
    if !path.exists() {
        return Err(RoadCostError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let input: EstimationInput = serde_json::from_str(&content)?;

    let materials = match input.materials {
        MaterialsInput::List(list) => list,
        MaterialsInput::Map(map) => map
            .into_iter()
            .map(|(code, value)| -> Result<MaterialQuantity> {
                let quantity = value.as_f64().ok_or_else(|| {
                    road_cost_common::Error::Parse(format!("数量が数値ではありません: {} = {}", code, value))
                })?;
                Ok(MaterialQuantity::new(code, quantity))
            })
            .collect::<Result<Vec<_>>>()?,
    };
    Ok((input.intervention_type, materials))
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// バッチ積算を実行
///
/// Ctrl-C で中断フラグを立て、完了済みの結果は保持する。
pub async fn run_batch(
    engine: CostingEngine,
    interventions: Vec<Intervention>,
    cancel: CancelFlag,
) -> Result<BatchOutcome> {
    let pb = progress_bar(interventions.len() as u64);

    let watcher = {
        let cancel = cancel.clone();
        let pb = pb.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                pb.set_message("中断中...");
                cancel.cancel();
            }
        })
    };

    let worker_pb = pb.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        engine.run_batch(&interventions, &cancel, |_| worker_pb.inc(1))
    })
    .await
    .map_err(|e| RoadCostError::Config(format!("積算スレッドが異常終了しました: {}", e)))?;

    watcher.abort();
    pb.finish_and_clear();
    Ok(outcome)
}
