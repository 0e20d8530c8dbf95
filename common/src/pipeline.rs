//! 積算パイプライン
//!
//! 数量算定 → 単価表照合 → 集計 を1対策単位で実行する。
//! 読み込み済みデータは `Snapshot` にまとめて `Arc` で共有し、読み込み後は変更しない。

use crate::cost::{aggregate, InstallationRates};
use crate::matcher::SorMatcher;
use crate::quantity::{self, QuantityEstimate, UnknownInterventionType};
use crate::rulebook::Rulebook;
use crate::types::{CostBreakdown, Intervention, MatchResult, MaterialQuantity, Warning};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// 読み込み済みの共有データ（ルールブック・据付費表・単価表照合器）
#[derive(Debug)]
pub struct Snapshot {
    rulebook: Rulebook,
    installation: InstallationRates,
    matcher: SorMatcher,
    load_warnings: Vec<Warning>,
    fingerprint: String,
}

impl Snapshot {
    /// スナップショットを作成（照合器の構築時警告も読み込み警告に含める）
    pub fn new(
        rulebook: Rulebook,
        installation: InstallationRates,
        matcher: SorMatcher,
        mut load_warnings: Vec<Warning>,
    ) -> Self {
        load_warnings.extend(matcher.warnings().iter().cloned());
        let fingerprint = fingerprint(&rulebook, &installation, &matcher);
        Self { rulebook, installation, matcher, load_warnings, fingerprint }
    }

    pub fn rulebook(&self) -> &Rulebook {
        &self.rulebook
    }

    pub fn installation(&self) -> &InstallationRates {
        &self.installation
    }

    pub fn matcher(&self) -> &SorMatcher {
        &self.matcher
    }

    /// 読み込み時の警告
    pub fn load_warnings(&self) -> &[Warning] {
        &self.load_warnings
    }

    /// 入力データのSHA-256（16進）
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn fingerprint(rulebook: &Rulebook, installation: &InstallationRates, matcher: &SorMatcher) -> String {
    let mut hasher = Sha256::new();

    for entry in rulebook.entries() {
        hasher.update(b"type\0");
        hasher.update(entry.intervention_type.as_bytes());
        for (key, value) in &entry.defaults {
            hasher.update(key.as_bytes());
            hasher.update(value.to_le_bytes());
        }
        for rule in &entry.materials {
            hasher.update(rule.code.as_bytes());
            hasher.update(b"=");
            hasher.update(rule.formula.as_bytes());
            hasher.update(b"\0");
        }
    }

    hasher.update(b"installation\0");
    for (key, entry) in installation.iter() {
        hasher.update(key.as_bytes());
        hasher.update(entry.rate.to_le_bytes());
        hasher.update(entry.unit.as_bytes());
        hasher.update(b"\0");
    }

    hasher.update(b"catalog\0");
    if let Some(catalog) = matcher.catalog().catalog() {
        for item in catalog.items() {
            hasher.update(item.description.as_bytes());
            hasher.update(b"\t");
            hasher.update(item.unit.as_bytes());
            hasher.update(b"\t");
            match item.rate {
                Some(rate) => hasher.update(rate.to_le_bytes()),
                None => hasher.update(b"-"),
            }
            hasher.update(b"\n");
        }
    }

    hex::encode(hasher.finalize())
}

/// 1対策の積算結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionCost {
    pub intervention_type: String,
    #[serde(default)]
    pub raw_text: String,
    pub clause: Option<String>,
    pub chainage: Option<String>,
    pub params_used: BTreeMap<String, f64>,
    pub quantities: Vec<MaterialQuantity>,
    pub matches: Vec<MatchResult>,
    pub cost: CostBreakdown,
    /// 数量算定・照合・集計の警告をまとめたもの
    pub warnings: Vec<Warning>,
}

/// 1対策のエラー結果（据付行のみの内訳を持つ）
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{error}")]
pub struct InterventionError {
    pub intervention_type: String,
    #[serde(default)]
    pub raw_text: String,
    pub clause: Option<String>,
    pub chainage: Option<String>,
    pub error: UnknownInterventionType,
    pub cost: CostBreakdown,
    pub warnings: Vec<Warning>,
}

/// 中断フラグ（複数スレッドから参照）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// バッチ内の1件の結果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchEntry {
    Costed(InterventionCost),
    Failed(InterventionError),
    Cancelled { intervention_type: String },
}

impl BatchEntry {
    /// 合計金額（中断は None）
    pub fn total_cost(&self) -> Option<f64> {
        match self {
            BatchEntry::Costed(c) => Some(c.cost.total_cost),
            BatchEntry::Failed(e) => Some(e.cost.total_cost),
            BatchEntry::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchEntry::Cancelled { .. })
    }
}

/// バッチ結果（入力順）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub fingerprint: String,
    pub entries: Vec<BatchEntry>,
}

impl BatchOutcome {
    pub fn cancelled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_cancelled()).count()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled_count() > 0
    }
}

/// 積算エンジン
#[derive(Debug, Clone)]
pub struct CostingEngine {
    snapshot: Arc<Snapshot>,
}

impl CostingEngine {
    pub fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    /// 数量算定
    pub fn estimate(
        &self,
        intervention_type: &str,
        params: &BTreeMap<String, f64>,
    ) -> Result<QuantityEstimate, UnknownInterventionType> {
        quantity::estimate(&self.snapshot.rulebook, intervention_type, params)
    }

    /// 単価表照合
    pub fn match_material(&self, description: &str, quantity: f64, unit: Option<&str>) -> MatchResult {
        self.snapshot.matcher.match_material(description, quantity, unit)
    }

    /// 算定済み数量の照合と集計
    pub fn calculate_costs(&self, materials: &[MaterialQuantity], intervention_type: &str) -> CostBreakdown {
        let (_, breakdown) = self.match_and_aggregate(materials, intervention_type);
        breakdown
    }

    fn match_and_aggregate(
        &self,
        materials: &[MaterialQuantity],
        intervention_type: &str,
    ) -> (Vec<MatchResult>, CostBreakdown) {
        let matches: Vec<MatchResult> = materials
            .iter()
            .map(|m| self.match_material(&m.code, m.quantity, m.unit.as_deref()))
            .collect();

        let mut breakdown = aggregate(materials, &matches, intervention_type, &self.snapshot.installation);
        let mut warnings: Vec<Warning> = matches.iter().flat_map(|m| m.warnings.iter().cloned()).collect();
        warnings.append(&mut breakdown.warnings);
        breakdown.warnings = warnings;

        (matches, breakdown)
    }

    /// 1対策の積算（数量算定 → 照合 → 集計）
    ///
    /// 種別がルールブックにない場合は `InterventionError`（据付行のみの内訳付き）。
    pub fn cost_intervention(&self, intervention: &Intervention) -> Result<InterventionCost, InterventionError> {
        let intervention_type = intervention.intervention_type.as_str();
        tracing::debug!(intervention_type, "積算開始");

        let estimate = match self.estimate(intervention_type, &intervention.classified_params) {
            Ok(estimate) => estimate,
            Err(error) => {
                tracing::warn!(intervention_type, "ルールブックに対策種別がありません");
                let (_, cost) = self.match_and_aggregate(&[], intervention_type);
                let mut warnings = vec![Warning::new(
                    crate::types::WarningKind::UnknownInterventionType,
                    intervention_type,
                    error.to_string(),
                )];
                warnings.extend(cost.warnings.iter().cloned());
                return Err(InterventionError {
                    intervention_type: intervention.intervention_type.clone(),
                    raw_text: intervention.raw_text.clone(),
                    clause: intervention.clause.clone(),
                    chainage: intervention.chainage.clone(),
                    error,
                    cost,
                    warnings,
                });
            }
        };

        let (matches, cost) = self.match_and_aggregate(&estimate.materials, intervention_type);
        let mut warnings = estimate.warnings.clone();
        warnings.extend(cost.warnings.iter().cloned());

        tracing::debug!(intervention_type, total = cost.total_cost, "積算完了");

        Ok(InterventionCost {
            intervention_type: intervention.intervention_type.clone(),
            raw_text: intervention.raw_text.clone(),
            clause: intervention.clause.clone(),
            chainage: intervention.chainage.clone(),
            params_used: estimate.params_used,
            quantities: estimate.materials,
            matches,
            cost,
            warnings,
        })
    }

    /// バッチ積算（rayonで並列、結果は入力順）
    ///
    /// 各対策の開始前に中断フラグを確認する。完了済みの結果は保持し、
    /// 未着手の対策は `Cancelled` になる。`on_done` は1件完了ごとに呼ばれる。
    pub fn run_batch<F>(&self, interventions: &[Intervention], cancel: &CancelFlag, on_done: F) -> BatchOutcome
    where
        F: Fn(&BatchEntry) + Sync,
    {
        tracing::info!(count = interventions.len(), "バッチ積算開始");

        let entries: Vec<BatchEntry> = interventions
            .par_iter()
            .map(|intervention| {
                let entry = if cancel.is_cancelled() {
                    BatchEntry::Cancelled {
                        intervention_type: intervention.intervention_type.clone(),
                    }
                } else {
                    match self.cost_intervention(intervention) {
                        Ok(cost) => BatchEntry::Costed(cost),
                        Err(error) => BatchEntry::Failed(error),
                    }
                };
                on_done(&entry);
                entry
            })
            .collect();

        let outcome = BatchOutcome {
            fingerprint: self.snapshot.fingerprint.clone(),
            entries,
        };
        tracing::info!(
            count = outcome.entries.len(),
            cancelled = outcome.cancelled_count(),
            "バッチ積算終了"
        );
        outcome
    }
}
