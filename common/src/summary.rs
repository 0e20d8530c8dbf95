//! バッチ集計（種別別・条項別・材料別の合計とKPI）

use crate::formula::round_to;
use crate::pipeline::{BatchEntry, BatchOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 条項が未設定の対策の集計キー
pub const UNKNOWN_CLAUSE: &str = "UNKNOWN";

/// 件数と合計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub count: usize,
    pub total_cost: f64,
}

impl GroupTotal {
    fn add(&mut self, amount: f64) {
        self.count += 1;
        self.total_cost += amount;
    }
}

/// 主要指標
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_interventions: usize,
    pub failed_interventions: usize,
    pub cancelled_interventions: usize,
    pub unique_clauses: usize,
    pub grand_total: f64,
}

/// バッチ集計
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub by_type: BTreeMap<String, GroupTotal>,
    pub by_clause: BTreeMap<String, GroupTotal>,
    /// 明細ラベルごとの金額合計
    pub materials: BTreeMap<String, f64>,
    pub kpis: Kpis,
}

impl BatchSummary {
    /// バッチ結果から集計（中断分は件数のみ）
    pub fn compute(outcome: &BatchOutcome) -> Self {
        let mut summary = Self::default();

        for entry in &outcome.entries {
            summary.kpis.total_interventions += 1;

            let (intervention_type, clause, cost) = match entry {
                BatchEntry::Costed(c) => (&c.intervention_type, &c.clause, &c.cost),
                BatchEntry::Failed(e) => {
                    summary.kpis.failed_interventions += 1;
                    (&e.intervention_type, &e.clause, &e.cost)
                }
                BatchEntry::Cancelled { .. } => {
                    summary.kpis.cancelled_interventions += 1;
                    continue;
                }
            };

            summary
                .by_type
                .entry(intervention_type.clone())
                .or_default()
                .add(cost.total_cost);

            let clause = clause
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(UNKNOWN_CLAUSE);
            summary
                .by_clause
                .entry(clause.to_string())
                .or_default()
                .add(cost.total_cost);

            for item in &cost.items {
                *summary.materials.entry(item.label.clone()).or_insert(0.0) += item.amount;
            }
        }

        summary.kpis.unique_clauses = summary.by_clause.len();
        summary.kpis.grand_total = round_to(summary.by_clause.values().map(|g| g.total_cost).sum(), 2);
        summary
    }
}
