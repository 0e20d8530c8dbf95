//! 数量算定モジュール
//!
//! 対策種別とパラメータから、ルールブックの数量式で材料数量を求める。
//! 1材料の失敗（未定義変数・ゼロ除算・文法違反）は数量0と警告に吸収し、
//! 他の材料の算定は続行する。

use crate::formula::round_to;
use crate::rulebook::{Rulebook, RulebookEntry};
use crate::types::{MaterialQuantity, Warning, WarningKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 数量の丸め桁数
pub const QUANTITY_DECIMALS: i32 = 4;

/// ルールブックに対策種別がない（対策単位のソフトエラー）
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Unknown intervention type: {intervention_type}")]
pub struct UnknownInterventionType {
    pub intervention_type: String,
}

/// 数量算定の結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityEstimate {
    pub intervention_type: String,
    /// 既定値に呼び出し側パラメータを上書きしたコンテキスト
    pub params_used: BTreeMap<String, f64>,
    /// 材料数量（ルールブック記載順）
    pub materials: Vec<MaterialQuantity>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl QuantityEstimate {
    /// `材料コード → 数量` の形式（ルールブック記載順）
    pub fn materials_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.materials
            .iter()
            .map(|m| (m.code.clone(), serde_json::Value::from(m.quantity)))
            .collect()
    }

    /// 材料コードで数量を取得
    pub fn quantity_of(&self, code: &str) -> Option<f64> {
        self.materials.iter().find(|m| m.code == code).map(|m| m.quantity)
    }
}

/// 数量算定
///
/// # Arguments
/// * `rulebook` - 読み込み済みルールブック
/// * `intervention_type` - 対策種別
/// * `params` - 呼び出し側のパラメータ（既定値より優先）
///
/// # Returns
/// * `Ok(QuantityEstimate)` - 算定結果（失敗した材料は数量0＋警告）
/// * `Err(UnknownInterventionType)` - ルールブックに種別がない
pub fn estimate(
    rulebook: &Rulebook,
    intervention_type: &str,
    params: &BTreeMap<String, f64>,
) -> Result<QuantityEstimate, UnknownInterventionType> {
    let entry = rulebook.get(intervention_type).ok_or_else(|| UnknownInterventionType {
        intervention_type: intervention_type.to_string(),
    })?;
    Ok(estimate_entry(entry, params))
}

/// 1エントリの数量算定
pub fn estimate_entry(entry: &RulebookEntry, params: &BTreeMap<String, f64>) -> QuantityEstimate {
    let mut context = entry.defaults.clone();
    context.extend(params.iter().map(|(k, v)| (k.clone(), *v)));

    let mut warnings = Vec::new();
    let mut materials = Vec::with_capacity(entry.materials.len());

    for rule in &entry.materials {
        let evaluated = match rule.compiled() {
            Ok(expr) => expr.eval(&context),
            Err(e) => Err(e.clone()),
        };

        let quantity = match evaluated {
            Ok(value) if !value.is_finite() => {
                warnings.push(Warning::new(
                    WarningKind::FormulaEvaluation,
                    &rule.code,
                    format!("formula '{}' gave non-finite value {}", rule.formula, value),
                ));
                0.0
            }
            Ok(value) if value < 0.0 => {
                warnings.push(Warning::new(
                    WarningKind::NegativeQuantity,
                    &rule.code,
                    format!("formula '{}' gave {} and was clamped to 0", rule.formula, value),
                ));
                0.0
            }
            Ok(value) => round_to(value, QUANTITY_DECIMALS),
            Err(e) => {
                let kind = if e.is_unsafe() {
                    WarningKind::UnsafeExpression
                } else {
                    WarningKind::FormulaEvaluation
                };
                tracing::debug!(code = %rule.code, formula = %rule.formula, error = %e, "数量式の評価に失敗");
                warnings.push(Warning::new(
                    kind,
                    &rule.code,
                    format!("formula '{}' failed: {}", rule.formula, e),
                ));
                0.0
            }
        };

        materials.push(MaterialQuantity {
            code: rule.code.clone(),
            quantity,
            unit: rule.unit.clone(),
        });
    }

    QuantityEstimate {
        intervention_type: entry.intervention_type.clone(),
        params_used: context,
        materials,
        warnings,
    }
}
