//! 積算エンジンの型定義
//!
//! - Intervention: 外部で抽出された対策（入力）
//! - MaterialQuantity: 数量算定の出力
//! - CatalogItem / ScoredCandidate / MatchResult: 単価表照合
//! - CostLineItem / CostBreakdown: 積算結果
//! - Warning: 処理中の診断情報（データとして返す）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 道路安全対策（外部で抽出・分類済み）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervention {
    /// 対策種別タグ（例: SPEED_LIMIT_SIGN）
    #[serde(alias = "type")]
    pub intervention_type: String,
    /// 分類済みパラメータ
    #[serde(alias = "params")]
    pub classified_params: BTreeMap<String, f64>,
    /// 抽出元テキスト
    #[serde(alias = "intervention")]
    pub raw_text: String,
    /// 根拠条項（集計用ラベル）
    #[serde(alias = "clause_used")]
    pub clause: Option<String>,
    /// 測点
    pub chainage: Option<String>,
}

/// 材料数量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialQuantity {
    pub code: String,
    pub quantity: f64,
    /// 材料コードの末尾から導出した単位
    pub unit: Option<String>,
}

impl MaterialQuantity {
    /// 単位を材料コードの末尾から導出して作成
    pub fn new(code: impl Into<String>, quantity: f64) -> Self {
        let code = code.into();
        let unit = crate::unit::unit_from_code(&code);
        Self { code, quantity, unit }
    }
}

/// 単価表（SOR）の1行
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub description: String,
    #[serde(default)]
    pub unit: String,
    /// 単価（空欄・不明は None。照合対象だが金額は0になる）
    #[serde(default)]
    pub rate: Option<f64>,
}

/// 採点済みの単価表候補
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// 単価表内の位置（挿入順）
    pub catalog_index: usize,
    pub description: String,
    pub unit: String,
    pub rate: Option<f64>,
    pub lexical_score: f64,
    pub unit_score: f64,
    pub combined_score: f64,
}

/// 単価表照合の結果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    /// 材料コード（または材料説明）
    pub material: String,
    pub qty: f64,
    pub unit: Option<String>,
    /// 最良候補（該当なしは None）
    pub best_match: Option<ScoredCandidate>,
    /// 数量 × 単価（単価不明なら None）
    pub estimated_cost: Option<f64>,
    /// 上位候補（監査用、件数上限あり）
    pub candidates: Vec<ScoredCandidate>,
    /// 単価表が読み込めず照合できない状態
    #[serde(default)]
    pub catalog_unavailable: bool,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl MatchResult {
    /// 採用された単価
    pub fn rate(&self) -> Option<f64> {
        self.best_match.as_ref().and_then(|m| m.rate)
    }
}

/// 明細行の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Material,
    Installation,
}

/// 積算明細行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLineItem {
    #[serde(rename = "material")]
    pub label: String,
    #[serde(rename = "qty")]
    pub quantity: f64,
    pub unit: Option<String>,
    pub rate: Option<f64>,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: LineKind,
}

/// 積算結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// 材料行（算定順）＋ 据付行（最後）
    pub items: Vec<CostLineItem>,
    pub total_cost: f64,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl CostBreakdown {
    /// 材料行のみ
    pub fn material_lines(&self) -> impl Iterator<Item = &CostLineItem> {
        self.items.iter().filter(|i| i.kind == LineKind::Material)
    }

    /// 据付行
    pub fn installation_line(&self) -> Option<&CostLineItem> {
        self.items.iter().find(|i| i.kind == LineKind::Installation)
    }
}

/// 診断情報の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    FormulaEvaluation,
    UnsafeExpression,
    NegativeQuantity,
    UnknownInterventionType,
    InvalidDefault,
    NoCatalogMatch,
    MissingRate,
    MissingInstallationRate,
    CatalogUnavailable,
    MalformedCatalogRow,
    PrefilterFallback,
}

/// 診断情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// 対象（材料コード、対策種別など）
    pub subject: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.subject, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervention_deserialize_aliases() {
        let json = r#"{
            "type": "SPEED_LIMIT_SIGN",
            "params": {"count": 2},
            "intervention": "Install speed limit sign",
            "clause_used": "IRC:67-2022 Clause 15.9"
        }"#;
        let intervention: Intervention = serde_json::from_str(json).unwrap();
        assert_eq!(intervention.intervention_type, "SPEED_LIMIT_SIGN");
        assert_eq!(intervention.classified_params.get("count"), Some(&2.0));
        assert_eq!(intervention.raw_text, "Install speed limit sign");
        assert_eq!(intervention.clause.as_deref(), Some("IRC:67-2022 Clause 15.9"));
        assert!(intervention.chainage.is_none());
    }

    #[test]
    fn test_cost_line_serialize_names() {
        let line = CostLineItem {
            label: "ALUMINIUM_PLATE_m2".to_string(),
            quantity: 0.2827,
            unit: Some("m2".to_string()),
            rate: None,
            amount: 0.0,
            kind: LineKind::Material,
        };
        let json = serde_json::to_string(&line).unwrap();
        assert!(json.contains("\"material\":\"ALUMINIUM_PLATE_m2\""));
        assert!(json.contains("\"qty\":0.2827"));
        assert!(json.contains("\"rate\":null"));
        assert!(json.contains("\"type\":\"material\""));
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::new(WarningKind::FormulaEvaluation, "MS_POST_nos", "division by zero");
        let display = format!("{}", warning);
        assert!(display.contains("FormulaEvaluation"));
        assert!(display.contains("MS_POST_nos"));
    }

    #[test]
    fn test_match_result_rate() {
        let mut result = MatchResult::default();
        assert_eq!(result.rate(), None);
        result.best_match = Some(ScoredCandidate {
            catalog_index: 0,
            description: "Aluminium sign plate".into(),
            unit: "m2".into(),
            rate: Some(850.0),
            lexical_score: 0.9,
            unit_score: 1.0,
            combined_score: 0.93,
        });
        assert_eq!(result.rate(), Some(850.0));
    }
}
