//! ルールブックモジュール
//!
//! 対策種別ごとの既定パラメータと材料数量式を保持する。
//! 読み込み時に全数量式をコンパイルし、以後は変更しない。
//!
//! ```json
//! {
//!   "SPEED_LIMIT_SIGN": {
//!     "defaults": { "diameter_mm": 600, "count": 1 },
//!     "materials": [
//!       { "code": "ALUMINIUM_PLATE_m2", "qty_formula": "math.pi * (diameter_mm / 2000) ** 2 * count" },
//!       { "code": "MS_POST_nos", "qty_formula": "count" }
//!     ]
//!   }
//! }
//! ```

use crate::error::{FormulaError, Result};
use crate::formula::{self, Expr};
use crate::types::{Warning, WarningKind};
use crate::unit::unit_from_code;
use serde::Deserialize;
use std::collections::BTreeMap;

/// 材料ごとの数量式
#[derive(Debug, Clone)]
pub struct MaterialRule {
    pub code: String,
    /// 数量式の原文
    pub formula: String,
    /// 材料コード末尾の単位
    pub unit: Option<String>,
    compiled: std::result::Result<Expr, FormulaError>,
}

impl MaterialRule {
    /// 数量式をコンパイルしてルールを作る
    pub fn new(code: impl Into<String>, formula: impl Into<String>) -> Self {
        let code = code.into();
        let formula = formula.into();
        let compiled = formula::parse(&formula);
        let unit = unit_from_code(&code);
        Self { code, formula, unit, compiled }
    }

    /// コンパイル結果
    pub fn compiled(&self) -> std::result::Result<&Expr, &FormulaError> {
        self.compiled.as_ref()
    }
}

/// 対策種別ごとのルール
#[derive(Debug, Clone, Default)]
pub struct RulebookEntry {
    pub intervention_type: String,
    pub defaults: BTreeMap<String, f64>,
    /// 材料ルール（記載順）
    pub materials: Vec<MaterialRule>,
}

/// ルールブック全体
#[derive(Debug, Clone, Default)]
pub struct Rulebook {
    entries: BTreeMap<String, RulebookEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    defaults: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    materials: Vec<RawMaterial>,
}

#[derive(Deserialize)]
struct RawMaterial {
    #[serde(alias = "item")]
    code: String,
    #[serde(default = "default_formula", alias = "formula")]
    qty_formula: String,
}

fn default_formula() -> String {
    "0".to_string()
}

impl Rulebook {
    /// JSON文字列から読み込み
    ///
    /// 数値に変換できない既定値は除外し、警告として返す。
    pub fn from_json(json: &str) -> Result<(Self, Vec<Warning>)> {
        let raw: BTreeMap<String, RawEntry> = serde_json::from_str(json)?;
        let mut warnings = Vec::new();
        let mut entries = BTreeMap::new();

        for (intervention_type, raw_entry) in raw {
            let mut defaults = BTreeMap::new();
            for (key, value) in raw_entry.defaults {
                match value_as_number(&value) {
                    Some(number) => {
                        defaults.insert(key, number);
                    }
                    None => warnings.push(Warning::new(
                        WarningKind::InvalidDefault,
                        format!("{}.{}", intervention_type, key),
                        format!("default value {} is not numeric and was ignored", value),
                    )),
                }
            }

            let materials = raw_entry
                .materials
                .into_iter()
                .map(|m| MaterialRule::new(m.code, m.qty_formula))
                .collect();

            entries.insert(
                intervention_type.clone(),
                RulebookEntry { intervention_type, defaults, materials },
            );
        }

        Ok((Self { entries }, warnings))
    }

    /// エントリを追加（テスト・組み込み用）
    pub fn insert(&mut self, entry: RulebookEntry) {
        self.entries.insert(entry.intervention_type.clone(), entry);
    }

    /// 対策種別のルールを取得
    pub fn get(&self, intervention_type: &str) -> Option<&RulebookEntry> {
        self.entries.get(intervention_type)
    }

    /// 対策種別の一覧（整列済み）
    pub fn intervention_types(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RulebookEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// コンパイルできなかった数量式 (対策種別, 材料コード, エラー)
    pub fn compile_errors(&self) -> Vec<(&str, &str, &FormulaError)> {
        self.entries
            .values()
            .flat_map(|entry| {
                entry.materials.iter().filter_map(move |rule| {
                    rule.compiled()
                        .err()
                        .map(|e| (entry.intervention_type.as_str(), rule.code.as_str(), e))
                })
            })
            .collect()
    }
}

fn value_as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_RULEBOOK: &str = r#"{
        "SPEED_LIMIT_SIGN": {
            "defaults": {"diameter_mm": 600, "count": 1, "shape": "circle"},
            "materials": [
                {"code": "ALUMINIUM_PLATE_m2", "qty_formula": "0.2827"},
                {"code": "MS_POST_nos", "qty_formula": "count"}
            ]
        },
        "ROAD_STUDS": {
            "materials": [
                {"code": "ROAD_STUD_nos", "qty_formula": "math.ceil(length_m / spacing_m)"},
                {"code": "BAD_nos", "qty_formula": "__import__('os')"},
                {"code": "DEFAULTED_nos"}
            ]
        }
    }"#;

    #[test]
    fn test_load_rulebook() {
        let (rulebook, warnings) = Rulebook::from_json(TEST_RULEBOOK).unwrap();
        assert_eq!(rulebook.len(), 2);
        assert_eq!(rulebook.intervention_types(), vec!["ROAD_STUDS", "SPEED_LIMIT_SIGN"]);

        let sign = rulebook.get("SPEED_LIMIT_SIGN").unwrap();
        assert_eq!(sign.defaults.get("diameter_mm"), Some(&600.0));
        assert_eq!(sign.materials[0].code, "ALUMINIUM_PLATE_m2");
        assert_eq!(sign.materials[0].unit.as_deref(), Some("m2"));
        assert_eq!(sign.materials[1].code, "MS_POST_nos");

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::InvalidDefault);
        assert_eq!(warnings[0].subject, "SPEED_LIMIT_SIGN.shape");
    }

    #[test]
    fn test_unknown_type_is_none() {
        let (rulebook, _) = Rulebook::from_json(TEST_RULEBOOK).unwrap();
        assert!(rulebook.get("FOO").is_none());
    }

    #[test]
    fn test_formulas_compiled_at_load() {
        let (rulebook, _) = Rulebook::from_json(TEST_RULEBOOK).unwrap();
        let studs = rulebook.get("ROAD_STUDS").unwrap();
        assert!(studs.materials[0].compiled().is_ok());
        assert!(studs.materials[1].compiled().unwrap_err().is_unsafe());
        assert_eq!(studs.materials[2].formula, "0");

        let errors = rulebook.compile_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "ROAD_STUDS");
        assert_eq!(errors[0].1, "BAD_nos");
    }

    #[test]
    fn test_invalid_json() {
        assert!(Rulebook::from_json("{ not json").is_err());
        assert!(Rulebook::from_json(r#"{"X": {"materials": [{"qty_formula": "1"}]}}"#).is_err());
    }
}
