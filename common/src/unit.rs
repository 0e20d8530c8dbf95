//! 単位の正規化と単位スコア
//!
//! 材料コードの末尾（`ALUMINIUM_PLATE_m2` → `m2`）と単価表の単位表記を比較する。

use regex::Regex;

/// 単位スコア: 完全一致
pub const UNIT_EXACT: f64 = 1.0;
/// 単位スコア: 同じ同値クラス
pub const UNIT_EQUIVALENT: f64 = 0.8;
/// 単位スコア: どちらかが空欄・不明
pub const UNIT_UNKNOWN: f64 = 0.4;
/// 単位スコア: 宣言済みクラス同士の不一致
pub const UNIT_MISMATCH: f64 = 0.0;

/// 単位の同値クラス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    Count,
    Area,
    Length,
    Mass,
    Volume,
}

const UNIT_CLASSES: &[(UnitClass, &[&str])] = &[
    (UnitClass::Count, &["nos", "no", "no.", "nos.", "each", "set", "pair"]),
    (UnitClass::Area, &["m2", "sqm", "sq.m", "sq.m.", "sqmt"]),
    (UnitClass::Length, &["m", "rm", "rmt", "metre", "meter", "running metre"]),
    (UnitClass::Mass, &["kg", "kgs"]),
    (UnitClass::Volume, &["l", "ltr", "litre", "liter", "m3", "cum", "cu.m", "cu.m."]),
];

/// 単位表記を正規化（小文字化、空白除去、上付き数字の置換）
///
/// 空欄は空文字列になる。
pub fn normalize_unit(unit: &str) -> String {
    lazy_static::lazy_static! {
        static ref PER_RE: Regex = Regex::new(r"^(per\s+|/\s*)").unwrap();
        static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    }

    let lowered = unit.trim().to_lowercase().replace('²', "2").replace('³', "3");
    let stripped = PER_RE.replace(&lowered, "");
    if stripped == "running metre" {
        return stripped.into_owned();
    }
    SPACE_RE.replace_all(&stripped, "").into_owned()
}

/// 正規化済みの単位が属する同値クラス
pub fn unit_class(normalized: &str) -> Option<UnitClass> {
    UNIT_CLASSES
        .iter()
        .find(|(_, spellings)| spellings.contains(&normalized))
        .map(|(class, _)| *class)
}

/// 材料コードの末尾から単位を取り出す（`_` を含まなければ None）
pub fn unit_from_code(code: &str) -> Option<String> {
    let (_, suffix) = code.rsplit_once('_')?;
    if suffix.is_empty() {
        return None;
    }
    Some(suffix.to_string())
}

/// 単位スコア
///
/// - どちらかが空欄: 0.4
/// - 正規化後に一致: 1.0
/// - 同じ同値クラス: 0.8
/// - 両方記入済みで上記以外（クラス外の単位を含む）: 0.0
pub fn unit_score(material_unit: Option<&str>, catalog_unit: &str) -> f64 {
    let material = material_unit.map(normalize_unit).unwrap_or_default();
    let catalog = normalize_unit(catalog_unit);

    if material.is_empty() || catalog.is_empty() {
        return UNIT_UNKNOWN;
    }
    if material == catalog {
        return UNIT_EXACT;
    }

    match (unit_class(&material), unit_class(&catalog)) {
        (Some(a), Some(b)) if a == b => UNIT_EQUIVALENT,
        _ => UNIT_MISMATCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_from_code() {
        assert_eq!(unit_from_code("ALUMINIUM_PLATE_m2").as_deref(), Some("m2"));
        assert_eq!(unit_from_code("RETRO_SHEETING_TypeXI_m2").as_deref(), Some("m2"));
        assert_eq!(unit_from_code("MS_POST_nos").as_deref(), Some("nos"));
        assert_eq!(unit_from_code("PAINT"), None);
        assert_eq!(unit_from_code("PAINT_"), None);
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit(" Sq. M. "), "sq.m.");
        assert_eq!(normalize_unit("M²"), "m2");
        assert_eq!(normalize_unit("per kg"), "kg");
        assert_eq!(normalize_unit("Running Metre"), "running metre");
        assert_eq!(normalize_unit(""), "");
    }

    #[test]
    fn test_unit_score_exact() {
        assert_eq!(unit_score(Some("m2"), "m2"), UNIT_EXACT);
        assert_eq!(unit_score(Some("M2"), "m2"), UNIT_EXACT);
        assert_eq!(unit_score(Some("xyz"), "XYZ"), UNIT_EXACT);
    }

    #[test]
    fn test_unit_score_equivalent() {
        assert_eq!(unit_score(Some("m2"), "sqm"), UNIT_EQUIVALENT);
        assert_eq!(unit_score(Some("nos"), "each"), UNIT_EQUIVALENT);
        assert_eq!(unit_score(Some("m"), "rm"), UNIT_EQUIVALENT);
        assert_eq!(unit_score(Some("l"), "m3"), UNIT_EQUIVALENT);
        assert_eq!(unit_score(Some("m3"), "cum"), UNIT_EQUIVALENT);
    }

    #[test]
    fn test_unit_score_unknown() {
        assert_eq!(unit_score(None, "m2"), UNIT_UNKNOWN);
        assert_eq!(unit_score(Some("m2"), ""), UNIT_UNKNOWN);
        assert_eq!(unit_score(Some(""), ""), UNIT_UNKNOWN);
        assert_eq!(unit_score(Some("  "), "job"), UNIT_UNKNOWN);
    }

    #[test]
    fn test_unit_score_mismatch() {
        assert_eq!(unit_score(Some("m2"), "kg"), UNIT_MISMATCH);
        assert_eq!(unit_score(Some("nos"), "m"), UNIT_MISMATCH);
    }

    #[test]
    fn test_unit_score_unclassified_declared_unit_is_mismatch() {
        assert_eq!(unit_score(Some("m2"), "job"), UNIT_MISMATCH);
        assert_eq!(unit_score(Some("m2"), "bag"), UNIT_MISMATCH);
        assert_eq!(unit_score(Some("TypeXI"), "m2"), UNIT_MISMATCH);
        assert_eq!(unit_score(Some("job"), "bag"), UNIT_MISMATCH);
        assert!(unit_score(Some("m2"), "job") < unit_score(Some("m2"), ""));
    }

    #[test]
    fn test_unit_score_ordering_all_pairs() {
        let units = ["nos", "each", "set", "", "m2", "sqm", "m", "rm", "kg", "l", "m3", "job", "bag"];
        for a in units {
            for b in units {
                let score = unit_score(Some(a), b);
                assert!([UNIT_EXACT, UNIT_EQUIVALENT, UNIT_UNKNOWN, UNIT_MISMATCH].contains(&score));
                if !a.is_empty() && a == b {
                    assert_eq!(score, UNIT_EXACT, "{} vs {}", a, b);
                }
                assert_eq!(score, unit_score(Some(b), a), "symmetry {} vs {}", a, b);
            }
        }
        assert!(UNIT_EXACT >= UNIT_EQUIVALENT);
        assert!(UNIT_EQUIVALENT >= UNIT_UNKNOWN);
        assert!(UNIT_UNKNOWN >= UNIT_MISMATCH);
    }
}
