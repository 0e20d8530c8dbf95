//! 積算集計モジュール
//!
//! 材料数量と照合結果から明細行を作り、据付費の行を必ず最後に追加する。

use crate::error::Result;
use crate::formula::round_to;
use crate::types::{CostBreakdown, CostLineItem, LineKind, MatchResult, MaterialQuantity, Warning, WarningKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 据付費の明細ラベル
pub const INSTALLATION_LABEL: &str = "INSTALLATION_CHARGES (As per CPWD SOR)";
/// 据付費の既定単位
pub const DEFAULT_INSTALLATION_UNIT: &str = "job";

/// 据付費単価
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationRate {
    pub rate: f64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    DEFAULT_INSTALLATION_UNIT.to_string()
}

#[derive(Deserialize)]
struct RawInstallationRate {
    rate: serde_json::Value,
    #[serde(default)]
    unit: Option<String>,
}

/// 対策種別ごとの据付費単価表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallationRates {
    rates: BTreeMap<String, InstallationRate>,
}

/// 据付費表のキー（前後空白除去・大文字化）
pub fn installation_key(intervention_type: &str) -> String {
    intervention_type.trim().to_uppercase()
}

impl InstallationRates {
    /// JSON（`種別 → {rate, unit}`）から読み込み
    ///
    /// 単価が数値として読めない行は除外し、警告にする。
    pub fn from_json(json: &str) -> Result<(Self, Vec<Warning>)> {
        let raw: BTreeMap<String, RawInstallationRate> = serde_json::from_str(json)?;
        let mut rates = BTreeMap::new();
        let mut warnings = Vec::new();

        for (key, entry) in raw {
            let rate = match &entry.rate {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => crate::catalog::parse_rate(s),
                _ => None,
            }
            .filter(|r| r.is_finite() && *r >= 0.0);

            match rate {
                Some(rate) => {
                    let unit = entry
                        .unit
                        .filter(|u| !u.trim().is_empty())
                        .unwrap_or_else(default_unit);
                    rates.insert(installation_key(&key), InstallationRate { rate, unit });
                }
                None => warnings.push(Warning::new(
                    WarningKind::MissingInstallationRate,
                    key.clone(),
                    format!("installation rate {} is not a valid number and was ignored", entry.rate),
                )),
            }
        }

        Ok((Self { rates }, warnings))
    }

    pub fn insert(&mut self, intervention_type: &str, rate: f64, unit: &str) {
        self.rates.insert(
            installation_key(intervention_type),
            InstallationRate { rate, unit: unit.to_string() },
        );
    }

    /// 据付費単価を取得（キーは正規化して比較）
    pub fn lookup(&self, intervention_type: &str) -> Option<&InstallationRate> {
        self.rates.get(&installation_key(intervention_type))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InstallationRate)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// 明細を集計
///
/// `matches[i]` は `materials[i]` の照合結果。照合結果がない材料、
/// 単価不明の材料も金額0の行として残す。
pub fn aggregate(
    materials: &[MaterialQuantity],
    matches: &[MatchResult],
    intervention_type: &str,
    installation: &InstallationRates,
) -> CostBreakdown {
    let mut items = Vec::with_capacity(materials.len() + 1);
    let mut warnings = Vec::new();

    for (i, material) in materials.iter().enumerate() {
        let rate = matches.get(i).and_then(|m| m.rate());
        let amount = rate.map(|r| material.quantity * r).unwrap_or(0.0);
        items.push(CostLineItem {
            label: material.code.clone(),
            quantity: material.quantity,
            unit: material.unit.clone(),
            rate,
            amount,
            kind: LineKind::Material,
        });
    }

    let (rate, unit) = match installation.lookup(intervention_type) {
        Some(entry) => (entry.rate, entry.unit.clone()),
        None => {
            tracing::warn!(intervention_type = %installation_key(intervention_type), "据付費が見つかりません");
            warnings.push(Warning::new(
                WarningKind::MissingInstallationRate,
                installation_key(intervention_type),
                "installation rate not found, charged as 0",
            ));
            (0.0, default_unit())
        }
    };
    items.push(CostLineItem {
        label: INSTALLATION_LABEL.to_string(),
        quantity: 1.0,
        unit: Some(unit),
        rate: Some(rate),
        amount: rate,
        kind: LineKind::Installation,
    });

    let total_cost = round_to(items.iter().map(|i| i.amount).sum(), 2);

    CostBreakdown { items, total_cost, warnings }
}
