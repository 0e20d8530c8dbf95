//! 単価表（SOR）モジュール
//!
//! 読み込み済みの行（ヘッダー＋セル文字列）から照合用の品目リストを作る。
//! ファイル形式（CSV / XLSX）の読み込みはCLI側で行う。

use crate::error::{Error, Result};
use crate::text::tokenize;
use crate::types::{CatalogItem, Warning, WarningKind};
use std::collections::BTreeSet;

/// 品名列として認識する列名
pub const DESCRIPTION_COLUMNS: &[&str] = &["description", "desc", "item_description"];
/// 単位列として認識する列名
pub const UNIT_COLUMNS: &[&str] = &["unit", "uom"];
/// 単価列として認識する列名（優先順）
pub const RATE_COLUMNS: &[&str] = &["unit_rate", "rate", "price", "rate_per_unit"];

/// 列位置の対応
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub description: usize,
    pub unit: Option<usize>,
    pub rate: Option<usize>,
}

impl ColumnMap {
    /// ヘッダー行から列位置を解決（大文字小文字・前後空白は無視）
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.as_ref().trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| normalized.iter().position(|h| h == name))
        };

        let description = find(DESCRIPTION_COLUMNS).ok_or_else(|| {
            Error::Parse(format!(
                "catalog header has no description column (expected one of {:?}): {:?}",
                DESCRIPTION_COLUMNS, normalized
            ))
        })?;

        Ok(Self {
            description,
            unit: find(UNIT_COLUMNS),
            rate: find(RATE_COLUMNS),
        })
    }
}

/// 単価文字列を数値に変換
///
/// 桁区切りのカンマは除去する。空欄・数値でない・負・非有限は None。
pub fn parse_rate(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// 照合用の単価表
///
/// 品目は挿入順を保持し、その位置が同点時の最終順位になる。
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    /// 品名の正規化済み語集合（品目と同じ並び）
    tokens: Vec<BTreeSet<String>>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        let tokens = items
            .iter()
            .map(|item| tokenize(&item.description).into_iter().collect())
            .collect();
        Self { items, tokens }
    }

    /// ヘッダー付きの行データから作成
    ///
    /// 品名が空の行は不正行として除外し、警告にする。
    /// `source` は警告に使う出典名（ファイル名など）。
    pub fn from_rows<S: AsRef<str>>(
        source: &str,
        headers: &[S],
        rows: &[Vec<String>],
    ) -> Result<(Self, Vec<Warning>)> {
        let columns = ColumnMap::resolve(headers)?;
        let mut items = Vec::with_capacity(rows.len());
        let mut warnings = Vec::new();

        for (line, row) in rows.iter().enumerate() {
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            };

            let description = cell(Some(columns.description));
            if description.is_empty() {
                if row.iter().all(|c| c.trim().is_empty()) {
                    continue;
                }
                warnings.push(Warning::new(
                    WarningKind::MalformedCatalogRow,
                    format!("{}:{}", source, line + 2),
                    "row has no description and was skipped",
                ));
                continue;
            }

            items.push(CatalogItem {
                description,
                unit: cell(columns.unit),
                rate: parse_rate(&cell(columns.rate)),
            });
        }

        Ok((Self::new(items), warnings))
    }

    /// 別の単価表を末尾に連結
    pub fn extend(&mut self, other: Catalog) {
        self.items.extend(other.items);
        self.tokens.extend(other.tokens);
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&CatalogItem> {
        self.items.get(index)
    }

    /// 品目の語集合
    pub fn tokens(&self, index: usize) -> Option<&BTreeSet<String>> {
        self.tokens.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 単価が空欄・不明の品目数
    pub fn missing_rate_count(&self) -> usize {
        self.items.iter().filter(|i| i.rate.is_none()).count()
    }
}

/// 単価表の状態
///
/// 読み込みに失敗した場合も処理は止めず、照合は全件「該当なし」になる。
#[derive(Debug, Clone)]
pub enum CatalogState {
    Available(Catalog),
    Unavailable { reason: String },
}

impl CatalogState {
    pub fn catalog(&self) -> Option<&Catalog> {
        match self {
            CatalogState::Available(catalog) => Some(catalog),
            CatalogState::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CatalogState::Available(_))
    }

    pub fn len(&self) -> usize {
        self.catalog().map(|c| c.len()).unwrap_or(0)
    }
}

impl From<Catalog> for CatalogState {
    fn from(catalog: Catalog) -> Self {
        CatalogState::Available(catalog)
    }
}
