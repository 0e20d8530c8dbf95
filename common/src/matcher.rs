//! 単価表照合エンジン
//!
//! 材料コード・数量・単位から、語句スコアと単位スコアの加重和で
//! 単価表の最良品目を選ぶ。
//!
//! 順位: 総合スコア降順 → 単価あり優先 → 単価表の挿入順

use crate::catalog::{Catalog, CatalogState};
use crate::prefilter::VectorPrefilter;
use crate::text::{token_set_similarity_of, tokenize};
use crate::types::{MatchResult, ScoredCandidate, Warning, WarningKind};
use crate::unit::unit_score;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// 語句スコアの重み
pub const LEXICAL_WEIGHT: f64 = 0.7;
/// 単位スコアの重み
pub const UNIT_WEIGHT: f64 = 0.3;
/// 監査用候補リストの既定件数
pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// 照合オプション
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// 結果に含める候補数の上限
    pub candidate_limit: usize,
    /// これ未満の最良候補は「該当なし」とする
    pub min_combined_score: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            min_combined_score: 0.0,
        }
    }
}

/// 候補の生成方法
#[derive(Debug, Default)]
pub enum CandidateSource {
    /// 全件走査
    #[default]
    FullScan,
    /// ベクトル類似度で上位K件に絞る
    Prefilter(VectorPrefilter),
}

/// 総合スコア
pub fn combined_score(lexical: f64, unit: f64) -> f64 {
    LEXICAL_WEIGHT * lexical + UNIT_WEIGHT * unit
}

/// 候補の順位比較
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| b.rate.is_some().cmp(&a.rate.is_some()))
        .then_with(|| a.catalog_index.cmp(&b.catalog_index))
}

/// 単価表照合
#[derive(Debug)]
pub struct SorMatcher {
    catalog: CatalogState,
    source: CandidateSource,
    options: MatchOptions,
    warnings: Vec<Warning>,
}

impl SorMatcher {
    /// 照合器を作成
    ///
    /// 前段絞り込みのインデックスが単価表と整合しない場合は全件走査に切り替え、
    /// `PrefilterFallback` 警告を残す。
    pub fn new(catalog: CatalogState, source: CandidateSource, options: MatchOptions) -> Self {
        let mut warnings = Vec::new();

        let source = match source {
            CandidateSource::Prefilter(prefilter) => match prefilter.check_compatible(catalog.len()) {
                Ok(()) => CandidateSource::Prefilter(prefilter),
                Err(reason) => {
                    tracing::warn!(%reason, "前段絞り込みを無効化し全件走査に切り替えます");
                    warnings.push(Warning::new(WarningKind::PrefilterFallback, "embedding_index", reason));
                    CandidateSource::FullScan
                }
            },
            CandidateSource::FullScan => CandidateSource::FullScan,
        };

        if let CatalogState::Unavailable { reason } = &catalog {
            warnings.push(Warning::new(WarningKind::CatalogUnavailable, "catalog", reason.clone()));
        }

        Self { catalog, source, options, warnings }
    }

    /// 全件走査・既定オプション
    pub fn full_scan(catalog: Catalog) -> Self {
        Self::new(CatalogState::Available(catalog), CandidateSource::FullScan, MatchOptions::default())
    }

    pub fn catalog(&self) -> &CatalogState {
        &self.catalog
    }

    pub fn options(&self) -> &MatchOptions {
        &self.options
    }

    pub fn uses_prefilter(&self) -> bool {
        matches!(self.source, CandidateSource::Prefilter(_))
    }

    /// 構築時の警告
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// 材料を単価表と照合
    ///
    /// # Arguments
    /// * `description` - 材料コードまたは説明
    /// * `quantity` - 数量（金額算定用）
    /// * `unit` - 材料の単位（不明なら None）
    pub fn match_material(&self, description: &str, quantity: f64, unit: Option<&str>) -> MatchResult {
        let mut result = MatchResult {
            material: description.to_string(),
            qty: quantity,
            unit: unit.map(|u| u.to_string()),
            ..Default::default()
        };

        let catalog = match &self.catalog {
            CatalogState::Available(catalog) => catalog,
            CatalogState::Unavailable { reason } => {
                result.catalog_unavailable = true;
                result.warnings.push(Warning::new(
                    WarningKind::CatalogUnavailable,
                    description,
                    format!("catalog unavailable: {}", reason),
                ));
                return result;
            }
        };

        let mut ranked = self.score_candidates(catalog, description, unit);
        ranked.sort_by(rank_order);

        let best = ranked
            .first()
            .filter(|c| c.combined_score >= self.options.min_combined_score)
            .cloned();

        match &best {
            None => {
                tracing::debug!(material = description, candidates = ranked.len(), "単価表に該当なし");
                result.warnings.push(Warning::new(
                    WarningKind::NoCatalogMatch,
                    description,
                    if ranked.is_empty() {
                        "catalog has no candidates".to_string()
                    } else {
                        format!(
                            "best score {:.3} is below threshold {:.3}",
                            ranked[0].combined_score, self.options.min_combined_score
                        )
                    },
                ));
            }
            Some(candidate) => match candidate.rate {
                Some(rate) => result.estimated_cost = Some(quantity * rate),
                None => result.warnings.push(Warning::new(
                    WarningKind::MissingRate,
                    description,
                    format!("matched '{}' has no rate", candidate.description),
                )),
            },
        }

        ranked.truncate(self.options.candidate_limit);
        result.best_match = best;
        result.candidates = ranked;
        result
    }

    fn candidate_indices(&self, catalog: &Catalog, description: &str) -> Vec<usize> {
        match &self.source {
            CandidateSource::FullScan => (0..catalog.len()).collect(),
            CandidateSource::Prefilter(prefilter) => prefilter.select(description),
        }
    }

    fn score_candidates(&self, catalog: &Catalog, description: &str, unit: Option<&str>) -> Vec<ScoredCandidate> {
        let query: BTreeSet<String> = tokenize(description).into_iter().collect();

        self.candidate_indices(catalog, description)
            .into_iter()
            .filter_map(|index| {
                let item = catalog.get(index)?;
                let tokens = catalog.tokens(index)?;
                let lexical = token_set_similarity_of(&query, tokens);
                let unit_score = unit_score(unit, &item.unit);
                Some(ScoredCandidate {
                    catalog_index: index,
                    description: item.description.clone(),
                    unit: item.unit.clone(),
                    rate: item.rate,
                    lexical_score: lexical,
                    unit_score,
                    combined_score: combined_score(lexical, unit_score),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefilter::{EmbeddingIndex, HashingEmbedder};
    use crate::types::CatalogItem;

    fn item(description: &str, unit: &str, rate: Option<f64>) -> CatalogItem {
        CatalogItem {
            description: description.to_string(),
            unit: unit.to_string(),
            rate,
        }
    }

    fn sample_catalog() -> Catalog {
        Catalog::new(vec![
            item("Thermoplastic road marking paint", "kg", Some(120.0)),
            item("Aluminium sign plate 600mm", "m2", Some(850.0)),
            item("MS post 75mm dia", "nos", Some(1450.0)),
            item("Retro reflective sheeting Type XI", "m2", None),
        ])
    }

    #[test]
    fn test_plate_match() {
        let matcher = SorMatcher::full_scan(sample_catalog());
        let result = matcher.match_material("ALUMINIUM_PLATE_m2", 0.2827, Some("m2"));

        let best = result.best_match.as_ref().unwrap();
        assert_eq!(best.description, "Aluminium sign plate 600mm");
        assert_eq!(best.unit_score, 1.0);
        assert!((result.estimated_cost.unwrap() - 240.295).abs() < 0.01);
        assert!(result.warnings.is_empty());
        assert!(result.candidates.len() <= DEFAULT_CANDIDATE_LIMIT);
        assert_eq!(result.candidates[0], *best);
    }

    #[test]
    fn test_scores_bounded() {
        let matcher = SorMatcher::full_scan(sample_catalog());
        for (code, unit) in [("MS_POST_nos", Some("nos")), ("PAINT_kg", Some("kg")), ("X", None)] {
            let result = matcher.match_material(code, 1.0, unit);
            for c in &result.candidates {
                assert!((0.0..=1.0).contains(&c.lexical_score));
                assert!([0.0, 0.4, 0.8, 1.0].contains(&c.unit_score));
                assert!((0.0..=1.0).contains(&c.combined_score));
            }
        }
    }

    #[test]
    fn test_empty_catalog() {
        let matcher = SorMatcher::full_scan(Catalog::default());
        let result = matcher.match_material("ALUMINIUM_PLATE_m2", 1.0, Some("m2"));
        assert!(result.best_match.is_none());
        assert!(result.estimated_cost.is_none());
        assert!(result.candidates.is_empty());
        assert_eq!(result.warnings[0].kind, WarningKind::NoCatalogMatch);
    }

    #[test]
    fn test_missing_rate() {
        let matcher = SorMatcher::full_scan(sample_catalog());
        let result = matcher.match_material("RETRO_REFLECTIVE_SHEETING_m2", 2.0, Some("m2"));
        let best = result.best_match.as_ref().unwrap();
        assert_eq!(best.catalog_index, 3);
        assert!(result.estimated_cost.is_none());
        assert_eq!(result.warnings[0].kind, WarningKind::MissingRate);
    }

    #[test]
    fn test_tie_break_rate_then_order() {
        let catalog = Catalog::new(vec![
            item("road stud", "nos", None),
            item("road stud", "nos", Some(200.0)),
            item("road stud", "nos", Some(150.0)),
        ]);
        let matcher = SorMatcher::full_scan(catalog);
        let result = matcher.match_material("ROAD_STUD_nos", 10.0, Some("nos"));
        let order: Vec<usize> = result.candidates.iter().map(|c| c.catalog_index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(result.rate(), Some(200.0));
    }

    #[test]
    fn test_zero_rate_costs_zero() {
        let matcher = SorMatcher::full_scan(Catalog::new(vec![item("road stud", "nos", Some(0.0))]));
        let result = matcher.match_material("ROAD_STUD_nos", 10.0, Some("nos"));
        assert_eq!(result.estimated_cost, Some(0.0));
    }

    #[test]
    fn test_min_combined_score() {
        let options = MatchOptions { candidate_limit: 2, min_combined_score: 0.95 };
        let matcher = SorMatcher::new(sample_catalog().into(), CandidateSource::FullScan, options);
        let result = matcher.match_material("STEEL_BEAM_kg", 1.0, Some("kg"));
        assert!(result.best_match.is_none());
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.warnings[0].kind, WarningKind::NoCatalogMatch);
    }

    #[test]
    fn test_catalog_unavailable() {
        let matcher = SorMatcher::new(
            CatalogState::Unavailable { reason: "file not found".into() },
            CandidateSource::FullScan,
            MatchOptions::default(),
        );
        assert_eq!(matcher.warnings()[0].kind, WarningKind::CatalogUnavailable);

        let result = matcher.match_material("ALUMINIUM_PLATE_m2", 1.0, Some("m2"));
        assert!(result.catalog_unavailable);
        assert!(result.best_match.is_none());
        assert_eq!(result.warnings[0].kind, WarningKind::CatalogUnavailable);
    }

    #[test]
    fn test_prefilter_agrees_with_full_scan() {
        let catalog = sample_catalog();
        let embedder = HashingEmbedder::new(128);
        let index = EmbeddingIndex::build(&catalog, &embedder);
        let prefilter = VectorPrefilter::new(index, Box::new(embedder), catalog.len());

        let full = SorMatcher::full_scan(catalog.clone());
        let filtered = SorMatcher::new(catalog.into(), CandidateSource::Prefilter(prefilter), MatchOptions::default());
        assert!(filtered.uses_prefilter());

        for (code, unit) in [("ALUMINIUM_PLATE_m2", Some("m2")), ("MS_POST_nos", Some("nos"))] {
            let a = full.match_material(code, 1.0, unit);
            let b = filtered.match_material(code, 1.0, unit);
            assert_eq!(a.best_match, b.best_match);
            assert_eq!(a.candidates, b.candidates);
        }
    }

    #[test]
    fn test_prefilter_size_mismatch_falls_back() {
        let catalog = sample_catalog();
        let embedder = HashingEmbedder::new(32);
        let index = EmbeddingIndex::build(&Catalog::new(vec![item("only one", "", None)]), &embedder);
        let prefilter = VectorPrefilter::new(index, Box::new(embedder), 2);

        let matcher = SorMatcher::new(catalog.into(), CandidateSource::Prefilter(prefilter), MatchOptions::default());
        assert!(!matcher.uses_prefilter());
        assert_eq!(matcher.warnings()[0].kind, WarningKind::PrefilterFallback);
        assert!(matcher.match_material("ALUMINIUM_PLATE_m2", 1.0, Some("m2")).best_match.is_some());
    }
}
