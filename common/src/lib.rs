//! Road Cost Common Library
//!
//! 道路安全対策の積算エンジン（I/Oなし）
//!
//! - formula / rulebook / quantity: 数量式の文法とルールブック、数量算定
//! - text / unit / catalog / prefilter / matcher: 単価表照合
//! - cost / pipeline / summary: 集計、パイプライン、バッチ集計

pub mod error;
pub mod types;
pub mod formula;
pub mod rulebook;
pub mod quantity;
pub mod text;
pub mod unit;
pub mod catalog;
pub mod prefilter;
pub mod matcher;
pub mod cost;
pub mod pipeline;
pub mod summary;
pub mod export;

pub use error::{Error, FormulaError, Result};
pub use types::{
    CatalogItem, CostBreakdown, CostLineItem, Intervention, LineKind, MatchResult, MaterialQuantity,
    ScoredCandidate, Warning, WarningKind,
};
pub use rulebook::{MaterialRule, Rulebook, RulebookEntry};
pub use quantity::{estimate, QuantityEstimate, UnknownInterventionType};
pub use catalog::{parse_rate, Catalog, CatalogState, ColumnMap};
pub use prefilter::{EmbeddingIndex, Embedder, HashingEmbedder, VectorPrefilter};
pub use matcher::{CandidateSource, MatchOptions, SorMatcher};
pub use cost::{aggregate, InstallationRates, INSTALLATION_LABEL};
pub use pipeline::{BatchEntry, BatchOutcome, CancelFlag, CostingEngine, InterventionCost, InterventionError, Snapshot};
pub use summary::BatchSummary;
