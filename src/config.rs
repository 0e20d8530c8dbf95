use crate::error::{RoadCostError, Result};
use road_cost_common::matcher::{MatchOptions, DEFAULT_CANDIDATE_LIMIT};
use road_cost_common::prefilter::DEFAULT_EMBEDDING_DIM;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rulebook_path: PathBuf,
    pub installation_path: PathBuf,
    /// 単価表（CSV/XLSXファイル、またはそれらを含むディレクトリ）
    pub catalog_path: PathBuf,
    /// 埋め込みインデックスJSON（未指定なら全件走査）
    pub index_path: Option<PathBuf>,
    /// 前段絞り込みの件数（0で全件走査）
    pub prefilter_top_k: usize,
    /// 語ハッシュ埋め込みの次元
    pub embedding_dim: usize,
    pub candidate_limit: usize,
    pub min_combined_score: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rulebook_path: PathBuf::from("data/rulebook.json"),
            installation_path: PathBuf::from("data/installation_costs.json"),
            catalog_path: PathBuf::from("data/sor_csv"),
            index_path: None,
            prefilter_top_k: 0,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
            min_combined_score: 0.0,
        }
    }
}

impl Config {
    /// 指定パスから読み込み（ファイルがなければ既定値）
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RoadCostError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("road-cost").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_combined_score) {
            return Err(RoadCostError::Config(format!(
                "min_combined_score は 0.0〜1.0 で指定してください: {}",
                self.min_combined_score
            )));
        }
        if self.embedding_dim == 0 {
            return Err(RoadCostError::Config("embedding_dim は1以上で指定してください".into()));
        }
        if self.candidate_limit == 0 {
            return Err(RoadCostError::Config("candidate_limit は1以上で指定してください".into()));
        }
        Ok(())
    }

    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            candidate_limit: self.candidate_limit,
            min_combined_score: self.min_combined_score,
        }
    }
}
