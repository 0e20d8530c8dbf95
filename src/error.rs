use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoadCostError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("ルールブックが不正: {0}")]
    InvalidRulebook(String),

    #[error("単価表が不正: {0}")]
    InvalidCatalog(String),

    #[error("埋め込みインデックスが不正: {0}")]
    InvalidIndex(String),

    #[error("CSV読み込みエラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel読み込みエラー: {0}")]
    Excel(String),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("処理を中断しました")]
    Cancelled,

    #[error(transparent)]
    Common(#[from] road_cost_common::Error),
}

pub type Result<T> = std::result::Result<T, RoadCostError>;
