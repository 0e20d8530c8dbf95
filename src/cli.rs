use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "road-cost")]
#[command(about = "道路安全対策の数量算定・単価照合・積算ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（省略時は ~/.config/road-cost/config.json）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// ルールブックJSON
    #[arg(long, global = true)]
    pub rulebook: Option<PathBuf>,

    /// 据付費JSON
    #[arg(long, global = true)]
    pub installation: Option<PathBuf>,

    /// 単価表（CSV/XLSXまたはディレクトリ）
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// 埋め込みインデックスJSON
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// 前段絞り込みの件数（0で全件走査）
    #[arg(long, global = true)]
    pub top_k: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 対策種別とパラメータから材料数量を算定
    Estimate {
        /// 対策種別（例: SPEED_LIMIT_SIGN）
        #[arg(short = 't', long = "type", required = true)]
        intervention_type: String,

        /// パラメータ（key=value、複数指定可）
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,
    },

    /// 材料を単価表と照合
    Match {
        /// 材料コードまたは説明
        #[arg(required = true)]
        description: String,

        /// 数量
        #[arg(short, long, default_value = "1")]
        qty: f64,

        /// 単位（省略時は材料コード末尾から導出）
        #[arg(short, long)]
        unit: Option<String>,
    },

    /// 算定済み数量JSONから積算
    Cost {
        /// `{"intervention_type": ..., "materials": {code: qty}}` 形式のJSON
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 対策リストJSONを一括積算
    Run {
        /// 対策リストJSON
        #[arg(required = true)]
        input: PathBuf,

        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 出力形式 (json/excel/both)
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,

        /// 出力名
        #[arg(short, long, default_value = "cost_report")]
        title: String,
    },

    /// データを読み込んで検証
    Check,

    /// 単価表の埋め込みインデックスを作成
    Index {
        /// 出力JSONファイル
        #[arg(short, long, required = true)]
        output: PathBuf,

        /// 埋め込み次元（省略時は設定値）
        #[arg(long)]
        dim: Option<usize>,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// ルールブックのパスを設定
        #[arg(long)]
        set_rulebook: Option<PathBuf>,

        /// 据付費表のパスを設定
        #[arg(long)]
        set_installation: Option<PathBuf>,

        /// 単価表のパスを設定
        #[arg(long)]
        set_catalog: Option<PathBuf>,

        /// 埋め込みインデックスのパスを設定
        #[arg(long)]
        set_index: Option<PathBuf>,

        /// 前段絞り込みの件数を設定
        #[arg(long)]
        set_top_k: Option<usize>,

        /// 採用する最低スコアを設定（0.0-1.0）
        #[arg(long)]
        set_min_score: Option<f64>,
    },
}

/// `key=value` 形式のパラメータを解析
pub fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("key=value 形式で指定してください: {}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("パラメータ名が空です: {}", s));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("数値ではありません: {}", value.trim()))?;
    if !value.is_finite() {
        return Err(format!("有限の数値を指定してください: {}", s));
    }
    Ok((key.to_string(), value))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ExportFormat {
    #[default]
    Json,
    Excel,
    Both,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "both" => Ok(ExportFormat::Both),
            _ => Err(format!("Unknown format: {}. Use json, excel, or both", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Excel => write!(f, "excel"),
            ExportFormat::Both => write!(f, "both"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("diameter_mm=600"), Ok(("diameter_mm".to_string(), 600.0)));
        assert_eq!(parse_param(" count = 2.5 "), Ok(("count".to_string(), 2.5)));
        assert!(parse_param("count").is_err());
        assert!(parse_param("=3").is_err());
        assert!(parse_param("count=abc").is_err());
        assert!(parse_param("count=inf").is_err());
    }

    #[test]
    fn test_export_format() {
        assert_eq!("JSON".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert_eq!("xlsx".parse::<ExportFormat>(), Ok(ExportFormat::Excel));
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Both.to_string(), "both");
    }

    #[test]
    fn test_cli_parses_estimate() {
        let cli = Cli::try_parse_from([
            "road-cost", "estimate", "--type", "SPEED_LIMIT_SIGN", "--param", "count=2", "-p", "diameter_mm=750",
        ])
        .unwrap();
        match cli.command {
            Commands::Estimate { intervention_type, params } => {
                assert_eq!(intervention_type, "SPEED_LIMIT_SIGN");
                assert_eq!(params.len(), 2);
            }
            _ => panic!("expected estimate"),
        }
    }

    #[test]
    fn test_cli_parses_run_with_globals() {
        let cli = Cli::try_parse_from([
            "road-cost", "run", "interventions.json", "-f", "both", "--catalog", "data/sor.csv", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.catalog, Some(PathBuf::from("data/sor.csv")));
        assert!(matches!(cli.command, Commands::Run { format: ExportFormat::Both, .. }));
    }
}
