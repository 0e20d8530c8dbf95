//! エラーケーステスト
//!
//! 入力ファイルの不備に対するエラー種別とメッセージを検証

mod common;

use road_cost_rust::batch;
use road_cost_rust::config::Config;
use road_cost_rust::error::RoadCostError;
use road_cost_rust::loader;
use std::path::Path;
use tempfile::tempdir;

/// 存在しない対策リスト
#[test]
fn test_missing_interventions_file() {
    let err = batch::load_interventions(Path::new("/nonexistent/interventions.json")).unwrap_err();
    assert!(matches!(err, RoadCostError::FileNotFound(_)));
}

/// 対策リストの形式不正
#[test]
fn test_malformed_interventions_file() {
    let dir = tempdir().unwrap();
    common::write(dir.path(), "bad.json", r#"{"items": 3}"#);
    let err = batch::load_interventions(&dir.path().join("bad.json")).unwrap_err();
    assert!(matches!(err, RoadCostError::JsonParse(_)));
}

/// 必須列のない単価表
#[test]
fn test_catalog_without_description_column() {
    let dir = tempdir().unwrap();
    common::write(dir.path(), "sor.csv", "name,unit,rate\nStud,nos,200\n");
    let result = loader::load_catalog(&dir.path().join("sor.csv"));
    assert!(result.is_err());
}

/// 範囲外の設定値
#[test]
fn test_invalid_config_file() {
    let dir = tempdir().unwrap();
    common::write(dir.path(), "config.json", r#"{"min_combined_score": 2.0}"#);
    let err = Config::load_from(&dir.path().join("config.json")).unwrap_err();
    assert!(matches!(err, RoadCostError::Config(_)));
}

/// RoadCostErrorのDisplay実装確認
#[test]
fn test_error_display() {
    let errors = vec![
        RoadCostError::Config("テスト設定エラー".to_string()),
        RoadCostError::FileNotFound("rulebook.json".to_string()),
        RoadCostError::InvalidRulebook("rulebook.json: 不正".to_string()),
        RoadCostError::InvalidCatalog("sor.csv".to_string()),
        RoadCostError::InvalidIndex("sor_index.json".to_string()),
        RoadCostError::Excel("sor.xlsx".to_string()),
        RoadCostError::ExcelGeneration("Excel生成エラー".to_string()),
        RoadCostError::Cancelled,
    ];

    for err in errors {
        let display = format!("{}", err);
        assert!(!display.is_empty(), "エラーメッセージが空: {:?}", err);
    }
}

/// 共通ライブラリのエラーはそのまま表示
#[test]
fn test_common_error_is_transparent() {
    let inner = road_cost_common::Error::Parse("数量が数値ではありません".to_string());
    let expected = inner.to_string();
    let err: RoadCostError = inner.into();
    assert_eq!(err.to_string(), expected);
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: RoadCostError = io.into();
    assert!(err.to_string().contains("IOエラー"));
}
