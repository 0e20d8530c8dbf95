//! 統合テスト用のデータ一式（一時ディレクトリに書き出す）

#![allow(dead_code)]

use road_cost_rust::config::Config;
use std::path::Path;
use tempfile::TempDir;

pub const RULEBOOK: &str = r#"{
    "SPEED_LIMIT_SIGN": {
        "defaults": {"count": 1, "diameter_mm": 600},
        "materials": [
            {"code": "ALUMINIUM_PLATE_m2", "qty_formula": "0.2827"},
            {"code": "MS_POST_nos", "qty_formula": "count"}
        ]
    },
    "ROAD_STUDS": {
        "defaults": {"length_m": 100, "spacing_m": 10},
        "materials": [
            {"code": "BROKEN_nos", "qty_formula": "1/0"},
            {"code": "ROAD_STUD_nos", "qty_formula": "ceil(length_m / spacing_m)"}
        ]
    },
    "BAD_FORMULA": {
        "materials": [
            {"code": "INJECTED_nos", "qty_formula": "__import__('os')"},
            {"code": "NEGATIVE_nos", "qty_formula": "0 - 5"},
            {"code": "PAINT_kg", "qty_formula": "2.5"}
        ]
    }
}"#;

pub const INSTALLATION: &str = r#"{
    "SPEED_LIMIT_SIGN": {"rate": 500, "unit": "job"},
    "ROAD_STUDS": {"rate": "1,200"},
    "BAD_FORMULA": {"rate": 0}
}"#;

pub const CATALOG_CSV: &str = "description,unit,unit_rate\n\
Aluminium sign plate 600mm,m2,850\n\
MS post 75mm dia,nos,\"1,150\"\n\
Cat eye road stud,nos,200\n\
Road marking paint,kg,0\n";

/// データファイルを書き出し、それを指す設定を返す
pub fn fixture(dir: &TempDir) -> Config {
    road_cost_rust::logging::init_test();
    write(dir.path(), "rulebook.json", RULEBOOK);
    write(dir.path(), "installation_costs.json", INSTALLATION);
    std::fs::create_dir(dir.path().join("sor_csv")).unwrap();
    write(&dir.path().join("sor_csv"), "roads.csv", CATALOG_CSV);

    Config {
        rulebook_path: dir.path().join("rulebook.json"),
        installation_path: dir.path().join("installation_costs.json"),
        catalog_path: dir.path().join("sor_csv"),
        ..Default::default()
    }
}

pub fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}
