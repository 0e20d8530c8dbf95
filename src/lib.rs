//! Road Cost CLI Library
//!
//! 設定・データ読み込み・バッチ実行・出力（エンジン本体は road-cost-common）

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod loader;
pub mod logging;
