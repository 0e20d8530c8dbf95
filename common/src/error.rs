//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),
}

/// 数式のパース・評価エラー
///
/// `Unsafe` と `Syntax` はパース時（評価前）に確定する。
/// それ以外は評価時のエラー。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unsafe expression at {position}: {reason}")]
    Unsafe { position: usize, reason: String },

    #[error("syntax error at {position}: {reason}")]
    Syntax { position: usize, reason: String },

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("non-finite result in {0}")]
    NonFinite(String),
}

impl FormulaError {
    /// 文法違反（セキュリティ境界での拒否）かどうか
    pub fn is_unsafe(&self) -> bool {
        matches!(self, FormulaError::Unsafe { .. })
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::Io(io_error);
        let display = format!("{}", error);
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_error_display_config() {
        let error = Error::Config("rulebook not found".to_string());
        assert_eq!(format!("{}", error), "Config error: rulebook not found");
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }

    #[test]
    fn test_formula_error_conversion() {
        let error: Error = FormulaError::DivisionByZero.into();
        assert!(matches!(error, Error::Formula(FormulaError::DivisionByZero)));
        assert!(format!("{}", error).contains("division by zero"));
    }

    #[test]
    fn test_formula_error_is_unsafe() {
        let unsafe_err = FormulaError::Unsafe { position: 0, reason: "call".into() };
        let syntax_err = FormulaError::Syntax { position: 3, reason: "eof".into() };
        assert!(unsafe_err.is_unsafe());
        assert!(!syntax_err.is_unsafe());
        assert!(!FormulaError::UndefinedVariable("x".into()).is_unsafe());
    }
}
