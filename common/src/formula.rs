//! 数量算定式モジュール
//!
//! ルールブックの数量式（`(width_mm * height_mm)/1e6` など）を
//! 閉じた文法でパースし、ASTとして評価する。
//!
//! ## 文法
//! ```text
//! expr       := comparison
//! comparison := additive (("<" | "<=" | ">" | ">=" | "==" | "!=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("+" | "-") unary | power
//! power      := primary ("**" unary)?
//! primary    := NUMBER | NAME | call | "math" "." NAME [args] | "(" expr ")"
//! call       := FUNC "(" expr ("," expr)* ")"
//! ```
//!
//! 許可リスト外の関数・属性アクセス・文字はパース時に `FormulaError::Unsafe` で拒否し、
//! 評価には進まない。

use crate::error::FormulaError;
use std::collections::{BTreeMap, BTreeSet};

/// 数式の最大長（文字数）
pub const MAX_FORMULA_LEN: usize = 512;

/// 括弧・単項演算子の最大ネスト
pub const MAX_DEPTH: usize = 64;

/// 識別子として使えない予約語
const RESERVED_WORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "exec", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "print", "raise", "return",
    "try", "while", "with", "yield", "eval", "open", "getattr", "setattr", "globals", "locals",
];

/// 許可された関数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Round,
    Min,
    Max,
    Int,
    Trunc,
    Float,
    Ceil,
    Floor,
    Sqrt,
    Pow,
    Exp,
    Log,
    Log10,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" | "fabs" => Func::Abs,
            "round" => Func::Round,
            "min" => Func::Min,
            "max" => Func::Max,
            "int" => Func::Int,
            "trunc" => Func::Trunc,
            "float" => Func::Float,
            "ceil" => Func::Ceil,
            "floor" => Func::Floor,
            "sqrt" => Func::Sqrt,
            "pow" => Func::Pow,
            "exp" => Func::Exp,
            "log" => Func::Log,
            "log10" => Func::Log10,
            _ => return None,
        })
    }

    /// 引数の個数 (最小, 最大)。最大 None は可変長
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Min | Func::Max => (1, None),
            Func::Round | Func::Log => (1, Some(2)),
            Func::Pow => (2, Some(2)),
            _ => (1, Some(1)),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Round => "round",
            Func::Min => "min",
            Func::Max => "max",
            Func::Int => "int",
            Func::Trunc => "trunc",
            Func::Float => "float",
            Func::Ceil => "ceil",
            Func::Floor => "floor",
            Func::Sqrt => "sqrt",
            Func::Pow => "pow",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Log10 => "log10",
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// 数式のAST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
    End,
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;

        // 数値リテラル（1, 0.5, .5, 1e6, 2.5E-3）
        if c.is_ascii_digit() || (c == b'.' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())) {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text = &src[start..i];
            let value: f64 = text.parse().map_err(|_| FormulaError::Syntax {
                position: start,
                reason: format!("invalid number '{}'", text),
            })?;
            if !value.is_finite() {
                return Err(FormulaError::Syntax {
                    position: start,
                    reason: format!("number out of range '{}'", text),
                });
            }
            tokens.push((Token::Number(value), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push((Token::Ident(src[start..i].to_string()), start));
            continue;
        }

        let two = src.get(i..i + 2).unwrap_or("");
        let op2 = match two {
            "**" => Some("**"),
            "//" => Some("//"),
            "<=" => Some("<="),
            ">=" => Some(">="),
            "==" => Some("=="),
            "!=" => Some("!="),
            _ => None,
        };
        if let Some(op) = op2 {
            tokens.push((Token::Op(op), start));
            i += 2;
            continue;
        }

        let token = match c {
            b'+' => Token::Op("+"),
            b'-' => Token::Op("-"),
            b'*' => Token::Op("*"),
            b'/' => Token::Op("/"),
            b'%' => Token::Op("%"),
            b'<' => Token::Op("<"),
            b'>' => Token::Op(">"),
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'.' => Token::Dot,
            _ => {
                let ch = src.get(start..).and_then(|s| s.chars().next()).unwrap_or('?');
                return Err(FormulaError::Unsafe {
                    position: start,
                    reason: format!("character '{}' is not allowed", ch),
                });
            }
        };
        tokens.push((token, start));
        i += 1;
    }

    tokens.push((Token::End, src.len()));
    Ok(tokens)
}

/// 再帰下降パーサー（呼び出しごとに生成し、状態は持ち越さない）
struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn peek_op(&self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Token::Op(op) if candidates.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn syntax(&self, reason: impl Into<String>) -> FormulaError {
        FormulaError::Syntax { position: self.position(), reason: reason.into() }
    }

    fn unsafe_at(&self, position: usize, reason: impl Into<String>) -> FormulaError {
        FormulaError::Unsafe { position, reason: reason.into() }
    }

    fn enter(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.unsafe_at(self.position(), format!("nesting deeper than {}", MAX_DEPTH)));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// 比較は1段のみ（`a < b < c` は連鎖比較と紛らわしいため文法エラー）
    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        const COMPARISONS: &[&str] = &["<", "<=", ">", ">=", "==", "!="];

        let left = self.parse_additive()?;
        let Some(op) = self.peek_op(COMPARISONS) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if self.peek_op(COMPARISONS).is_some() {
            return Err(self.syntax("chained comparison is not supported; use parentheses"));
        }
        let bin = match op {
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "==" => BinOp::Eq,
            _ => BinOp::Ne,
        };
        Ok(Expr::Binary(bin, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek_op(&["+", "-"]) {
            self.advance();
            let right = self.parse_term()?;
            let bin = if op == "+" { BinOp::Add } else { BinOp::Sub };
            left = Expr::Binary(bin, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_op(&["*", "/", "//", "%"]) {
            self.advance();
            let right = self.parse_unary()?;
            let bin = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "//" => BinOp::FloorDiv,
                _ => BinOp::Mod,
            };
            left = Expr::Binary(bin, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(op) = self.peek_op(&["+", "-"]) {
            self.advance();
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            let unary = if op == "-" { UnaryOp::Neg } else { UnaryOp::Pos };
            return Ok(Expr::Unary(unary, Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.parse_primary()?;
        if self.peek_op(&["**"]).is_some() {
            self.advance();
            self.enter()?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let start = self.position();
        let expr = match self.advance() {
            Token::Number(value) => Expr::Number(value),
            Token::LParen => {
                self.enter()?;
                let inner = self.parse_expr()?;
                self.leave();
                if self.advance() != Token::RParen {
                    return Err(self.syntax("expected ')'"));
                }
                inner
            }
            Token::Ident(name) => self.parse_name(name, start)?,
            Token::End => return Err(self.syntax("unexpected end of formula")),
            other => return Err(FormulaError::Syntax {
                position: start,
                reason: format!("unexpected token {:?}", other),
            }),
        };

        // 名前以外への呼び出し・属性アクセスは文法外
        match self.peek() {
            Token::LParen => Err(self.unsafe_at(self.position(), "call on a non-function value")),
            Token::Dot => Err(self.unsafe_at(self.position(), "attribute access is not allowed")),
            Token::Ident(word) if RESERVED_WORDS.contains(&word.as_str()) => {
                Err(self.unsafe_at(self.position(), format!("keyword '{}' is not allowed", word)))
            }
            Token::Number(_) | Token::Ident(_) => Err(self.syntax("missing operator")),
            _ => Ok(expr),
        }
    }

    fn parse_name(&mut self, name: String, start: usize) -> Result<Expr, FormulaError> {
        if name.starts_with("__") {
            return Err(self.unsafe_at(start, format!("name '{}' is not allowed", name)));
        }
        if RESERVED_WORDS.contains(&name.as_str()) {
            return Err(self.unsafe_at(start, format!("keyword '{}' is not allowed", name)));
        }

        if name == "math" {
            if self.peek() != &Token::Dot {
                return Err(self.unsafe_at(start, "module 'math' cannot be used as a value"));
            }
            self.advance();
            let attr_pos = self.position();
            let attr = match self.advance() {
                Token::Ident(attr) => attr,
                _ => return Err(self.syntax("expected name after 'math.'")),
            };
            if let Some(value) = constant(&attr) {
                return Ok(Expr::Number(value));
            }
            return match Func::from_name(&attr) {
                Some(func) if self.peek() == &Token::LParen => self.parse_call(func, attr_pos),
                Some(_) => Err(self.unsafe_at(attr_pos, format!("function 'math.{}' must be called", attr))),
                None => Err(self.unsafe_at(attr_pos, format!("'math.{}' is not in the allow-list", attr))),
            };
        }

        if self.peek() == &Token::LParen {
            return match Func::from_name(&name) {
                Some(func) => self.parse_call(func, start),
                None => Err(self.unsafe_at(start, format!("function '{}' is not in the allow-list", name))),
            };
        }

        if Func::from_name(&name).is_some() {
            return Err(self.unsafe_at(start, format!("function '{}' must be called", name)));
        }

        // 'e' は変数名として使われやすいため修飾なしでは定数扱いしない
        if name == "pi" {
            return Ok(Expr::Number(std::f64::consts::PI));
        }

        Ok(Expr::Var(name))
    }

    fn parse_call(&mut self, func: Func, start: usize) -> Result<Expr, FormulaError> {
        // '(' を消費
        self.advance();
        self.enter()?;

        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            loop {
                args.push(self.parse_expr()?);
                if self.peek() == &Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        if self.advance() != Token::RParen {
            return Err(self.syntax("expected ')' after arguments"));
        }
        self.leave();

        let (min, max) = func.arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            return Err(self.unsafe_at(
                start,
                format!("{}() does not accept {} argument(s)", func.name(), args.len()),
            ));
        }

        Ok(Expr::Call(func, args))
    }
}

/// 数式をパースする
///
/// 文法外の要素はここで拒否される。評価は [`Expr::eval`] で行う。
pub fn parse(src: &str) -> Result<Expr, FormulaError> {
    if src.chars().count() > MAX_FORMULA_LEN {
        return Err(FormulaError::Unsafe {
            position: MAX_FORMULA_LEN,
            reason: format!("formula longer than {} characters", MAX_FORMULA_LEN),
        });
    }

    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };

    if parser.peek() == &Token::End {
        return Err(parser.syntax("empty formula"));
    }

    let expr = parser.parse_expr()?;
    if parser.peek() != &Token::End {
        return Err(parser.syntax("unexpected trailing input"));
    }
    Ok(expr)
}

fn finite(value: f64, what: &str) -> Result<f64, FormulaError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FormulaError::NonFinite(what.to_string()))
    }
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// 小数点以下 `digits` 桁で四捨五入（0.5は0から遠い方へ）
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

impl Expr {
    /// コンテキストの変数値で評価する
    pub fn eval(&self, ctx: &BTreeMap<String, f64>) -> Result<f64, FormulaError> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Var(name) => ctx
                .get(name)
                .copied()
                .ok_or_else(|| FormulaError::UndefinedVariable(name.clone())),
            Expr::Unary(op, operand) => {
                let value = operand.eval(ctx)?;
                let value = match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Pos => value,
                };
                finite(value, "unary")
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(ctx)?;
                let b = rhs.eval(ctx)?;
                eval_binary(*op, a, b)
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(ctx))
                    .collect::<Result<Vec<f64>, FormulaError>>()?;
                eval_call(*func, &values)
            }
        }
    }

    /// 式が参照する変数名
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                names.insert(name.clone());
            }
            Expr::Unary(_, operand) => operand.collect_variables(names),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_variables(names)),
        }
    }
}

fn eval_binary(op: BinOp, a: f64, b: f64) -> Result<f64, FormulaError> {
    match op {
        BinOp::Add => finite(a + b, "+"),
        BinOp::Sub => finite(a - b, "-"),
        BinOp::Mul => finite(a * b, "*"),
        BinOp::Div => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            finite(a / b, "/")
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            finite((a / b).floor(), "//")
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            // 除数と同符号の剰余
            finite(a - b * (a / b).floor(), "%")
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            finite(a.powf(b), "**")
        }
        BinOp::Lt => Ok(bool_value(a < b)),
        BinOp::Le => Ok(bool_value(a <= b)),
        BinOp::Gt => Ok(bool_value(a > b)),
        BinOp::Ge => Ok(bool_value(a >= b)),
        BinOp::Eq => Ok(bool_value(a == b)),
        BinOp::Ne => Ok(bool_value(a != b)),
    }
}

fn eval_call(func: Func, args: &[f64]) -> Result<f64, FormulaError> {
    let x = args.first().copied().unwrap_or(0.0);
    let value = match func {
        Func::Abs => x.abs(),
        Func::Round => {
            let digits = args.get(1).map(|d| d.trunc() as i32).unwrap_or(0);
            round_to(x, digits)
        }
        Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Int | Func::Trunc => x.trunc(),
        Func::Float => x,
        Func::Ceil => x.ceil(),
        Func::Floor => x.floor(),
        Func::Sqrt => x.sqrt(),
        Func::Pow => {
            let y = args.get(1).copied().unwrap_or(1.0);
            if x == 0.0 && y < 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            x.powf(y)
        }
        Func::Exp => x.exp(),
        Func::Log => match args.get(1) {
            Some(base) => x.ln() / base.ln(),
            None => x.ln(),
        },
        Func::Log10 => x.log10(),
    };
    finite(value, func.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn eval_str(src: &str, pairs: &[(&str, f64)]) -> Result<f64, FormulaError> {
        parse(src)?.eval(&ctx(pairs))
    }

    #[test]
    fn test_constant_formula() {
        assert_eq!(eval_str("0.2827", &[]).unwrap(), 0.2827);
    }

    #[test]
    fn test_area_formula() {
        let value = eval_str("(width_mm * height_mm)/1e6", &[("width_mm", 900.0), ("height_mm", 600.0)]).unwrap();
        assert!((value - 0.54).abs() < 1e-12);
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval_str("2 + 3 * 4", &[]).unwrap(), 14.0);
        assert_eq!(eval_str("(2 + 3) * 4", &[]).unwrap(), 20.0);
        assert_eq!(eval_str("-2 ** 2", &[]).unwrap(), -4.0);
        assert_eq!(eval_str("2 ** 3 ** 2", &[]).unwrap(), 512.0);
        assert_eq!(eval_str("2 ** -1", &[]).unwrap(), 0.5);
    }

    #[test]
    fn test_floor_div_and_mod() {
        assert_eq!(eval_str("7 // 2", &[]).unwrap(), 3.0);
        assert_eq!(eval_str("-7 // 2", &[]).unwrap(), -4.0);
        assert_eq!(eval_str("-7 % 3", &[]).unwrap(), 2.0);
    }

    #[test]
    fn test_comparisons_yield_one_or_zero() {
        assert_eq!(eval_str("(length_m > 100) * 2", &[("length_m", 300.0)]).unwrap(), 2.0);
        assert_eq!(eval_str("length_m <= 100", &[("length_m", 300.0)]).unwrap(), 0.0);
        assert_eq!(eval_str("1 == 1", &[]).unwrap(), 1.0);
        assert_eq!(eval_str("1 != 1", &[]).unwrap(), 0.0);
        assert_eq!(eval_str("(1 < 2) < 3", &[]).unwrap(), 1.0);
    }

    #[test]
    fn test_chained_comparison_rejected() {
        assert!(matches!(parse("1 < x < 3"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("a == b != c"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_overflowing_literal_rejected() {
        assert!(matches!(parse("1e400"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("+1e400"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("count * 1e309"), Err(FormulaError::Syntax { .. })));
        assert_eq!(eval_str("1e300", &[]).unwrap(), 1e300);
    }

    #[test]
    fn test_non_finite_variable_rejected() {
        assert!(matches!(eval_str("-x", &[("x", f64::INFINITY)]), Err(FormulaError::NonFinite(_))));
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(eval_str("round(2.5)", &[]).unwrap(), 3.0);
        assert_eq!(eval_str("round(-2.5)", &[]).unwrap(), -3.0);
    }

    #[test]
    fn test_tau_not_allowed() {
        assert!(parse("math.tau").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_allowed_functions() {
        assert_eq!(eval_str("math.ceil(length_m / spacing_m)", &[("length_m", 300.0), ("spacing_m", 60.0)]).unwrap(), 5.0);
        assert_eq!(eval_str("ceil(301 / 60)", &[]).unwrap(), 6.0);
        assert_eq!(eval_str("int(2.9)", &[]).unwrap(), 2.0);
        assert_eq!(eval_str("max(1, count, 3)", &[("count", 7.0)]).unwrap(), 7.0);
        assert_eq!(eval_str("min(4, 2)", &[]).unwrap(), 2.0);
        assert_eq!(eval_str("round(2.3456, 2)", &[]).unwrap(), 2.35);
        assert_eq!(eval_str("abs(-3)", &[]).unwrap(), 3.0);
        assert_eq!(eval_str("sqrt(16)", &[]).unwrap(), 4.0);
        assert_eq!(eval_str("pow(2, 10)", &[]).unwrap(), 1024.0);
        assert!((eval_str("log(100, 10)", &[]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constants() {
        let area = eval_str("math.pi * (diameter_mm / 2000) ** 2", &[("diameter_mm", 600.0)]).unwrap();
        assert!((area - 0.2827).abs() < 1e-4);
        assert_eq!(eval_str("pi", &[]).unwrap(), std::f64::consts::PI);
        assert_eq!(eval_str("math.e", &[]).unwrap(), std::f64::consts::E);
    }

    #[test]
    fn test_bare_e_is_a_variable() {
        assert_eq!(eval_str("e * 2", &[("e", 3.0)]).unwrap(), 6.0);
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(eval_str(".5 + 1.", &[]).unwrap(), 1.5);
        assert!((eval_str("2.5E-3 * 1000", &[]).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_unknown_function() {
        let err = parse("__import__('os').system('ls')").unwrap_err();
        assert!(err.is_unsafe());
        let err = parse("open(1)").unwrap_err();
        assert!(err.is_unsafe());
        let err = parse("exit(1)").unwrap_err();
        assert!(err.is_unsafe());
    }

    #[test]
    fn test_rejects_attribute_access() {
        assert!(parse("x.real").unwrap_err().is_unsafe());
        assert!(parse("(1).conjugate").unwrap_err().is_unsafe());
        assert!(parse("math.system(1)").unwrap_err().is_unsafe());
        assert!(parse("math").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_rejects_disallowed_characters() {
        assert!(parse("count[0]").unwrap_err().is_unsafe());
        assert!(parse("'abc'").unwrap_err().is_unsafe());
        assert!(parse("a; b").unwrap_err().is_unsafe());
        assert!(parse("a = 1").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_rejects_call_on_value() {
        assert!(parse("(abs)(1)").unwrap_err().is_unsafe());
        assert!(parse("count(2)").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_rejects_keywords_and_dunder() {
        assert!(parse("lambda").unwrap_err().is_unsafe());
        assert!(parse("1 if x else 2").unwrap_err().is_unsafe());
        assert!(parse("__class__").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_rejects_arity_violation() {
        assert!(parse("sqrt(1, 2)").unwrap_err().is_unsafe());
        assert!(parse("pow(2)").unwrap_err().is_unsafe());
        assert!(parse("max()").unwrap_err().is_unsafe());
    }

    #[test]
    fn test_rejects_excessive_length_and_depth() {
        let long = "1+".repeat(MAX_FORMULA_LEN) + "1";
        assert!(parse(&long).unwrap_err().is_unsafe());
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(parse(&deep).unwrap_err().is_unsafe());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse(""), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("1 +"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("(1 + 2"), Err(FormulaError::Syntax { .. })));
        assert!(matches!(parse("2 3"), Err(FormulaError::Syntax { .. })));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval_str("1/0", &[]), Err(FormulaError::DivisionByZero));
        assert_eq!(eval_str("1 // 0", &[]), Err(FormulaError::DivisionByZero));
        assert_eq!(eval_str("5 % 0", &[]), Err(FormulaError::DivisionByZero));
        assert_eq!(eval_str("length_m / spacing_m", &[("length_m", 10.0), ("spacing_m", 0.0)]), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(eval_str("count * 2", &[]), Err(FormulaError::UndefinedVariable("count".into())));
    }

    #[test]
    fn test_non_finite() {
        assert!(matches!(eval_str("sqrt(-1)", &[]), Err(FormulaError::NonFinite(_))));
        assert!(matches!(eval_str("log(0)", &[]), Err(FormulaError::NonFinite(_))));
        assert!(matches!(eval_str("10 ** 400", &[]), Err(FormulaError::NonFinite(_))));
    }

    #[test]
    fn test_variables() {
        let expr = parse("ceil(length_m / spacing_m) + count * 0").unwrap();
        let vars: Vec<String> = expr.variables().into_iter().collect();
        assert_eq!(vars, vec!["count", "length_m", "spacing_m"]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.28274333, 4), 0.2827);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-2.5, 0), -3.0);
    }
}
