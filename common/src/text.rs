//! 文字列の正規化と語句集合類似度
//!
//! 材料コード（`ALUMINIUM_PLATE_m2`）と単価表の品名
//! （`Aluminium sign plate 600mm`）を語順に依存せず比較する。

use std::collections::BTreeSet;

/// 照合時に除外する語
pub const STOP_WORDS: &[&str] = &["mm", "for", "in", "and", "of", "with"];

/// 正規化した語のリスト
///
/// 小文字化し、英数字・空白・`.`・`/`・`-` 以外を空白に置換、除外語を落とす。
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | '/' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// 正規化した文字列（語を空白で連結）
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// 最長共通部分列の長さ（文字単位）
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Indel距離に基づく類似度 `2·LCS / (len_a + len_b)`（0.0〜1.0）
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

/// 語句集合類似度（0.0〜1.0）
///
/// 共通語と差分語をそれぞれ整列・連結し、3通りの組み合わせの最大類似度を返す。
/// 一方の語集合が他方に含まれる場合は 1.0、どちらかが空なら 0.0。
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<String> = tokenize(a).into_iter().collect();
    let set_b: BTreeSet<String> = tokenize(b).into_iter().collect();
    token_set_similarity_of(&set_a, &set_b)
}

/// 正規化済みの語集合同士の類似度
pub fn token_set_similarity_of(set_a: &BTreeSet<String>, set_b: &BTreeSet<String>) -> f64 {
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = set_a.intersection(set_b).map(|s| s.as_str()).collect();
    let diff_ab: Vec<&str> = set_a.difference(set_b).map(|s| s.as_str()).collect();
    let diff_ba: Vec<&str> = set_b.difference(set_a).map(|s| s.as_str()).collect();

    if !intersection.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 1.0;
    }

    let sect = intersection.join(" ");
    let join = |rest: &[&str]| {
        if sect.is_empty() {
            rest.join(" ")
        } else {
            format!("{} {}", sect, rest.join(" "))
        }
    };
    let combined_ab = join(&diff_ab);
    let combined_ba = join(&diff_ba);

    let mut best = indel_ratio(&combined_ab, &combined_ba);
    if !sect.is_empty() {
        best = best
            .max(indel_ratio(&sect, &combined_ab))
            .max(indel_ratio(&sect, &combined_ba));
    }
    best.clamp(0.0, 1.0)
}
