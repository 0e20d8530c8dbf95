//! ベクトル前段絞り込み
//!
//! 品名の埋め込みベクトルと事前計算済みの単価表ベクトルのコサイン類似度で
//! 上位K件に絞り、その後は全件走査と同じ語句・単位スコアで再順位付けする。

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::text::tokenize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 既定の埋め込み次元
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// 文字列を固定長ベクトルに変換する
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// 語のハッシュによる埋め込み（学習不要、決定的）
///
/// 正規化した各語をSHA-256で次元位置と符号に写し、L2正規化する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

/// コサイン類似度（どちらかがゼロベクトルなら 0.0）
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// 単価表と同じ並びの埋め込みベクトル集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    pub dim: usize,
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    /// 単価表の全品名から作成
    pub fn build(catalog: &Catalog, embedder: &dyn Embedder) -> Self {
        Self {
            dim: embedder.dim(),
            vectors: catalog
                .items()
                .iter()
                .map(|item| embedder.embed(&item.description))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let index: Self = serde_json::from_str(json)?;
        if let Some(pos) = index.vectors.iter().position(|v| v.len() != index.dim) {
            return Err(Error::Parse(format!(
                "embedding {} has {} values, expected dim {}",
                pos,
                index.vectors[pos].len(),
                index.dim
            )));
        }
        Ok(index)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 単価表・埋め込み器と整合しているか
    ///
    /// 不整合なら理由を返す（呼び出し側は全件走査に切り替える）。
    pub fn check_compatible(&self, catalog_len: usize, embedder_dim: usize) -> std::result::Result<(), String> {
        if self.vectors.len() != catalog_len {
            return Err(format!(
                "index has {} vectors but catalog has {} items",
                self.vectors.len(),
                catalog_len
            ));
        }
        if self.dim != embedder_dim {
            return Err(format!(
                "index dim {} does not match embedder dim {}",
                self.dim, embedder_dim
            ));
        }
        Ok(())
    }

    /// 上位K件の位置（単価表の並び順で返す）
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        let mut selected: Vec<usize> = scored.into_iter().map(|(i, _)| i).collect();
        selected.sort_unstable();
        selected
    }
}

/// 前段絞り込み（埋め込み器＋インデックス＋K）
pub struct VectorPrefilter {
    index: EmbeddingIndex,
    embedder: Box<dyn Embedder>,
    top_k: usize,
}

impl std::fmt::Debug for VectorPrefilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorPrefilter")
            .field("dim", &self.index.dim)
            .field("vectors", &self.index.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl VectorPrefilter {
    pub fn new(index: EmbeddingIndex, embedder: Box<dyn Embedder>, top_k: usize) -> Self {
        Self { index, embedder, top_k: top_k.max(1) }
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn check_compatible(&self, catalog_len: usize) -> std::result::Result<(), String> {
        self.index.check_compatible(catalog_len, self.embedder.dim())
    }

    /// 品名に近い候補の位置
    pub fn select(&self, description: &str) -> Vec<usize> {
        let query = self.embedder.embed(description);
        self.index.top_k(&query, self.top_k)
    }
}
