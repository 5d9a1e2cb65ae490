//! Built-in embedders.
//!
//! The embedding model is pluggable through [`dfembed_core::traits::Embedder`];
//! this crate ships a deterministic token-hashing backend that needs no model
//! files and is used by the CLI and tests.

use anyhow::{anyhow, Result};
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

pub use dfembed_core::traits::Embedder;

/// Bag-of-tokens embedder: every whitespace token is hashed into one of `dim`
/// buckets and the result is L2-normalized. Same input, same vector.
#[derive(Debug, Clone)]
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 { return Err(anyhow!("embedding dim must be > 0")); }
        Ok(Self { dim })
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        Ok(v)
    }
}

/// Embedder used when the caller does not plug in its own.
pub fn get_default_embedder(dim: usize) -> Result<Box<dyn Embedder>> {
    tracing::info!(dim, "using hash embedder");
    Ok(Box::new(HashEmbedder::new(dim)?))
}
