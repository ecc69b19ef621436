use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::loader::ModelInfo;

/// SHA-256 of an asset payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Decoded models keyed by payload hash, so the same file dropped twice is
/// decoded once.
#[derive(Debug, Default)]
pub struct AssetCache {
    models: BTreeMap<ContentHash, ModelInfo>,
    hits: u64,
    misses: u64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a model, counting the hit or miss.
    pub fn model(&mut self, hash: &ContentHash) -> Option<ModelInfo> {
        match self.models.get(hash) {
            Some(info) => {
                self.hits += 1;
                tracing::debug!(%hash, "model cache hit");
                Some(info.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert_model(&mut self, hash: ContentHash, info: ModelInfo) {
        self.models.insert(hash, info);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }
}
