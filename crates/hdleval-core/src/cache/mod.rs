//! Generation cache: memoizes generator output per
//! (generator, task, tier, attempt, prompt) so repeated runs skip
//! redundant model calls.

pub mod fs;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};
use thiserror::Error;

use crate::tiering::Tier;

/// SHA-256 digest used for prompt hashes and cache addresses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex().chars().take(12).collect::<String>())
    }
}

impl FromStr for Digest {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| CacheError::InvalidDigest(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(CacheError::InvalidDigest(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Errors from cache backends. Callers treat any of these as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid digest hex: {0}")]
    InvalidDigest(String),

    #[error("corrupt cache entry {0}: {1}")]
    Corrupt(Digest, String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Identity of one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub generator: String,
    pub task_id: String,
    pub tier: Tier,
    pub attempt: u32,
    pub prompt_digest: Digest,
}

impl CacheKey {
    pub fn new(
        generator: impl Into<String>,
        task_id: impl Into<String>,
        tier: Tier,
        attempt: u32,
        prompt: &str,
    ) -> Self {
        Self {
            generator: generator.into(),
            task_id: task_id.into(),
            tier,
            attempt,
            prompt_digest: Digest::compute(prompt.as_bytes()),
        }
    }

    /// Stable address over a length-prefixed encoding of every field, so
    /// no two distinct keys can share a byte sequence.
    pub fn digest(&self) -> Digest {
        let mut buf = Vec::with_capacity(self.generator.len() + self.task_id.len() + 80);
        for field in [
            self.generator.as_bytes(),
            self.task_id.as_bytes(),
            self.tier.as_str().as_bytes(),
        ] {
            buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
            buf.extend_from_slice(field);
        }
        buf.extend_from_slice(&self.attempt.to_be_bytes());
        buf.extend_from_slice(self.prompt_digest.as_bytes());
        Digest::compute(&buf)
    }
}

/// A memoized generator response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedGeneration {
    pub code: String,
    /// Generation time recorded when the entry was produced.
    pub generation_time: f64,
}

/// Cache backend. Implementations must tolerate concurrent use; a
/// read/write race on one key may recompute but must not corrupt.
pub trait GenerationCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>>;

    fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()>;
}

/// Never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl GenerationCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<CachedGeneration>> {
        Ok(None)
    }

    fn put(&self, _key: &CacheKey, _value: &CachedGeneration) -> Result<()> {
        Ok(())
    }
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Digest, CachedGeneration>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GenerationCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&key.digest()).cloned())
    }

    fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.digest(), value.clone());
        Ok(())
    }
}
