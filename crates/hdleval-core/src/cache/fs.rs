use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{CacheError, CacheKey, CachedGeneration, Digest, GenerationCache, Result};

/// Filesystem-backed generation cache with 2-char sharding.
///
/// Layout: `<root>/generations/<first 2 hex chars>/<remaining hex chars>.json`
pub struct FsGenerationCache {
    entries_dir: PathBuf,
}

impl FsGenerationCache {
    /// Create a cache rooted at `root`. Creates `root/generations/` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let entries_dir = root.as_ref().join("generations");
        fs::create_dir_all(&entries_dir)?;
        Ok(Self { entries_dir })
    }

    fn shard_dir(&self, digest: &Digest) -> PathBuf {
        self.entries_dir.join(&digest.to_hex()[..2])
    }

    fn entry_path(&self, digest: &Digest) -> PathBuf {
        let hex = digest.to_hex();
        self.shard_dir(digest).join(format!("{}.json", &hex[2..]))
    }
}

impl GenerationCache for FsGenerationCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedGeneration>> {
        let digest = key.digest();
        let bytes = match fs::read(self.entry_path(&digest)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Corrupt(digest, e.to_string()))
    }

    fn put(&self, key: &CacheKey, value: &CachedGeneration) -> Result<()> {
        let digest = key.digest();
        let shard_dir = self.shard_dir(&digest);
        fs::create_dir_all(&shard_dir)?;

        let json = serde_json::to_vec(value).map_err(|e| CacheError::Corrupt(digest, e.to_string()))?;

        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.entry_path(&digest)).map_err(|e| e.error)?;
        Ok(())
    }
}
