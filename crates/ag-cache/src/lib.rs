//! Content-addressed cache for pattern-executor agent invocations: the same
//! prompt (hashed into a key by the caller) short-circuits to a previous
//! output instead of re-running the assistant.
//!
//! Grounded on `original_source/agentling/cache.py`'s `ResultCache`. That
//! reference writes its JSON blob directly; this implementation writes to a
//! temp file in the same directory and renames it into place, since the
//! spec's cache contract calls for atomic writes and a rename on the same
//! filesystem is effectively atomic, unlike the reference's plain write.

use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns `None` on a cache miss, including a corrupt or unreadable
    /// entry — any failure here degrades to "just run it again", never a
    /// hard error.
    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let text = std::fs::read_to_string(&path).ok()?;
        let parsed: Value = serde_json::from_str(&text).ok()?;
        parsed.get("output").cloned()
    }

    pub fn set(&self, key: &str, output: &Value) -> std::io::Result<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let blob = serde_json::json!({"output": output});
        std::fs::write(&tmp_path, serde_json::to_vec(&blob)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        self.root.join(format!("{digest:x}.json"))
    }
}

/// Hashes the inputs that determine whether two agent invocations are
/// "the same" for caching purposes: the prompt, the model, and the working
/// directory (a prompt means something different in a different repo).
pub fn cache_key(prompt: &str, model: &str, working_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(working_dir.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn miss_then_hit_round_trips_output() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path()).unwrap();
        assert!(cache.get("k").is_none());
        cache.set("k", &json!({"result": 42})).unwrap();
        assert_eq!(cache.get("k"), Some(json!({"result": 42})));
    }

    #[test]
    fn corrupt_entry_is_treated_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path()).unwrap();
        let path = cache.path_for("k");
        std::fs::write(&path, b"not json").unwrap();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn cache_key_is_stable_and_sensitive_to_each_input() {
        let dir = Path::new("/tmp/x");
        let a = cache_key("prompt", "sonnet", dir);
        let b = cache_key("prompt", "sonnet", dir);
        let c = cache_key("prompt", "opus", dir);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
