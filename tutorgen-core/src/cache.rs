//! Prompt-hash keyed response cache, optionally persisted as a JSON file.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default file name of the persisted cache, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "llm_cache.json";

/// Lowercase hex SHA-256 of the prompt text.
pub fn cache_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ResponseCache {
    entries: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
    // Serialises snapshot writes so the file never interleaves two versions.
    persist_lock: Mutex<()>,
}

impl ResponseCache {
    /// A cache that lives for the current process only.
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open (or start) a cache persisted at `path`.
    ///
    /// A missing file yields an empty cache. A corrupt file is logged and
    /// ignored; it is overwritten by the next insert.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "Loaded response cache");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Response cache file is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No response cache file yet");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a response and, for a persisted cache, rewrite the file.
    ///
    /// The in-memory entry is kept even when persisting fails.
    pub fn insert(&self, key: String, value: String) -> std::io::Result<()> {
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.insert(key, value);
        }
        match &self.path {
            Some(path) => self.persist(path),
            None => Ok(()),
        }
    }

    fn persist(&self, path: &Path) -> std::io::Result<()> {
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot: BTreeMap<String, String> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), entries = snapshot.len(), "Persisted response cache");
        Ok(())
    }
}
