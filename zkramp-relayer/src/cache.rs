//! Session cache for proof continuity across restarts.
//!
//! Only the three keys below are ever written. A value is rewritten solely
//! when it differs from what is stored, so an interrupted rewrite can at
//! worst lose the newest value, never corrupt an older one.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::debug;

use zkramp_common::ProofArtifact;

use crate::error::{RelayerError, Result};

/// Raw email the current proof was generated from.
pub const KEY_EMAIL_FULL: &str = "email_full";
/// Groth16 proof JSON.
pub const KEY_PROOF: &str = "proof";
/// Public signal array JSON.
pub const KEY_PUBLIC_SIGNALS: &str = "public_signals";

#[derive(Clone)]
pub struct SessionCache {
    backend: Arc<CacheBackend>,
}

enum CacheBackend {
    InMemory(Mutex<HashMap<String, String>>),
    Persistent(sled::Db),
}

impl SessionCache {
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(CacheBackend::InMemory(Mutex::new(HashMap::new()))),
        }
    }

    pub fn persistent(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = sled::open(path_ref)?;
        Ok(Self {
            backend: Arc::new(CacheBackend::Persistent(db)),
        })
    }

    pub fn read(&self, key: &str) -> Result<Option<String>> {
        match &*self.backend {
            CacheBackend::InMemory(store) => Ok(store
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(key)
                .cloned()),
            CacheBackend::Persistent(db) => {
                let value = db.get(key)?;
                value
                    .map(|bytes| {
                        String::from_utf8(bytes.to_vec()).map_err(|err| {
                            RelayerError::CacheIo(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!("cache value under '{key}' is not utf-8: {err}"),
                            ))
                        })
                    })
                    .transpose()
            }
        }
    }

    /// Write a value, skipping the write when the stored value already
    /// matches. Returns whether anything was written.
    pub fn write(&self, key: &str, value: &str) -> Result<bool> {
        if self.read(key)?.as_deref() == Some(value) {
            debug!(key, "cache value unchanged, skipping write");
            return Ok(false);
        }
        match &*self.backend {
            CacheBackend::InMemory(store) => {
                store
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(key.to_string(), value.to_string());
            }
            CacheBackend::Persistent(db) => {
                db.insert(key, value.as_bytes())?;
                db.flush()?;
            }
        }
        Ok(true)
    }

    /// Persist the inputs and outputs of a completed proof run.
    pub fn store_completed_run(&self, raw_email: &str, artifact: &ProofArtifact) -> Result<()> {
        self.write(KEY_EMAIL_FULL, raw_email)?;
        self.write(KEY_PROOF, &serde_json::to_string(&artifact.proof)?)?;
        self.write(
            KEY_PUBLIC_SIGNALS,
            &serde_json::to_string(&artifact.public_signals)?,
        )?;
        Ok(())
    }

    /// Restore a previously cached artifact, if all of its parts are present.
    pub fn load_artifact(&self) -> Result<Option<ProofArtifact>> {
        let proof = match self.read(KEY_PROOF)? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };
        let public_signals = match self.read(KEY_PUBLIC_SIGNALS)? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok(None),
        };
        Ok(Some(ProofArtifact {
            proof,
            public_signals,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use zkramp_common::Groth16Proof;

    fn artifact() -> ProofArtifact {
        ProofArtifact {
            proof: Groth16Proof {
                pi_a: vec!["1".into(), "2".into(), "1".into()],
                pi_b: vec![
                    vec!["3".into(), "4".into()],
                    vec!["5".into(), "6".into()],
                    vec!["1".into(), "0".into()],
                ],
                pi_c: vec!["7".into(), "8".into(), "1".into()],
                protocol: "groth16".into(),
                curve: "bn128".into(),
            },
            public_signals: vec!["11".into(), "12".into()],
        }
    }

    #[test]
    fn write_skips_equal_values() {
        let cache = SessionCache::in_memory();
        assert!(cache.write(KEY_EMAIL_FULL, "raw email").unwrap());
        assert!(!cache.write(KEY_EMAIL_FULL, "raw email").unwrap());
        assert!(cache.write(KEY_EMAIL_FULL, "different email").unwrap());
        assert_eq!(
            cache.read(KEY_EMAIL_FULL).unwrap().as_deref(),
            Some("different email")
        );
    }

    #[test]
    fn completed_run_round_trips() {
        let cache = SessionCache::in_memory();
        cache.store_completed_run("raw email", &artifact()).unwrap();
        assert_eq!(
            cache.read(KEY_EMAIL_FULL).unwrap().as_deref(),
            Some("raw email")
        );
        let restored = cache.load_artifact().unwrap().unwrap();
        assert_eq!(restored, artifact());
    }

    #[test]
    fn missing_parts_restore_nothing() {
        let cache = SessionCache::in_memory();
        assert!(cache.load_artifact().unwrap().is_none());
        cache
            .write(KEY_PROOF, &serde_json::to_string(&artifact().proof).unwrap())
            .unwrap();
        assert!(cache.load_artifact().unwrap().is_none());
    }

    #[test]
    fn persistent_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");
        {
            let cache = SessionCache::persistent(&path).unwrap();
            cache.store_completed_run("raw email", &artifact()).unwrap();
        }
        let cache = SessionCache::persistent(&path).unwrap();
        assert_eq!(cache.load_artifact().unwrap().unwrap(), artifact());
    }
}
