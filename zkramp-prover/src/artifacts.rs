//! Proving-artifact acquisition.
//!
//! Artifacts are published as a manifest plus a set of compressed
//! proving-key chunk files. Every file is verified against the manifest's
//! blake3 hash and size before it lands in the artifact directory.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ArtifactSource;

/// Name of the manifest file under each circuit's artifact prefix.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest schema version this crate understands.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: blake3::hash(bytes).to_hex().to_string(),
            size: bytes.len() as u64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub circuit: String,
    pub files: Vec<ArtifactFile>,
}

/// Downloads artifact files over HTTP into a local directory.
pub struct HttpArtifactSource {
    base_url: String,
    dest_dir: PathBuf,
    client: reqwest::Client,
}

impl HttpArtifactSource {
    pub fn new(base_url: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dest_dir: dest_dir.into(),
            client,
        })
    }

    async fn fetch_manifest(&self, circuit: &str) -> Result<ArtifactManifest> {
        let url = format!("{}/{circuit}/{MANIFEST_FILE}", self.base_url);
        let manifest: ArtifactManifest = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("manifest request rejected at {url}"))?
            .json()
            .await
            .context("failed to parse artifact manifest")?;
        ensure!(
            manifest.manifest_version == MANIFEST_VERSION,
            "unsupported manifest version {}, expected {}",
            manifest.manifest_version,
            MANIFEST_VERSION
        );
        ensure!(
            manifest.circuit == circuit,
            "manifest is for circuit '{}', requested '{}'",
            manifest.circuit,
            circuit
        );
        Ok(manifest)
    }

    async fn fetch_file(&self, circuit: &str, entry: &ArtifactFile) -> Result<()> {
        let url = format!("{}/{circuit}/{}", self.base_url, entry.path);
        debug!(%url, "downloading artifact file");
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("artifact request rejected at {url}"))?
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        verify_entry(&bytes, entry)?;
        let dest = self.dest_dir.join(circuit);
        tokio::fs::create_dir_all(&dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let path = dest.join(&entry.path);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Check a downloaded file against its manifest entry.
pub fn verify_entry(bytes: &[u8], entry: &ArtifactFile) -> Result<()> {
    ensure!(
        bytes.len() as u64 == entry.size,
        "{} size mismatch, manifest recorded {} bytes but received {}",
        entry.path,
        entry.size,
        bytes.len()
    );
    let actual = blake3::hash(bytes).to_hex().to_string();
    ensure!(
        actual == entry.blake3,
        "{} hash mismatch, expected {} but computed {}",
        entry.path,
        entry.blake3,
        actual
    );
    Ok(())
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(
        &self,
        circuit: &str,
        on_progress: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<()> {
        let manifest = self.fetch_manifest(circuit).await?;
        info!(
            circuit,
            files = manifest.files.len(),
            "downloading proving artifacts"
        );
        for (i, entry) in manifest.files.iter().enumerate() {
            self.fetch_file(circuit, entry)
                .await
                .with_context(|| format!("failed to download {}", entry.path))?;
            on_progress(i as u32 + 1);
        }
        Ok(())
    }
}
