//! zkramp-relayer
//!
//! Orchestration service for the proof-backed fiat on-ramp.
//!
//! Architecture:
//! 1. Mirror the escrow ledger on a fixed poll interval
//! 2. Watch an inbox directory for payment confirmation emails
//! 3. Drive each email through the proof pipeline
//! 4. Hold the finished artifact for escrow settlement

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use zkramp_common::signals::decode_signals;
use zkramp_common::SignalLayout;
use zkramp_prover::{HttpArtifactSource, ProofPipeline};
use zkramp_relayer::{
    ActionCoordinator, EmailInputBuilder, EvmEscrowClient, LedgerMirror, RelayerConfig,
    SessionCache, SubprocessProofEngine,
};

const INBOX_SCAN_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "zkramp_relayer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = RelayerConfig::from_env()?;

    info!("Starting zkramp-relayer");
    info!("Escrow contract: {}", config.escrow_address);
    info!("Acting wallet: {}", config.wallet_address);

    let escrow = EvmEscrowClient::new(
        &config.rpc_url,
        &config.escrow_address,
        config.chain_id,
        config.private_key.clone(),
    )?;
    let block = escrow.health_check().await?;
    info!("Connected to escrow chain at block {}", block);

    let mirror = Arc::new(LedgerMirror::new(
        escrow.clone(),
        config.wallet_address.clone(),
    ));
    let _mirror_handle = mirror.start(Duration::from_secs(config.poll_interval_secs));

    let cache = SessionCache::persistent(&config.cache_path)?;
    let coordinator = ActionCoordinator::new(Arc::clone(&mirror), escrow, cache);
    if coordinator.restore_cached_artifact()? {
        info!("Restored proof artifact from a previous session");
    }

    let source = HttpArtifactSource::new(&config.artifact_base_url, &config.artifact_dir)?;
    let engine = SubprocessProofEngine::new(&config.prover_cmd, &config.artifact_dir);
    let pipeline = ProofPipeline::new(
        EmailInputBuilder,
        source,
        engine,
        config.circuit_name.clone(),
    );

    let inbox = PathBuf::from(&config.inbox_dir);
    tokio::fs::create_dir_all(&inbox).await?;
    info!("Watching {} for payment emails", inbox.display());

    let mut ticker = tokio::time::interval(INBOX_SCAN_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if let Err(err) = scan_inbox(&inbox, &coordinator, &pipeline).await {
                    warn!(%err, "inbox scan failed");
                }
            }
        }
    }

    info!("Shutting down relayer...");
    Ok(())
}

/// Process every unhandled email file in the inbox. Handled files are
/// renamed in place so restarts never reprocess them.
async fn scan_inbox<R, W>(
    inbox: &Path,
    coordinator: &ActionCoordinator<R, W>,
    pipeline: &ProofPipeline<EmailInputBuilder, HttpArtifactSource, SubprocessProofEngine>,
) -> anyhow::Result<()>
where
    R: zkramp_relayer::EscrowReader + 'static,
    W: zkramp_relayer::EscrowWriter,
{
    let mut entries = tokio::fs::read_dir(inbox).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("done") | Some("failed") => continue,
            _ => {}
        }

        info!("Processing payment email {}", path.display());
        let raw_email = tokio::fs::read_to_string(&path).await?;
        match coordinator.generate_proof(pipeline, &raw_email).await {
            Ok(artifact) => {
                match decode_signals(&artifact.public_signals, &SignalLayout::default()) {
                    Ok(decoded) => info!("Proof ready for payment\n{decoded}"),
                    Err(err) => warn!(%err, "proof ready but signals did not decode"),
                }
                mark_handled(&path, "done").await?;
            }
            Err(err) => {
                warn!(%err, "proof generation failed for {}", path.display());
                mark_handled(&path, "failed").await?;
            }
        }
    }
    Ok(())
}

async fn mark_handled(path: &Path, suffix: &str) -> std::io::Result<()> {
    let mut renamed = path.as_os_str().to_owned();
    renamed.push(".");
    renamed.push(suffix);
    tokio::fs::rename(path, renamed).await
}
