//! The staged proof-generation state machine.
//!
//! One run turns a raw email into a proof artifact in three stages: circuit
//! input construction, proving-artifact download, proof computation. Stages
//! never skip and terminal states never resume; starting a new run
//! invalidates the previous run's token, so a superseded run keeps executing
//! but stops publishing and its completion is discarded.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use zkramp_common::email::normalize_email;
use zkramp_common::ProofArtifact;

use crate::error::{PipelineError, Result};
use crate::{ArtifactSource, CircuitInputBuilder, ProofEngine};

/// Status of one run. Labels are stable; operators and tests assert on them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    NotStarted,
    GeneratingInput,
    DownloadingProofFiles,
    GeneratingProof,
    ErrorBadInput,
    ErrorFailedToDownload,
    ErrorFailedToProve,
    Done,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::GeneratingInput => "generating-input",
            Self::DownloadingProofFiles => "downloading-proof-files",
            Self::GeneratingProof => "generating-proof",
            Self::ErrorBadInput => "error-bad-input",
            Self::ErrorFailedToDownload => "error-failed-to-download",
            Self::ErrorFailedToProve => "error-failed-to-prove",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done
                | Self::ErrorBadInput
                | Self::ErrorFailedToDownload
                | Self::ErrorFailedToProve
        )
    }
}

/// Wall-clock stamps for the two long stages, unix milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stopwatch {
    pub started_downloading: Option<u64>,
    pub finished_downloading: Option<u64>,
    pub started_proving: Option<u64>,
    pub finished_proving: Option<u64>,
}

impl Stopwatch {
    /// Elapsed download time once both stamps are set.
    pub fn download_ms(&self) -> Option<u64> {
        match (self.started_downloading, self.finished_downloading) {
            (Some(start), Some(end)) => end.checked_sub(start),
            _ => None,
        }
    }

    /// Elapsed proving time once both stamps are set.
    pub fn proving_ms(&self) -> Option<u64> {
        match (self.started_proving, self.finished_proving) {
            (Some(start), Some(end)) => end.checked_sub(start),
            _ => None,
        }
    }
}

/// Snapshot of one run, published after every transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: u64,
    pub status: RunStatus,
    pub stopwatch: Stopwatch,
    pub downloaded_artifact_count: u32,
    pub error: Option<String>,
}

impl PipelineRun {
    fn idle() -> Self {
        Self {
            run_id: 0,
            status: RunStatus::NotStarted,
            stopwatch: Stopwatch::default(),
            downloaded_artifact_count: 0,
            error: None,
        }
    }

    fn started(run_id: u64) -> Self {
        Self {
            run_id,
            status: RunStatus::GeneratingInput,
            stopwatch: Stopwatch::default(),
            downloaded_artifact_count: 0,
            error: None,
        }
    }
}

/// Drives proof-generation runs against the external collaborators.
///
/// At most one run per pipeline is current; `run` hands out a fresh token and
/// the previous token immediately goes stale.
pub struct ProofPipeline<B, S, E> {
    builder: Arc<B>,
    source: Arc<S>,
    engine: Arc<E>,
    circuit: String,
    run_seq: AtomicU64,
    tx: watch::Sender<PipelineRun>,
}

impl<B, S, E> ProofPipeline<B, S, E>
where
    B: CircuitInputBuilder + 'static,
    S: ArtifactSource,
    E: ProofEngine,
{
    pub fn new(builder: B, source: S, engine: E, circuit: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(PipelineRun::idle());
        Self {
            builder: Arc::new(builder),
            source: Arc::new(source),
            engine: Arc::new(engine),
            circuit: circuit.into(),
            run_seq: AtomicU64::new(0),
            tx,
        }
    }

    /// Observe run snapshots as they are published.
    pub fn subscribe(&self) -> watch::Receiver<PipelineRun> {
        self.tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn current_run(&self) -> PipelineRun {
        self.tx.borrow().clone()
    }

    /// Run the full pipeline for one email.
    ///
    /// Returns the artifact only when this run is still the current one at
    /// completion; a superseded run gets [`PipelineError::Superseded`] and
    /// publishes nothing further.
    pub async fn run(&self, raw_email: &str, correlation: &str) -> Result<ProofArtifact> {
        let token = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut run = PipelineRun::started(token);
        self.publish(token, &run);
        info!(run = token, circuit = %self.circuit, "building circuit input");

        // Stage 1: input construction, off the async scheduler.
        let builder = Arc::clone(&self.builder);
        let email = raw_email.to_owned();
        let correlation = correlation.to_owned();
        let built = tokio::task::spawn_blocking(move || {
            let bytes = normalize_email(&email)
                .map_err(|err| PipelineError::MalformedEmail(err.to_string()))?;
            builder
                .build(&bytes, &correlation)
                .map_err(|err| PipelineError::InputBuild(err.to_string()))
        })
        .await
        .map_err(|err| PipelineError::InputBuild(format!("input worker panicked: {err}")));
        let input = match built {
            Ok(Ok(input)) => input,
            Ok(Err(err)) | Err(err) => {
                return self.fail(token, &mut run, RunStatus::ErrorBadInput, err)
            }
        };

        // Stage 2: artifact download with incremental progress.
        run.status = RunStatus::DownloadingProofFiles;
        run.stopwatch.started_downloading = Some(now_ms());
        self.publish(token, &run);
        let counter = Arc::new(AtomicU32::new(0));
        let progress_counter = Arc::clone(&counter);
        let progress = move |_units: u32| {
            // A superseded run must not surface late progress.
            if self.run_seq.load(Ordering::SeqCst) != token {
                return;
            }
            let count = progress_counter.fetch_add(1, Ordering::SeqCst) + 1;
            self.tx.send_modify(|snapshot| {
                if snapshot.run_id == token {
                    snapshot.downloaded_artifact_count = count;
                }
            });
        };
        if let Err(err) = self.source.fetch(&self.circuit, &progress).await {
            return self.fail(
                token,
                &mut run,
                RunStatus::ErrorFailedToDownload,
                PipelineError::Download(err.to_string()),
            );
        }
        run.downloaded_artifact_count = counter.load(Ordering::SeqCst);
        run.stopwatch.finished_downloading = Some(now_ms());

        // Stage 3: proof computation.
        run.status = RunStatus::GeneratingProof;
        run.stopwatch.started_proving = Some(now_ms());
        self.publish(token, &run);
        info!(run = token, "computing proof");
        let artifact = match self.engine.prove(input, &self.circuit).await {
            Ok(artifact) => artifact,
            Err(err) => {
                return self.fail(
                    token,
                    &mut run,
                    RunStatus::ErrorFailedToProve,
                    PipelineError::Prove(err.to_string()),
                )
            }
        };
        run.stopwatch.finished_proving = Some(now_ms());

        if !self.is_current(token) {
            return Err(PipelineError::Superseded);
        }
        run.status = RunStatus::Done;
        self.publish(token, &run);
        info!(
            run = token,
            download_ms = run.stopwatch.download_ms(),
            proving_ms = run.stopwatch.proving_ms(),
            "proof generation finished"
        );
        Ok(artifact)
    }

    fn is_current(&self, token: u64) -> bool {
        self.run_seq.load(Ordering::SeqCst) == token
    }

    fn publish(&self, token: u64, run: &PipelineRun) {
        if self.is_current(token) {
            self.tx.send_replace(run.clone());
        }
    }

    fn fail(
        &self,
        token: u64,
        run: &mut PipelineRun,
        status: RunStatus,
        err: PipelineError,
    ) -> Result<ProofArtifact> {
        warn!(run = token, status = status.as_str(), %err, "pipeline run failed");
        run.status = status;
        run.error = Some(err.to_string());
        self.publish(token, run);
        if self.is_current(token) {
            Err(err)
        } else {
            Err(PipelineError::Superseded)
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_are_stable() {
        assert_eq!(RunStatus::NotStarted.as_str(), "not-started");
        assert_eq!(
            RunStatus::DownloadingProofFiles.as_str(),
            "downloading-proof-files"
        );
        assert_eq!(
            RunStatus::ErrorFailedToDownload.as_str(),
            "error-failed-to-download"
        );
        for status in [
            RunStatus::NotStarted,
            RunStatus::GeneratingInput,
            RunStatus::DownloadingProofFiles,
            RunStatus::GeneratingProof,
            RunStatus::ErrorBadInput,
            RunStatus::ErrorFailedToDownload,
            RunStatus::ErrorFailedToProve,
            RunStatus::Done,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(serde_json::from_str::<RunStatus>(&json).unwrap(), status);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::ErrorBadInput.is_terminal());
        assert!(!RunStatus::GeneratingProof.is_terminal());
    }

    #[test]
    fn stopwatch_elapsed() {
        let mut sw = Stopwatch::default();
        assert_eq!(sw.download_ms(), None);
        sw.started_downloading = Some(100);
        sw.finished_downloading = Some(350);
        assert_eq!(sw.download_ms(), Some(250));
        sw.started_proving = Some(400);
        sw.finished_proving = Some(400);
        assert_eq!(sw.proving_ms(), Some(0));
    }
}
