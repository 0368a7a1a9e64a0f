//! Pipeline state-machine tests against in-process collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use zkramp_common::{Groth16Proof, ProofArtifact};
use zkramp_prover::{
    ArtifactSource, CircuitInputBuilder, PipelineError, PipelineRun, ProofEngine, ProofPipeline,
    RunStatus,
};

fn sample_artifact() -> ProofArtifact {
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

struct JsonInputBuilder {
    fail: bool,
    delay_ms: u64,
}

impl CircuitInputBuilder for JsonInputBuilder {
    fn build(&self, email: &[u8], correlation: &str) -> anyhow::Result<serde_json::Value> {
        if self.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.delay_ms));
        }
        if self.fail {
            anyhow::bail!("no DKIM signature header found");
        }
        Ok(serde_json::json!({
            "email_len": email.len(),
            "correlation": correlation,
        }))
    }
}

struct ChunkSource {
    chunks: u32,
    fail: bool,
    gate: Option<Arc<Notify>>,
    /// Signalled right before a fetch parks on the gate.
    parked: Option<Arc<Notify>>,
    /// When set, every fetch parks on the gate.
    park_always: bool,
    /// When set, only the first fetch parks on the gate.
    park_first_only: AtomicBool,
}

impl ChunkSource {
    fn plain(chunks: u32) -> Self {
        Self {
            chunks,
            fail: false,
            gate: None,
            parked: None,
            park_always: false,
            park_first_only: AtomicBool::new(false),
        }
    }

    fn gated(chunks: u32, gate: Arc<Notify>) -> Self {
        Self {
            chunks,
            fail: false,
            gate: Some(gate),
            parked: None,
            park_always: true,
            park_first_only: AtomicBool::new(false),
        }
    }

    fn gated_first_only(chunks: u32, gate: Arc<Notify>, parked: Arc<Notify>) -> Self {
        Self {
            chunks,
            fail: false,
            gate: Some(gate),
            parked: Some(parked),
            park_always: false,
            park_first_only: AtomicBool::new(true),
        }
    }

    fn failing() -> Self {
        Self {
            chunks: 0,
            fail: true,
            gate: None,
            parked: None,
            park_always: false,
            park_first_only: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ArtifactSource for ChunkSource {
    async fn fetch(
        &self,
        _circuit: &str,
        on_progress: &(dyn Fn(u32) + Send + Sync),
    ) -> anyhow::Result<()> {
        if let Some(gate) = &self.gate {
            if self.park_always || self.park_first_only.swap(false, Ordering::SeqCst) {
                if let Some(parked) = &self.parked {
                    parked.notify_one();
                }
                gate.notified().await;
            }
        }
        if self.fail {
            anyhow::bail!("artifact host returned 404");
        }
        for i in 1..=self.chunks {
            on_progress(i);
        }
        Ok(())
    }
}

struct StubEngine {
    fail: bool,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl ProofEngine for StubEngine {
    async fn prove(
        &self,
        _input: serde_json::Value,
        _circuit: &str,
    ) -> anyhow::Result<ProofArtifact> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            anyhow::bail!("witness does not satisfy the circuit");
        }
        Ok(sample_artifact())
    }
}

async fn wait_for_status(
    rx: &mut watch::Receiver<PipelineRun>,
    status: RunStatus,
) -> PipelineRun {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let run = rx.borrow().clone();
                if run.status == status {
                    return run;
                }
            }
            rx.changed().await.expect("pipeline dropped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", status.as_str()))
}

#[tokio::test]
async fn full_run_walks_every_stage_in_order() {
    let dl_gate = Arc::new(Notify::new());
    let prove_gate = Arc::new(Notify::new());
    let pipeline = Arc::new(ProofPipeline::new(
        JsonInputBuilder {
            fail: false,
            delay_ms: 100,
        },
        ChunkSource::gated(10, Arc::clone(&dl_gate)),
        StubEngine {
            fail: false,
            gate: Some(Arc::clone(&prove_gate)),
        },
        "circuit",
    ));
    let mut rx = pipeline.subscribe();
    assert_eq!(pipeline.current_run().status, RunStatus::NotStarted);

    let runner = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run("From: venmo\nAmount: $30\n", "42").await })
    };

    let generating = wait_for_status(&mut rx, RunStatus::GeneratingInput).await;
    assert_eq!(generating.run_id, 1);
    assert_eq!(generating.stopwatch.started_downloading, None);

    let downloading = wait_for_status(&mut rx, RunStatus::DownloadingProofFiles).await;
    assert!(downloading.stopwatch.started_downloading.is_some());
    assert_eq!(downloading.stopwatch.finished_downloading, None);
    assert_eq!(downloading.downloaded_artifact_count, 0);

    dl_gate.notify_one();
    let proving = wait_for_status(&mut rx, RunStatus::GeneratingProof).await;
    assert_eq!(proving.downloaded_artifact_count, 10);
    let started_dl = proving.stopwatch.started_downloading.unwrap();
    let finished_dl = proving.stopwatch.finished_downloading.unwrap();
    assert!(finished_dl >= started_dl);
    assert!(proving.stopwatch.started_proving.is_some());
    assert_eq!(proving.stopwatch.finished_proving, None);

    prove_gate.notify_one();
    let done = wait_for_status(&mut rx, RunStatus::Done).await;
    let artifact = runner.await.unwrap().unwrap();
    assert_eq!(artifact, sample_artifact());

    // Stamps are set once: the download stamps must not move after stage 2.
    assert_eq!(
        done.stopwatch.started_downloading,
        proving.stopwatch.started_downloading
    );
    assert_eq!(
        done.stopwatch.finished_downloading,
        proving.stopwatch.finished_downloading
    );
    let started_prove = done.stopwatch.started_proving.unwrap();
    let finished_prove = done.stopwatch.finished_proving.unwrap();
    assert!(finished_prove >= started_prove);
    assert!(done.stopwatch.download_ms().is_some());
    assert!(done.stopwatch.proving_ms().is_some());
}

#[tokio::test]
async fn empty_email_ends_in_error_bad_input() {
    let pipeline = ProofPipeline::new(
        JsonInputBuilder {
            fail: false,
            delay_ms: 0,
        },
        ChunkSource::plain(1),
        StubEngine {
            fail: false,
            gate: None,
        },
        "circuit",
    );
    let err = pipeline.run("", "42").await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedEmail(_)));
    let run = pipeline.current_run();
    assert_eq!(run.status, RunStatus::ErrorBadInput);
    assert_eq!(run.status.as_str(), "error-bad-input");
    assert!(run.error.is_some());
}

#[tokio::test]
async fn rejected_input_ends_in_error_bad_input() {
    let pipeline = ProofPipeline::new(
        JsonInputBuilder {
            fail: true,
            delay_ms: 0,
        },
        ChunkSource::plain(1),
        StubEngine {
            fail: false,
            gate: None,
        },
        "circuit",
    );
    let err = pipeline.run("not an email\n", "42").await.unwrap_err();
    assert!(matches!(err, PipelineError::InputBuild(_)));
    assert_eq!(pipeline.current_run().status, RunStatus::ErrorBadInput);
}

#[tokio::test]
async fn download_failure_ends_in_its_own_terminal() {
    let pipeline = ProofPipeline::new(
        JsonInputBuilder {
            fail: false,
            delay_ms: 0,
        },
        ChunkSource::failing(),
        StubEngine {
            fail: false,
            gate: None,
        },
        "circuit",
    );
    let err = pipeline.run("email\n", "42").await.unwrap_err();
    assert!(matches!(err, PipelineError::Download(_)));
    let run = pipeline.current_run();
    assert_eq!(run.status, RunStatus::ErrorFailedToDownload);
    assert_eq!(run.status.as_str(), "error-failed-to-download");
    // The failure froze the stopwatch mid-stage.
    assert!(run.stopwatch.started_downloading.is_some());
    assert_eq!(run.stopwatch.finished_downloading, None);
}

#[tokio::test]
async fn prove_failure_ends_in_its_own_terminal() {
    let pipeline = ProofPipeline::new(
        JsonInputBuilder {
            fail: false,
            delay_ms: 0,
        },
        ChunkSource::plain(2),
        StubEngine {
            fail: true,
            gate: None,
        },
        "circuit",
    );
    let err = pipeline.run("email\n", "42").await.unwrap_err();
    assert!(matches!(err, PipelineError::Prove(_)));
    let run = pipeline.current_run();
    assert_eq!(run.status, RunStatus::ErrorFailedToProve);
    assert_eq!(run.downloaded_artifact_count, 2);
}

#[tokio::test]
async fn second_run_supersedes_the_first() {
    let gate = Arc::new(Notify::new());
    let parked = Arc::new(Notify::new());
    let pipeline = Arc::new(ProofPipeline::new(
        JsonInputBuilder {
            fail: false,
            delay_ms: 0,
        },
        ChunkSource::gated_first_only(3, Arc::clone(&gate), Arc::clone(&parked)),
        StubEngine {
            fail: false,
            gate: None,
        },
        "circuit",
    ));
    let mut rx = pipeline.subscribe();

    let first = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run("first email\n", "1").await })
    };
    tokio::time::timeout(Duration::from_secs(5), parked.notified())
        .await
        .expect("first run never reached the download stage");
    let snapshot = wait_for_status(&mut rx, RunStatus::DownloadingProofFiles).await;
    assert_eq!(snapshot.run_id, 1);

    // The second run walks straight through while the first is parked.
    let artifact = pipeline.run("second email\n", "2").await.unwrap();
    assert_eq!(artifact, sample_artifact());
    let settled = pipeline.current_run();
    assert_eq!(settled.run_id, 2);
    assert_eq!(settled.status, RunStatus::Done);
    assert_eq!(settled.downloaded_artifact_count, 3);

    // Release the first run; its late completion must be discarded.
    gate.notify_one();
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Superseded));
    let after = pipeline.current_run();
    assert_eq!(after.run_id, 2);
    assert_eq!(after.status, RunStatus::Done);
    assert_eq!(after.downloaded_artifact_count, 3);
}
