//! Background ingestion jobs
//!
//! A submitted request is validated, given a [`JobId`] and handed to a tokio task;
//! the caller polls [`JobManager::status`] or awaits [`JobManager::wait`] instead
//! of blocking for the whole pipeline.

use crate::error::IngestError;
use crate::ingest::IngestionOrchestrator;
use crate::types::{IngestRequest, IngestResponse, IngestStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type JobId = Uuid;

/// Lifecycle of a job
///
/// `Queued -> Cloning -> Extracting -> Embedding -> Writing -> Done`, with
/// `Failed` or `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Cloning,
    Extracting,
    Embedding,
    Writing,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl From<IngestStage> for JobState {
    fn from(stage: IngestStage) -> Self {
        match stage {
            IngestStage::Fetch => JobState::Cloning,
            IngestStage::Extract => JobState::Extracting,
            // Graph writes are interleaved with embedding batches
            IngestStage::Embed | IngestStage::GraphWrite => JobState::Embedding,
            IngestStage::VectorWrite => JobState::Writing,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Cloning => "cloning",
            JobState::Extracting => "extracting",
            JobState::Embedding => "embedding",
            JobState::Writing => "writing",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a job did not finish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Stage that failed; absent for failures outside the pipeline
    pub stage: Option<IngestStage>,
    pub message: String,
}

/// Snapshot of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub repo_url: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the job is `Done`
    pub result: Option<IngestResponse>,
    /// Set once the job is `Failed` or `Cancelled`
    pub error: Option<JobFailure>,
}

struct JobEntry {
    status: Arc<watch::Sender<JobStatus>>,
    cancel: CancellationToken,
}

/// Runs ingestion jobs in the background, at most `max_concurrent` at a time
///
/// Jobs beyond the limit stay `Queued` until a slot frees up.
pub struct JobManager {
    orchestrator: Arc<IngestionOrchestrator>,
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
    permits: Arc<Semaphore>,
}

impl JobManager {
    pub fn new(orchestrator: Arc<IngestionOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Validate a request and start it in the background
    ///
    /// Invalid requests are rejected here and never become jobs.
    pub async fn submit(&self, request: IngestRequest) -> Result<JobId, IngestError> {
        let repo_url = request.validate()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        let (status, _) = watch::channel(JobStatus {
            id,
            repo_url: repo_url.clone(),
            state: JobState::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        });
        let status = Arc::new(status);
        let cancel = CancellationToken::new();

        self.jobs.write().await.insert(
            id,
            JobEntry {
                status: status.clone(),
                cancel: cancel.clone(),
            },
        );
        tracing::info!("Queued job {} for {}", id, repo_url);

        tokio::spawn(run_job(
            self.orchestrator.clone(),
            self.permits.clone(),
            repo_url,
            status,
            cancel,
        ));

        Ok(id)
    }

    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).map(|entry| entry.status.borrow().clone())
    }

    /// All known jobs, oldest first
    pub async fn list(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<JobStatus> = jobs
            .values()
            .map(|entry| entry.status.borrow().clone())
            .collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Receiver that observes every state change of a job
    pub async fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).map(|entry| entry.status.subscribe())
    }

    /// Request cancellation; returns false if the job is unknown or already finished
    ///
    /// Cancellation is cooperative: the job stops at its next stage or batch
    /// boundary and whatever it already wrote stays in the stores.
    pub async fn cancel(&self, id: JobId) -> bool {
        let jobs = self.jobs.read().await;
        let Some(entry) = jobs.get(&id) else {
            return false;
        };
        if entry.status.borrow().state.is_terminal() {
            return false;
        }
        tracing::info!("Cancelling job {}", id);
        entry.cancel.cancel();
        true
    }

    /// Wait until a job reaches a terminal state
    pub async fn wait(&self, id: JobId) -> Option<JobStatus> {
        let mut rx = self.subscribe(id).await?;
        let terminal = rx
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|s| s.clone());
        match terminal {
            Ok(status) => Some(status),
            Err(_) => Some(rx.borrow().clone()),
        }
    }
}

async fn run_job(
    orchestrator: Arc<IngestionOrchestrator>,
    permits: Arc<Semaphore>,
    repo_url: String,
    status: Arc<watch::Sender<JobStatus>>,
    cancel: CancellationToken,
) {
    let _permit = tokio::select! {
        _ = cancel.cancelled() => {
            finish(&status, Err(IngestError::Cancelled { stage: IngestStage::Fetch }));
            return;
        }
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                finish(&status, Err(IngestError::other(format!("job slots unavailable: {}", e))));
                return;
            }
        },
    };

    let on_stage = |stage: IngestStage| {
        status.send_modify(|s| {
            s.state = JobState::from(stage);
            s.updated_at = Utc::now();
        });
    };

    let result = orchestrator.ingest_with(&repo_url, &cancel, &on_stage).await;
    finish(&status, result);
}

fn finish(status: &watch::Sender<JobStatus>, result: Result<IngestResponse, IngestError>) {
    status.send_modify(|s| {
        s.updated_at = Utc::now();
        match result {
            Ok(response) => {
                tracing::info!("Job {} done: {} chunks", s.id, response.chunk_count);
                s.state = JobState::Done;
                s.result = Some(response);
            }
            Err(err) => {
                s.state = if matches!(err, IngestError::Cancelled { .. }) {
                    JobState::Cancelled
                } else {
                    JobState::Failed
                };
                tracing::warn!("Job {} {}: {}", s.id, s.state, err);
                s.error = Some(JobFailure {
                    stage: err.stage(),
                    message: err.to_string(),
                });
            }
        }
    });
}
