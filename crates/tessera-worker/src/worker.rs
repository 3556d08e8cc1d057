//! Worker runner: the in-process boundary to the worker-host runtime.
//!
//! The host pushes [`JobRequest`]s into the handle's queue; the runner
//! executes them through the registered handler with bounded concurrency and
//! broadcasts lifecycle events the host can subscribe to (including the
//! handoff payload on completion).

use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use tessera_core::{defaults, Error, JobRequest, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the worker runner.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `WORKER_ENABLED` | `true` | Enable/disable job processing |
/// | `WORKER_MAX_CONCURRENT` | `4` | Max concurrent jobs |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to process jobs at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    pub fn from_env() -> Self {
        let enabled = std::env::var("WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let max_concurrent_jobs = std::env::var("WORKER_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        Self {
            max_concurrent_jobs,
            enabled,
        }
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
    /// A job was started.
    JobStarted { job_id: Uuid },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// A job completed; `entry` is the host-log body including the handoff.
    JobCompleted { job_id: Uuid, entry: JsonValue },
    /// A job failed; `entry` is the `{status: "error", ...}` host-log body.
    JobFailed { job_id: Uuid, entry: JsonValue },
}

/// Handle for submitting jobs to and controlling a running worker.
pub struct WorkerHandle {
    job_tx: mpsc::Sender<JobRequest>,
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Submit a job for processing. Backpressures when the queue is full.
    pub async fn submit(&self, request: JobRequest) -> Result<()> {
        self.job_tx
            .send(request)
            .await
            .map_err(|_| Error::Internal("worker queue closed".to_string()))
    }

    /// Signal the worker to shut down after in-flight jobs finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("worker already stopped".to_string()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that executes submitted jobs through a handler.
pub struct Worker {
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            handler,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (job_tx, job_rx) = mpsc::channel(defaults::JOB_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(job_rx, shutdown_rx).await;
        });

        WorkerHandle {
            job_tx,
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with bounded concurrent job processing.
    #[instrument(skip_all)]
    async fn run(
        self: Arc<Self>,
        mut job_rx: mpsc::Receiver<JobRequest>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        if !self.config.enabled {
            info!("Worker is disabled, not starting");
            return;
        }

        info!(
            max_concurrent = self.config.max_concurrent_jobs,
            "Worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Worker received shutdown signal");
                    break;
                }
                maybe_request = job_rx.recv() => {
                    match maybe_request {
                        Some(request) => {
                            let worker = self.clone();
                            let semaphore = semaphore.clone();
                            tasks.spawn(async move {
                                let _permit = match semaphore.acquire_owned().await {
                                    Ok(permit) => permit,
                                    Err(_) => return,
                                };
                                worker.execute_job(request).await;
                            });
                        }
                        None => {
                            info!("Job queue closed");
                            break;
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        // Drain in-flight jobs before stopping.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = ?e, "Job task panicked");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Worker stopped");
    }

    /// Execute a single job, emitting lifecycle events.
    async fn execute_job(&self, request: JobRequest) {
        let start = Instant::now();
        let job_id = request.job_id;

        info!(%job_id, target_entity = %request.target_entity, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        let event_tx = self.event_tx.clone();
        let ctx = JobContext::new(request).with_progress_callback(move |percent, message| {
            let _ = event_tx.send(WorkerEvent::JobProgress {
                job_id,
                percent,
                message: message.map(String::from),
            });
        });

        let result = self.handler.execute(ctx).await;
        let entry = result.host_entry();
        match result {
            JobResult::Success(_) => {
                info!(
                    %job_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                let _ = self.event_tx.send(WorkerEvent::JobCompleted { job_id, entry });
            }
            JobResult::Failed { code, message } => {
                warn!(
                    %job_id,
                    %code,
                    %message,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job failed"
                );
                let _ = self.event_tx.send(WorkerEvent::JobFailed { job_id, entry });
            }
        }
    }
}
