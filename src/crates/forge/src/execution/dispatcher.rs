//! Job dispatch
//!
//! [`JobDispatcher`] is the seam between job creation and job execution:
//! `submit(job_id)` schedules processing and hands back a [`JobHandle`].
//! [`WorkerPool`] is the in-process implementation: a bounded queue feeding
//! a semaphore-limited set of tokio tasks. A job id already queued or
//! running is rejected, so one job never executes twice at the same time.

use super::processor::JobProcessor;
use crate::db::models::JobStatus;
use crate::error::{ForgeError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info};

/// Schedules job processing.
pub trait JobDispatcher: Send + Sync {
    fn submit(&self, job_id: &str) -> Result<JobHandle>;
}

/// Completion handle for a submitted job.
///
/// Dropping it does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    done: oneshot::Receiver<Result<JobStatus>>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, done: oneshot::Receiver<Result<JobStatus>>) -> Self {
        Self {
            job_id: job_id.into(),
            done,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the worker to finish with the job.
    pub async fn wait(self) -> Result<JobStatus> {
        self.done
            .await
            .map_err(|_| ForgeError::Dispatch(format!("worker dropped job {}", self.job_id)))?
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Jobs processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Submissions buffered before `submit` starts refusing
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

struct Submission {
    job_id: String,
    done: oneshot::Sender<Result<JobStatus>>,
}

/// Channel-fed pool of job workers.
pub struct WorkerPool {
    sender: mpsc::Sender<Submission>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl WorkerPool {
    /// Spawn the pool's intake loop. Must be called inside a tokio runtime.
    pub fn start(processor: Arc<JobProcessor>, config: WorkerConfig) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Submission>(config.queue_capacity.max(1));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let running = in_flight.clone();
        tokio::spawn(async move {
            while let Some(submission) = receiver.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let processor = processor.clone();
                let running = running.clone();
                tokio::spawn(async move {
                    let Submission { job_id, done } = submission;
                    let outcome = processor.process(&job_id).await;
                    if let Err(e) = &outcome {
                        error!(job_id = %job_id, error = %e, "Job processing error");
                    }
                    running.lock().remove(&job_id);
                    drop(permit);
                    let _ = done.send(outcome);
                });
            }
            debug!("Worker pool intake closed");
        });

        info!(
            concurrency = config.concurrency,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );
        Self { sender, in_flight }
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl JobDispatcher for WorkerPool {
    fn submit(&self, job_id: &str) -> Result<JobHandle> {
        if !self.in_flight.lock().insert(job_id.to_string()) {
            return Err(ForgeError::Dispatch(format!("job {} is already scheduled", job_id)));
        }

        let (done, receiver) = oneshot::channel();
        let submission = Submission {
            job_id: job_id.to_string(),
            done,
        };
        if let Err(e) = self.sender.try_send(submission) {
            self.in_flight.lock().remove(job_id);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue is full",
                mpsc::error::TrySendError::Closed(_) => "worker pool is shut down",
            };
            return Err(ForgeError::Dispatch(reason.to_string()));
        }

        debug!(job_id = %job_id, "Job queued");
        Ok(JobHandle::new(job_id, receiver))
    }
}
