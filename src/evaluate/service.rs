use crate::error::PlatformResult;
use crate::evaluate::worker::FactorWorker;
use futures::future::join_all;
use log::{error, info};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Polling worker pool. Workers never coordinate; the queue's claim
/// transaction keeps their batches disjoint.
pub struct WorkerService {
    worker: FactorWorker,
    worker_count: usize,
    batch: u64,
    poll_interval: Duration,
}

impl WorkerService {
    pub fn new(worker: FactorWorker, worker_count: usize, batch: u64, poll_interval: Duration) -> Self {
        Self {
            worker,
            worker_count: worker_count.max(1),
            batch: batch.max(1),
            poll_interval,
        }
    }

    /// Claims one batch and resolves every job in it. Returns how many jobs
    /// reached a terminal state.
    pub async fn run_once(&self, worker_id: &str) -> PlatformResult<usize> {
        Self::drain_batch(&self.worker, worker_id, self.batch).await
    }

    async fn drain_batch(worker: &FactorWorker, worker_id: &str, batch: u64) -> PlatformResult<usize> {
        let jobs = worker.platform().dequeue_jobs(worker_id, batch).await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        let outcomes = join_all(jobs.into_iter().map(|job| {
            let job_id = job.job_id;
            async move { (job_id, worker.process(job).await) }
        }))
        .await;

        let mut resolved = 0;
        for (job_id, outcome) in outcomes {
            match outcome {
                Ok(status) if status.is_terminal() => resolved += 1,
                Ok(other) => info!("[{}] job [{}] left in {}", worker_id, job_id, other),
                Err(e) => error!("[{}] could not resolve job [{}]: {}", worker_id, job_id, e),
            }
        }
        Ok(resolved)
    }

    /// Spawns `worker_count` polling loops that stop once `shutdown` flips to true.
    pub fn start_workers(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.worker_count)
            .map(|idx| {
                let worker_id = format!("w{}", idx + 1);
                let worker = self.worker.clone();
                let batch = self.batch;
                let poll = self.poll_interval;
                let mut shutdown = shutdown.clone();

                tokio::spawn(async move {
                    info!("[{}] worker started", worker_id);
                    while !*shutdown.borrow() {
                        let idle = match Self::drain_batch(&worker, &worker_id, batch).await {
                            Ok(0) => true,
                            Ok(n) => {
                                info!("[{}] resolved {} job(s)", worker_id, n);
                                false
                            }
                            Err(e) => {
                                error!("[{}] dequeue failed: {}", worker_id, e);
                                true
                            }
                        };
                        if idle {
                            tokio::select! {
                                _ = sleep(poll) => {}
                                changed = shutdown.changed() => {
                                    if changed.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    info!("[{}] worker stopped", worker_id);
                })
            })
            .collect()
    }
}
