// THEORY:
// Scoring one pair of frames is synchronous and CPU-bound, and two pairs never share
// state. A service watching several cameras, or re-scoring a recorded sequence, can
// therefore score many pairs at once. `ScoringPool` does this on a tokio runtime:
// a dispatcher hands tasks round-robin to a fixed set of workers, each worker runs
// the scorer on the blocking thread pool and replies on a oneshot channel. Frames are
// shared through `Arc`, so a reference frame scored against many candidates is
// never copied. The pixel reductions inside each call run on the scorer's rayon pool,
// which every worker shares, so concurrent calls do not multiply threads.

use crate::core_modules::difference_scorer::DifferenceScorer;
use crate::core_modules::error::ScoreError;
use crate::core_modules::pixel_buffer::PixelBuffer;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors surfaced by the pool on top of the scorer's own.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("scoring pool is shut down")]
    Closed,

    #[error("scoring worker failed: {0}")]
    WorkerFailed(String),
}

/// One reference/candidate pair queued for scoring.
pub struct ScoringTask {
    pub reference: Option<Arc<PixelBuffer>>,
    pub candidate: Arc<PixelBuffer>,
    pub result_sender: oneshot::Sender<Result<f64, PoolError>>,
}

pub struct ScoringPool {
    task_sender: mpsc::UnboundedSender<ScoringTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ScoringPool {
    /// Spawns the dispatcher and `worker_count` workers (at least one).
    /// Must be called from within a tokio runtime.
    pub fn new(scorer: DifferenceScorer, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ScoringTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ScoringTask>())
            .unzip();

        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    let _ = task
                        .result_sender
                        .send(Err(PoolError::WorkerFailed(format!("worker {worker_idx} exited"))));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
            debug!("scoring dispatcher stopped");
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_idx, mut worker_receiver)| {
                let scorer = scorer.clone();
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let result =
                            Self::score_task(scorer.clone(), task.reference, task.candidate).await;
                        if let Err(PoolError::WorkerFailed(reason)) = &result {
                            warn!(worker = worker_idx, %reason, "scoring task failed");
                        }
                        let _ = task.result_sender.send(result);
                    }
                    debug!(worker = worker_idx, "scoring worker stopped");
                })
            })
            .collect();

        debug!(workers = worker_count, "scoring pool started");
        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    /// A pool with one worker per logical CPU.
    pub fn with_default_workers(scorer: DifferenceScorer) -> Self {
        Self::new(scorer, num_cpus::get())
    }

    async fn score_task(
        scorer: DifferenceScorer,
        reference: Option<Arc<PixelBuffer>>,
        candidate: Arc<PixelBuffer>,
    ) -> Result<f64, PoolError> {
        tokio::task::spawn_blocking(move || scorer.score(reference.as_deref(), &candidate))
            .await
            .map_err(|e| PoolError::WorkerFailed(e.to_string()))?
            .map_err(PoolError::from)
    }

    pub async fn score(
        &self,
        reference: Option<Arc<PixelBuffer>>,
        candidate: Arc<PixelBuffer>,
    ) -> Result<f64, PoolError> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = ScoringTask {
            reference,
            candidate,
            result_sender,
        };

        self.task_sender.send(task).map_err(|_| PoolError::Closed)?;

        result_receiver.await.map_err(|_| PoolError::Closed)?
    }

    /// Scores every pair concurrently; results come back in input order.
    pub async fn score_all<I>(&self, pairs: I) -> Vec<Result<f64, PoolError>>
    where
        I: IntoIterator<Item = (Option<Arc<PixelBuffer>>, Arc<PixelBuffer>)>,
    {
        join_all(
            pairs
                .into_iter()
                .map(|(reference, candidate)| self.score(reference, candidate)),
        )
        .await
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting work and waits for queued tasks to finish.
    pub async fn shutdown(self) -> Result<(), PoolError> {
        drop(self.task_sender);
        self.dispatcher
            .await
            .map_err(|e| PoolError::WorkerFailed(e.to_string()))?;
        for worker in self.workers {
            worker
                .await
                .map_err(|e| PoolError::WorkerFailed(e.to_string()))?;
        }
        Ok(())
    }
}
