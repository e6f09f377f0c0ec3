use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::queue::TaskQueue;

use super::{try_execute_task, ExecutionOutcome};

/// `WorkerPool` runs `num_workers` independent consumers of the subscriber creation queue.
/// Workers share nothing but the queue; row locks keep them from handling the same task.
pub struct WorkerPool {
    queue: TaskQueue,
    num_workers: usize,
    poll_interval: Duration,
    shutdown_token: CancellationToken,
}

impl WorkerPool {
    #[must_use]
    pub fn new(queue: TaskQueue, config: &WorkerConfig) -> Self {
        Self {
            queue,
            num_workers: config.num_workers,
            poll_interval: config.poll_interval(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Makes the pool stop when `token` gets cancelled.
    #[must_use]
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    /// Returns a clone of the shutdown token for external control
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs all workers until the shutdown token is cancelled.
    /// Tasks already being handled are finished before a worker stops.
    pub async fn run(self) {
        info!("Starting worker pool with {} workers", self.num_workers);

        let handles = self.spawn_workers();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task error: {}", e);
            }
        }

        info!("All workers stopped");
    }

    fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        (0..self.num_workers)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    queue: self.queue.clone(),
                    poll_interval: self.poll_interval,
                };
                let shutdown_token = self.shutdown_token.clone();

                tokio::spawn(async move { worker.run(shutdown_token).await })
            })
            .collect()
    }
}

struct Worker {
    worker_id: usize,
    queue: TaskQueue,
    poll_interval: Duration,
}

impl Worker {
    async fn run(&self, shutdown_token: CancellationToken) {
        info!("Worker {} started", self.worker_id);

        while !shutdown_token.is_cancelled() {
            match try_execute_task(&self.queue).await {
                // Keep draining while there is work.
                Ok(ExecutionOutcome::TaskCompleted | ExecutionOutcome::TaskFailed(_)) => continue,
                Ok(ExecutionOutcome::EmptyQueue) => {}
                Err(e) => error!("Worker {} queue error: {}", self.worker_id, e),
            }

            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Worker {} stopped", self.worker_id);
    }
}
