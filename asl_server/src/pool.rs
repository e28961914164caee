//! Bounded dispatch of blocking inference jobs.
//!
//! Jobs run on tokio's blocking threads so the I/O tasks stay responsive. A
//! semaphore caps how many run at once and every job gets a deadline that
//! covers both waiting for a permit and running. A job that misses its
//! deadline keeps its permit until it finishes; only its result is dropped.
use std::{sync::Arc, time::Duration};

use tokio::sync::Semaphore;

use crate::error::PredictError;

#[derive(Clone, Debug)]
pub struct InferencePool {
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Duration,
}

impl InferencePool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        let workers = workers.max(1);
        log::info!(
            "Inference pool with {workers} workers and {} ms timeout",
            timeout.as_millis()
        );

        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a blocking thread and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PredictError>
    where
        F: FnOnce() -> Result<T, PredictError> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        let dispatch = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PredictError::Inference("inference pool is closed".to_string()))?;

            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|e| PredictError::Inference(format!("inference job failed: {e}")))?
        };

        match tokio::time::timeout(self.timeout, dispatch).await {
            Ok(result) => result,
            Err(_) => Err(PredictError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }),
        }
    }
}
