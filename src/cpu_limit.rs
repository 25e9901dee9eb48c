//! Tools for limiting the number of concurrent CPU-bound tasks.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// A pool of CPU permits shared by every request.
///
/// Per-request fan-out is bounded separately, but several requests may each
/// fan out at once. Every external process that is expected to use 100% of a
/// core (`tesseract`, `pdftoppm`, `pdftocairo`, `ocrmypdf`) runs while
/// holding one of these permits, so that we never run more of them than we
/// have cores. The multi-threaded tools are held to a single thread (see
/// [`crate::tools::Tool::env`] and the `--jobs 1` we pass to `ocrmypdf`).
#[derive(Clone, Debug)]
pub struct CpuLimit {
    semaphore: Arc<Semaphore>,
}

impl CpuLimit {
    /// Create a pool with `permits` slots. At least one slot is always
    /// available.
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// How many permits are currently free?
    #[cfg(test)]
    fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Call an async function while holding a permit.
    #[instrument(level = "trace", skip_all)]
    pub async fn run<Func, Fut, R>(&self, f: Func) -> Result<R>
    where
        Func: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let permit = self
            .semaphore
            .acquire()
            .await
            .context("Could not acquire CPU permit")?;
        let result = f().await;
        drop(permit);
        Ok(result)
    }
}
