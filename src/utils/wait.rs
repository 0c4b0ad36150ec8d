//! Blocking access to client futures.
//!
//! Mirrors the "issue one request, block until the answer or a deadline"
//! usage of a synchronous caller. None of these helpers retry or cancel the
//! underlying request beyond dropping it when the deadline passes.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::warn;

use crate::errors::EtcdError;

pub const DEFAULT_AWAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Races `future` against `timeout`.
pub async fn with_timeout<F, T>(future: F, timeout: Duration) -> Result<T, EtcdError>
where
    F: Future<Output = Result<T, EtcdError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!("No etcd response within {:?}", timeout);
            Err(EtcdError::Timeout(timeout))
        }
    }
}

/// Owns a current-thread runtime so repeated blocking waits share one
/// connection pool.
///
/// Must not be used from inside another tokio runtime.
pub struct BlockingWaiter {
    runtime: Runtime,
}

impl BlockingWaiter {
    pub fn new() -> Result<Self, EtcdError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EtcdError::RuntimeError(e.to_string()))?;
        Ok(Self { runtime })
    }

    /// Blocks the calling thread until `future` resolves or `timeout` elapses.
    pub fn wait<F, T>(&self, future: F, timeout: Duration) -> Result<T, EtcdError>
    where
        F: Future<Output = Result<T, EtcdError>>,
    {
        self.runtime.block_on(with_timeout(future, timeout))
    }
}

/// One-shot form of [`BlockingWaiter::wait`].
pub fn await_result<F, T>(future: F, timeout: Duration) -> Result<T, EtcdError>
where
    F: Future<Output = Result<T, EtcdError>>,
{
    BlockingWaiter::new()?.wait(future, timeout)
}
