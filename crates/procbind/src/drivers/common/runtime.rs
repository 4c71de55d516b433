//! Blocking bridge over the async database clients.
//!
//! Each network connection owns a single-threaded tokio runtime and drives
//! every command to completion on the calling thread. Calling into a
//! connection from inside another tokio runtime is not supported.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::error::{DataAccessError, Result};

/// Current-thread runtime owned by one connection.
#[derive(Debug)]
pub struct BlockingRuntime {
    runtime: Runtime,
}

impl BlockingRuntime {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime })
    }

    /// Run a fallible future with a deadline.
    ///
    /// Driver errors become [`DataAccessError::Command`] carrying `context`;
    /// an expired deadline becomes [`DataAccessError::Timeout`].
    pub fn run<T, E, F>(&self, timeout: Duration, context: &str, fut: F) -> Result<T>
    where
        E: Display,
        F: Future<Output = std::result::Result<T, E>>,
    {
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, fut).await })
            .map_err(|_| DataAccessError::Timeout(timeout.as_secs()))?
            .map_err(|e| DataAccessError::command(e, context))
    }

    /// Run a future whose errors are already [`DataAccessError`]s.
    pub fn run_checked<T, F>(&self, timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.runtime
            .block_on(async { tokio::time::timeout(timeout, fut).await })
            .map_err(|_| DataAccessError::Timeout(timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_maps_driver_error_with_context() {
        let rt = BlockingRuntime::new().unwrap();
        let err = rt
            .run(Duration::from_secs(1), "executing dbo.Save", async {
                Err::<(), _>("deadlock")
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "deadlock");
        assert!(err.format_detailed().contains("executing dbo.Save"));
    }

    #[test]
    fn test_run_times_out() {
        let rt = BlockingRuntime::new().unwrap();
        let err = rt
            .run(Duration::from_millis(10), "sleeping", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            })
            .unwrap_err();
        assert!(matches!(err, DataAccessError::Timeout(0)));
    }

    #[test]
    fn test_run_returns_value() {
        let rt = BlockingRuntime::new().unwrap();
        let v = rt
            .run(Duration::from_secs(1), "", async { Ok::<_, String>(5) })
            .unwrap();
        assert_eq!(v, 5);
    }
}
