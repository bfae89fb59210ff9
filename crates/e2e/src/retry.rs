//! Retry policy for flaky browser examples

use std::future::Future;
use tracing::{debug, warn};

use crate::error::E2eResult;

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Attempts actually made
    pub attempts: u32,

    /// Result of the last attempt
    pub result: E2eResult<T>,
}

impl<T> RetryOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `attempt` until it succeeds or `max_attempts` runs have failed.
///
/// `attempt` receives the 1-based attempt number. Only the last failure is
/// kept; earlier ones are logged and dropped. A limit of 0 still runs once.
pub async fn run_with_retry<F, Fut, T>(label: &str, max_attempts: u32, mut attempt: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = E2eResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;

    loop {
        let result = attempt(n).await;
        match result {
            Ok(value) => {
                if n > 1 {
                    debug!("{} passed on attempt {}/{}", label, n, max_attempts);
                }
                return RetryOutcome {
                    attempts: n,
                    result: Ok(value),
                };
            }
            Err(e) if n < max_attempts => {
                warn!("{} failed on attempt {}/{}, retrying: {}", label, n, max_attempts, e);
                n += 1;
            }
            Err(e) => {
                return RetryOutcome {
                    attempts: n,
                    result: Err(e),
                };
            }
        }
    }
}
