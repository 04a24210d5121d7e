//! Fixed-interval retry with cancellation checkpoints.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Pdf2MdError;
use crate::progress::RunContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        delay: Duration::ZERO,
    };

    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy is spent.
///
/// The cancel flag is checked before every attempt, so a run cancelled
/// during a sleep stops without sending another request. The delay is the
/// same between every attempt.
pub async fn with_retries<T, F, Fut>(
    ctx: &RunContext,
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, Pdf2MdError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Pdf2MdError>>,
{
    let mut attempt: u32 = 0;
    loop {
        ctx.check_cancelled()?;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.retries => {
                attempt += 1;
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    label,
                    attempt,
                    policy.max_attempts(),
                    e,
                    policy.delay.as_millis()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
