use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::delivery::Cancellation;
use crate::error::{DeliveryError, GatewayError};

/// Bounded exponential backoff for retryable gateway errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,

    pub initial_delay: Duration,

    pub max_delay: Duration,

    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`, or `None` once the budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }

        let factor = self.multiplier.max(1.0).powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = self.initial_delay.as_secs_f64() * factor;
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);

        Some(delay.min(self.max_delay))
    }
}

/// Runs `operation` until it succeeds, fails for good, or the budget runs out.
///
/// `attempts` counts every call made, retries included.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &Cancellation,
    attempts: &mut u32,
    mut operation: F,
) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut retry = 0;
    loop {
        cancel.check()?;
        *attempts += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(err.into()),
        };

        let Some(delay) = policy.delay_for_attempt(retry) else {
            return Err(err.into());
        };
        retry += 1;
        warn!(%err, retry, delay_ms = delay.as_millis() as u64, "retrying gateway call");
        cancel.sleep(delay).await?;
    }
}
