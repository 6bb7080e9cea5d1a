//! Retry policies for establishing a connection.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::BackendError;

/// Decides whether a failed connection attempt is tried again.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration>;
}

/// Context passed to [`RetryPolicy::should_retry`] after each failed attempt.
pub struct RetryContext {
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub error:        BackendError,
}

/// Never retry.
pub struct NoRetries;
impl RetryPolicy for NoRetries {
    fn should_retry(&self, _: &RetryContext) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Retry transport failures up to `attempts` times in total, sleeping
/// `delay` between attempts. RPC-level rejections are never retried.
pub struct BoundedRetries {
    pub attempts: NonZeroU32,
    pub delay:    Duration,
}

impl BoundedRetries {
    pub fn new(attempts: NonZeroU32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for BoundedRetries {
    fn default() -> Self {
        Self {
            attempts: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            delay:    Duration::from_secs(1),
        }
    }
}

impl RetryPolicy for BoundedRetries {
    fn should_retry(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        if !ctx.error.is_transport() || ctx.fail_count >= self.attempts {
            return ControlFlow::Break(());
        }
        tracing::warn!(
            "connect attempt {} failed ({}), retrying in {:?}",
            ctx.fail_count, ctx.error, self.delay
        );
        ControlFlow::Continue(self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(n: u32, error: BackendError) -> RetryContext {
        RetryContext {
            fail_count:   NonZeroU32::new(n).unwrap(),
            slept_so_far: Duration::ZERO,
            error,
        }
    }

    #[test]
    fn bounded_stops_at_limit() {
        let p = BoundedRetries::new(NonZeroU32::new(3).unwrap(), Duration::from_millis(5));
        assert_eq!(p.should_retry(&ctx(1, BackendError::Disconnected)), ControlFlow::Continue(Duration::from_millis(5)));
        assert_eq!(p.should_retry(&ctx(2, BackendError::Io("reset".into()))), ControlFlow::Continue(Duration::from_millis(5)));
        assert_eq!(p.should_retry(&ctx(3, BackendError::Disconnected)), ControlFlow::Break(()));
    }

    #[test]
    fn rpc_errors_are_not_retried() {
        let p = BoundedRetries::default();
        let e = BackendError::from_telegram(400, "API_ID_INVALID");
        assert_eq!(p.should_retry(&ctx(1, e)), ControlFlow::Break(()));
    }

    #[test]
    fn no_retries() {
        assert_eq!(NoRetries.should_retry(&ctx(1, BackendError::Disconnected)), ControlFlow::Break(()));
    }
}
