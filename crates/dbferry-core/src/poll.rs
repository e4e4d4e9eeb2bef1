//! Bounded polling for asynchronous cloud-side state transitions.
//!
//! Cloud resources report coarse-grained states ("creating" → "available"),
//! so the poller retries at a fixed interval with no backoff or jitter. The
//! poller never interprets provider errors itself: the poll closure decides
//! whether a probe failure maps to a not-ready status or propagates.

use crate::error::{CoreError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How often to poll and how long to keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    /// Invariant: `interval > 0` and `timeout >= interval`.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(CoreError::InvalidPollPolicy(
                "interval must be greater than zero".to_string(),
            ));
        }
        if timeout < interval {
            return Err(CoreError::InvalidPollPolicy(format!(
                "timeout {timeout:?} is shorter than interval {interval:?}"
            )));
        }
        Ok(Self { interval, timeout })
    }
}

/// Poll until `ready` holds for the status returned by `poll`, or until the
/// policy timeout elapses.
///
/// The first poll happens immediately. Returns `Ok(true)` when the predicate
/// was satisfied, `Ok(false)` when the deadline passed first. Errors from the
/// poll closure propagate unchanged.
pub async fn await_ready<T, E, P, F, Fut>(
    policy: &PollPolicy,
    ready: P,
    mut poll: F,
) -> std::result::Result<bool, E>
where
    P: Fn(&T) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        let status = poll().await?;
        if ready(&status) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn policy_rejects_zero_interval() {
        let err = PollPolicy::new(Duration::ZERO, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPollPolicy(_)));
    }

    #[test]
    fn policy_rejects_timeout_below_interval() {
        let err = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPollPolicy(_)));
    }

    #[tokio::test]
    async fn ready_on_first_poll_returns_without_sleeping() {
        let policy = PollPolicy::default();
        let ready = await_ready(&policy, |s: &&str| *s == "available", || async {
            Ok::<_, CoreError>("available")
        })
        .await
        .unwrap();
        assert!(ready);
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_ready_after_a_few_polls() {
        let policy = PollPolicy::new(Duration::from_secs(10), Duration::from_secs(600)).unwrap();
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let ready = await_ready(
            &policy,
            |s: &u32| *s >= 3,
            || async move { Ok::<_, CoreError>(counter.fetch_add(1, Ordering::SeqCst) + 1) },
        )
        .await
        .unwrap();
        assert!(ready);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_false_within_bound() {
        let interval = Duration::from_secs(10);
        let timeout = Duration::from_secs(60);
        let policy = PollPolicy::new(interval, timeout).unwrap();

        let start = Instant::now();
        let ready = await_ready(&policy, |_: &u32| false, || async { Ok::<_, CoreError>(0) })
            .await
            .unwrap();
        assert!(!ready);
        // returns within timeout + interval regardless of predicate outcome
        assert!(start.elapsed() <= timeout + interval);
    }

    #[tokio::test]
    async fn poll_errors_propagate() {
        let policy = PollPolicy::default();
        let result: std::result::Result<bool, CoreError> =
            await_ready(&policy, |_: &u32| true, || async {
                Err(CoreError::MissingParameter("Status".to_string()))
            })
            .await;
        assert!(result.is_err());
    }
}
