//! Bounded polling of remote resources until they reach a target state.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

/// Interval and attempt cap for a polling loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay between consecutive reads.
    pub interval: Duration,
    /// Maximum number of reads before giving up.
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Instance readiness: every 10 seconds for up to 10 minutes.
    pub const INSTANCE_READY: Self = Self::new(Duration::from_secs(10), 60);

    /// Snapshot completion: every 10 seconds for up to 20 minutes.
    pub const SNAPSHOT_READY: Self = Self::new(Duration::from_secs(10), 120);

    /// Creates a policy.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time spent waiting between reads.
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Value that satisfied the readiness predicate, with the attempt number.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Polled<T> {
    /// Last value read.
    pub value: T,
    /// 1-based attempt on which the value was read.
    pub attempts: u32,
}

/// Errors raised by [`poll_until`].
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// A read failed; polling stops immediately.
    #[error("read failed on poll attempt {attempt}")]
    Fetch {
        /// 1-based attempt that failed.
        attempt: u32,
        /// Underlying read error.
        #[source]
        source: E,
    },
    /// The predicate never held within the attempt cap.
    #[error("target state not reached after {attempts} attempts")]
    Exhausted {
        /// Number of reads performed.
        attempts: u32,
    },
}

/// Reads a value repeatedly until `ready` accepts it.
///
/// The loop sleeps for the policy interval between reads but not after the
/// final one, so a policy of `n` attempts performs at most `n` reads and
/// `n - 1` sleeps. `ready` receives the attempt number alongside the value
/// so callers can log progress.
///
/// # Errors
///
/// Returns [`PollError::Fetch`] as soon as a read fails, and
/// [`PollError::Exhausted`] when the attempt cap is reached.
pub async fn poll_until<T, E, F, Fut, P>(
    policy: PollPolicy,
    mut fetch: F,
    mut ready: P,
) -> Result<Polled<T>, PollError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&T, u32) -> bool,
{
    let mut attempt = 0;
    while attempt < policy.max_attempts {
        attempt += 1;
        let value = fetch()
            .await
            .map_err(|source| PollError::Fetch { attempt, source })?;
        if ready(&value, attempt) {
            return Ok(Polled {
                value,
                attempts: attempt,
            });
        }
        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }

    Err(PollError::Exhausted { attempts: attempt })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rstest::rstest;

    use super::*;

    #[derive(Debug, Error)]
    #[error("read failed")]
    struct ReadFailure;

    const FAST: Duration = Duration::ZERO;

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[tokio::test]
    async fn returns_value_on_first_ready_attempt(#[case] ready_at: u32) {
        let reads = Cell::new(0_u32);
        let polled = poll_until(
            PollPolicy::new(FAST, 5),
            || {
                reads.set(reads.get() + 1);
                let current = reads.get();
                async move { Ok::<_, ReadFailure>(current) }
            },
            |value, _| *value >= ready_at,
        )
        .await
        .unwrap_or_else(|err| panic!("poll should succeed: {err}"));

        assert_eq!(polled.value, ready_at);
        assert_eq!(polled.attempts, ready_at);
        assert_eq!(reads.get(), ready_at);
    }

    #[tokio::test]
    async fn gives_up_after_exactly_max_attempts() {
        let reads = Cell::new(0_u32);
        let result = poll_until(
            PollPolicy::new(FAST, 60),
            || {
                reads.set(reads.get() + 1);
                async { Ok::<_, ReadFailure>(()) }
            },
            |(), _| false,
        )
        .await;

        assert!(matches!(result, Err(PollError::Exhausted { attempts: 60 })));
        assert_eq!(reads.get(), 60);
    }

    #[tokio::test]
    async fn stops_on_first_read_error() {
        let reads = Cell::new(0_u32);
        let result = poll_until(
            PollPolicy::new(FAST, 10),
            || {
                reads.set(reads.get() + 1);
                let current = reads.get();
                async move {
                    if current == 2 {
                        Err(ReadFailure)
                    } else {
                        Ok(current)
                    }
                }
            },
            |_, _| false,
        )
        .await;

        assert!(matches!(result, Err(PollError::Fetch { attempt: 2, .. })));
        assert_eq!(reads.get(), 2);
    }

    #[tokio::test]
    async fn zero_attempts_never_reads() {
        let reads = Cell::new(0_u32);
        let result = poll_until(
            PollPolicy::new(FAST, 0),
            || {
                reads.set(reads.get() + 1);
                async { Ok::<_, ReadFailure>(()) }
            },
            |(), _| true,
        )
        .await;

        assert!(matches!(result, Err(PollError::Exhausted { attempts: 0 })));
        assert_eq!(reads.get(), 0);
    }

    #[test]
    fn default_policies_match_documented_ceilings() {
        assert_eq!(PollPolicy::INSTANCE_READY.ceiling(), Duration::from_secs(600));
        assert_eq!(PollPolicy::SNAPSHOT_READY.ceiling(), Duration::from_secs(1200));
    }
}
