use std::{fmt::Display, future::Future, time::Duration};

use rand::Rng;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(250),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff(attempt) + jitter(self.max_jitter)
    }
}

// Kept synchronous: the thread-local rng must not live across an await.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Run `op` until it succeeds or the policy's retries are spent.
///
/// A failing attempt hands back the state for the next attempt together with
/// its error. After `retries + 1` calls the last error is returned as-is.
pub async fn retry_with_state<S, T, E, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut state: S,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, (S, E)>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op(state).await {
            Ok(value) => return Ok(value),
            Err((next, e)) if attempt < policy.retries => {
                let sleep_for = policy.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    op = op_name,
                    attempt,
                    delay_ms = sleep_for.as_millis() as u64,
                    "operation failed, retrying with backoff"
                );
                metrics::counter!("retry_attempts_total").increment(1);

                tokio::time::sleep(sleep_for).await;
                state = next;
            }
            Err((_, e)) => return Err(e),
        }
    }
}

/// Stateless form of [`retry_with_state`].
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_state(policy, op_name, (), |()| {
        let fut = op();
        async move { fut.await.map_err(|e| ((), e)) }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    };
    use tokio::time::Instant;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn delay_grows_exponentially_within_jitter_bound() {
        let policy = RetryPolicy {
            retries: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
        };

        for (attempt, base) in [(0u32, 100u64), (1, 200), (2, 400)] {
            let d = policy.delay_for(attempt);
            assert!(d >= Duration::from_millis(base));
            assert!(d <= Duration::from_millis(base + 100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_retries_plus_one_calls_with_backoff() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let res: Result<(), String> = retry(&no_jitter(), "always-fails", || {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(start.elapsed());
                Err("boom".to_string())
            }
        })
        .await;

        assert_eq!(res.unwrap_err(), "boom");
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                Duration::ZERO,
                Duration::from_millis(250),
                Duration::from_millis(750),
                Duration::from_millis(1750),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);

        let res: Result<u32, String> = retry(&no_jitter(), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn state_from_failed_attempt_feeds_the_next() {
        let seen = Mutex::new(Vec::new());

        let res: Result<(), String> = retry_with_state(&no_jitter(), "shrinking", vec![1, 2, 3], |batch: Vec<i32>| {
            seen.lock().unwrap().push(batch.clone());
            async move {
                let rest: Vec<i32> = batch.into_iter().skip(1).collect();
                if rest.is_empty() {
                    Ok(())
                } else {
                    Err((rest, "partial".to_string()))
                }
            }
        })
        .await;

        assert!(res.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 3], vec![2, 3], vec![3]]);
    }
}
