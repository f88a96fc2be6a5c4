//! RFC 6887 §8.1's retransmission schedule, generalized from `client.rs`'s
//! per-mapping `generate_irt`/`generate_rt` into something both the discovery engine
//! and the PCP/NAT-PMP mapper drivers can drive over an arbitrary async send+receive.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::Error;

/// Initial retransmission time, in seconds.
const IRT: f32 = 3.0;
/// Maximum retransmission time, in seconds. Zero participants quote this as "no cap"
/// in RFC 6887's text, but the formula treats 0 as "never grows past IRT", so gateway
/// probing (which has no deadline of its own) uses the protocol's real ceiling instead.
const MRT: f32 = 1024.0;

/// A bounded or unbounded retransmission schedule, per RFC 6887 §8.1.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    /// Maximum retransmission count. `0` means retransmit until `overall_timeout`.
    pub mrc: usize,
    /// Overall timeout across every attempt. `None` means no cap beyond `mrc`.
    pub overall_timeout: Option<Duration>,
}

impl RetrySchedule {
    /// The schedule this crate uses for probing a candidate gateway: RFC 6887's
    /// suggested bound of a handful of attempts capped by an overall wall-clock budget,
    /// since an absent gateway must not stall discovery indefinitely.
    pub fn bounded(overall_timeout: Duration) -> Self {
        Self { mrc: 0, overall_timeout: Some(overall_timeout) }
    }
}

/// The 1+RAND jitter factor shared by the IRT and RT formulas: a value in [0.9, 1.1).
fn one_plus_rand(rng: &mut impl Rng) -> f32 {
    0.9 + rng.gen::<f32>() * 0.2
}

/// RT = (1 + RAND) * IRT
fn generate_irt(rng: &mut impl Rng) -> Duration {
    Duration::from_secs_f32(one_plus_rand(rng) * IRT)
}

/// RT = (1 + RAND) * MIN(2 * RTprev, MRT)
fn generate_rt(rng: &mut impl Rng, rt_prev: Duration) -> Duration {
    Duration::from_secs_f32(one_plus_rand(rng) * MRT.min(2.0 * rt_prev.as_secs_f32()))
}

/// Runs `attempt` repeatedly with RFC 6887 backoff until it returns `Ok`, the schedule's
/// attempt count or overall timeout is exhausted, or `attempt` returns a non-transient
/// error (in which case that error is returned immediately without further retries).
///
/// `attempt` is handed the zero-based retry count so it can use it for logging; it must
/// perform its own per-attempt receive timeout (the schedule only governs *when the next
/// send happens*, not how long a single attempt waits for a reply).
pub async fn run_with_retry<T, F, Fut>(schedule: RetrySchedule, mut attempt: F) -> Result<T, Error>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut rng = rand::thread_rng();
    let deadline = schedule.overall_timeout.map(|timeout| Instant::now() + timeout);
    let mut rt = generate_irt(&mut rng);
    let mut attempts = 0usize;

    loop {
        match attempt(attempts).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                attempts += 1;
                let exhausted_count = schedule.mrc != 0 && attempts >= schedule.mrc;
                let exhausted_time = deadline.is_some_and(|deadline| Instant::now() >= deadline);
                if exhausted_count || exhausted_time {
                    return Err(err);
                }
                let mut wait = rt;
                if let Some(deadline) = deadline {
                    wait = wait.min(deadline.saturating_duration_since(Instant::now()));
                }
                tokio::time::sleep(wait).await;
                rt = generate_rt(&mut rng, rt);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_without_retrying_on_first_success() {
        let calls = AtomicUsize::new(0);
        let schedule = RetrySchedule::bounded(Duration::from_secs(5));
        let result = run_with_retry(schedule, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_once_the_overall_timeout_elapses() {
        let schedule = RetrySchedule::bounded(Duration::from_millis(50));
        let result: Result<(), Error> =
            run_with_retry(schedule, |_| async { Err(Error::Timeout) }).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn stops_immediately_on_a_non_transient_error() {
        let calls = AtomicUsize::new(0);
        let schedule = RetrySchedule::bounded(Duration::from_secs(5));
        let result: Result<(), Error> = run_with_retry(schedule, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::InvalidArgument("lifetime")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
