//! Retry-until-condition driver with capped exponential backoff.
//!
//! Configuration changes reach the gateway asynchronously, so probes are
//! repeated while their result still looks like the old configuration.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use threescale_telemetry::{log_probe_attempt, log_retry_exhausted};

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    /// Maximum number of probe calls, including the first one.
    pub max_tries: u32,
    /// Delay before the second call.
    pub base: Duration,
    /// Growth factor between consecutive delays.
    pub factor: u32,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Pick each delay uniformly from `[0, delay]`.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_tries: 8,
            base: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

/// Final value of a retry loop and the number of probe calls it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

impl Backoff {
    /// Default policy with a different try budget.
    pub fn new(max_tries: u32) -> Self {
        Self {
            max_tries,
            ..Self::default()
        }
    }

    /// Retry without sleeping in between.
    pub fn immediate(max_tries: u32) -> Self {
        Self {
            max_tries,
            base: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay after the `attempt`-th failed probe (0-based).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Delay to sleep after the `attempt`-th failed probe (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let millis = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }

    /// Call `probe` until `retry_if` rejects its result or the budget runs out.
    ///
    /// Returns the last result either way. Errors from `probe` are returned
    /// immediately and never retried.
    pub async fn retry_while<T, E, F, Fut, P>(&self, probe: F, retry_if: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T) -> bool,
    {
        Ok(self.run(probe, retry_if).await?.value)
    }

    /// Like [`Backoff::retry_while`], also reporting the number of calls.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        mut probe: F,
        mut retry_if: P,
    ) -> Result<Retried<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T) -> bool,
    {
        let max_tries = self.max_tries.max(1);
        let mut attempt = 1;

        loop {
            let value = probe().await?;
            let retry = retry_if(&value);
            log_probe_attempt!(attempt, retry, "probe attempt");

            if !retry {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }

            if attempt >= max_tries {
                log_retry_exhausted!(attempts = attempt, "retry budget exhausted");
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }

            tokio::time::sleep(self.delay(attempt - 1)).await;
            attempt += 1;
        }
    }
}
