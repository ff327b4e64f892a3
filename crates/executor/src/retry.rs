use std::time::Duration;

/// Backoff curve used between attempts of a transiently failing cloud call.
///
/// Exponential delays are clamped to their configured maximum.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// `base * multiplier^attempt`, optionally spread by deterministic jitter.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        /// Scale each delay by `1.0 + 0.1 * (attempt % 5)` so concurrent
        /// jobs hitting the same throttled API do not retry in lockstep.
        jitter: bool,
    },
    /// The same delay before every attempt.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Capped exponential backoff without jitter.
    #[must_use]
    pub fn capped_exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base,
            max,
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay to wait after the zero-based `attempt` failed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use remedy_executor::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::capped_exponential(
    ///     Duration::from_millis(100),
    ///     Duration::from_secs(1),
    /// );
    /// assert_eq!(strategy.delay_for(0), Duration::from_millis(100));
    /// assert_eq!(strategy.delay_for(2), Duration::from_millis(400));
    /// assert_eq!(strategy.delay_for(10), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                // Retry counts are small; the cast cannot wrap.
                #[allow(clippy::cast_possible_wrap)]
                let raw = base.as_secs_f64() * multiplier.powi(attempt as i32);
                let adjusted = if *jitter {
                    raw * (1.0 + 0.1 * f64::from(attempt % 5))
                } else {
                    raw
                };
                Duration::from_secs_f64(adjusted.min(max.as_secs_f64()))
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}
