use std::time::Duration;

/// Upper bound on a single backoff so misconfiguration cannot park a job
/// for days.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// A failed attempt is terminal.
    #[default]
    None,
    /// Up to `max_attempts` tries in total; the n-th retry waits
    /// `base_delay * 2^(n-1)`.
    Exponential {
        max_attempts: u32,
        base_delay: Duration,
    },
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self::Exponential {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Exponential { max_attempts, .. } => *max_attempts,
        }
    }

    /// How long to wait before trying again after `attempts` failed tries,
    /// or `None` when the failure is terminal.
    pub fn next_delay(&self, attempts: u32, retryable: bool) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Exponential {
                max_attempts,
                base_delay,
            } => {
                if !retryable || attempts >= *max_attempts {
                    return None;
                }
                Some(backoff(*base_delay, attempts))
            }
        }
    }
}

/// `base * 2^(attempt-1)`, saturating and capped.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.max(1).saturating_sub(1);
    let multiplier = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
    base.checked_mul(multiplier)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}
