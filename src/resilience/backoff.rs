//! Exponential backoff with jitter for the accept loop.

use std::time::Duration;
use rand::Rng;

const BASE_DELAY_MS: u64 = 10;
const MAX_DELAY_MS: u64 = 1_000;

/// Delay before the next accept after `failures` consecutive failures.
pub fn calculate_backoff(failures: u32) -> Duration {
    backoff_between(failures, BASE_DELAY_MS, MAX_DELAY_MS)
}

fn backoff_between(failures: u32, base_ms: u64, max_ms: u64) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }

    let exponential = 2u64.saturating_pow(failures - 1);
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    // Up to 10% jitter so a burst of failing accepts does not stay in lockstep
    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(calculate_backoff(0), Duration::ZERO);
        assert!(calculate_backoff(1) >= Duration::from_millis(10));
        assert!(calculate_backoff(3) >= Duration::from_millis(40));

        let capped = calculate_backoff(30);
        assert!(capped >= Duration::from_millis(1_000));
        assert!(capped < Duration::from_millis(1_100));
    }
}
