use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::workflow::RetryPolicy;

/// Spreads per-node seeds so that neighbouring nodes draw unrelated jitter.
const SEED_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed for the backoff jitter of the node at `index` in a run seeded with `seed`.
pub(crate) fn node_seed(
    seed: u64,
    index: usize,
) -> u64 {
    seed ^ (index as u64).wrapping_add(1).wrapping_mul(SEED_SPREAD)
}

/// Exponential backoff with seeded jitter for one node.
///
/// Delays depend only on the policy, the seed and the retry number, so a
/// fixed seed reproduces the exact same schedule.
pub(crate) struct Backoff {
    policy: RetryPolicy,
    rng: StdRng,
}

impl Backoff {
    pub(crate) fn new(
        policy: RetryPolicy,
        seed: u64,
    ) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delay before retry `retry` (1-based).
    pub(crate) fn delay(
        &mut self,
        retry: u32,
    ) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = (self.policy.initial_backoff_ms as f64 * self.policy.backoff_multiplier.powi(exponent)).min(self.policy.max_backoff_ms as f64).max(0.0);
        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        let extra = if jitter > 0.0 { self.rng.random::<f64>() * jitter * base } else { 0.0 };
        Duration::from_millis((base + extra).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 500,
            jitter,
            retry_missing_secrets: false,
        }
    }

    #[test]
    fn test_exponential_without_jitter() {
        let mut backoff = Backoff::new(policy(0.0), 1);
        let delays: Vec<u128> = (1..=5).map(|n| backoff.delay(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let mut backoff = Backoff::new(policy(0.5), 7);
        for n in 1..=5 {
            let base = (100.0 * 2f64.powi(n as i32 - 1)).min(500.0);
            let delay = backoff.delay(n).as_millis() as f64;
            assert!(delay >= base && delay <= base * 1.5 + 1.0, "retry {} delay {}", n, delay);
        }
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let schedule = |seed| {
            let mut backoff = Backoff::new(policy(1.0), seed);
            (1..=5).map(|n| backoff.delay(n)).collect::<Vec<_>>()
        };
        assert_eq!(schedule(42), schedule(42));
        assert_ne!(schedule(42), schedule(43));
    }

    #[test]
    fn test_node_seeds_differ() {
        assert_ne!(node_seed(42, 0), node_seed(42, 1));
        assert_eq!(node_seed(42, 3), node_seed(42, 3));
    }
}
