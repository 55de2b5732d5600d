use std::time::Duration;

use rand::Rng;

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    /// `jitter` is a fraction of the delay, clamped to `[0, 1]`.
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// `initial * 2^attempt`, capped at `max`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max)
    }

    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        base.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_base_delay_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(300), 0.2);
        assert_eq!(backoff.base_delay(0), Duration::from_secs(2));
        assert_eq!(backoff.base_delay(3), Duration::from_secs(16));
        assert_eq!(backoff.base_delay(10), Duration::from_secs(300));
        assert_eq!(backoff.base_delay(40), Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(300), 0.2);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..5 {
            let base = backoff.base_delay(attempt).as_secs_f64();
            let d = backoff.delay(attempt, &mut rng).as_secs_f64();
            assert!(d >= base * 0.8 - 1e-9 && d <= base * 1.2 + 1e-9);
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let backoff = Backoff::new(Duration::from_millis(5), Duration::from_secs(1), 0.0);
        assert_eq!(backoff.delay(2, &mut rand::thread_rng()), Duration::from_millis(20));
    }
}
