//! Request pacing and retry backoff
//!
//! Two independent clocks slow the crawler down:
//! - [`Pacer`]: a jittered delay before every page request, errors or not
//! - [`Backoff`]: a growing, jittered delay between retries of one request

use rand::Rng;
use std::time::Duration;

/// Jitter window applied to the pacing delay
const PACING_JITTER: (f64, f64) = (0.6, 1.8);

/// Jitter window applied to each backoff step (±20%)
const BACKOFF_JITTER: (f64, f64) = (0.8, 1.2);

/// Scales `base` by a uniform factor drawn from `[low, high]`
fn jittered(base: Duration, (low, high): (f64, f64)) -> Duration {
    if base.is_zero() {
        return base;
    }
    let factor = rand::rng().random_range(low..=high);
    base.mul_f64(factor)
}

/// Delay inserted before every page request
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    base: Duration,
}

impl Pacer {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Draws the next pacing delay: `base * U(0.6, 1.8)`
    pub fn next_delay(&self) -> Duration {
        jittered(self.base, PACING_JITTER)
    }
}

/// Exponential backoff for one request's retries
///
/// Step `n` (starting at 0) waits `base * 2^n * U(0.8, 1.2)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    step: u32,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { base, step: 0 }
    }

    /// Number of delays handed out so far
    pub fn steps(&self) -> u32 {
        self.step
    }

    /// Returns the next delay and advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let scaled = self.base.saturating_mul(2u32.saturating_pow(self.step));
        self.step += 1;
        jittered(scaled, BACKOFF_JITTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_stays_in_window() {
        let pacer = Pacer::new(Duration::from_millis(1000));
        for _ in 0..200 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_millis(600), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1800), "{:?}", delay);
        }
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        assert_eq!(Pacer::new(Duration::ZERO).next_delay(), Duration::ZERO);
        assert_eq!(Backoff::new(Duration::ZERO).next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_with_jitter() {
        let mut backoff = Backoff::new(Duration::from_secs(15));

        let expected = [15.0, 30.0, 60.0];
        for center in expected {
            let secs = backoff.next_delay().as_secs_f64();
            assert!(secs >= center * 0.8 - 1e-9, "{} below {}", secs, center);
            assert!(secs <= center * 1.2 + 1e-9, "{} above {}", secs, center);
        }
        assert_eq!(backoff.steps(), 3);
    }
}
