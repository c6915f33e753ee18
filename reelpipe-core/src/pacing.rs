use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Randomized sleeps between steps of a loop.
///
/// A range of `(0, 0)` disables pacing entirely, which is what the tests use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    range_ms: (u64, u64),
}

impl Pacer {
    pub fn new(range_ms: (u64, u64)) -> Self {
        Self { range_ms }
    }

    pub fn from_millis(bounds: [u64; 2]) -> Self {
        Self::new((bounds[0], bounds[1]))
    }

    pub fn from_seconds(bounds: [u64; 2]) -> Self {
        Self::new((
            bounds[0].saturating_mul(1000),
            bounds[1].saturating_mul(1000),
        ))
    }

    pub fn fixed(millis: u64) -> Self {
        Self::new((millis, millis))
    }

    pub fn disabled() -> Self {
        Self::new((0, 0))
    }

    pub fn is_disabled(&self) -> bool {
        self.range_ms.0 == 0 && self.range_ms.1 == 0
    }

    pub fn next_delay(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        let lower = self.range_ms.0.min(self.range_ms.1);
        let upper = self.range_ms.0.max(self.range_ms.1);
        let millis = rand::thread_rng().gen_range(lower..=upper);
        Duration::from_millis(millis)
    }

    /// Sleeps for a random duration inside the range and returns the milliseconds waited.
    pub async fn wait(&self) -> u64 {
        let delay = self.next_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        delay.as_millis() as u64
    }
}
