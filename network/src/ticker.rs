//! Periodic ticks with ±50% jitter
//!
//! Each wait is drawn uniformly from `[period / 2, 3 * period / 2)` so peers
//! started together drift apart instead of firing in lockstep.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time;

pub struct JitteredTicker {
    period: Duration,
    rng: StdRng,
}

impl JitteredTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(period: Duration, seed: u64) -> Self {
        Self {
            period,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.period.mul_f64(self.rng.random_range(0.5..1.5))
    }

    /// Sleep until the next tick
    pub async fn tick(&mut self) {
        let delay = self.next_delay();
        time::sleep(delay).await;
    }
}
