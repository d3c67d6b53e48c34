// src/fetch/politeness.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Randomized minimum spacing between requests to the same host.
#[derive(Debug)]
pub struct PolitenessGate {
    min: Duration,
    max: Duration,
    last: HashMap<String, Instant>,
    rng: StdRng,
}

impl PolitenessGate {
    /// Bounds in seconds. Swapped if given in the wrong order, clamped at zero.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let (lo, hi) = if min_secs <= max_secs {
            (min_secs, max_secs)
        } else {
            (max_secs, min_secs)
        };
        Self {
            min: Duration::from_secs_f64(lo.max(0.0)),
            max: Duration::from_secs_f64(hi.max(0.0)),
            last: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// No delay at all.
    pub fn disabled() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Same bounds, reproducible draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn draw(&mut self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let secs = self
            .rng
            .gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Wait until `host` may be contacted again, then record the request.
    pub async fn wait(&mut self, host: &str) {
        let delay = self.draw();
        if let Some(prev) = self.last.get(host) {
            let elapsed = prev.elapsed();
            if elapsed < delay {
                let remaining = delay - elapsed;
                debug!(host, wait_ms = remaining.as_millis() as u64, "politeness delay");
                sleep(remaining).await;
            }
        }
        self.last.insert(host.to_string(), Instant::now());
    }
}
