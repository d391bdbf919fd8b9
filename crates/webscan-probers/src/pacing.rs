//! Shared pacing helper (§5 Rate-limit invariant): no two successive HTTP
//! requests from the same prober to the same target may be separated by
//! less than the prober's configured pacing.

use std::time::{Duration, Instant};

pub struct Paced {
    delay: Duration,
    last_request: Option<Instant>,
}

impl Paced {
    pub fn new(delay_ms: u64) -> Self {
        Paced {
            delay: Duration::from_millis(delay_ms),
            last_request: None,
        }
    }

    /// Sleeps just long enough that `delay` has elapsed since the previous
    /// call. The first call never sleeps.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_does_not_sleep() {
        let mut paced = Paced::new(5_000);
        let started = Instant::now();
        paced.wait().await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn second_call_waits_out_the_remaining_delay() {
        let mut paced = Paced::new(50);
        paced.wait().await;
        let started = Instant::now();
        paced.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
