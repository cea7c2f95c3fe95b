use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum gap between outbound calls.
///
/// The lock is held while sleeping, so concurrent callers queue up and leave
/// one interval apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_call_does_not_wait() {
        let throttle = Throttle::from_millis(1000);
        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_calls_are_spaced() {
        let throttle = Throttle::from_millis(200);
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_serialize() {
        let throttle = Arc::new(Throttle::from_millis(100));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let throttle = Arc::clone(&throttle);
                tokio::spawn(async move {
                    throttle.wait().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[3] - start >= Duration::from_millis(300));
        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_counts_towards_the_window() {
        let throttle = Throttle::from_millis(500);
        throttle.wait().await;
        tokio::time::advance(Duration::from_millis(600)).await;

        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
