//! Send throttle - Fixed minimum spacing between transport invocations

use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Spaces consecutive sends of one dispatch worker.
///
/// The first call to [`SendThrottle::ready`] returns immediately; each later
/// call waits until at least `period` has passed since the previous one,
/// whether the previous send succeeded or not.
pub struct SendThrottle {
    ticker: Interval,
}

impl SendThrottle {
    pub fn new(period: Duration) -> Self {
        let mut ticker = interval(period);
        // A slow transport round trip must not be followed by a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { ticker }
    }

    /// Wait for the next send slot
    pub async fn ready(&mut self) {
        self.ticker.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_first_slot_is_immediate() {
        let start = Instant::now();
        let mut throttle = SendThrottle::new(Duration::from_millis(500));

        throttle.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_spaced() {
        let mut throttle = SendThrottle::new(Duration::from_millis(500));
        let mut slots = Vec::new();
        for _ in 0..4 {
            throttle.ready().await;
            slots.push(Instant::now());
        }

        for pair in slots.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_does_not_burst() {
        let mut throttle = SendThrottle::new(Duration::from_millis(500));

        throttle.ready().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        throttle.ready().await;
        let late = Instant::now();
        throttle.ready().await;

        assert!(Instant::now() - late >= Duration::from_millis(500));
    }
}
