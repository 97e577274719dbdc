//! Randomized request pacing
//!
//! Every outbound attempt is preceded by a pause drawn uniformly from a
//! configured window, so the request stream never settles into a fixed
//! cadence the remote side can fingerprint.

use crate::harvest::control::HarvestControl;
use rand::Rng;
use std::time::Duration;

/// Inserts randomized delays between requests
///
/// The harvester is single-flight, so one limiter serves exactly one caller.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
}

impl RateLimiter {
    /// Creates a limiter for the `[min_delay, max_delay]` window
    ///
    /// The bounds are swapped if given in the wrong order.
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        if min_delay <= max_delay {
            Self {
                min_delay,
                max_delay,
            }
        } else {
            Self {
                min_delay: max_delay,
                max_delay: min_delay,
            }
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draws one delay from the window
    pub fn draw(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if min == max {
            return self.min_delay;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Suspends the caller for one drawn delay
    ///
    /// Returns false if a stop was requested while waiting.
    pub async fn pace(&self, control: &HarvestControl) -> bool {
        let delay = self.draw();
        tracing::debug!("Waiting {}ms before next request", delay.as_millis());
        control.pause(delay).await
    }
}
