// =============================================================================
// Poll pacing — jittered wait between price checks
// =============================================================================
//
//   wait = max(1s, interval + uniform(-jitter, +jitter))
//
// With jitter >= 0 every wait lies in [1s, interval + jitter].
// =============================================================================

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Floor applied to every poll wait, in seconds.
pub const MIN_WAIT_SECS: f64 = 1.0;

/// Produces the wait before each price sample.
#[derive(Debug)]
pub struct PollPacing {
    interval_secs: f64,
    jitter_secs: f64,
    rng: StdRng,
}

impl PollPacing {
    /// `seed = None` draws from OS entropy.
    pub fn new(interval_secs: f64, jitter_secs: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            interval_secs,
            jitter_secs: jitter_secs.max(0.0),
            rng,
        }
    }

    pub fn next_wait(&mut self) -> Duration {
        let sample = if self.jitter_secs > 0.0 {
            self.rng.gen_range(-self.jitter_secs..=self.jitter_secs)
        } else {
            0.0
        };
        Duration::from_secs_f64(jittered_wait_secs(self.interval_secs, sample))
    }
}

/// Apply one jitter sample to the nominal interval and floor the result.
pub fn jittered_wait_secs(interval_secs: f64, jitter_sample: f64) -> f64 {
    (interval_secs + jitter_sample).max(MIN_WAIT_SECS)
}
