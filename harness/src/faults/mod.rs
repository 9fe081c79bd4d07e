//! Fault injectors
//!
//! Each injector is a long-lived task that owns its RNG stream and observes
//! the broadcast exit signal at every sleep and decision point.

mod prober;
mod resource_bouncer;
mod router_bouncer;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::select;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::sleep;

pub use prober::ManagementProber;
pub use resource_bouncer::ResourceBouncer;
pub use router_bouncer::RouterBouncer;

/// Inclusive range of milliseconds a pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl PauseRange {
    pub const fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min_ms: min * 1000,
            max_ms: max * 1000,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min_ms <= self.max_ms
    }

    /// Uniform draw from the range.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Non-blocking check of the exit signal.
///
/// A closed or lagged channel also counts as a request to exit.
pub fn exit_requested(exit: &mut broadcast::Receiver<()>) -> bool {
    !matches!(exit.try_recv(), Err(TryRecvError::Empty))
}

/// Sleep for `duration` unless the exit signal arrives first.
///
/// Returns `false` if the harness is shutting down.
pub async fn pause(exit: &mut broadcast::Receiver<()>, duration: Duration) -> bool {
    select! {
        biased;
        _ = exit.recv() => {
            debug!("pause interrupted by exit signal");
            false
        },
        _ = sleep(duration) => true,
    }
}
