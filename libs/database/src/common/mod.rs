//! Pieces shared by both backends.
//!
//! The reconnect loops themselves live in each backend's connector (the
//! two stores fail differently and log differently); only the wait
//! schedule is shared.

pub mod error;

pub use error::{DatabaseError, DatabaseResult};

use rand::RngExt;
use std::time::Duration;

/// First wait after a failed connection attempt.
pub(crate) const FIRST_WAIT: Duration = Duration::from_millis(250);

/// Waits double per attempt but never stretch past this.
pub(crate) const WAIT_CEILING: Duration = Duration::from_secs(10);

/// The wait following `current`.
pub(crate) fn next_wait(current: Duration) -> Duration {
    (current * 2).min(WAIT_CEILING)
}

/// Stretch a wait by up to half its length, so a fleet restarting in
/// lockstep does not reconnect in lockstep too.
pub(crate) fn smear(wait: Duration) -> Duration {
    wait.mul_f64(rand::rng().random_range(1.0..1.5))
}
