// src/utils/clock.rs
//! Wall-clock access for credential timestamps and event scheduling.
//!
//! Issuer and verifier never read the system time directly; they take a
//! [`Clock`] at construction so freshness checks can be driven from tests.

use chrono::Utc;

/// Source of the current time in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;

    /// Current time in whole Unix seconds, the resolution used by event contracts.
    fn now_secs(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// Clock backed by the host's system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
