//! Simulation clock types and the timer capability handed to the MAC.
//!
//! All time is kept in integer microseconds on a single logical clock. Nothing here
//! blocks: a "delay" is a future event placed on the [`Timeline`](crate::timeline::Timeline)
//! and identified by an [`EventId`] the MAC keeps while the event is still wanted.

use core::ops::{Add, AddAssign, Mul, Sub};

use crate::mac::types::MacTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    QueueFull,
}

/// A point on the simulation clock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instant(u64);

impl Instant {
    /// Start of the simulation.
    pub const ZERO: Instant = Instant(0);

    /// Creation.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creation.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    /// Creation.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Microseconds since the start of the simulation.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        Instant(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

/// A span of simulation time. [`Duration::MAX`] stands for "never".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Duration(u64);

impl Duration {
    /// No time at all.
    pub const ZERO: Duration = Duration(0);
    /// Infinite waiting time.
    pub const MAX: Duration = Duration(u64::MAX);

    /// Creation.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creation.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    /// Creation.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000)
    }

    /// Length in microseconds.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Length in whole milliseconds.
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Length in seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Is this an empty span?
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Does this stand for "never"?
    pub const fn is_infinite(&self) -> bool {
        self.0 == u64::MAX
    }

    /// Subtraction clamped at zero.
    pub const fn saturating_sub(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_sub(rhs.0))
    }

    /// Divide by a fraction in `(0, 1]`, rounding to the nearest microsecond.
    pub fn div_fraction(self, fraction: f64) -> Duration {
        let scaled = self.0 as f64 / fraction + 0.5;
        if scaled >= u64::MAX as f64 {
            Duration::MAX
        } else {
            Duration(scaled as u64)
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Self::Output {
        Duration(self.0.saturating_mul(rhs as u64))
    }
}

/// Handle of a scheduled event.
///
/// Handles are never reused within one timeline, so a stale handle can always be told
/// apart from the one currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId(pub(crate) u64);

impl EventId {
    /// Insertion sequence number on the owning timeline.
    pub fn seq(&self) -> u64 {
        self.0
    }
}

/// Clock and scheduling capability provided by the calling code.
pub trait Timer {
    /// Current simulation time.
    fn now(&self) -> Instant;

    /// Place `timer` on the timeline `delay` from now.
    fn schedule(&mut self, delay: Duration, timer: MacTimer) -> Result<EventId, Error>;
}
