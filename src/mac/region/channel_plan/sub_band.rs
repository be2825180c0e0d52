//! Regulatory sub-bands and their duty-cycle clock.

use crate::device::timer::{Duration, Instant};

/// A frequency range sharing one duty-cycle and power rule.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubBand {
    first_frequency: u32,
    last_frequency: u32,
    duty_cycle: f64,
    max_tx_power: i8,
    next_transmission_time: Instant,
}

impl SubBand {
    /// Creation. Frequencies in Hz, `duty_cycle` in `(0, 1]`, power in dBm.
    pub const fn new(first_frequency: u32, last_frequency: u32, duty_cycle: f64, max_tx_power: i8) -> Self {
        Self { first_frequency, last_frequency, duty_cycle, max_tx_power, next_transmission_time: Instant::ZERO }
    }

    /// Does `frequency` lie strictly inside this sub-band?
    pub fn belongs_to(&self, frequency: u32) -> bool {
        frequency > self.first_frequency && frequency < self.last_frequency
    }

    /// Lower edge in Hz, exclusive.
    pub fn first_frequency(&self) -> u32 {
        self.first_frequency
    }

    /// Upper edge in Hz, exclusive.
    pub fn last_frequency(&self) -> u32 {
        self.last_frequency
    }

    /// Fraction of time the band may be occupied.
    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    /// Power limit in dBm.
    pub fn max_tx_power(&self) -> i8 {
        self.max_tx_power
    }

    /// Earliest instant a new transmission may start in this sub-band.
    pub fn next_transmission_time(&self) -> Instant {
        self.next_transmission_time
    }

    /// Move the next transmission time; it never moves backwards.
    pub fn set_next_transmission_time(&mut self, at: Instant) {
        if at > self.next_transmission_time {
            self.next_transmission_time = at;
        }
    }

    /// Time left until the sub-band is free again.
    pub fn waiting_time(&self, now: Instant) -> Duration {
        self.next_transmission_time.saturating_duration_since(now)
    }

    /// Account for a transmission of `duration` starting at `now`: the sub-band stays
    /// silent for `duration / duty_cycle - duration` after that.
    pub(crate) fn register_transmission(&mut self, now: Instant, duration: Duration) {
        let off_time = duration.div_fraction(self.duty_cycle) - duration;
        self.set_next_transmission_time(now + off_time);
    }
}
