//! Physical layer capability handed to the MAC.

pub mod types;
use core::fmt::Debug;

use lora_modulation::SpreadingFactor;
use types::*;

use super::timer::Duration;

/// The physical layer as seen from the MAC.
///
/// Transmission and reception outcomes travel the other way: the PHY reports them by
/// calling [`LorawanMac::tx_finished`](crate::mac::LorawanMac::tx_finished),
/// [`LorawanMac::receive`](crate::mac::LorawanMac::receive) and
/// [`LorawanMac::failed_reception`](crate::mac::LorawanMac::failed_reception).
pub trait Radio: Sized {
    #[cfg(feature = "defmt")]
    /// Error reported by the transceiver.
    type Error: Debug + defmt::Format;

    #[cfg(not(feature = "defmt"))]
    /// Error reported by the transceiver.
    type Error: Debug;

    /// Start transmitting `buf` with the given transceiver configuration.
    fn send(&mut self, config: &TxConfig, buf: &[u8]) -> Result<(), Self::Error>;

    /// Listen on the configured frequency and spreading factor.
    fn switch_to_standby(&mut self) -> Result<(), Self::Error>;

    /// Stop listening.
    fn switch_to_sleep(&mut self) -> Result<(), Self::Error>;

    /// Tune the receiver.
    fn set_frequency(&mut self, frequency: u32) -> Result<(), Self::Error>;

    /// Select the spreading factor the receiver locks on to.
    fn set_spreading_factor(&mut self, sf: SpreadingFactor) -> Result<(), Self::Error>;

    /// Current state of the transceiver.
    fn state(&self) -> RadioState;

    /// On-air time of a `len` byte frame sent with `config`.
    fn time_on_air(&self, config: &TxConfig, len: usize) -> Duration {
        config.time_on_air(len)
    }
}
