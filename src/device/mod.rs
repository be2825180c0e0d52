//! Wrapper for all necessary functionality implemented by calling code.

pub mod radio;
pub mod radio_buffer;
pub mod rng;
pub mod timer;

use radio::Radio;
use rng::Rng;

use crate::mac::types::MacEvent;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error<D>
where
    D: Device,
{
    Timer(timer::Error),
    Radio(<<D as Device>::Radio as Radio>::Error),
    Rng(<<D as Device>::Rng as Rng>::Error),
    RadioBuffer(radio_buffer::Error),
}
impl<D> From<Error<D>> for super::Error<D>
where
    D: Device,
{
    fn from(value: Error<D>) -> Self {
        Self::Device(value)
    }
}

/// Specification of node-specific functionality provided by the caller.
///
/// A MAC instance owns exactly one device, and through it exactly one radio.
pub trait Device {
    /// Radio provided by the calling code.
    type Radio: Radio;
    /// Random number generator provided by calling code.
    type Rng: Rng;

    /// Get the caller-supplied LoRa radio implementation.
    fn radio(&mut self) -> &mut Self::Radio;
    /// Get the caller-supllied random number generator implementation.
    fn rng(&mut self) -> &mut Self::Rng;
    /// Process the LinkCheckAns response from a network server as directed by the caller.
    fn handle_link_check(&mut self, _gateway_count: u8, _margin: u8) {
        // default do nothing
    }
    /// Battery level in `0.0..=1.0` reported in DevStatusAns, `None` if unknown.
    fn battery_level(&self) -> Option<f32> {
        None
    }
    /// Is the device running on external power? Reported as battery level 0.
    fn externally_powered(&self) -> bool {
        false
    }
    /// Observe MAC state changes and refusals.
    fn handle_event(&mut self, _event: MacEvent<'_>) {
        // default do nothing
    }
}
