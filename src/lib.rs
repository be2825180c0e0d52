#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! Discrete-event LoRaWAN 1.0.x MAC for class A end devices and gateways.
//!
//! Each node owns a [`device::Device`] giving it a radio and a random source, and a
//! [`mac::region::channel_plan::ChannelManager`] tracking its channels and the duty cycle
//! of every regulatory sub-band. Nodes never block: the calling code runs a
//! [`timeline::Timeline`] and feeds fired timers and physical layer outcomes back through
//! [`mac::LorawanMac`].

// must come first so the logging macros are visible to the other modules
mod fmt;

use device::Device;
use mac::region;

pub mod device;
pub mod encoding;
pub mod mac;
pub mod timeline;

pub use mac::gateway::GatewayMac;
pub use mac::region::eu868::EU868;
pub use mac::{EndDeviceMac, LorawanMac};

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error<D>
where
    D: Device,
{
    Device(device::Error<D>),
    Region(region::Error),
    Mac(mac::Error),
    Encoding(encoding::Error),
}
