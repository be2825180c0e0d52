//! Specification of functionality implemented for each supported LoRaWAN region.

use crate::device::radio::types::{CodingRate, Datarate};
use crate::device::timer::Duration;
use crate::device::Device;

use self::channel_plan::sub_band::SubBand;

use super::types::DR;
pub mod channel_plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    InvalidTxPower,
    InvalidChannelIndex,
    InvalidChannelMaskCtrl,
    InvalidFrequency,
    DataRateNotSupported(DR),
    UnsupportedRx1DROffset(DR, u8),
}
impl<D> From<Error> for crate::Error<D>
where
    D: Device,
{
    fn from(value: Error) -> Self {
        Self::Region(value)
    }
}

/// Specification of functionality to describe regional characteristics.
pub trait Region {
    /// Get the number of default uplink channels for the region.
    fn default_channels() -> usize;
    /// Get the default uplink frequency based on channel index for the region.
    fn mandatory_frequency(index: usize) -> u32;
    /// Get the default uplink data rate based on channel index for the region.
    fn mandatory_ul_data_rate_range(index: usize) -> (DR, DR);
    /// Regulatory sub-bands, each with its duty cycle and power limit.
    fn sub_bands() -> &'static [SubBand];
    /// Get the uplink data rate range.
    fn ul_data_rate_range() -> (DR, DR);
    /// Get the default data rate for the region.
    fn default_data_rate() -> DR;
    /// Get the default coding rate for the region.
    fn default_coding_rate() -> CodingRate;
    /// Get the default RX2 frequency for the region.
    fn default_rx2_frequency() -> u32;
    /// Get the default RX2 data rate for the region.
    fn default_rx2_data_rate() -> DR;
    /// Get the default transmit power in dBm.
    fn default_tx_power() -> i8;
    /// Get the minimum frequency for the region.
    fn min_frequency() -> u32;
    /// Get the maximum frequency for the region.
    fn max_frequency() -> u32;
    /// Convert the data rate to spreading factor and bandwidth for the region.
    fn convert_data_rate(dr: DR) -> Result<Datarate, Error>;
    /// Largest application payload allowed at `dr`.
    fn max_app_payload(dr: DR) -> Result<usize, Error>;
    /// Convert a LinkADRReq TXPower index to dBm.
    fn tx_power_dbm(tx_power: u8) -> Result<i8, Error>;
    /// For the region, determine the RX1 data rate based on the uplink data rate and data rate offset.
    fn get_rx1_dr(ul_dr: DR, rx1_dr_offset: u8) -> Result<DR, Error>;
    /// Does the region support TXParamSetupReq packet processing?
    fn supports_tx_param_setup() -> bool;
    /// Get the default RX delay for the region.
    fn default_rx_delay() -> Duration {
        Duration::from_secs(1)
    }
    /// Get the default RX1 data rate offset for the region.
    fn default_rx1_data_rate_offset() -> u8;
    /// Preamble length of every uplink, in symbols.
    fn preamble_symbols() -> u16 {
        8
    }
    /// Get the default ADR acknowledgement limit for the region.
    fn default_adr_ack_limit() -> u8 {
        64
    }
    /// Get the default ADR acknowledgement delay for the region.
    fn default_adr_ack_delay() -> u8 {
        32
    }
}

pub mod eu868;
