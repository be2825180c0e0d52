//! Transceiver configuration and reception metadata.

pub use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

use crate::device::timer::Duration;

/// Symbol time above which low data rate optimization is mandatory.
const LDRO_SYMBOL_TIME_US: u64 = 16_000;

/// Observable state of the physical layer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RadioState {
    Sleep,
    Standby,
    Tx,
    Rx,
}

/// Carrier and modulation of a transmission.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct RfConfig {
    /// Carrier frequency in Hz.
    pub frequency: u32,
    /// Forward error correction rate.
    pub coding_rate: CodingRate,
    /// Spreading factor and bandwidth.
    pub data_rate: Datarate,
}

/// A LoRa modulation.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct Datarate {
    #[allow(missing_docs)]
    pub bandwidth: Bandwidth,
    #[allow(missing_docs)]
    pub spreading_factor: SpreadingFactor,
}

impl Datarate {
    /// Spreading factor as a number of bits per symbol.
    pub fn sf(&self) -> u32 {
        self.spreading_factor.factor()
    }

    /// Channel width in Hz.
    pub fn bandwidth_hz(&self) -> u32 {
        self.bandwidth.hz()
    }

    /// Duration of one LoRa symbol, `2^SF / BW`.
    pub fn symbol_time(&self) -> Duration {
        Duration::from_micros((1u64 << self.sf()) * 1_000_000 / self.bandwidth_hz() as u64)
    }

    /// Is low data rate optimization required for this modulation?
    pub fn requires_ldro(&self) -> bool {
        self.symbol_time().as_micros() > LDRO_SYMBOL_TIME_US
    }
}

/// Everything the physical layer needs for one transmission.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq)]
pub struct TxConfig {
    /// Transmit power in dBm.
    pub pw: i8,
    #[allow(missing_docs)]
    pub rf: RfConfig,
    /// Programmed preamble length, without the 4.25 sync symbols.
    pub preamble_symbols: u16,
    /// Fixed length frames without a PHY header.
    pub implicit_header: bool,
    /// Is a payload CRC appended?
    pub crc_on: bool,
    #[allow(missing_docs)]
    pub low_data_rate_optimize: bool,
}

impl TxConfig {
    /// On-air time of a `len` byte frame, per the SX127x designer's guide.
    pub fn time_on_air(&self, len: usize) -> Duration {
        let sf = self.rf.data_rate.sf() as i64;
        let t_sym = self.rf.data_rate.symbol_time().as_micros();
        let cr = coding_rate_offset(&self.rf.coding_rate) as i64;
        let de = self.low_data_rate_optimize as i64;
        let h = self.implicit_header as i64;
        let crc = self.crc_on as i64;

        // (n + 4.25) symbols, kept integral by working in quarter symbols
        let preamble = (4 * self.preamble_symbols as u64 + 17) * t_sym / 4;

        let num = 8 * len as i64 - 4 * sf + 28 + 16 * crc - 20 * h;
        let den = 4 * (sf - 2 * de);
        let blocks = if num > 0 { (num + den - 1) / den } else { 0 };
        let payload_symbols = 8 + (blocks * (cr + 4)) as u64;

        Duration::from_micros(preamble + payload_symbols * t_sym)
    }
}

/// Signal metrics of a received frame.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RxQuality {
    /// In dBm.
    pub rssi: i16,
    /// In dB.
    pub snr: i8,
}

impl RxQuality {
    #[allow(missing_docs)]
    pub fn new(rssi: i16, snr: i8) -> RxQuality {
        RxQuality { rssi, snr }
    }

    #[allow(missing_docs)]
    pub fn rssi(self) -> i16 {
        self.rssi
    }
    #[allow(missing_docs)]
    pub fn snr(self) -> i8 {
        self.snr
    }
}

/// `CR` in the 4/(4+CR) notation.
pub(crate) fn coding_rate_offset(cr: &CodingRate) -> u32 {
    match cr {
        CodingRate::_4_5 => 1,
        CodingRate::_4_6 => 2,
        CodingRate::_4_7 => 3,
        CodingRate::_4_8 => 4,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(sf: SpreadingFactor) -> TxConfig {
        TxConfig {
            pw: 14,
            rf: RfConfig {
                frequency: 868_100_000,
                coding_rate: CodingRate::_4_5,
                data_rate: Datarate { bandwidth: Bandwidth::_125KHz, spreading_factor: sf },
            },
            preamble_symbols: 8,
            implicit_header: false,
            crc_on: true,
            low_data_rate_optimize: false,
        }
    }

    #[test]
    fn sf7_ten_bytes() {
        assert_eq!(config(SpreadingFactor::_7).time_on_air(10), Duration::from_micros(41_216));
    }

    #[test]
    fn sf8_ten_bytes() {
        let mut tx = config(SpreadingFactor::_8);
        assert_eq!(tx.time_on_air(10), Duration::from_micros(72_192));
        tx.implicit_header = true;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(72_192));
        tx.rf.coding_rate = CodingRate::_4_6;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(78_336));
        tx.preamble_symbols = 10;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(82_432));
        tx.low_data_rate_optimize = true;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(82_432));
    }

    #[test]
    fn sf10_with_ldro_and_wider_channel() {
        let mut tx = config(SpreadingFactor::_10);
        tx.implicit_header = true;
        tx.rf.coding_rate = CodingRate::_4_6;
        tx.preamble_symbols = 10;
        tx.low_data_rate_optimize = true;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(280_576));
        tx.rf.data_rate.bandwidth = Bandwidth::_250KHz;
        assert_eq!(tx.time_on_air(10), Duration::from_micros(140_288));
    }

    #[test]
    fn narrow_channels_stretch_the_symbol() {
        let sf7 = Datarate { bandwidth: Bandwidth::_62KHz, spreading_factor: SpreadingFactor::_7 };
        assert_eq!(sf7.bandwidth_hz(), 62_500);
        assert_eq!(sf7.symbol_time(), Duration::from_micros(2_048));
        let sf9 = Datarate { bandwidth: Bandwidth::_31KHz, spreading_factor: SpreadingFactor::_9 };
        assert_eq!(sf9.symbol_time(), Duration::from_micros(16_384));
        assert!(sf9.requires_ldro());
    }

    #[test]
    fn ldro_kicks_in_above_sixteen_ms_symbols() {
        let sf11 = Datarate { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_11 };
        let sf10 = Datarate { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_10 };
        assert_eq!(sf11.symbol_time(), Duration::from_micros(16_384));
        assert!(sf11.requires_ldro());
        assert!(!sf10.requires_ldro());
    }
}
