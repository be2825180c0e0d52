//! Processing for the EU868 region, which uses a dynamic channel plan.

use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

use super::channel_plan::sub_band::SubBand;
use super::Error;
use crate::device::radio::types::Datarate;
use crate::mac::types::DR;

const DEFAULT_CHANNELS: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

static SUB_BANDS: [SubBand; 3] = [
    SubBand::new(868_000_000, 868_600_000, 0.01, 14),
    SubBand::new(868_700_000, 869_200_000, 0.001, 14),
    SubBand::new(869_400_000, 869_650_000, 0.1, 27),
];

const MAX_APP_PAYLOAD: [usize; 8] = [59, 59, 59, 123, 230, 230, 230, 230];

const TX_POWER_DBM: [i8; 8] = [16, 14, 12, 10, 8, 6, 4, 2];

const DL_DR_MATRIX: [[DR; 6]; 8] = [
    [DR::_0, DR::_0, DR::_0, DR::_0, DR::_0, DR::_0],
    [DR::_1, DR::_0, DR::_0, DR::_0, DR::_0, DR::_0],
    [DR::_2, DR::_1, DR::_0, DR::_0, DR::_0, DR::_0],
    [DR::_3, DR::_2, DR::_1, DR::_0, DR::_0, DR::_0],
    [DR::_4, DR::_3, DR::_2, DR::_1, DR::_0, DR::_0],
    [DR::_5, DR::_4, DR::_3, DR::_2, DR::_1, DR::_0],
    [DR::_6, DR::_5, DR::_4, DR::_3, DR::_2, DR::_1],
    [DR::_7, DR::_6, DR::_5, DR::_4, DR::_3, DR::_2],
];

/// Specific processing for the EU868 region.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EU868;
impl crate::mac::Region for EU868 {
    fn default_channels() -> usize {
        DEFAULT_CHANNELS.len()
    }
    fn mandatory_frequency(index: usize) -> u32 {
        DEFAULT_CHANNELS[index % DEFAULT_CHANNELS.len()]
    }
    fn mandatory_ul_data_rate_range(_index: usize) -> (DR, DR) {
        (DR::_0, DR::_5)
    }
    fn sub_bands() -> &'static [SubBand] {
        &SUB_BANDS
    }
    fn ul_data_rate_range() -> (DR, DR) {
        (DR::_0, DR::_6)
    }
    fn min_frequency() -> u32 {
        863000000
    }
    fn max_frequency() -> u32 {
        870000000
    }
    fn default_rx2_frequency() -> u32 {
        869525000
    }
    fn default_rx2_data_rate() -> DR {
        DR::_0
    }
    fn default_data_rate() -> DR {
        DR::_0
    }
    fn default_tx_power() -> i8 {
        14
    }
    fn default_rx1_data_rate_offset() -> u8 {
        0
    }

    fn convert_data_rate(dr: DR) -> Result<Datarate, super::Error> {
        match dr {
            DR::_0 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_12,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_1 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_11,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_2 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_10,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_3 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_9,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_4 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_8,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_5 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_7,
                bandwidth: Bandwidth::_125KHz,
            }),
            DR::_6 => Ok(Datarate {
                spreading_factor: SpreadingFactor::_7,
                bandwidth: Bandwidth::_250KHz,
            }),
            _ => Err(super::Error::DataRateNotSupported(dr)),
        }
    }

    fn max_app_payload(dr: DR) -> Result<usize, Error> {
        MAX_APP_PAYLOAD.get(dr as usize).copied().ok_or(Error::DataRateNotSupported(dr))
    }

    fn default_coding_rate() -> CodingRate {
        CodingRate::_4_5
    }
    fn supports_tx_param_setup() -> bool {
        false
    }

    fn tx_power_dbm(tx_power: u8) -> Result<i8, Error> {
        TX_POWER_DBM.get(tx_power as usize).copied().ok_or(Error::InvalidTxPower)
    }

    fn get_rx1_dr(ul_dr: DR, rx1_dr_offset: u8) -> Result<DR, super::Error> {
        DL_DR_MATRIX
            .get(ul_dr as usize)
            .and_then(|row| row.get(rx1_dr_offset as usize))
            .copied()
            .ok_or(super::Error::UnsupportedRx1DROffset(ul_dr, rx1_dr_offset))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mac::Region;

    #[test]
    fn data_rates_map_to_modulation() {
        let dr0 = EU868::convert_data_rate(DR::_0).unwrap();
        assert_eq!(dr0.sf(), 12);
        assert_eq!(dr0.bandwidth_hz(), 125_000);
        let dr6 = EU868::convert_data_rate(DR::_6).unwrap();
        assert_eq!(dr6.sf(), 7);
        assert_eq!(dr6.bandwidth_hz(), 250_000);
        assert_eq!(EU868::convert_data_rate(DR::_7), Err(Error::DataRateNotSupported(DR::_7)));
    }

    #[test]
    fn payload_limits() {
        assert_eq!(EU868::max_app_payload(DR::_0), Ok(59));
        assert_eq!(EU868::max_app_payload(DR::_3), Ok(123));
        assert_eq!(EU868::max_app_payload(DR::_7), Ok(230));
        assert!(EU868::max_app_payload(DR::_8).is_err());
    }

    #[test]
    fn reply_data_rate_matrix() {
        assert_eq!(EU868::get_rx1_dr(DR::_5, 0), Ok(DR::_5));
        assert_eq!(EU868::get_rx1_dr(DR::_5, 2), Ok(DR::_3));
        assert_eq!(EU868::get_rx1_dr(DR::_7, 5), Ok(DR::_2));
        assert_eq!(EU868::get_rx1_dr(DR::_1, 3), Ok(DR::_0));
        assert!(EU868::get_rx1_dr(DR::_2, 6).is_err());
        assert!(EU868::get_rx1_dr(DR::_8, 0).is_err());
    }

    #[test]
    fn tx_power_table() {
        assert_eq!(EU868::tx_power_dbm(0), Ok(16));
        assert_eq!(EU868::tx_power_dbm(7), Ok(2));
        assert_eq!(EU868::tx_power_dbm(8), Err(Error::InvalidTxPower));
    }

    #[test]
    fn sub_bands_cover_default_channels() {
        for index in 0..EU868::default_channels() {
            let frequency = EU868::mandatory_frequency(index);
            assert!(EU868::sub_bands().iter().any(|band| band.belongs_to(frequency)));
        }
    }
}
