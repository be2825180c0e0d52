//! Logical uplink channels.

use crate::mac::types::DR;

/// An uplink frequency the device may pick, with the frequency its replies come back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogicalChannel {
    pub(crate) frequency: u32,
    pub(crate) reply_frequency: u32,
    pub(crate) min_data_rate: DR,
    pub(crate) max_data_rate: DR,
    pub(crate) enabled_for_uplink: bool,
}

impl LogicalChannel {
    /// Creation. The reply frequency starts out equal to the uplink frequency.
    pub fn new(frequency: u32, min_data_rate: DR, max_data_rate: DR) -> Self {
        Self { frequency, reply_frequency: frequency, min_data_rate, max_data_rate, enabled_for_uplink: true }
    }

    /// Uplink frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// RX1 frequency in Hz.
    pub fn reply_frequency(&self) -> u32 {
        self.reply_frequency
    }

    /// Moves RX1, as a DlChannelReq does.
    pub fn set_reply_frequency(&mut self, frequency: u32) {
        self.reply_frequency = frequency;
    }

    #[allow(missing_docs)]
    pub fn min_data_rate(&self) -> DR {
        self.min_data_rate
    }

    #[allow(missing_docs)]
    pub fn max_data_rate(&self) -> DR {
        self.max_data_rate
    }

    /// Is `dr` within the channel's data rate range?
    pub fn supports_data_rate(&self, dr: DR) -> bool {
        dr.in_range((self.min_data_rate, self.max_data_rate))
    }

    /// May the channel be picked for an uplink?
    pub fn is_enabled_for_uplink(&self) -> bool {
        self.enabled_for_uplink
    }

    #[allow(missing_docs)]
    pub fn enable_for_uplink(&mut self) {
        self.enabled_for_uplink = true;
    }

    #[allow(missing_docs)]
    pub fn disable_for_uplink(&mut self) {
        self.enabled_for_uplink = false;
    }
}
