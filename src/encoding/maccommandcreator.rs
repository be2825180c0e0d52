// Copyright (c) 2018-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// Author: Ivaylo Petrov <ivajloip@gmail.com>

//! Setters for building MAC command payloads.
//!
//! Start from `Default` (all zero) and chain the setters:
//!
//! ```
//! use lorawan_sim::encoding::maccommands::{LinkADRAnsPayload, MacCommand};
//!
//! let mut ans = LinkADRAnsPayload::default();
//! ans.set_tx_power_ack(true).set_data_rate_ack(true).set_channel_mask_ack(false);
//! let cmd: MacCommand = ans.into();
//! assert_eq!(cmd.payload_bytes(), &[0x06]);
//! ```

use super::maccommands::*;
use super::Error;

macro_rules! create_ack_setter {
    (
        $(#[$outer:meta])*
        $fn_name:ident, $offset:expr
    ) => (
        $(#[$outer])*
        pub fn $fn_name(&mut self, ack: bool) -> &mut Self {
            self.0[0] &= !(1 << $offset);
            self.0[0] |= (ack as u8) << $offset;
            self
        }
    )
}

impl LinkCheckAnsPayload {
    /// Link margin in dB of the last uplink.
    pub fn set_margin(&mut self, margin: u8) -> &mut Self {
        self.0[0] = margin;
        self
    }

    /// Number of gateways that heard the last uplink.
    pub fn set_gateway_count(&mut self, gateway_count: u8) -> &mut Self {
        self.0[1] = gateway_count;
        self
    }
}

impl LinkADRReqPayload {
    /// Data rate index, upper nibble.
    pub fn set_data_rate(&mut self, data_rate: u8) -> &mut Self {
        self.0[0] = (self.0[0] & 0x0f) | (data_rate << 4);
        self
    }

    /// TX power index, lower nibble.
    pub fn set_tx_power(&mut self, tx_power: u8) -> &mut Self {
        self.0[0] = (self.0[0] & 0xf0) | (tx_power & 0x0f);
        self
    }

    #[allow(missing_docs)]
    pub fn set_channel_mask<T: Into<ChannelMask>>(&mut self, channel_mask: T) -> &mut Self {
        self.0[1..3].copy_from_slice(channel_mask.into().as_ref());
        self
    }

    /// ChMaskCntl and NbTrans.
    pub fn set_redundancy(&mut self, channel_mask_control: u8, number_of_transmissions: u8) -> &mut Self {
        self.0[3] = ((channel_mask_control & 0x07) << 4) | (number_of_transmissions & 0x0f);
        self
    }
}

impl LinkADRAnsPayload {
    create_ack_setter!(
        /// Accept the channel mask.
        set_channel_mask_ack,
        0
    );
    create_ack_setter!(
        /// Accept the data rate.
        set_data_rate_ack,
        1
    );
    create_ack_setter!(
        /// Accept the TX power.
        set_tx_power_ack,
        2
    );
}

impl DutyCycleReqPayload {
    /// Aggregated duty cycle limit as `1 / 2^max_duty_cycle`.
    pub fn set_max_duty_cycle(&mut self, max_duty_cycle: u8) -> &mut Self {
        self.0[0] = max_duty_cycle;
        self
    }
}

impl RXParamSetupReqPayload {
    /// RX1 data rate offset and RX2 data rate.
    pub fn set_dl_settings(&mut self, rx1_dr_offset: u8, rx2_data_rate: u8) -> &mut Self {
        self.0[0] = ((rx1_dr_offset & 0x07) << 4) | (rx2_data_rate & 0x0f);
        self
    }

    /// RX2 frequency in Hz.
    pub fn set_frequency(&mut self, frequency: u32) -> &mut Self {
        self.0[1..4].copy_from_slice(Frequency::new_from_value(frequency).as_ref());
        self
    }
}

impl RXParamSetupAnsPayload {
    create_ack_setter!(
        /// Accept the RX2 frequency.
        set_channel_ack,
        0
    );
    create_ack_setter!(
        /// Accept the RX2 data rate.
        set_rx2_data_rate_ack,
        1
    );
    create_ack_setter!(
        /// Accept the RX1 offset.
        set_rx1_dr_offset_ack,
        2
    );
}

impl DevStatusAnsPayload {
    /// Battery level, 0 for external power and 255 if unknown.
    pub fn set_battery(&mut self, battery: u8) -> &mut Self {
        self.0[0] = battery;
        self
    }

    /// Sets the margin, which must be in `-32..=31`.
    pub fn set_margin(&mut self, margin: i8) -> Result<&mut Self, Error> {
        if !(-32..=31).contains(&margin) {
            return Err(Error::MarginOutOfRange);
        }
        self.0[1] = (margin as u8) & 0x3f;
        Ok(self)
    }
}

impl NewChannelReqPayload {
    #[allow(missing_docs)]
    pub fn set_channel_index(&mut self, channel_index: u8) -> &mut Self {
        self.0[0] = channel_index;
        self
    }

    /// Uplink frequency in Hz; zero deletes the channel.
    pub fn set_frequency(&mut self, frequency: u32) -> &mut Self {
        self.0[1..4].copy_from_slice(Frequency::new_from_value(frequency).as_ref());
        self
    }

    #[allow(missing_docs)]
    pub fn set_data_rate_range(&mut self, min_data_rate: u8, max_data_rate: u8) -> &mut Self {
        self.0[4] = (max_data_rate << 4) | (min_data_rate & 0x0f);
        self
    }
}

impl NewChannelAnsPayload {
    create_ack_setter!(
        /// Accept the frequency.
        set_channel_frequency_ack,
        0
    );
    create_ack_setter!(
        /// Accept the data rate range.
        set_data_rate_range_ack,
        1
    );
}

impl RXTimingSetupReqPayload {
    /// RX1 delay in seconds, at most 15; 0 means 1.
    pub fn set_delay(&mut self, delay: u8) -> Result<&mut Self, Error> {
        if delay > 0x0f {
            return Err(Error::DelayOutOfRange);
        }
        self.0[0] = delay;
        Ok(self)
    }
}

impl DlChannelReqPayload {
    #[allow(missing_docs)]
    pub fn set_channel_index(&mut self, channel_index: u8) -> &mut Self {
        self.0[0] = channel_index;
        self
    }

    /// RX1 frequency in Hz.
    pub fn set_frequency(&mut self, frequency: u32) -> &mut Self {
        self.0[1..4].copy_from_slice(Frequency::new_from_value(frequency).as_ref());
        self
    }
}

impl DlChannelAnsPayload {
    create_ack_setter!(
        /// Accept the frequency.
        set_channel_frequency_ack,
        0
    );
    create_ack_setter!(
        /// The uplink channel exists.
        set_uplink_frequency_exists_ack,
        1
    );
}

/// Serializes `cmds` into `out`, returning the number of bytes written.
pub fn build_mac_commands<T: AsMut<[u8]>>(cmds: &[MacCommand], mut out: T) -> Result<usize, Error> {
    let res = out.as_mut();
    if mac_commands_len(cmds) > res.len() {
        return Err(Error::BufferTooSmall);
    }
    let mut i = 0;
    for mc in cmds {
        res[i] = mc.cid();
        let l = mc.payload_bytes().len();
        res[i + 1..i + l + 1].copy_from_slice(mc.payload_bytes());
        i += l + 1;
    }
    Ok(i)
}
