// Copyright (c) 2018,2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// author: Ivaylo Petrov <ivajloip@gmail.com>

//! MAC commands carried in FOpts or in an FPort 0 payload.
//!
//! Every command is a CID byte followed by a payload of fixed length. The same CID is
//! used by a request and its answer, so parsing needs to know the direction.

use super::Error;

macro_rules! mac_cmds {
    (
        $(
            $(#[$outer:meta])*
            struct $type:ident[cmd=$name:ident, cid=$cid:expr, uplink=$uplink:expr, size=$size:expr]
        )*
    ) => {
        $(
            $(#[$outer])*
            #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
            #[cfg_attr(feature = "defmt", derive(defmt::Format))]
            pub struct $type(pub(crate) [u8; $size]);

            impl $type {
                /// Creates a new instance of the mac command if there is enough data.
                #[allow(unused_comparisons)]
                pub fn new(data: &[u8]) -> Result<$type, Error> {
                    if data.len() < $size {
                        Err(Error::IncorrectSizeForMacCommand)
                    } else {
                        let mut payload = [0u8; $size];
                        payload.copy_from_slice(&data[..$size]);
                        Ok($type(payload))
                    }
                }

                /// Command identifier.
                pub const fn cid() -> u8 {
                    $cid
                }

                /// Sent by end device or sent by network server.
                pub const fn uplink() -> bool {
                    $uplink
                }

                /// length of the payload of the mac command.
                pub const fn len() -> usize {
                    $size
                }

                /// Payload bytes without the CID.
                pub fn bytes(&self) -> &[u8] {
                    &self.0
                }
            }

            impl From<$type> for MacCommand {
                fn from(payload: $type) -> Self {
                    MacCommand::$name(payload)
                }
            }
        )*

        /// A parsed or to-be-serialized MAC command of either direction.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[allow(missing_docs)]
        pub enum MacCommand {
            $( $name($type), )*
        }

        impl MacCommand {
            /// Command identifier.
            pub fn cid(&self) -> u8 {
                match self {
                    $( MacCommand::$name(_) => $cid, )*
                }
            }

            /// Sent by end device or sent by network server.
            pub fn uplink(&self) -> bool {
                match self {
                    $( MacCommand::$name(_) => $uplink, )*
                }
            }

            /// Payload bytes without the CID.
            pub fn payload_bytes(&self) -> &[u8] {
                match self {
                    $( MacCommand::$name(payload) => &payload.0, )*
                }
            }

            /// Serialized length including the CID.
            pub fn len(&self) -> usize {
                self.payload_bytes().len() + 1
            }
        }

        fn parse_one_mac_cmd(data: &[u8], uplink: bool) -> Result<(usize, MacCommand), Error> {
            match (data[0], uplink) {
                $(
                    ($cid, $uplink) => Ok((1 + $size, MacCommand::$name($type::new(&data[1..])?))),
                )*
                _ => Err(Error::UnknownMacCommand),
            }
        }
    }
}

mac_cmds! {
    /// LinkCheckReq: the device asks for link quality.
    struct LinkCheckReqPayload[cmd=LinkCheckReq, cid=0x02, uplink=true, size=0]
    /// LinkCheckAns: demodulation margin and number of gateways that heard the request.
    struct LinkCheckAnsPayload[cmd=LinkCheckAns, cid=0x02, uplink=false, size=2]
    /// LinkADRReq: data rate, power, channel mask and repetitions.
    struct LinkADRReqPayload[cmd=LinkADRReq, cid=0x03, uplink=false, size=4]
    /// LinkADRAns: which parts of LinkADRReq were accepted.
    struct LinkADRAnsPayload[cmd=LinkADRAns, cid=0x03, uplink=true, size=1]
    /// DutyCycleReq: aggregated duty cycle limit.
    struct DutyCycleReqPayload[cmd=DutyCycleReq, cid=0x04, uplink=false, size=1]
    /// DutyCycleAns.
    struct DutyCycleAnsPayload[cmd=DutyCycleAns, cid=0x04, uplink=true, size=0]
    /// RXParamSetupReq: RX1 offset, RX2 data rate and RX2 frequency.
    struct RXParamSetupReqPayload[cmd=RXParamSetupReq, cid=0x05, uplink=false, size=4]
    /// RXParamSetupAns.
    struct RXParamSetupAnsPayload[cmd=RXParamSetupAns, cid=0x05, uplink=true, size=1]
    /// DevStatusReq.
    struct DevStatusReqPayload[cmd=DevStatusReq, cid=0x06, uplink=false, size=0]
    /// DevStatusAns: battery level and demodulation margin.
    struct DevStatusAnsPayload[cmd=DevStatusAns, cid=0x06, uplink=true, size=2]
    /// NewChannelReq: create, replace or delete a channel.
    struct NewChannelReqPayload[cmd=NewChannelReq, cid=0x07, uplink=false, size=5]
    /// NewChannelAns.
    struct NewChannelAnsPayload[cmd=NewChannelAns, cid=0x07, uplink=true, size=1]
    /// RXTimingSetupReq: delay of the first receive window.
    struct RXTimingSetupReqPayload[cmd=RXTimingSetupReq, cid=0x08, uplink=false, size=1]
    /// RXTimingSetupAns.
    struct RXTimingSetupAnsPayload[cmd=RXTimingSetupAns, cid=0x08, uplink=true, size=0]
    /// TXParamSetupReq: dwell time and maximum EIRP.
    struct TXParamSetupReqPayload[cmd=TXParamSetupReq, cid=0x09, uplink=false, size=1]
    /// TXParamSetupAns.
    struct TXParamSetupAnsPayload[cmd=TXParamSetupAns, cid=0x09, uplink=true, size=0]
    /// DlChannelReq: move the RX1 frequency of a channel.
    struct DlChannelReqPayload[cmd=DlChannelReq, cid=0x0A, uplink=false, size=4]
    /// DlChannelAns.
    struct DlChannelAnsPayload[cmd=DlChannelAns, cid=0x0A, uplink=true, size=1]
}

macro_rules! create_ack_fn {
    (
        $(#[$outer:meta])*
        $fn_name:ident, $offset:expr
    ) => (
        $(#[$outer])*
        pub fn $fn_name(&self) -> bool {
            self.0[0] & (0x01 << $offset) != 0
        }
    )
}

macro_rules! create_value_reader_fn {
    (
        $(#[$outer:meta])*
        $fn_name:ident, $index:expr
    ) => (
        $(#[$outer])*
        pub fn $fn_name(&self) -> u8 {
            self.0[$index]
        }
    )
}

impl LinkCheckAnsPayload {
    create_value_reader_fn!(
        /// Demodulation margin in dB of the LinkCheckReq.
        margin,
        0
    );
    create_value_reader_fn!(
        /// Number of gateways that received the LinkCheckReq.
        gateway_count,
        1
    );
}

impl LinkADRReqPayload {
    /// Requested data rate index.
    pub fn data_rate(&self) -> u8 {
        self.0[0] >> 4
    }

    /// Requested TXPower index.
    pub fn tx_power(&self) -> u8 {
        self.0[0] & 0x0f
    }

    /// Channels the request applies to.
    pub fn channel_mask(&self) -> ChannelMask {
        ChannelMask::new_from_raw(&self.0[1..3])
    }

    /// ChMaskCntl and NbTrans.
    pub fn redundancy(&self) -> Redundancy {
        Redundancy(self.0[3])
    }
}

impl LinkADRAnsPayload {
    create_ack_fn!(
        /// Was the channel mask accepted?
        channel_mask_ack,
        0
    );
    create_ack_fn!(
        /// Was the data rate accepted?
        data_rate_ack,
        1
    );
    create_ack_fn!(
        /// Was the power accepted?
        tx_power_ack,
        2
    );

    /// Were all three parts accepted?
    pub fn ack(&self) -> bool {
        self.0[0] & 0x07 == 0x07
    }
}

impl DutyCycleReqPayload {
    /// The raw MaxDCycle byte.
    pub fn max_duty_cycle_raw(&self) -> u8 {
        self.0[0]
    }

    /// Aggregated duty cycle as a fraction: `1 / 2^MaxDCycle`, with 255 meaning silence.
    pub fn max_duty_cycle(&self) -> f64 {
        match self.0[0] {
            255 => 0.0,
            raw => 1.0 / (1u32 << (raw & 0x0f)) as f64,
        }
    }
}

impl RXParamSetupReqPayload {
    /// RX1 data rate offset and RX2 data rate.
    pub fn dl_settings(&self) -> DLSettings {
        DLSettings(self.0[0])
    }

    /// RX2 frequency.
    pub fn frequency(&self) -> Frequency {
        Frequency::new_from_raw(&self.0[1..4])
    }
}

impl RXParamSetupAnsPayload {
    create_ack_fn!(
        /// Is the RX2 frequency usable?
        channel_ack,
        0
    );
    create_ack_fn!(
        /// Is the RX2 data rate known?
        rx2_data_rate_ack,
        1
    );
    create_ack_fn!(
        /// Is the RX1 offset in range?
        rx1_dr_offset_ack,
        2
    );

    /// Were all three parts accepted?
    pub fn ack(&self) -> bool {
        self.0[0] & 0x07 == 0x07
    }
}

impl DevStatusAnsPayload {
    create_value_reader_fn!(
        /// 0 external power, 1..=254 battery level, 255 unknown.
        battery,
        0
    );

    /// Demodulation margin of the last DevStatusReq, a 6 bit signed value.
    pub fn margin(&self) -> i8 {
        ((self.0[1] << 2) as i8) >> 2
    }
}

impl NewChannelReqPayload {
    create_value_reader_fn!(
        /// Index of the channel to create, replace or delete.
        channel_index,
        0
    );

    /// Uplink frequency; zero deletes the channel.
    pub fn frequency(&self) -> Frequency {
        Frequency::new_from_raw(&self.0[1..4])
    }

    /// Data rates the channel may use.
    pub fn data_rate_range(&self) -> DataRateRange {
        DataRateRange(self.0[4])
    }
}

impl NewChannelAnsPayload {
    create_ack_fn!(
        /// Can the device use the frequency?
        channel_frequency_ack,
        0
    );
    create_ack_fn!(
        /// Is the data rate range valid?
        data_rate_range_ack,
        1
    );

    /// Was the channel set up?
    pub fn ack(&self) -> bool {
        self.0[0] & 0x03 == 0x03
    }
}

impl RXTimingSetupReqPayload {
    /// Delay of RX1 in seconds, 0 meaning 1.
    pub fn delay(&self) -> u8 {
        self.0[0] & 0x0f
    }
}

impl TXParamSetupReqPayload {
    /// Downlink dwell time limited to 400 ms.
    pub fn downlink_dwell_time(&self) -> bool {
        self.0[0] & (1 << 5) != 0
    }

    /// Uplink dwell time limited to 400 ms.
    pub fn uplink_dwell_time(&self) -> bool {
        self.0[0] & (1 << 4) != 0
    }

    /// MaxEIRP index.
    pub fn max_eirp(&self) -> u8 {
        self.0[0] & 0x0f
    }
}

impl DlChannelReqPayload {
    create_value_reader_fn!(
        /// Index of the uplink channel whose RX1 frequency moves.
        channel_index,
        0
    );

    /// New RX1 frequency.
    pub fn frequency(&self) -> Frequency {
        Frequency::new_from_raw(&self.0[1..4])
    }
}

impl DlChannelAnsPayload {
    create_ack_fn!(
        /// Can the device use the frequency?
        channel_frequency_ack,
        0
    );
    create_ack_fn!(
        /// Does the uplink channel exist?
        uplink_frequency_exists_ack,
        1
    );

    /// Was the RX1 frequency moved?
    pub fn ack(&self) -> bool {
        self.0[0] & 0x03 == 0x03
    }
}

/// Channel enable bits of a LinkADRReq.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask([u8; 2]);

impl ChannelMask {
    /// Constructs a new ChannelMask from the provided data, without verifying if they are
    /// admissible.
    ///
    /// Improper use of this method could lead to panic during runtime!
    pub fn new_from_raw(data: &[u8]) -> Self {
        ChannelMask([data[0], data[1]])
    }

    fn channel_enabled(&self, index: usize) -> bool {
        self.0[index >> 3] & (1 << (index & 0x07)) != 0
    }

    /// Verifies if a given channel is enabled, `None` for indices past 15.
    pub fn is_enabled(&self, index: usize) -> Option<bool> {
        (index < 16).then(|| self.channel_enabled(index))
    }

    /// Provides information for each of the 16 channels if they are enabled.
    pub fn statuses(&self) -> [bool; 16] {
        let mut res = [false; 16];
        for (i, c) in res.iter_mut().enumerate() {
            *c = self.channel_enabled(i);
        }
        res
    }
}

impl From<[u8; 2]> for ChannelMask {
    fn from(v: [u8; 2]) -> Self {
        ChannelMask(v)
    }
}

impl From<u16> for ChannelMask {
    fn from(v: u16) -> Self {
        ChannelMask(v.to_le_bytes())
    }
}

impl AsRef<[u8]> for ChannelMask {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// A frequency on the wire: 3 bytes little endian in units of 100 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frequency([u8; 3]);

impl Frequency {
    /// Constructs a new Frequency from the provided data, without verifying if they are
    /// admissible.
    ///
    /// Improper use of this method could lead to panic during runtime!
    pub fn new_from_raw(data: &[u8]) -> Self {
        Self([data[0], data[1], data[2]])
    }

    /// Encode a frequency given in Hz; sub-100 Hz digits are dropped.
    pub fn new_from_value(value: u32) -> Self {
        let data = (value / 100).to_le_bytes();
        Self([data[0], data[1], data[2]])
    }

    /// Provides the decimal value in Hz of the frequency.
    pub fn value(&self) -> u32 {
        ((u32::from(self.0[2]) << 16) + (u32::from(self.0[1]) << 8) + u32::from(self.0[0])) * 100
    }
}

impl AsRef<[u8]> for Frequency {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// Redundancy byte of a LinkADRReq.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Redundancy(pub(crate) u8);

impl Redundancy {
    /// How the channel mask is to be interpreted.
    pub fn channel_mask_control(&self) -> u8 {
        (self.0 >> 4) & 0x07
    }

    /// NbTrans; 0 is read as 1.
    pub fn number_of_transmissions(&self) -> u8 {
        self.0 & 0x0f
    }
}

/// DLSettings byte of a RXParamSetupReq.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DLSettings(pub(crate) u8);

impl DLSettings {
    /// Offset between the uplink and the RX1 data rate.
    pub fn rx1_dr_offset(&self) -> u8 {
        (self.0 >> 4) & 0x07
    }

    /// Data rate of the RX2 window.
    pub fn rx2_data_rate(&self) -> u8 {
        self.0 & 0x0f
    }
}

/// DrRange byte of a NewChannelReq.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataRateRange(pub(crate) u8);

impl DataRateRange {
    /// Highest data rate allowed on the channel.
    pub fn max_data_rate(&self) -> u8 {
        self.0 >> 4
    }

    /// Lowest data rate allowed on the channel.
    pub fn min_data_rate(&self) -> u8 {
        self.0 & 0x0f
    }
}

/// Calculates the len in bytes of a sequence of mac commands, including the CIDs.
pub fn mac_commands_len(cmds: &[MacCommand]) -> usize {
    cmds.iter().map(MacCommand::len).sum()
}

/// Parses bytes to mac commands if possible.
///
/// The iterator yields an error and stops if a command is unknown or truncated.
pub fn parse_mac_commands(data: &[u8], uplink: bool) -> MacCommandIterator<'_> {
    MacCommandIterator { data, index: 0, uplink }
}

/// Implementation of iterator for mac commands.
pub struct MacCommandIterator<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) index: usize,
    pub(crate) uplink: bool,
}

impl Iterator for MacCommandIterator<'_> {
    type Item = Result<MacCommand, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.data.len() {
            return None;
        }
        match parse_one_mac_cmd(&self.data[self.index..], self.uplink) {
            Ok((len, cmd)) => {
                self.index += len;
                Some(Ok(cmd))
            }
            Err(e) => {
                self.index = self.data.len();
                Some(Err(e))
            }
        }
    }
}
