//! Properties used in LoRaWAN MAC processing.

use heapless::Vec;

use crate::device::radio::types::RxQuality;
use crate::device::timer::{Duration, Instant};

/// Largest application payload of any supported data rate.
pub const MAX_APP_PAYLOAD: usize = 242;

/// Offsets of the two receive windows from the end of an uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RxWindows {
    pub(crate) rx1_delay: Duration,
    pub(crate) rx2_delay: Duration,
}
impl RxWindows {
    pub(crate) fn get_open(&self, window: &Window) -> Duration {
        match window {
            Window::_1 => self.rx1_delay,
            Window::_2 => self.rx2_delay,
        }
    }
}

/// Basic send/receive properties, fixed at construction and then adjusted by MAC
/// commands. `None` means "the region default".
#[derive(Debug, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Configuration {
    /// Set the ADR bit and run the ADR acknowledgement backoff.
    pub adr_enabled: bool,
    /// Fraction of time the device may spend transmitting across all sub-bands.
    pub aggregated_duty_cycle: f64,
    /// Transmit power in dBm.
    pub tx_power: Option<i8>,
    /// Uplink data rate.
    pub tx_data_rate: Option<DR>,
    /// Offset between the uplink data rate and the RX1 data rate.
    pub rx1_data_rate_offset: Option<u8>,
    /// RX1 delay in seconds; RX2 opens one second later.
    pub rx_delay: Option<u8>,
    /// RX2 data rate.
    pub rx2_data_rate: Option<DR>,
    /// RX2 frequency in Hz.
    pub rx2_frequency: Option<u32>,
    /// Transmissions of each unconfirmed uplink (NbTrans).
    pub number_of_transmissions: u8,
    /// Upper bound on transmissions of a confirmed uplink, the first one included.
    pub max_number_of_transmissions: u8,
    /// Pause between an unanswered exchange and the next attempt.
    pub retransmit_timeout: Duration,
    /// Length of each receive window in symbols.
    pub rx_window_symbols: u16,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            adr_enabled: false,
            aggregated_duty_cycle: 1.0,
            tx_power: None,
            tx_data_rate: None,
            rx1_data_rate_offset: None,
            rx_delay: None,
            rx2_data_rate: None,
            rx2_frequency: None,
            number_of_transmissions: 1,
            max_number_of_transmissions: 8,
            retransmit_timeout: Duration::from_secs(5),
            rx_window_symbols: 8,
        }
    }
}

/// Bookkeeping for an uplink that may still be sent again.
#[derive(Debug, Clone)]
pub(crate) struct TxContext {
    pub(crate) payload: Vec<u8, MAX_APP_PAYLOAD>,
    pub(crate) f_port: u8,
    pub(crate) fcnt: u16,
    pub(crate) confirmed: bool,
    pub(crate) data_rate: DR,
    pub(crate) attempts_left: u8,
    pub(crate) transmissions: u8,
    pub(crate) first_attempt: Instant,
}

/// Regional data rate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
#[repr(u8)]
pub enum DR {
    _0 = 0,
    _1 = 1,
    _2 = 2,
    _3 = 3,
    _4 = 4,
    _5 = 5,
    _6 = 6,
    _7 = 7,
    _8 = 8,
    _9 = 9,
    _10 = 10,
    _11 = 11,
    _12 = 12,
    _13 = 13,
    _14 = 14,
    _15 = 15,
}

impl DR {
    /// Is this DR within range?
    pub fn in_range(&self, range: (DR, DR)) -> bool {
        (range.0 as u8 <= *self as u8) && (*self as u8 <= range.1 as u8)
    }

    /// The next slower data rate, `None` at DR0.
    pub fn lower(&self) -> Option<DR> {
        (*self as u8).checked_sub(1).and_then(|dr| DR::try_from(dr).ok())
    }
}

impl TryFrom<u8> for DR {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DR::_0),
            1 => Ok(DR::_1),
            2 => Ok(DR::_2),
            3 => Ok(DR::_3),
            4 => Ok(DR::_4),
            5 => Ok(DR::_5),
            6 => Ok(DR::_6),
            7 => Ok(DR::_7),
            8 => Ok(DR::_8),
            9 => Ok(DR::_9),
            10 => Ok(DR::_10),
            11 => Ok(DR::_11),
            12 => Ok(DR::_12),
            13 => Ok(DR::_13),
            14 => Ok(DR::_14),
            15 => Ok(DR::_15),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
/// Class A receive window.
pub enum Window {
    _1,
    _2,
}

/// Timers a MAC places on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum MacTimer {
    OpenRx1,
    CloseRx1,
    OpenRx2,
    CloseRx2,
    Retransmit,
}

/// State changes and refusals reported to [`Device::handle_event`](crate::device::Device::handle_event).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum MacEvent<'a> {
    /// A new uplink went on air.
    SentNewPacket { fcnt: u16, channel: u8, data_rate: DR, len: usize },
    /// An earlier uplink went on air again.
    Retransmitted { fcnt: u16, channel: u8, transmission: u8 },
    /// Send refused while a receive window is pending.
    RxWindowsPending,
    /// Send refused, the payload does not fit the current data rate.
    PayloadTooLarge { len: usize, max: usize },
    /// Send refused by the aggregated duty cycle.
    AggregatedDutyCycleBlocked { wait: Duration },
    /// Send refused, every enabled channel is waiting for its sub-band.
    DutyCycleBlocked,
    /// Downlink addressed to this device.
    Received { f_port: Option<u8>, payload: &'a [u8], quality: RxQuality },
    /// Uplink heard by a gateway.
    UplinkReceived { frame: &'a [u8], quality: RxQuality },
    /// Confirmed uplink acknowledged after this many transmissions.
    Acknowledged { transmissions: u8 },
    /// Confirmed uplink dropped without acknowledgement.
    MaxTransmissionsReached { transmissions: u8 },
    /// Confirmed uplink superseded by a new one before it was acknowledged.
    RetransmissionAbandoned { transmissions: u8 },
    /// LinkCheckAns received.
    LinkCheck { margin: u8, gateway_count: u8 },
    /// Uplink data rate changed.
    DataRateChanged { from: DR, to: DR },
    /// Transmit power changed.
    TxPowerChanged { from: i8, to: i8 },
}
