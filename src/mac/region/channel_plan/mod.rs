//! Logical channels, regulatory sub-bands and the duty-cycle clocks that tie them together.

pub mod channel;
pub mod sub_band;

use heapless::Vec;

use crate::device::timer::{Duration, Instant};
use crate::encoding::maccommands::ChannelMask;
use crate::mac::types::DR;
use channel::LogicalChannel;
use sub_band::SubBand;

use super::{Error, Region};

/// Channel slots per node, the range of a LinkADRReq channel mask.
pub const MAX_CHANNELS: usize = 16;
/// Sub-bands a node can track.
pub const MAX_SUB_BANDS: usize = 8;

/// Owns the channels and sub-bands of one node and decides when it may transmit.
#[derive(Debug, Clone)]
pub struct ChannelManager {
    channels: [Option<LogicalChannel>; MAX_CHANNELS],
    sub_bands: Vec<SubBand, MAX_SUB_BANDS>,
    last_tx_start: Instant,
    last_tx_duration: Duration,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    /// An empty plan without channels or sub-bands.
    pub fn new() -> Self {
        Self {
            channels: [None; MAX_CHANNELS],
            sub_bands: Vec::new(),
            last_tx_start: Instant::ZERO,
            last_tx_duration: Duration::ZERO,
        }
    }

    /// The default plan of region `R`: its sub-bands and mandatory channels.
    pub fn from_region<R: Region>() -> Self {
        let mut manager = Self::new();
        for sub_band in R::sub_bands() {
            manager.add_sub_band(sub_band.clone());
        }
        for index in 0..R::default_channels() {
            let (min, max) = R::mandatory_ul_data_rate_range(index);
            manager.set_channel(index, LogicalChannel::new(R::mandatory_frequency(index), min, max));
        }
        manager
    }

    /// Register a sub-band. Panics when the table is full or the duty cycle is outside `(0, 1]`.
    pub fn add_sub_band(&mut self, sub_band: SubBand) {
        assert!(
            sub_band.duty_cycle() > 0.0 && sub_band.duty_cycle() <= 1.0,
            "sub-band duty cycle must be in (0, 1]"
        );
        if self.sub_bands.push(sub_band).is_err() {
            panic!("too many sub-bands");
        }
    }

    #[allow(missing_docs)]
    pub fn sub_bands(&self) -> &[SubBand] {
        &self.sub_bands
    }

    /// Sub-band containing `frequency`, if any.
    pub fn sub_band_for_frequency(&self, frequency: u32) -> Option<&SubBand> {
        self.sub_bands.iter().find(|sub_band| sub_band.belongs_to(frequency))
    }

    fn sub_band_for_frequency_mut(&mut self, frequency: u32) -> &mut SubBand {
        match self.sub_bands.iter_mut().find(|sub_band| sub_band.belongs_to(frequency)) {
            Some(sub_band) => sub_band,
            None => panic!("frequency {} Hz is not inside any sub-band", frequency),
        }
    }

    fn required_sub_band(&self, frequency: u32) -> &SubBand {
        match self.sub_band_for_frequency(frequency) {
            Some(sub_band) => sub_band,
            None => panic!("frequency {} Hz is not inside any sub-band", frequency),
        }
    }

    /// Can a channel be placed on `frequency`?
    pub fn is_frequency_valid(&self, frequency: u32) -> bool {
        self.sub_band_for_frequency(frequency).is_some()
    }

    /// Add a channel at the first free index.
    pub fn add_channel(&mut self, channel: LogicalChannel) -> Result<usize, Error> {
        let index = self.channels.iter().position(Option::is_none).ok_or(Error::InvalidChannelIndex)?;
        self.set_channel(index, channel);
        Ok(index)
    }

    /// Create or replace the channel at `index`. Panics when the index is out of range or
    /// the frequency lies outside every sub-band.
    pub fn set_channel(&mut self, index: usize, channel: LogicalChannel) {
        self.required_sub_band(channel.frequency());
        self.channels[index] = Some(channel);
    }

    /// Remove the channel at `index`.
    pub fn remove_channel(&mut self, index: usize) -> Option<LogicalChannel> {
        self.channels.get_mut(index).and_then(Option::take)
    }

    /// Channel at `index`, if defined.
    pub fn channel(&self, index: usize) -> Option<&LogicalChannel> {
        self.channels.get(index).and_then(Option::as_ref)
    }

    #[allow(missing_docs)]
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut LogicalChannel> {
        self.channels.get_mut(index).and_then(Option::as_mut)
    }

    /// Defined channels with their indices.
    pub fn channels(&self) -> impl Iterator<Item = (usize, &LogicalChannel)> {
        self.channels.iter().enumerate().filter_map(|(index, c)| c.as_ref().map(|c| (index, c)))
    }

    /// Indices of the channels enabled for uplink.
    pub fn enabled_channels(&self) -> Vec<u8, MAX_CHANNELS> {
        self.channels()
            .filter(|(_, c)| c.is_enabled_for_uplink())
            .map(|(index, _)| index as u8)
            .collect()
    }

    /// Allow uplinks on the channel at `index`.
    pub fn enable_channel(&mut self, index: usize) -> Result<(), Error> {
        self.channel_mut(index).map(LogicalChannel::enable_for_uplink).ok_or(Error::InvalidChannelIndex)
    }

    /// Stop using the channel at `index` for uplinks.
    pub fn disable_channel(&mut self, index: usize) -> Result<(), Error> {
        self.channel_mut(index).map(LogicalChannel::disable_for_uplink).ok_or(Error::InvalidChannelIndex)
    }

    /// Time until `channel`'s sub-band allows a new transmission.
    ///
    /// Panics when the channel frequency lies outside every sub-band.
    pub fn get_waiting_time(&self, now: Instant, channel: &LogicalChannel) -> Duration {
        self.get_waiting_time_for_frequency(now, channel.frequency())
    }

    /// Same as [`Self::get_waiting_time`] for a bare frequency.
    pub fn get_waiting_time_for_frequency(&self, now: Instant, frequency: u32) -> Duration {
        self.required_sub_band(frequency).waiting_time(now)
    }

    /// Time until the device-wide airtime budget allows a new transmission;
    /// [`Duration::MAX`] when the budget is zero.
    pub fn get_aggregated_waiting_time(&self, now: Instant, aggregated_duty_cycle: f64) -> Duration {
        if aggregated_duty_cycle <= 0.0 {
            return Duration::MAX;
        }
        let next = self.last_tx_start + self.last_tx_duration.div_fraction(aggregated_duty_cycle);
        next.saturating_duration_since(now)
    }

    /// Reserve airtime for a transmission of `duration` on `channel` starting at `now`.
    pub fn add_event(&mut self, now: Instant, duration: Duration, channel: &LogicalChannel) {
        self.add_event_for_frequency(now, duration, channel.frequency());
    }

    /// Same as [`Self::add_event`] for a bare frequency.
    pub fn add_event_for_frequency(&mut self, now: Instant, duration: Duration, frequency: u32) {
        self.last_tx_start = now;
        self.last_tx_duration = duration;
        let sub_band = self.sub_band_for_frequency_mut(frequency);
        sub_band.register_transmission(now, duration);
        trace!("sub-band {} busy until {}", sub_band.first_frequency(), sub_band.next_transmission_time().as_micros());
    }

    /// Highest power allowed on `channel`.
    pub fn get_tx_power_for_channel(&self, channel: &LogicalChannel) -> i8 {
        self.required_sub_band(channel.frequency()).max_tx_power()
    }

    /// Resolve a LinkADRReq channel mask into per-index enable flags without applying it.
    pub fn handle_channel_mask(&self, channel_mask: &ChannelMask, channel_mask_ctrl: u8) -> Result<[bool; MAX_CHANNELS], Error> {
        let mut statuses = [false; MAX_CHANNELS];
        match channel_mask_ctrl {
            0 => {
                for (index, enabled) in channel_mask.statuses().into_iter().enumerate() {
                    if enabled {
                        if self.channel(index).is_none() {
                            return Err(Error::InvalidChannelIndex);
                        }
                        statuses[index] = true;
                    }
                }
            }
            6 => {
                for (index, _) in self.channels() {
                    statuses[index] = true;
                }
            }
            _ => return Err(Error::InvalidChannelMaskCtrl),
        }
        if statuses.iter().any(|enabled| *enabled) {
            Ok(statuses)
        } else {
            Err(Error::InvalidChannelIndex)
        }
    }

    /// Enable exactly the channels flagged in `statuses`.
    pub fn set_channel_mask(&mut self, statuses: &[bool; MAX_CHANNELS]) {
        for (slot, enabled) in self.channels.iter_mut().zip(statuses.iter()) {
            if let Some(channel) = slot {
                if *enabled {
                    channel.enable_for_uplink();
                } else {
                    channel.disable_for_uplink();
                }
            }
        }
    }

    /// Does any channel flagged in `statuses` support `dr`?
    pub fn mask_supports_data_rate(&self, statuses: &[bool; MAX_CHANNELS], dr: DR) -> bool {
        self.channels().any(|(index, c)| statuses[index] && c.supports_data_rate(dr))
    }
}
