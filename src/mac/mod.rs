//! LoRaWAN MAC roles sharing one channel manager: the class A end device and the gateway.

pub mod gateway;
pub mod region;
pub(crate) mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

use core::cmp::{max, min};
use core::marker::PhantomData;

use heapless::Vec;

pub use self::region::Region;
use self::region::channel_plan::channel::LogicalChannel;
use self::region::channel_plan::{ChannelManager, MAX_CHANNELS};
use self::scheduler::class_a::WindowTimers;
use crate::device::radio::types::{RfConfig, RxQuality, TxConfig};
use crate::device::radio::Radio;
use crate::device::radio_buffer::RadioBuffer;
use crate::device::rng::shuffle;
use crate::device::timer::{Duration, EventId, Instant, Timer};
use crate::device::Device;
use crate::encoding::creator::DataPayloadCreator;
use crate::encoding::maccommands::*;
use crate::encoding::parser::{DataFrame, DevAddr, FCtrl, MAX_FOPTS_LEN, MIN_DATA_FRAME_LEN};
use types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Error {
    /// A receive window is scheduled or open, or the last uplink is still on air.
    RxWindowsPending,
    /// The payload exceeds the maximum of the current data rate.
    PayloadTooLarge,
    /// The aggregated duty cycle does not allow a transmission yet.
    AggregatedDutyCycle,
    /// Every usable channel is blocked by its sub-band.
    NoValidChannelFound,
    /// The gateway radio is still sending the previous frame.
    TransmissionInProgress,
    FOptsFull,
    InvalidPayloadType,
}
impl<D> From<Error> for super::Error<D>
where
    D: Device,
{
    fn from(value: Error) -> Self {
        Self::Mac(value)
    }
}

/// Callbacks through which the physical layer and the timeline drive a MAC.
pub trait LorawanMac {
    /// Caller-supplied collaborators of this MAC.
    type Device: Device;

    /// A frame was demodulated.
    fn receive<T: Timer>(
        &mut self,
        timer: &mut T,
        frame: &[u8],
        quality: RxQuality,
    ) -> Result<(), crate::Error<Self::Device>>;

    /// A reception started but could not be completed.
    fn failed_reception<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<Self::Device>>;

    /// The frame handed to [`Radio::send`] left the antenna.
    fn tx_finished<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<Self::Device>>;

    /// A timer this MAC scheduled fired. Events whose handle was cancelled are ignored.
    fn handle_timer<T: Timer>(
        &mut self,
        timer: &mut T,
        id: EventId,
        event: MacTimer,
    ) -> Result<(), crate::Error<Self::Device>>;

    /// Channels and duty-cycle state.
    fn channel_manager(&self) -> &ChannelManager;

    /// Mutable access for configuring channels and sub-bands.
    fn channel_manager_mut(&mut self) -> &mut ChannelManager;

    /// The owned device.
    fn device(&mut self) -> &mut Self::Device;
}

/// Largest uplink: full FOpts, FPort and the biggest application payload of any region.
const MAX_UPLINK_LEN: usize = MIN_DATA_FRAME_LEN + MAX_FOPTS_LEN + 1 + MAX_APP_PAYLOAD;

/// Answers that stay queued until a downlink shows the network got them.
fn is_sticky(cmd: &MacCommand) -> bool {
    matches!(
        cmd,
        MacCommand::RXParamSetupAns(_) | MacCommand::RXTimingSetupAns(_) | MacCommand::DlChannelAns(_)
    )
}

/// Class A end device.
pub struct EndDeviceMac<R, D>
where
    R: Region,
    D: Device,
{
    pub(crate) device: D,
    region: PhantomData<R>,
    pub(crate) channel_manager: ChannelManager,
    pub(crate) configuration: Configuration,
    dev_addr: DevAddr,
    fcnt_up: u16,
    pub(crate) uplink_cmds: Vec<MacCommand, MAX_FOPTS_LEN>,
    ack_next: bool,
    adr_ack_cnt: u16,
    pub(crate) tx_context: Option<TxContext>,
    pub(crate) last_uplink: Option<(LogicalChannel, DR)>,
    pub(crate) timers: WindowTimers,
    pub(crate) deferred_close: Option<Window>,
    pub(crate) transmitting: bool,
    radio_buffer: RadioBuffer<MAX_UPLINK_LEN>,
}

impl<R, D> EndDeviceMac<R, D>
where
    R: Region,
    D: Device,
{
    /// A device using the default channel plan of `R`.
    pub fn new(device: D, dev_addr: DevAddr, configuration: Configuration) -> Self {
        Self::with_channel_manager(device, dev_addr, configuration, ChannelManager::from_region::<R>())
    }

    /// A device using a caller-built channel plan.
    pub fn with_channel_manager(
        device: D,
        dev_addr: DevAddr,
        configuration: Configuration,
        channel_manager: ChannelManager,
    ) -> Self {
        Self {
            device,
            region: PhantomData,
            channel_manager,
            configuration,
            dev_addr,
            fcnt_up: 0,
            uplink_cmds: Vec::new(),
            ack_next: false,
            adr_ack_cnt: 0,
            tx_context: None,
            last_uplink: None,
            timers: WindowTimers::default(),
            deferred_close: None,
            transmitting: false,
            radio_buffer: RadioBuffer::new(),
        }
    }

    #[allow(missing_docs)]
    pub fn dev_addr(&self) -> DevAddr {
        self.dev_addr
    }

    /// Frame counter of the next new uplink.
    pub fn fcnt_up(&self) -> u16 {
        self.fcnt_up
    }

    /// Settings currently in force, including those changed by MAC commands.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Uplinks sent since the last downlink, while ADR is enabled.
    pub fn adr_ack_cnt(&self) -> u16 {
        self.adr_ack_cnt
    }

    /// Answers and requests waiting for the next uplink.
    pub fn pending_mac_commands(&self) -> &[MacCommand] {
        &self.uplink_cmds
    }

    /// Is an exchange still open: uplink on air, windows scheduled or a reception running
    /// past its window?
    pub fn rx_windows_pending(&self) -> bool {
        self.transmitting || self.timers.windows_pending() || self.deferred_close.is_some()
    }

    /// Is an uplink waiting to be sent again?
    pub fn retransmission_pending(&self) -> bool {
        self.tx_context.is_some()
    }

    /// Current uplink data rate.
    pub fn tx_data_rate(&self) -> DR {
        self.configuration.tx_data_rate.unwrap_or(R::default_data_rate())
    }

    /// Configured transmit power in dBm, before the sub-band limit applies.
    pub fn tx_power(&self) -> i8 {
        self.configuration.tx_power.unwrap_or(R::default_tx_power())
    }

    pub(crate) fn rx1_data_rate_offset(&self) -> u8 {
        self.configuration.rx1_data_rate_offset.unwrap_or(R::default_rx1_data_rate_offset())
    }

    pub(crate) fn rx2_data_rate(&self) -> DR {
        self.configuration.rx2_data_rate.unwrap_or(R::default_rx2_data_rate())
    }

    pub(crate) fn rx2_frequency(&self) -> u32 {
        self.configuration.rx2_frequency.unwrap_or(R::default_rx2_frequency())
    }

    /// Queue a LinkCheckReq for the next uplink.
    pub fn request_link_check(&mut self) -> Result<(), crate::Error<D>> {
        self.uplink_cmds
            .push(LinkCheckReqPayload::default().into())
            .map_err(|_| Error::FOptsFull)?;
        debug!("link check requested");
        Ok(())
    }

    /// Send a new uplink.
    ///
    /// Refusals leave the MAC untouched apart from the matching [`MacEvent`]. A
    /// retransmission still pending for an earlier uplink is abandoned once the new one
    /// is on air.
    pub fn send<T: Timer>(
        &mut self,
        timer: &mut T,
        payload: &[u8],
        f_port: u8,
        confirmed: bool,
    ) -> Result<(), crate::Error<D>> {
        let now = timer.now();
        if self.rx_windows_pending() {
            debug!("send refused: receive windows pending");
            self.device.handle_event(MacEvent::RxWindowsPending);
            return Err(Error::RxWindowsPending.into());
        }
        if f_port == 0 && !payload.is_empty() {
            return Err(Error::InvalidPayloadType.into());
        }
        let data_rate = self.tx_data_rate();
        let max_payload = R::max_app_payload(data_rate)?;
        if payload.len() > max_payload {
            debug!("send refused: {} bytes exceed {} at {:?}", payload.len(), max_payload, data_rate);
            self.device.handle_event(MacEvent::PayloadTooLarge { len: payload.len(), max: max_payload });
            return Err(Error::PayloadTooLarge.into());
        }
        let wait = self.channel_manager.get_aggregated_waiting_time(now, self.configuration.aggregated_duty_cycle);
        if !wait.is_zero() {
            debug!("send refused: aggregated duty cycle, {} us to wait", wait.as_micros());
            self.device.handle_event(MacEvent::AggregatedDutyCycleBlocked { wait });
            return Err(Error::AggregatedDutyCycle.into());
        }
        let Some(channel) = self.select_channel(now, data_rate)? else {
            debug!("send refused: every channel blocked by duty cycle");
            self.device.handle_event(MacEvent::DutyCycleBlocked);
            return Err(Error::NoValidChannelFound.into());
        };

        let attempts = if confirmed {
            self.configuration.max_number_of_transmissions
        } else {
            self.configuration.number_of_transmissions
        };
        let ctx = TxContext {
            payload: Vec::from_slice(payload).map_err(|_| Error::PayloadTooLarge)?,
            f_port,
            fcnt: self.fcnt_up,
            confirmed,
            data_rate,
            attempts_left: max(attempts, 1),
            transmissions: 0,
            first_attempt: now,
        };
        let previous = self.tx_context.replace(ctx);
        if let Err(e) = self.transmit(timer, channel) {
            self.tx_context = previous;
            return Err(e);
        }
        self.fcnt_up = self.fcnt_up.wrapping_add(1);

        if let Some(ctx) = previous {
            self.timers.retransmit = None;
            info!("abandoning fcnt {} after {} transmissions", ctx.fcnt, ctx.transmissions);
            self.device.handle_event(MacEvent::RetransmissionAbandoned { transmissions: ctx.transmissions });
        }

        if self.configuration.adr_enabled {
            self.adr_ack_cnt = self.adr_ack_cnt.saturating_add(1);
            self.adr_backoff();
        }
        Ok(())
    }

    /// Pick a random enabled channel supporting `data_rate` whose sub-band is free.
    fn select_channel(&mut self, now: Instant, data_rate: DR) -> Result<Option<usize>, crate::Error<D>> {
        let mut candidates: Vec<u8, MAX_CHANNELS> = self
            .channel_manager
            .enabled_channels()
            .into_iter()
            .filter(|index| {
                self.channel_manager
                    .channel(*index as usize)
                    .is_some_and(|channel| channel.supports_data_rate(data_rate))
            })
            .collect();
        shuffle(&mut candidates, self.device.rng()).map_err(crate::device::Error::Rng)?;
        for index in candidates {
            let Some(channel) = self.channel_manager.channel(index as usize) else {
                continue;
            };
            let wait = self.channel_manager.get_waiting_time(now, channel);
            if wait.is_zero() {
                return Ok(Some(index as usize));
            }
            trace!("channel {} blocked for {} us", index, wait.as_micros());
        }
        Ok(None)
    }

    /// Earliest time from `now` at which some channel supporting `data_rate` is legal,
    /// the aggregated duty cycle included.
    pub(crate) fn earliest_transmission_delay(&self, now: Instant, data_rate: DR) -> Duration {
        let per_channel = self
            .channel_manager
            .channels()
            .filter(|(_, channel)| channel.is_enabled_for_uplink() && channel.supports_data_rate(data_rate))
            .map(|(_, channel)| self.channel_manager.get_waiting_time(now, channel))
            .min()
            .unwrap_or(Duration::MAX);
        let aggregated =
            self.channel_manager.get_aggregated_waiting_time(now, self.configuration.aggregated_duty_cycle);
        max(per_channel, aggregated)
    }

    /// Put the uplink held in the retransmission context on air on channel `index`.
    ///
    /// Nothing but the frame buffer changes unless the radio accepted the frame.
    pub(crate) fn transmit<T: Timer>(&mut self, timer: &mut T, index: usize) -> Result<(), crate::Error<D>> {
        let now = timer.now();
        let channel = *self.channel_manager.channel(index).ok_or(region::Error::InvalidChannelIndex)?;
        let Some((fcnt, data_rate, is_new)) =
            self.tx_context.as_ref().map(|ctx| (ctx.fcnt, ctx.data_rate, ctx.transmissions == 0))
        else {
            return Ok(());
        };

        let sent_cmds = self.prepare_buffer()?;
        let tx_config = self.create_tx_config(&channel, data_rate)?;
        trace!("tx config {:?}", tx_config);
        let time_on_air = self.device.radio().time_on_air(&tx_config, self.radio_buffer.len());
        self.device
            .radio()
            .send(&tx_config, self.radio_buffer.as_ref())
            .map_err(crate::device::Error::Radio)?;
        self.channel_manager.add_event(now, time_on_air, &channel);
        self.transmitting = true;
        self.uplink_cmds_sent(sent_cmds);
        self.last_uplink = Some((channel, data_rate));

        let transmission = match self.tx_context.as_mut() {
            Some(ctx) => {
                ctx.transmissions += 1;
                ctx.attempts_left = ctx.attempts_left.saturating_sub(1);
                ctx.transmissions
            }
            None => 1,
        };
        if is_new {
            info!("fcnt {} sent on channel {} at {:?}", fcnt, index, data_rate);
            self.device.handle_event(MacEvent::SentNewPacket {
                fcnt,
                channel: index as u8,
                data_rate,
                len: self.radio_buffer.len(),
            });
        } else {
            info!("fcnt {} transmission {} on channel {}", fcnt, transmission, index);
            self.device.handle_event(MacEvent::Retransmitted { fcnt, channel: index as u8, transmission });
        }
        Ok(())
    }

    /// Encode the uplink of the retransmission context. Returns how many queued commands
    /// went into FOpts.
    fn prepare_buffer(&mut self) -> Result<usize, crate::Error<D>> {
        let Some(ctx) = self.tx_context.as_ref() else {
            return Ok(0);
        };
        let mut fctrl = FCtrl::new(0x0, true);
        if self.configuration.adr_enabled {
            fctrl.set_adr(true);
            fctrl.set_adr_ack_req(self.adr_ack_cnt >= R::default_adr_ack_limit() as u16);
        }
        fctrl.set_ack(self.ack_next);

        let mut fopts: Vec<MacCommand, MAX_FOPTS_LEN> = Vec::new();
        let mut fopts_len = 0;
        for cmd in &self.uplink_cmds {
            if fopts_len + cmd.len() > MAX_FOPTS_LEN {
                break;
            }
            fopts_len += cmd.len();
            fopts.push(*cmd).map_err(|_| Error::FOptsFull)?;
        }

        let mut phy = DataPayloadCreator::new();
        phy.set_uplink(true)
            .set_confirmed(ctx.confirmed)
            .set_dev_addr(self.dev_addr)
            .set_fctrl(&fctrl)
            .set_fcnt(ctx.fcnt);
        if !ctx.payload.is_empty() {
            phy.set_f_port(ctx.f_port);
        }
        phy.build(&ctx.payload, &fopts, &mut self.radio_buffer)?;
        Ok(fopts.len())
    }

    /// The first `sent` queued commands are on air: drop them unless they are sticky.
    fn uplink_cmds_sent(&mut self, sent: usize) {
        let mut index = 0;
        self.uplink_cmds.retain(|cmd| {
            index += 1;
            index > sent || is_sticky(cmd)
        });
        self.ack_next = false;
    }

    fn create_tx_config(&self, channel: &LogicalChannel, data_rate: DR) -> Result<TxConfig, crate::Error<D>> {
        let data_rate = R::convert_data_rate(data_rate)?;
        let pw = min(self.tx_power(), self.channel_manager.get_tx_power_for_channel(channel));
        let low_data_rate_optimize = data_rate.requires_ldro();
        Ok(TxConfig {
            pw,
            rf: RfConfig { frequency: channel.frequency(), coding_rate: R::default_coding_rate(), data_rate },
            preamble_symbols: R::preamble_symbols(),
            implicit_header: false,
            crc_on: true,
            low_data_rate_optimize,
        })
    }

    fn adr_backoff(&mut self) {
        let limit = R::default_adr_ack_limit() as u16;
        let delay = R::default_adr_ack_delay() as u16;
        let cnt = self.adr_ack_cnt;
        if cnt == limit {
            debug!("no downlink for {} uplinks, requesting ADR acknowledgement", cnt);
        } else if cnt == limit + delay {
            self.set_tx_power(R::default_tx_power());
        } else if delay > 0 && cnt > limit && (cnt - limit) % delay == 0 {
            match self.tx_data_rate().lower() {
                Some(lower) => self.set_data_rate(lower),
                None => {
                    for index in 0..R::default_channels() {
                        if self.channel_manager.enable_channel(index).is_err() {
                            warn!("default channel {} missing", index);
                        }
                    }
                    self.configuration.number_of_transmissions = 1;
                }
            }
        }
    }

    fn set_data_rate(&mut self, data_rate: DR) {
        let from = self.tx_data_rate();
        self.configuration.tx_data_rate = Some(data_rate);
        if from != data_rate {
            info!("data rate {:?} -> {:?}", from, data_rate);
            self.device.handle_event(MacEvent::DataRateChanged { from, to: data_rate });
        }
    }

    fn set_tx_power(&mut self, tx_power: i8) {
        let from = self.tx_power();
        self.configuration.tx_power = Some(tx_power);
        if from != tx_power {
            info!("tx power {} -> {} dBm", from, tx_power);
            self.device.handle_event(MacEvent::TxPowerChanged { from, to: tx_power });
        }
    }

    /// Process a received frame. Returns `Some(ack)` if it was a downlink for this device.
    pub(crate) fn handle_downlink(&mut self, frame: &[u8], quality: RxQuality) -> Option<bool> {
        let frame = match DataFrame::parse(frame) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping undecodable frame: {:?}", e);
                return None;
            }
        };
        if frame.is_uplink() {
            trace!("ignoring uplink from {}", frame.fhdr().dev_addr.value());
            return None;
        }
        if frame.fhdr().dev_addr != self.dev_addr {
            trace!("ignoring downlink for {}", frame.fhdr().dev_addr.value());
            return None;
        }

        self.uplink_cmds.retain(|cmd| !is_sticky(cmd));
        self.adr_ack_cnt = 0;
        if frame.is_confirmed() {
            self.ack_next = true;
        }
        for cmd in frame.mac_commands() {
            match cmd {
                Ok(cmd) => self.handle_mac_command(cmd, quality),
                Err(e) => {
                    warn!("stopping at malformed MAC command: {:?}", e);
                    break;
                }
            }
        }
        let payload = match frame.f_port() {
            Some(0) => &[][..],
            _ => frame.frm_payload(),
        };
        self.device.handle_event(MacEvent::Received { f_port: frame.f_port(), payload, quality });
        Some(frame.fhdr().fctrl.ack())
    }

    fn handle_mac_command(&mut self, cmd: MacCommand, quality: RxQuality) {
        trace!("handling command {:?}", cmd);
        let answer: Option<MacCommand> = match cmd {
            MacCommand::LinkCheckAns(payload) => {
                info!("link check: margin {} dB, {} gateways", payload.margin(), payload.gateway_count());
                self.device.handle_link_check(payload.gateway_count(), payload.margin());
                self.device.handle_event(MacEvent::LinkCheck {
                    margin: payload.margin(),
                    gateway_count: payload.gateway_count(),
                });
                None
            }
            MacCommand::LinkADRReq(payload) => Some(self.handle_link_adr_req(&payload).into()),
            MacCommand::DutyCycleReq(payload) => {
                self.configuration.aggregated_duty_cycle = payload.max_duty_cycle();
                info!("aggregated duty cycle {}", self.configuration.aggregated_duty_cycle);
                Some(DutyCycleAnsPayload::default().into())
            }
            MacCommand::RXParamSetupReq(payload) => Some(self.handle_rx_param_setup_req(&payload).into()),
            MacCommand::DevStatusReq(_) => {
                let mut ans = DevStatusAnsPayload::default();
                ans.set_battery(self.battery_byte());
                // clamped to the 6 bit range, cannot fail
                if ans.set_margin(quality.snr().clamp(-32, 31)).is_err() {
                    warn!("margin {} out of range", quality.snr());
                }
                Some(ans.into())
            }
            MacCommand::NewChannelReq(payload) => Some(self.handle_new_channel_req(&payload).into()),
            MacCommand::RXTimingSetupReq(payload) => {
                let delay = match payload.delay() {
                    0 => 1,
                    delay => delay,
                };
                self.configuration.rx_delay = Some(delay);
                info!("RX1 delay {} s", delay);
                Some(RXTimingSetupAnsPayload::default().into())
            }
            MacCommand::DlChannelReq(payload) => Some(self.handle_dl_channel_req(&payload).into()),
            MacCommand::TXParamSetupReq(payload) => {
                if R::supports_tx_param_setup() {
                    debug!("max EIRP index {}", payload.max_eirp());
                    Some(TXParamSetupAnsPayload::default().into())
                } else {
                    debug!("TXParamSetupReq not supported in this region");
                    None
                }
            }
            _ => {
                warn!("ignoring uplink command {:?} in a downlink", cmd);
                None
            }
        };
        if let Some(answer) = answer {
            trace!("answer {:?}", answer);
            if self.uplink_cmds.push(answer).is_err() {
                warn!("answer queue full, dropping {:?}", answer);
            }
        }
    }

    fn battery_byte(&self) -> u8 {
        if self.device.externally_powered() {
            return 0;
        }
        match self.device.battery_level() {
            Some(level) => (level.clamp(0.0, 1.0) * 253.0) as u8 + 1,
            None => 255,
        }
    }

    fn handle_link_adr_req(&mut self, payload: &LinkADRReqPayload) -> LinkADRAnsPayload {
        let redundancy = payload.redundancy();
        let mask = self
            .channel_manager
            .handle_channel_mask(&payload.channel_mask(), redundancy.channel_mask_control());
        let data_rate = match payload.data_rate() {
            0x0f => Some(self.tx_data_rate()),
            raw => DR::try_from(raw)
                .ok()
                .filter(|dr| dr.in_range(R::ul_data_rate_range()) && R::convert_data_rate(*dr).is_ok()),
        };
        let data_rate_ok = match (&mask, data_rate) {
            (Ok(statuses), Some(dr)) => self.channel_manager.mask_supports_data_rate(statuses, dr),
            (Err(_), Some(dr)) => self.channel_manager.channels().any(|(_, c)| c.supports_data_rate(dr)),
            (_, None) => false,
        };
        let tx_power = match payload.tx_power() {
            0x0f => Some(self.tx_power()),
            raw => R::tx_power_dbm(raw).ok(),
        };

        let mut ans = LinkADRAnsPayload::default();
        ans.set_channel_mask_ack(mask.is_ok())
            .set_data_rate_ack(data_rate_ok)
            .set_tx_power_ack(tx_power.is_some());
        match (mask, data_rate, tx_power) {
            (Ok(statuses), Some(data_rate), Some(tx_power)) if data_rate_ok => {
                self.channel_manager.set_channel_mask(&statuses);
                self.set_data_rate(data_rate);
                self.set_tx_power(tx_power);
                self.configuration.number_of_transmissions = match redundancy.number_of_transmissions() {
                    0 => 1,
                    n => n,
                };
            }
            (mask, _, _) => {
                debug!(
                    "LinkADRReq rejected: mask {:?}, data rate {}, power {}",
                    mask.err(),
                    data_rate_ok,
                    tx_power.is_some()
                );
            }
        }
        ans
    }

    fn handle_rx_param_setup_req(&mut self, payload: &RXParamSetupReqPayload) -> RXParamSetupAnsPayload {
        let dl_settings = payload.dl_settings();
        let offset = dl_settings.rx1_dr_offset();
        let rx1_dr_offset_ack = offset <= 5;
        let rx2_data_rate =
            DR::try_from(dl_settings.rx2_data_rate()).ok().filter(|dr| R::convert_data_rate(*dr).is_ok());

        let mut ans = RXParamSetupAnsPayload::default();
        ans.set_rx1_dr_offset_ack(rx1_dr_offset_ack)
            .set_rx2_data_rate_ack(rx2_data_rate.is_some())
            .set_channel_ack(true);
        if let (true, Some(rx2_data_rate)) = (rx1_dr_offset_ack, rx2_data_rate) {
            self.configuration.rx1_data_rate_offset = Some(offset);
            self.configuration.rx2_data_rate = Some(rx2_data_rate);
            self.configuration.rx2_frequency = Some(payload.frequency().value());
            info!("RX1 offset {}, RX2 {:?} at {} Hz", offset, rx2_data_rate, payload.frequency().value());
        }
        ans
    }

    fn handle_new_channel_req(&mut self, payload: &NewChannelReqPayload) -> NewChannelAnsPayload {
        let index = payload.channel_index() as usize;
        let frequency = payload.frequency().value();
        let range = payload.data_rate_range();
        let (_, ul_max) = R::ul_data_rate_range();
        let data_rate_range = match (DR::try_from(range.min_data_rate()), DR::try_from(range.max_data_rate())) {
            (Ok(min_dr), Ok(max_dr)) if min_dr <= max_dr && max_dr <= ul_max => Some((min_dr, max_dr)),
            _ => None,
        };
        let channel_frequency_ack =
            index < MAX_CHANNELS && (frequency == 0 || self.channel_manager.is_frequency_valid(frequency));

        let mut ans = NewChannelAnsPayload::default();
        ans.set_data_rate_range_ack(data_rate_range.is_some()).set_channel_frequency_ack(channel_frequency_ack);
        if let (true, Some((min_dr, max_dr))) = (channel_frequency_ack, data_rate_range) {
            if frequency == 0 {
                self.channel_manager.remove_channel(index);
                info!("channel {} removed", index);
            } else {
                self.channel_manager.set_channel(index, LogicalChannel::new(frequency, min_dr, max_dr));
                info!("channel {} at {} Hz, {:?}..={:?}", index, frequency, min_dr, max_dr);
            }
        }
        ans
    }

    fn handle_dl_channel_req(&mut self, payload: &DlChannelReqPayload) -> DlChannelAnsPayload {
        let frequency = payload.frequency().value();
        let channel_frequency_ack = self.channel_manager.is_frequency_valid(frequency);
        let channel = self.channel_manager.channel_mut(payload.channel_index() as usize);
        let uplink_frequency_exists_ack = channel.is_some();
        if let (true, Some(channel)) = (channel_frequency_ack, channel) {
            channel.set_reply_frequency(frequency);
            info!("channel {} replies on {} Hz", payload.channel_index(), frequency);
        }
        let mut ans = DlChannelAnsPayload::default();
        ans.set_uplink_frequency_exists_ack(uplink_frequency_exists_ack)
            .set_channel_frequency_ack(channel_frequency_ack);
        ans
    }
}

impl<R, D> LorawanMac for EndDeviceMac<R, D>
where
    R: Region,
    D: Device,
{
    type Device = D;

    fn receive<T: Timer>(&mut self, timer: &mut T, frame: &[u8], quality: RxQuality) -> Result<(), crate::Error<D>> {
        match self.handle_downlink(frame, quality) {
            Some(ack) => self.downlink_received(timer, ack),
            None => self.finish_deferred_close(timer),
        }
    }

    fn failed_reception<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<D>> {
        debug!("reception failed");
        self.finish_deferred_close(timer)
    }

    fn tx_finished<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<D>> {
        self.open_exchange(timer)
    }

    fn handle_timer<T: Timer>(&mut self, timer: &mut T, id: EventId, event: MacTimer) -> Result<(), crate::Error<D>> {
        self.dispatch_timer(timer, id, event)
    }

    fn channel_manager(&self) -> &ChannelManager {
        &self.channel_manager
    }

    fn channel_manager_mut(&mut self) -> &mut ChannelManager {
        &mut self.channel_manager
    }

    fn device(&mut self) -> &mut D {
        &mut self.device
    }
}
