//! Class A receive windows and the retransmission procedure that follows them.
//!
//! After every uplink the device listens twice: RX1 on the reply frequency of the uplink
//! channel `rx_delay` after the end of transmission, RX2 on the fixed RX2 frequency one
//! second later. A window that is still demodulating a frame when it should close stays
//! open until the physical layer reports the outcome. The exchange concludes with the
//! first downlink for this device or when the last window closes empty.

use crate::device::radio::types::RadioState;
use crate::device::radio::Radio;
use crate::device::timer::{Duration, EventId, Timer};
use crate::device::Device;
use crate::mac::region::Region;
use crate::mac::types::{MacEvent, MacTimer, RxWindows, Window, DR};
use crate::mac::EndDeviceMac;

/// Handles of the timers an end device may have on the timeline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowTimers {
    pub(crate) open_rx1: Option<EventId>,
    pub(crate) close_rx1: Option<EventId>,
    pub(crate) open_rx2: Option<EventId>,
    pub(crate) close_rx2: Option<EventId>,
    pub(crate) retransmit: Option<EventId>,
}

impl WindowTimers {
    fn slot_mut(&mut self, timer: MacTimer) -> &mut Option<EventId> {
        match timer {
            MacTimer::OpenRx1 => &mut self.open_rx1,
            MacTimer::CloseRx1 => &mut self.close_rx1,
            MacTimer::OpenRx2 => &mut self.open_rx2,
            MacTimer::CloseRx2 => &mut self.close_rx2,
            MacTimer::Retransmit => &mut self.retransmit,
        }
    }

    /// Claim the slot of a fired timer. False for a cancelled or superseded handle.
    pub(crate) fn take(&mut self, timer: MacTimer, id: EventId) -> bool {
        let slot = self.slot_mut(timer);
        if *slot == Some(id) {
            *slot = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn windows_pending(&self) -> bool {
        self.open_rx1.is_some() || self.close_rx1.is_some() || self.open_rx2.is_some() || self.close_rx2.is_some()
    }

    pub(crate) fn cancel_windows(&mut self) {
        self.open_rx1 = None;
        self.close_rx1 = None;
        self.open_rx2 = None;
        self.close_rx2 = None;
    }
}

impl<R, D> EndDeviceMac<R, D>
where
    R: Region,
    D: Device,
{
    pub(crate) fn get_rx_windows(&self) -> RxWindows {
        let rx1_delay = self
            .configuration
            .rx_delay
            .map(|delay| Duration::from_secs(delay as u64))
            .unwrap_or(R::default_rx_delay());
        RxWindows { rx1_delay, rx2_delay: rx1_delay + Duration::from_secs(1) }
    }

    fn window_data_rate(&self, window: Window) -> Result<DR, crate::Error<D>> {
        match (window, self.last_uplink.as_ref()) {
            (Window::_1, Some((_, ul_dr))) => Ok(R::get_rx1_dr(*ul_dr, self.rx1_data_rate_offset())?),
            (Window::_1, None) => Ok(R::get_rx1_dr(self.tx_data_rate(), self.rx1_data_rate_offset())?),
            (Window::_2, _) => Ok(self.rx2_data_rate()),
        }
    }

    fn window_frequency(&self, window: Window) -> u32 {
        match (window, self.last_uplink.as_ref()) {
            (Window::_1, Some((channel, _))) => channel.reply_frequency(),
            _ => self.rx2_frequency(),
        }
    }

    /// Tune the receiver for `window` without starting to listen.
    fn configure_window(&mut self, window: Window) -> Result<DR, crate::Error<D>> {
        let data_rate = self.window_data_rate(window)?;
        let frequency = self.window_frequency(window);
        let modulation = R::convert_data_rate(data_rate)?;
        let radio = self.device.radio();
        radio.set_frequency(frequency).map_err(crate::device::Error::Radio)?;
        radio.set_spreading_factor(modulation.spreading_factor).map_err(crate::device::Error::Radio)?;
        Ok(data_rate)
    }

    /// End of an uplink: park the radio on RX1 and schedule both windows.
    pub(crate) fn open_exchange<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<D>> {
        if !self.transmitting {
            warn!("tx finished without a transmission in progress");
            return Ok(());
        }
        self.transmitting = false;
        self.configure_window(Window::_1)?;
        self.device.radio().switch_to_sleep().map_err(crate::device::Error::Radio)?;

        let windows = self.get_rx_windows();
        self.timers.open_rx1 = Some(
            timer
                .schedule(windows.get_open(&Window::_1), MacTimer::OpenRx1)
                .map_err(crate::device::Error::Timer)?,
        );
        self.timers.open_rx2 = Some(
            timer
                .schedule(windows.get_open(&Window::_2), MacTimer::OpenRx2)
                .map_err(crate::device::Error::Timer)?,
        );
        trace!(
            "windows at +{} ms and +{} ms",
            windows.get_open(&Window::_1).as_millis(),
            windows.get_open(&Window::_2).as_millis()
        );
        Ok(())
    }

    pub(crate) fn dispatch_timer<T: Timer>(
        &mut self,
        timer: &mut T,
        id: EventId,
        event: MacTimer,
    ) -> Result<(), crate::Error<D>> {
        if !self.timers.take(event, id) {
            trace!("stale timer {:?} ({})", event, id.seq());
            return Ok(());
        }
        match event {
            MacTimer::OpenRx1 => self.open_window(timer, Window::_1),
            MacTimer::CloseRx1 => self.close_window(timer, Window::_1),
            MacTimer::OpenRx2 => self.open_window(timer, Window::_2),
            MacTimer::CloseRx2 => self.close_window(timer, Window::_2),
            MacTimer::Retransmit => self.retransmit(timer),
        }
    }

    fn open_window<T: Timer>(&mut self, timer: &mut T, window: Window) -> Result<(), crate::Error<D>> {
        if self.device.radio().state() == RadioState::Rx {
            debug!("skipping {:?}, radio still receiving", window);
            return Ok(());
        }
        let data_rate = self.configure_window(window)?;
        self.device.radio().switch_to_standby().map_err(crate::device::Error::Radio)?;

        let symbol_time = R::convert_data_rate(data_rate)?.symbol_time();
        let length = symbol_time * self.configuration.rx_window_symbols as u32;
        let (close, slot) = match window {
            Window::_1 => (MacTimer::CloseRx1, &mut self.timers.close_rx1),
            Window::_2 => (MacTimer::CloseRx2, &mut self.timers.close_rx2),
        };
        *slot = Some(timer.schedule(length, close).map_err(crate::device::Error::Timer)?);
        debug!("{:?} open for {} us at {:?}", window, length.as_micros(), data_rate);
        Ok(())
    }

    fn close_window<T: Timer>(&mut self, timer: &mut T, window: Window) -> Result<(), crate::Error<D>> {
        if self.device.radio().state() == RadioState::Rx {
            debug!("{:?} closes after the ongoing reception", window);
            self.deferred_close = Some(window);
            return Ok(());
        }
        self.device.radio().switch_to_sleep().map_err(crate::device::Error::Radio)?;
        trace!("{:?} closed", window);
        if !self.rx_windows_pending() {
            self.conclude_exchange(timer, false, false)?;
        }
        Ok(())
    }

    /// A reception ended without a frame for this device.
    pub(crate) fn finish_deferred_close<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<D>> {
        let Some(window) = self.deferred_close.take() else {
            return Ok(());
        };
        self.device.radio().switch_to_sleep().map_err(crate::device::Error::Radio)?;
        trace!("{:?} closed after reception", window);
        if !self.rx_windows_pending() {
            self.conclude_exchange(timer, false, false)?;
        }
        Ok(())
    }

    /// A downlink for this device ends the exchange at once.
    pub(crate) fn downlink_received<T: Timer>(&mut self, timer: &mut T, ack: bool) -> Result<(), crate::Error<D>> {
        self.timers.cancel_windows();
        self.deferred_close = None;
        self.device.radio().switch_to_sleep().map_err(crate::device::Error::Radio)?;
        self.conclude_exchange(timer, true, ack)
    }

    /// Decide between sending again, reporting the outcome and going idle.
    fn conclude_exchange<T: Timer>(
        &mut self,
        timer: &mut T,
        received: bool,
        ack: bool,
    ) -> Result<(), crate::Error<D>> {
        let Some(ctx) = self.tx_context.as_ref() else {
            return Ok(());
        };
        let transmissions = ctx.transmissions;
        let confirmed = ctx.confirmed;
        if (!received || (confirmed && !ack)) && ctx.attempts_left > 0 {
            debug!("fcnt {}: {} attempts left", ctx.fcnt, ctx.attempts_left);
            let delay = self.configuration.retransmit_timeout;
            self.timers.retransmit =
                Some(timer.schedule(delay, MacTimer::Retransmit).map_err(crate::device::Error::Timer)?);
            return Ok(());
        }

        let elapsed = timer.now().saturating_duration_since(ctx.first_attempt);
        self.tx_context = None;
        self.timers.retransmit = None;
        if confirmed && ack {
            info!("acknowledged after {} transmissions, {} us", transmissions, elapsed.as_micros());
            self.device.handle_event(MacEvent::Acknowledged { transmissions });
        } else if confirmed {
            warn!("no acknowledgement after {} transmissions", transmissions);
            self.device.handle_event(MacEvent::MaxTransmissionsReached { transmissions });
        }
        Ok(())
    }

    /// Send the pending uplink again, or wait until the duty cycle allows it.
    fn retransmit<T: Timer>(&mut self, timer: &mut T) -> Result<(), crate::Error<D>> {
        let Some(data_rate) = self.tx_context.as_ref().map(|ctx| ctx.data_rate) else {
            return Ok(());
        };
        if self.rx_windows_pending() {
            warn!("retransmission while an exchange is open");
            return Ok(());
        }
        let now = timer.now();
        let wait = self.earliest_transmission_delay(now, data_rate);
        if wait.is_zero() {
            if let Some(channel) = self.select_channel(now, data_rate)? {
                let result = self.transmit(timer, channel);
                if result.is_err() {
                    warn!("retransmission failed, dropping the uplink");
                    self.tx_context = None;
                }
                return result;
            }
        }
        if wait.is_zero() || wait.is_infinite() {
            warn!("no channel will allow a retransmission, dropping the uplink");
            let transmissions = self.tx_context.take().map(|ctx| ctx.transmissions).unwrap_or(0);
            self.device.handle_event(MacEvent::DutyCycleBlocked);
            self.device.handle_event(MacEvent::MaxTransmissionsReached { transmissions });
            return Ok(());
        }
        debug!("retransmission blocked by duty cycle for {} us", wait.as_micros());
        self.timers.retransmit = Some(timer.schedule(wait, MacTimer::Retransmit).map_err(crate::device::Error::Timer)?);
        Ok(())
    }
}
