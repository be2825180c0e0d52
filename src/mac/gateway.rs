//! Gateway side of the MAC: forwards every decodable uplink and sends downlinks on
//! request. It keeps the same duty-cycle bookkeeping as an end device but never opens
//! receive windows or retries a frame.

use core::marker::PhantomData;

use super::region::channel_plan::ChannelManager;
use super::region::{self, Region};
use super::types::{MacEvent, MacTimer, DR};
use super::{Error, LorawanMac};
use crate::device::radio::types::{RfConfig, RxQuality, TxConfig};
use crate::device::radio::Radio;
use crate::device::timer::{Duration, EventId, Instant, Timer};
use crate::device::Device;
use crate::encoding::parser::DataFrame;

/// Gateway MAC.
pub struct GatewayMac<R, D>
where
    R: Region,
    D: Device,
{
    device: D,
    region: PhantomData<R>,
    channel_manager: ChannelManager,
    transmitting: bool,
}

impl<R, D> GatewayMac<R, D>
where
    R: Region,
    D: Device,
{
    /// A gateway using the sub-bands of `R`.
    pub fn new(device: D) -> Self {
        Self::with_channel_manager(device, ChannelManager::from_region::<R>())
    }

    /// A gateway restricted to the sub-bands of `channel_manager`.
    pub fn with_channel_manager(device: D, channel_manager: ChannelManager) -> Self {
        Self { device, region: PhantomData, channel_manager, transmitting: false }
    }

    /// Is a downlink still on air?
    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    /// Time until the sub-band of `frequency` allows a downlink.
    pub fn get_waiting_time(&self, now: Instant, frequency: u32) -> Duration {
        if !self.channel_manager.is_frequency_valid(frequency) {
            return Duration::MAX;
        }
        self.channel_manager.get_waiting_time_for_frequency(now, frequency)
    }

    /// Put an already encoded downlink on air.
    pub fn send<T: Timer>(
        &mut self,
        timer: &mut T,
        frame: &[u8],
        data_rate: DR,
        frequency: u32,
    ) -> Result<(), crate::Error<D>> {
        let now = timer.now();
        if self.transmitting {
            debug!("downlink refused: radio busy");
            return Err(Error::TransmissionInProgress.into());
        }
        let Some(sub_band) = self.channel_manager.sub_band_for_frequency(frequency) else {
            return Err(region::Error::InvalidFrequency.into());
        };
        let pw = sub_band.max_tx_power();
        let wait = sub_band.waiting_time(now);
        if !wait.is_zero() {
            debug!("downlink on {} Hz refused, {} us to wait", frequency, wait.as_micros());
            self.device.handle_event(MacEvent::DutyCycleBlocked);
            return Err(Error::NoValidChannelFound.into());
        }

        let data_rate = R::convert_data_rate(data_rate)?;
        let low_data_rate_optimize = data_rate.requires_ldro();
        let tx_config = TxConfig {
            pw,
            rf: RfConfig { frequency, coding_rate: R::default_coding_rate(), data_rate },
            preamble_symbols: R::preamble_symbols(),
            implicit_header: false,
            crc_on: false,
            low_data_rate_optimize,
        };
        let time_on_air = self.device.radio().time_on_air(&tx_config, frame.len());
        self.device.radio().send(&tx_config, frame).map_err(crate::device::Error::Radio)?;
        self.channel_manager.add_event_for_frequency(now, time_on_air, frequency);
        self.transmitting = true;
        info!("downlink of {} bytes on {} Hz, {} us on air", frame.len(), frequency, time_on_air.as_micros());
        Ok(())
    }
}

impl<R, D> LorawanMac for GatewayMac<R, D>
where
    R: Region,
    D: Device,
{
    type Device = D;

    fn receive<T: Timer>(&mut self, _timer: &mut T, frame: &[u8], quality: RxQuality) -> Result<(), crate::Error<D>> {
        match DataFrame::parse(frame) {
            Ok(parsed) if parsed.is_uplink() => {
                debug!(
                    "uplink fcnt {} from {}, rssi {} snr {}",
                    parsed.fhdr().fcnt,
                    parsed.fhdr().dev_addr.value(),
                    quality.rssi(),
                    quality.snr()
                );
                self.device.handle_event(MacEvent::UplinkReceived { frame, quality });
            }
            Ok(_) => trace!("ignoring downlink"),
            Err(e) => debug!("dropping undecodable frame: {:?}", e),
        }
        Ok(())
    }

    fn failed_reception<T: Timer>(&mut self, _timer: &mut T) -> Result<(), crate::Error<D>> {
        debug!("reception failed");
        Ok(())
    }

    fn tx_finished<T: Timer>(&mut self, _timer: &mut T) -> Result<(), crate::Error<D>> {
        if !self.transmitting {
            warn!("tx finished without a transmission in progress");
        }
        self.transmitting = false;
        self.device.radio().switch_to_standby().map_err(crate::device::Error::Radio)?;
        Ok(())
    }

    fn handle_timer<T: Timer>(&mut self, _timer: &mut T, _id: EventId, event: MacTimer) -> Result<(), crate::Error<D>> {
        trace!("gateway ignores {:?}", event);
        Ok(())
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
