use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::region::eu868::EU868;
use super::types::*;
use super::{EndDeviceMac, LorawanMac};
use crate::device::radio::types::{RadioState, RxQuality, SpreadingFactor, TxConfig};
use crate::device::radio::Radio;
use crate::device::radio_buffer::RadioBuffer;
use crate::device::rng::Rng;
use crate::device::timer::{Duration, Instant};
use crate::device::Device;
use crate::encoding::creator::DataPayloadCreator;
use crate::encoding::maccommands::MacCommand;
use crate::encoding::parser::{DevAddr, FCtrl};
use crate::timeline::{NodeEvent, Timeline};

pub(crate) const DEV_ADDR: u32 = 0x2601_1234;

#[derive(Debug)]
pub(crate) struct TestRadio {
    pub(crate) state: RadioState,
    pub(crate) sent: Vec<(TxConfig, Vec<u8>)>,
    pub(crate) frequencies: Vec<u32>,
    pub(crate) spreading_factors: Vec<SpreadingFactor>,
    pub(crate) airtime: Option<Duration>,
    pub(crate) pending_tx: Option<Duration>,
    pub(crate) fail_send: bool,
}

impl Default for TestRadio {
    fn default() -> Self {
        Self {
            state: RadioState::Sleep,
            sent: Vec::new(),
            frequencies: Vec::new(),
            spreading_factors: Vec::new(),
            airtime: Some(Duration::from_millis(100)),
            pending_tx: None,
            fail_send: false,
        }
    }
}

impl Radio for TestRadio {
    type Error = ();

    fn send(&mut self, config: &TxConfig, buf: &[u8]) -> Result<(), Self::Error> {
        if self.fail_send {
            return Err(());
        }
        self.state = RadioState::Tx;
        self.pending_tx = Some(self.time_on_air(config, buf.len()));
        self.sent.push((config.clone(), buf.to_vec()));
        Ok(())
    }

    fn switch_to_standby(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Standby;
        Ok(())
    }

    fn switch_to_sleep(&mut self) -> Result<(), Self::Error> {
        self.state = RadioState::Sleep;
        Ok(())
    }

    fn set_frequency(&mut self, frequency: u32) -> Result<(), Self::Error> {
        self.frequencies.push(frequency);
        Ok(())
    }

    fn set_spreading_factor(&mut self, sf: SpreadingFactor) -> Result<(), Self::Error> {
        self.spreading_factors.push(sf);
        Ok(())
    }

    fn state(&self) -> RadioState {
        self.state
    }

    fn time_on_air(&self, config: &TxConfig, len: usize) -> Duration {
        self.airtime.unwrap_or_else(|| config.time_on_air(len))
    }
}

#[derive(Debug)]
pub(crate) struct TestRng(StdRng);

impl Rng for TestRng {
    type Error = ();

    fn next_u32(&mut self) -> Result<u32, Self::Error> {
        Ok(self.0.next_u32())
    }
}

/// Owned copy of a [`MacEvent`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Recorded {
    Event(MacEvent<'static>),
    Received { f_port: Option<u8>, payload: Vec<u8> },
    Uplink(Vec<u8>),
}

#[derive(Debug)]
pub(crate) struct TestDevice {
    pub(crate) radio: TestRadio,
    rng: TestRng,
    pub(crate) battery: Option<f32>,
    pub(crate) events: Vec<Recorded>,
    pub(crate) link_checks: Vec<(u8, u8)>,
}

impl TestDevice {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            radio: TestRadio::default(),
            rng: TestRng(StdRng::seed_from_u64(seed)),
            battery: None,
            events: Vec::new(),
            link_checks: Vec::new(),
        }
    }

    pub(crate) fn count(&self, f: impl Fn(&MacEvent<'static>) -> bool) -> usize {
        self.events
            .iter()
            .filter(|recorded| matches!(recorded, Recorded::Event(event) if f(event)))
            .count()
    }
}

impl Device for TestDevice {
    type Radio = TestRadio;
    type Rng = TestRng;

    fn radio(&mut self) -> &mut Self::Radio {
        &mut self.radio
    }

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn handle_link_check(&mut self, gateway_count: u8, margin: u8) {
        self.link_checks.push((gateway_count, margin));
    }

    fn battery_level(&self) -> Option<f32> {
        self.battery
    }

    fn handle_event(&mut self, event: MacEvent<'_>) {
        let recorded = match event {
            MacEvent::Received { f_port, payload, .. } => Recorded::Received { f_port, payload: payload.to_vec() },
            MacEvent::UplinkReceived { frame, .. } => Recorded::Uplink(frame.to_vec()),
            MacEvent::SentNewPacket { fcnt, channel, data_rate, len } => {
                Recorded::Event(MacEvent::SentNewPacket { fcnt, channel, data_rate, len })
            }
            MacEvent::Retransmitted { fcnt, channel, transmission } => {
                Recorded::Event(MacEvent::Retransmitted { fcnt, channel, transmission })
            }
            MacEvent::RxWindowsPending => Recorded::Event(MacEvent::RxWindowsPending),
            MacEvent::PayloadTooLarge { len, max } => Recorded::Event(MacEvent::PayloadTooLarge { len, max }),
            MacEvent::AggregatedDutyCycleBlocked { wait } => {
                Recorded::Event(MacEvent::AggregatedDutyCycleBlocked { wait })
            }
            MacEvent::DutyCycleBlocked => Recorded::Event(MacEvent::DutyCycleBlocked),
            MacEvent::Acknowledged { transmissions } => Recorded::Event(MacEvent::Acknowledged { transmissions }),
            MacEvent::MaxTransmissionsReached { transmissions } => {
                Recorded::Event(MacEvent::MaxTransmissionsReached { transmissions })
            }
            MacEvent::RetransmissionAbandoned { transmissions } => {
                Recorded::Event(MacEvent::RetransmissionAbandoned { transmissions })
            }
            MacEvent::LinkCheck { margin, gateway_count } => {
                Recorded::Event(MacEvent::LinkCheck { margin, gateway_count })
            }
            MacEvent::DataRateChanged { from, to } => Recorded::Event(MacEvent::DataRateChanged { from, to }),
            MacEvent::TxPowerChanged { from, to } => Recorded::Event(MacEvent::TxPowerChanged { from, to }),
        };
        self.events.push(recorded);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimEvent {
    Mac(NodeEvent),
    TxDone,
}

impl From<NodeEvent> for SimEvent {
    fn from(value: NodeEvent) -> Self {
        SimEvent::Mac(value)
    }
}

/// One end device on its own timeline. The PHY is simulated by delivering `TxDone`
/// once the airtime of each frame has passed.
pub(crate) struct Sim {
    pub(crate) timeline: Timeline<SimEvent, 64>,
    pub(crate) mac: EndDeviceMac<EU868, TestDevice>,
}

impl Sim {
    pub(crate) fn new(configuration: Configuration) -> Self {
        Self::with_seed(configuration, 7)
    }

    pub(crate) fn with_seed(configuration: Configuration, seed: u64) -> Self {
        Self {
            timeline: Timeline::new(),
            mac: EndDeviceMac::new(TestDevice::new(seed), DevAddr::from(DEV_ADDR), configuration),
        }
    }

    pub(crate) fn radio(&mut self) -> &mut TestRadio {
        &mut self.mac.device.radio
    }

    pub(crate) fn events(&self) -> &[Recorded] {
        &self.mac.device.events
    }

    pub(crate) fn send(&mut self, payload: &[u8], f_port: u8, confirmed: bool) -> Result<(), crate::Error<TestDevice>> {
        let result = self.mac.send(&mut self.timeline.node(0), payload, f_port, confirmed);
        self.schedule_tx_done();
        result
    }

    fn schedule_tx_done(&mut self) {
        if let Some(airtime) = self.mac.device.radio.pending_tx.take() {
            self.timeline.schedule(airtime, SimEvent::TxDone).unwrap();
        }
    }

    /// Run one event. Returns what ran.
    pub(crate) fn step(&mut self) -> Option<SimEvent> {
        let (id, event) = self.timeline.pop()?;
        match event {
            SimEvent::Mac(NodeEvent { timer, .. }) => {
                self.mac.handle_timer(&mut self.timeline.node(0), id, timer).unwrap()
            }
            SimEvent::TxDone => self.mac.tx_finished(&mut self.timeline.node(0)).unwrap(),
        }
        self.schedule_tx_done();
        Some(event)
    }

    /// Run every event up to `at` and leave the clock there.
    pub(crate) fn run_until(&mut self, at: Instant) {
        while self.timeline.peek_time().is_some_and(|next| next <= at) {
            self.step();
        }
        assert!(self.timeline.advance_to(at));
    }

    /// Run until `timer` has fired.
    pub(crate) fn run_until_timer(&mut self, timer: MacTimer) {
        while let Some(event) = self.step() {
            if event == SimEvent::Mac(NodeEvent { node: 0, timer }) {
                return;
            }
        }
        panic!("{:?} never fired", timer);
    }

    pub(crate) fn deliver(&mut self, frame: &[u8]) {
        let quality = RxQuality::new(-80, 5);
        self.mac.receive(&mut self.timeline.node(0), frame, quality).unwrap();
        self.schedule_tx_done();
    }

    pub(crate) fn now(&self) -> Instant {
        self.timeline.now()
    }
}

/// Encode a downlink for [`DEV_ADDR`].
pub(crate) fn downlink(confirmed: bool, ack: bool, f_port: Option<u8>, payload: &[u8], cmds: &[MacCommand]) -> Vec<u8> {
    downlink_to(DEV_ADDR, confirmed, ack, f_port, payload, cmds)
}

pub(crate) fn downlink_to(
    dev_addr: u32,
    confirmed: bool,
    ack: bool,
    f_port: Option<u8>,
    payload: &[u8],
    cmds: &[MacCommand],
) -> Vec<u8> {
    let mut fctrl = FCtrl::new(0, false);
    fctrl.set_ack(ack);
    let mut phy = DataPayloadCreator::new();
    phy.set_uplink(false).set_confirmed(confirmed).set_dev_addr(dev_addr).set_fctrl(&fctrl).set_fcnt(1);
    if let Some(port) = f_port {
        phy.set_f_port(port);
    }
    let mut buf: RadioBuffer<256> = RadioBuffer::new();
    phy.build(payload, cmds, &mut buf).unwrap();
    buf.as_ref().to_vec()
}
