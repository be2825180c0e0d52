use lorawan_sim::device::radio::types::{RadioState, RxQuality, SpreadingFactor, TxConfig};
use lorawan_sim::device::radio::Radio;
use lorawan_sim::device::radio_buffer::RadioBuffer;
use lorawan_sim::device::rng::Rng;
use lorawan_sim::device::timer::{Duration, Instant};
use lorawan_sim::device::Device;
use lorawan_sim::encoding::creator::DataPayloadCreator;
use lorawan_sim::encoding::parser::{DataFrame, DevAddr, FCtrl};
use lorawan_sim::mac::region::channel_plan::channel::LogicalChannel;
use lorawan_sim::mac::region::channel_plan::sub_band::SubBand;
use lorawan_sim::mac::region::channel_plan::ChannelManager;
use lorawan_sim::mac::types::{Configuration, MacEvent, DR};
use lorawan_sim::timeline::{NodeEvent, Timeline};
use lorawan_sim::{EndDeviceMac, GatewayMac, LorawanMac, EU868};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

#[derive(Debug)]
struct PhyRadio {
    state: RadioState,
    airtime: Duration,
    sent: Vec<(TxConfig, Vec<u8>)>,
    pending: Option<Duration>,
}

impl PhyRadio {
    fn new(airtime: Duration) -> Self {
        Self { state: RadioState::Sleep, airtime, sent: Vec::new(), pending: None }
    }
}

impl Radio for PhyRadio {
    type Error = ();

    fn send(&mut self, config: &TxConfig, buf: &[u8]) -> Result<(), Self::Error> {
        self.state = RadioState::Tx;
        self.pending = Some(self.airtime);
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

    fn set_frequency(&mut self, _frequency: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_spreading_factor(&mut self, _sf: SpreadingFactor) -> Result<(), Self::Error> {
        Ok(())
    }

    fn state(&self) -> RadioState {
        self.state
    }

    fn time_on_air(&self, _config: &TxConfig, _len: usize) -> Duration {
        self.airtime
    }
}

#[derive(Debug)]
struct SeededRng(StdRng);

impl Rng for SeededRng {
    type Error = ();

    fn next_u32(&mut self) -> Result<u32, Self::Error> {
        Ok(self.0.next_u32())
    }
}

#[derive(Debug, Default)]
struct Log {
    sent: usize,
    duty_cycle_blocked: usize,
    acknowledged: Vec<u8>,
    uplinks: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Node {
    radio: PhyRadio,
    rng: SeededRng,
    log: Log,
}

impl Node {
    fn new(airtime: Duration, seed: u64) -> Self {
        Self { radio: PhyRadio::new(airtime), rng: SeededRng(StdRng::seed_from_u64(seed)), log: Log::default() }
    }
}

impl Device for Node {
    type Radio = PhyRadio;
    type Rng = SeededRng;

    fn radio(&mut self) -> &mut Self::Radio {
        &mut self.radio
    }

    fn rng(&mut self) -> &mut Self::Rng {
        &mut self.rng
    }

    fn handle_event(&mut self, event: MacEvent<'_>) {
        match event {
            MacEvent::SentNewPacket { .. } | MacEvent::Retransmitted { .. } => self.log.sent += 1,
            MacEvent::DutyCycleBlocked => self.log.duty_cycle_blocked += 1,
            MacEvent::Acknowledged { transmissions } => self.log.acknowledged.push(transmissions),
            MacEvent::UplinkReceived { frame, .. } => self.log.uplinks.push(frame.to_vec()),
            _ => {}
        }
    }
}

enum Event {
    Mac(NodeEvent),
    TxDone(usize),
    Reply(u32, u32),
}

impl From<NodeEvent> for Event {
    fn from(value: NodeEvent) -> Self {
        Event::Mac(value)
    }
}

const DEVICE: usize = 0;
const GATEWAY: usize = 1;

fn schedule_tx_done<M: LorawanMac<Device = Node>>(timeline: &mut Timeline<Event, 32>, mac: &mut M, node: usize) {
    if let Some(airtime) = mac.device().radio.pending.take() {
        timeline.schedule(airtime, Event::TxDone(node)).unwrap();
    }
}

/// A single device on a private sub-band: 868.0 to 868.6 MHz at 1 %, one channel.
fn lone_device(airtime: Duration) -> (EndDeviceMac<EU868, Node>, LogicalChannel) {
    let mut channel_manager = ChannelManager::new();
    channel_manager.add_sub_band(SubBand::new(868_000_000, 868_600_000, 0.01, 14));
    let channel = LogicalChannel::new(868_100_000, DR::_0, DR::_5);
    channel_manager.set_channel(0, channel);
    let mac = EndDeviceMac::with_channel_manager(
        Node::new(airtime, 1),
        DevAddr::from(0x2601_0001u32),
        Configuration::default(),
        channel_manager,
    );
    (mac, channel)
}

fn run_device(timeline: &mut Timeline<Event, 32>, mac: &mut EndDeviceMac<EU868, Node>, until: Instant) {
    while timeline.peek_time().is_some_and(|next| next <= until) {
        let Some((id, event)) = timeline.pop() else {
            break;
        };
        match event {
            Event::Mac(NodeEvent { timer, .. }) => mac.handle_timer(&mut timeline.node(DEVICE), id, timer).unwrap(),
            Event::TxDone(_) => mac.tx_finished(&mut timeline.node(DEVICE)).unwrap(),
            Event::Reply(..) => unreachable!(),
        }
        schedule_tx_done(timeline, mac, DEVICE);
    }
    assert!(timeline.advance_to(until));
}

#[test]
fn two_second_uplink_silences_the_sub_band_until_200_s() {
    let mut timeline: Timeline<Event, 32> = Timeline::new();
    let (mut mac, channel) = lone_device(Duration::from_secs(2));

    run_device(&mut timeline, &mut mac, Instant::from_secs(2));
    mac.send(&mut timeline.node(DEVICE), b"hello", 1, false).unwrap();
    schedule_tx_done(&mut timeline, &mut mac, DEVICE);
    assert_eq!(mac.channel_manager().get_waiting_time(timeline.now(), &channel), Duration::from_secs(198));
    assert_eq!(mac.channel_manager().sub_bands()[0].next_transmission_time(), Instant::from_secs(200));

    run_device(&mut timeline, &mut mac, Instant::from_secs(150));
    assert!(!mac.rx_windows_pending());
    assert_eq!(mac.channel_manager().get_waiting_time(timeline.now(), &channel), Duration::from_secs(50));
    let refused = mac.send(&mut timeline.node(DEVICE), b"too early", 1, false);
    assert!(matches!(refused, Err(lorawan_sim::Error::Mac(lorawan_sim::mac::Error::NoValidChannelFound))));
    assert_eq!(mac.device().log.duty_cycle_blocked, 1);

    run_device(&mut timeline, &mut mac, Instant::from_secs(200));
    mac.send(&mut timeline.node(DEVICE), b"on time", 1, false).unwrap();
    assert_eq!(mac.device().log.sent, 2);
    assert_eq!(mac.device().radio.sent.len(), 2);
    assert_eq!(mac.device().radio.sent[1].0.rf.frequency, 868_100_000);
}

fn downlink_ack(dev_addr: DevAddr) -> Vec<u8> {
    let mut fctrl = FCtrl::new(0, false);
    fctrl.set_ack(true);
    let mut phy = DataPayloadCreator::new();
    phy.set_uplink(false).set_dev_addr(dev_addr).set_fctrl(&fctrl).set_fcnt(0);
    let mut buf: RadioBuffer<64> = RadioBuffer::new();
    phy.build(&[], &[], &mut buf).unwrap();
    buf.as_ref().to_vec()
}

#[test]
fn gateway_acknowledges_a_confirmed_uplink_in_rx1() {
    let airtime = Duration::from_millis(100);
    let mut timeline: Timeline<Event, 32> = Timeline::new();
    let dev_addr = DevAddr::from(0x2601_0002u32);
    let mut device: EndDeviceMac<EU868, Node> =
        EndDeviceMac::new(Node::new(airtime, 2), dev_addr, Configuration::default());
    let mut gateway: GatewayMac<EU868, Node> = GatewayMac::new(Node::new(airtime, 3));

    device.send(&mut timeline.node(DEVICE), b"confirm me", 1, true).unwrap();
    schedule_tx_done(&mut timeline, &mut device, DEVICE);

    while let Some((id, event)) = timeline.pop() {
        match event {
            Event::Mac(NodeEvent { node: DEVICE, timer }) => {
                device.handle_timer(&mut timeline.node(DEVICE), id, timer).unwrap()
            }
            Event::Mac(NodeEvent { timer, .. }) => gateway.handle_timer(&mut timeline.node(GATEWAY), id, timer).unwrap(),
            Event::TxDone(DEVICE) => {
                device.tx_finished(&mut timeline.node(DEVICE)).unwrap();
                let (config, frame) = device.device().radio.sent.last().cloned().unwrap();
                gateway.receive(&mut timeline.node(GATEWAY), &frame, RxQuality::new(-90, 7)).unwrap();
                timeline
                    .schedule(Duration::from_secs(1), Event::Reply(config.rf.frequency, dev_addr.value()))
                    .unwrap();
            }
            Event::TxDone(_) => {
                gateway.tx_finished(&mut timeline.node(GATEWAY)).unwrap();
                let (_, frame) = gateway.device().radio.sent.last().cloned().unwrap();
                device.receive(&mut timeline.node(DEVICE), &frame, RxQuality::new(-95, 3)).unwrap();
            }
            Event::Reply(frequency, addr) => {
                let frame = downlink_ack(DevAddr::from(addr));
                gateway.send(&mut timeline.node(GATEWAY), &frame, DR::_0, frequency).unwrap();
                assert!(gateway.is_transmitting());
            }
        }
        schedule_tx_done(&mut timeline, &mut device, DEVICE);
        schedule_tx_done(&mut timeline, &mut gateway, GATEWAY);
    }

    assert_eq!(device.device().log.acknowledged, vec![1]);
    assert_eq!(device.device().radio.sent.len(), 1);
    assert!(!device.retransmission_pending());

    let uplink = &gateway.device().log.uplinks[0];
    let parsed = DataFrame::parse(uplink).unwrap();
    assert!(parsed.is_confirmed());
    assert_eq!(parsed.fhdr().dev_addr, dev_addr);
    assert_eq!(parsed.frm_payload(), b"confirm me");

    // the downlink keeps its sub-band busy for 9.9 s
    let frequency = device.device().radio.sent[0].0.rf.frequency;
    let now = timeline.now();
    assert!(!gateway.is_transmitting());
    assert!(!gateway.get_waiting_time(now, frequency).is_zero());
    let refused = gateway.send(&mut timeline.node(GATEWAY), &downlink_ack(dev_addr), DR::_0, frequency);
    assert!(matches!(refused, Err(lorawan_sim::Error::Mac(lorawan_sim::mac::Error::NoValidChannelFound))));
    assert_eq!(gateway.device().log.duty_cycle_blocked, 1);
}
