// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// author: Ivaylo Petrov <ivajloip@gmail.com>

//! Parsing of LoRaWAN data frames.
//!
//! Frames carry no encryption and the MIC is four placeholder bytes that are written but
//! never checked.

use heapless::Vec;

use super::maccommands::{mac_commands_len, parse_mac_commands, MacCommand, MacCommandIterator};
use super::Error;
use crate::device::radio_buffer::RadioBuffer;

/// Length of the MIC trailer.
pub const MIC_LEN: usize = 4;
/// MHDR, FHDR without options and MIC.
pub const MIN_DATA_FRAME_LEN: usize = 1 + 7 + MIC_LEN;
/// Upper bound of FOpts in bytes.
pub const MAX_FOPTS_LEN: usize = 15;

/// MHDR represents LoRaWAN MHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MHDR(u8);

impl MHDR {
    /// Wraps a raw MHDR byte.
    pub fn new(byte: u8) -> MHDR {
        MHDR(byte)
    }

    #[allow(missing_docs)]
    pub fn from_parts(mtype: MType, major: Major) -> MHDR {
        let major = match major {
            Major::LoRaWANR1 => 0,
            Major::RFU => 1,
        };
        MHDR(((mtype as u8) << 5) | major)
    }

    /// Gives the type of message that PhyPayload is carrying.
    pub fn mtype(&self) -> MType {
        match self.0 >> 5 {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::RFU,
            _ => MType::Proprietary,
        }
    }

    /// Gives the version of LoRaWAN payload format.
    pub fn major(&self) -> Major {
        if self.0 & 0x03 == 0 {
            Major::LoRaWANR1
        } else {
            Major::RFU
        }
    }

    /// Gives the binary representation of the MHDR.
    pub fn raw_value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for MHDR {
    fn from(v: u8) -> Self {
        MHDR(v)
    }
}

/// MType gives the possible message types of the PhyPayload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum MType {
    JoinRequest = 0,
    JoinAccept = 1,
    UnconfirmedDataUp = 2,
    UnconfirmedDataDown = 3,
    ConfirmedDataUp = 4,
    ConfirmedDataDown = 5,
    RFU = 6,
    Proprietary = 7,
}

impl MType {
    /// Does the message carry an FHDR?
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            MType::UnconfirmedDataUp | MType::UnconfirmedDataDown | MType::ConfirmedDataUp | MType::ConfirmedDataDown
        )
    }

    /// Is this a data uplink?
    pub fn is_uplink(&self) -> bool {
        matches!(self, MType::UnconfirmedDataUp | MType::ConfirmedDataUp)
    }

    /// Does the message require an acknowledgement?
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }

    /// The data message type for a direction and confirmation.
    pub fn data(uplink: bool, confirmed: bool) -> MType {
        match (uplink, confirmed) {
            (true, false) => MType::UnconfirmedDataUp,
            (true, true) => MType::ConfirmedDataUp,
            (false, false) => MType::UnconfirmedDataDown,
            (false, true) => MType::ConfirmedDataDown,
        }
    }
}

/// Major gives the supported LoRaWAN payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum Major {
    LoRaWANR1,
    RFU,
}

/// DevAddr represents a 32 bit device address, stored in wire (little endian) order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DevAddr([u8; 4]);

impl DevAddr {
    /// Takes the first four bytes of `bytes`, which must be at least that long.
    pub fn new_from_raw(bytes: &[u8]) -> Self {
        DevAddr([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// NwkID, the upper 7 bits.
    pub fn nwk_id(&self) -> u8 {
        self.0[3] >> 1
    }

    /// Address as a number.
    pub fn value(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl From<u32> for DevAddr {
    fn from(v: u32) -> Self {
        DevAddr(v.to_le_bytes())
    }
}

impl AsRef<[u8]> for DevAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// FCtrl represents the FCtrl from FHDR.
///
/// Bit 4 reads as FPending on downlinks and as ClassB on uplinks; ADRACKReq only exists on
/// uplinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FCtrl(pub u8, pub bool);

impl FCtrl {
    /// Wraps a raw FCtrl byte read in the given direction.
    pub fn new(bytes: u8, uplink: bool) -> FCtrl {
        FCtrl(bytes, uplink)
    }

    fn set_bit(&mut self, bit: u8, value: bool) -> &mut Self {
        self.0 &= !(1 << bit);
        self.0 |= (value as u8) << bit;
        self
    }

    #[allow(missing_docs)]
    pub fn set_adr(&mut self, value: bool) -> &mut Self {
        self.set_bit(7, value)
    }

    #[allow(missing_docs)]
    pub fn set_adr_ack_req(&mut self, value: bool) -> &mut Self {
        self.set_bit(6, value)
    }

    #[allow(missing_docs)]
    pub fn set_ack(&mut self, value: bool) -> &mut Self {
        self.set_bit(5, value)
    }

    /// Downlink meaning of bit 4.
    pub fn set_f_pending(&mut self, value: bool) -> &mut Self {
        self.set_bit(4, value)
    }

    /// Uplink meaning of bit 4.
    pub fn set_class_b(&mut self, value: bool) -> &mut Self {
        self.set_bit(4, value)
    }

    pub(crate) fn set_f_opts_len(&mut self, len: u8) -> &mut Self {
        self.0 = (self.0 & 0xf0) | (len & 0x0f);
        self
    }

    /// Gives whether ADR is enabled or not.
    pub fn adr(&self) -> bool {
        self.0 >> 7 == 1
    }

    /// Gives whether ADR ACK is requested.
    pub fn adr_ack_req(&self) -> bool {
        self.1 && self.0 & (1 << 6) != 0
    }

    /// Gives whether ack bit is set.
    pub fn ack(&self) -> bool {
        self.0 & (1 << 5) != 0
    }

    /// Gives whether there are more payloads pending.
    pub fn f_pending(&self) -> bool {
        !self.1 && self.0 & (1 << 4) != 0
    }

    /// Gives whether an uplink announces class B.
    pub fn class_b(&self) -> bool {
        self.1 && self.0 & (1 << 4) != 0
    }

    /// Gives the size of FOpts.
    pub fn f_opts_len(&self) -> u8 {
        self.0 & 0x0f
    }

    /// Gives the direction the byte is read in.
    pub fn is_uplink(&self) -> bool {
        self.1
    }

    /// Gives the binary representation of the FCtrl.
    pub fn raw_value(&self) -> u8 {
        self.0
    }
}

/// An owned FHDR with its piggybacked MAC commands already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    #[allow(missing_docs)]
    pub dev_addr: DevAddr,
    #[allow(missing_docs)]
    pub fctrl: FCtrl,
    /// Low 16 bits of the frame counter.
    pub fcnt: u16,
    /// Decoded FOpts, at most 15 bytes on the wire.
    pub fopts: Vec<MacCommand, MAX_FOPTS_LEN>,
}

impl FrameHeader {
    /// Empty header without options.
    pub fn new(dev_addr: DevAddr, uplink: bool, fcnt: u16) -> Self {
        Self { dev_addr, fctrl: FCtrl(0, uplink), fcnt, fopts: Vec::new() }
    }

    #[allow(missing_docs)]
    pub fn is_uplink(&self) -> bool {
        self.fctrl.is_uplink()
    }

    /// Appends a command to FOpts if it still fits in 15 bytes.
    pub fn push_command(&mut self, cmd: MacCommand) -> Result<(), Error> {
        if mac_commands_len(&self.fopts) + cmd.len() > MAX_FOPTS_LEN {
            return Err(Error::MacCommandTooBigForFOpts);
        }
        self.fopts.push(cmd).map_err(|_| Error::MacCommandTooBigForFOpts)
    }

    /// Serialized length of the header including FOpts.
    pub fn len(&self) -> usize {
        7 + mac_commands_len(&self.fopts)
    }

    /// An FHDR always holds at least DevAddr, FCtrl and FCnt.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Parses an FHDR, returning it with the number of bytes it occupied.
    pub fn parse(bytes: &[u8], uplink: bool) -> Result<(Self, usize), Error> {
        if bytes.len() < 7 {
            return Err(Error::InsufficeientNumberOfBytes);
        }
        let fctrl = FCtrl(bytes[4], uplink);
        let fopts_len = fctrl.f_opts_len() as usize;
        if bytes.len() < 7 + fopts_len {
            return Err(Error::InsufficeientNumberOfBytes);
        }
        // commands after the first undecodable one are lost, the rest of the frame is not
        let mut fopts = Vec::new();
        for cmd in parse_mac_commands(&bytes[7..7 + fopts_len], uplink) {
            match cmd {
                Ok(cmd) => fopts.push(cmd).map_err(|_| Error::MacCommandTooBigForFOpts)?,
                Err(e) => {
                    warn!("FOpts cut short: {:?}", e);
                    break;
                }
            }
        }
        let fcnt = u16::from_le_bytes([bytes[5], bytes[6]]);
        Ok((Self { dev_addr: DevAddr::new_from_raw(&bytes[0..4]), fctrl, fcnt, fopts }, 7 + fopts_len))
    }

    /// Appends the serialized header to `out`, with FOptsLen derived from the commands.
    pub fn write<const N: usize>(&self, out: &mut RadioBuffer<N>) -> Result<(), Error> {
        let fopts_len = mac_commands_len(&self.fopts);
        if fopts_len > MAX_FOPTS_LEN {
            return Err(Error::MacCommandTooBigForFOpts);
        }
        let mut fctrl = self.fctrl;
        fctrl.set_f_opts_len(fopts_len as u8);
        out.extend_from_slice(self.dev_addr.as_ref()).map_err(|_| Error::BufferTooSmall)?;
        out.extend_from_slice(&[fctrl.raw_value()]).map_err(|_| Error::BufferTooSmall)?;
        out.extend_from_slice(&self.fcnt.to_le_bytes()).map_err(|_| Error::BufferTooSmall)?;
        for cmd in &self.fopts {
            out.extend_from_slice(&[cmd.cid()]).map_err(|_| Error::BufferTooSmall)?;
            out.extend_from_slice(cmd.payload_bytes()).map_err(|_| Error::BufferTooSmall)?;
        }
        Ok(())
    }
}

/// A parsed data frame borrowing its FRMPayload from the received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame<'a> {
    mhdr: MHDR,
    fhdr: FrameHeader,
    f_port: Option<u8>,
    frm_payload: &'a [u8],
}

impl<'a> DataFrame<'a> {
    /// Parses a data uplink or downlink; the MIC is not checked.
    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        if data.is_empty() {
            return Err(Error::PhyDataEmpty);
        }
        let mhdr = MHDR(data[0]);
        if mhdr.major() != Major::LoRaWANR1 {
            return Err(Error::UnsupportedMajorVersion);
        }
        let mtype = mhdr.mtype();
        if !mtype.is_data() {
            return Err(Error::UnsupportedMessageType);
        }
        if data.len() < MIN_DATA_FRAME_LEN {
            return Err(Error::InsufficeientNumberOfBytes);
        }
        let body = &data[1..data.len() - MIC_LEN];
        let (fhdr, used) = FrameHeader::parse(body, mtype.is_uplink())?;
        let rest = &body[used..];
        let (f_port, frm_payload) = match rest.split_first() {
            Some((port, payload)) => (Some(*port), payload),
            None => (None, rest),
        };
        if f_port == Some(0) && !fhdr.fopts.is_empty() {
            return Err(Error::FRMPayloadWithFportZero);
        }
        Ok(Self { mhdr, fhdr, f_port, frm_payload })
    }

    #[allow(missing_docs)]
    pub fn mhdr(&self) -> MHDR {
        self.mhdr
    }

    #[allow(missing_docs)]
    pub fn mtype(&self) -> MType {
        self.mhdr.mtype()
    }

    #[allow(missing_docs)]
    pub fn is_uplink(&self) -> bool {
        self.mtype().is_uplink()
    }

    #[allow(missing_docs)]
    pub fn is_confirmed(&self) -> bool {
        self.mtype().is_confirmed()
    }

    #[allow(missing_docs)]
    pub fn fhdr(&self) -> &FrameHeader {
        &self.fhdr
    }

    /// FPort, absent when the frame ends after the FHDR.
    pub fn f_port(&self) -> Option<u8> {
        self.f_port
    }

    /// Application payload; MAC commands when the port is 0.
    pub fn frm_payload(&self) -> &'a [u8] {
        self.frm_payload
    }

    /// MAC commands from FOpts, or from the payload when the port is 0.
    pub fn mac_commands(&self) -> impl Iterator<Item = Result<MacCommand, Error>> + '_ {
        let in_payload = match self.f_port {
            Some(0) => self.frm_payload,
            _ => &[],
        };
        let payload_cmds: MacCommandIterator<'_> = parse_mac_commands(in_payload, self.is_uplink());
        self.fhdr.fopts.iter().copied().map(Ok).chain(payload_cmds)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::maccommands::*;

    #[test]
    fn mhdr_fields() {
        let mhdr = MHDR::from_parts(MType::ConfirmedDataUp, Major::LoRaWANR1);
        assert_eq!(mhdr.raw_value(), 0x80);
        assert_eq!(mhdr.mtype(), MType::ConfirmedDataUp);
        assert_eq!(MHDR::new(0x41).major(), Major::RFU);
    }

    #[test]
    fn fctrl_bits_depend_on_direction() {
        let mut fctrl = FCtrl::new(0, true);
        fctrl.set_adr(true).set_adr_ack_req(true).set_class_b(true).set_f_opts_len(3);
        assert_eq!(fctrl.raw_value(), 0xd3);
        assert!(fctrl.adr_ack_req());
        assert!(fctrl.class_b());
        assert!(!fctrl.f_pending());
        let down = FCtrl::new(0xd3, false);
        assert!(!down.adr_ack_req());
        assert!(down.f_pending());
    }

    #[test]
    fn frame_header_round_trip() {
        let mut header = FrameHeader::new(DevAddr::from(0x2601_1234), false, 0x0102);
        header.fctrl.set_ack(true);
        let mut check = LinkCheckAnsPayload::default();
        check.set_margin(7).set_gateway_count(1);
        header.push_command(check.into()).unwrap();
        let mut req = LinkADRReqPayload::default();
        req.set_data_rate(3).set_tx_power(1).set_channel_mask(0x0003).set_redundancy(0, 1);
        header.push_command(req.into()).unwrap();
        header.push_command(DevStatusReqPayload::default().into()).unwrap();

        let mut buf: RadioBuffer<32> = RadioBuffer::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), header.len());
        assert_eq!(&buf.as_ref()[..7], &[0x34, 0x12, 0x01, 0x26, 0x29, 0x02, 0x01]);

        let (parsed, used) = FrameHeader::parse(buf.as_ref(), false).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(parsed.dev_addr, header.dev_addr);
        assert_eq!(parsed.fcnt, header.fcnt);
        assert!(parsed.fctrl.ack());
        assert_eq!(parsed.fopts, header.fopts);
    }

    #[test]
    fn fopts_capacity_is_fifteen_bytes() {
        let mut header = FrameHeader::new(DevAddr::default(), true, 0);
        for _ in 0..7 {
            header.push_command(LinkADRAnsPayload::default().into()).unwrap();
        }
        assert_eq!(header.len(), 7 + 14);
        assert_eq!(
            header.push_command(LinkADRAnsPayload::default().into()),
            Err(Error::MacCommandTooBigForFOpts)
        );
        header.push_command(DutyCycleAnsPayload::default().into()).unwrap();
    }

    #[test]
    fn data_frame_with_port_zero_commands() {
        // unconfirmed down, FOptsLen 0, FPort 0, DevStatusReq + RXTimingSetupReq, MIC
        let data = [0x60, 1, 0, 0, 0, 0x00, 5, 0, 0, 0x06, 0x08, 0x03, 0, 0, 0, 0];
        let frame = DataFrame::parse(&data).unwrap();
        assert!(!frame.is_uplink());
        assert_eq!(frame.fhdr().fcnt, 5);
        assert_eq!(frame.f_port(), Some(0));
        let cmds: std::vec::Vec<_> = frame.mac_commands().collect();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[1], Ok(MacCommand::RXTimingSetupReq(RXTimingSetupReqPayload::new(&[3]).unwrap())));
    }

    #[test]
    fn data_frame_errors() {
        assert_eq!(DataFrame::parse(&[]), Err(Error::PhyDataEmpty));
        assert_eq!(DataFrame::parse(&[0x00; 12]), Err(Error::UnsupportedMessageType));
        assert_eq!(DataFrame::parse(&[0x40, 0, 0]), Err(Error::InsufficeientNumberOfBytes));
        // FOpts present and FPort 0
        let data = [0x60, 1, 0, 0, 0, 0x01, 5, 0, 0x06, 0x00, 0, 0, 0, 0];
        assert_eq!(DataFrame::parse(&data), Err(Error::FRMPayloadWithFportZero));
    }

    #[test]
    fn unknown_fopts_command_keeps_the_frame() {
        // unconfirmed down, ACK, FOptsLen 3: DevStatusReq, unknown CID 0x7f, DutyCycleReq CID
        let data = [0x60, 1, 0, 0, 0, 0x23, 9, 0, 0x06, 0x7f, 0x04, 2, b'h', b'i', 0, 0, 0, 0];
        let frame = DataFrame::parse(&data).unwrap();
        assert!(frame.fhdr().fctrl.ack());
        assert_eq!(frame.fhdr().fcnt, 9);
        assert_eq!(frame.fhdr().fopts.len(), 1);
        assert_eq!(frame.fhdr().fopts[0], MacCommand::DevStatusReq(DevStatusReqPayload::default()));
        assert_eq!(frame.f_port(), Some(2));
        assert_eq!(frame.frm_payload(), b"hi");
    }
}
