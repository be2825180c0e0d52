// Copyright (c) 2017-2020 Ivaylo Petrov
//
// Licensed under the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//
// author: Ivaylo Petrov <ivajloip@gmail.com>

//! Provides types and methods for creating LoRaWAN data frames.

use super::maccommands::MacCommand;
use super::parser::{DevAddr, FCtrl, FrameHeader, MType, Major, MHDR, MIC_LEN};
use super::Error;
use crate::device::radio_buffer::RadioBuffer;

/// DataPayloadCreator serves for creating binary representation of Physical
/// Payload of DataUp or DataDown messages.
///
/// # Example
///
/// ```
/// use lorawan_sim::device::radio_buffer::RadioBuffer;
/// use lorawan_sim::encoding::creator::DataPayloadCreator;
///
/// let mut out: RadioBuffer<64> = RadioBuffer::new();
/// DataPayloadCreator::new()
///     .set_uplink(true)
///     .set_confirmed(false)
///     .set_dev_addr(0x2601_1234u32)
///     .set_fcnt(1)
///     .set_f_port(1)
///     .build(b"hello", &[], &mut out)
///     .unwrap();
/// assert_eq!(out.len(), 1 + 7 + 1 + 5 + 4);
/// ```
#[derive(Debug, Clone)]
pub struct DataPayloadCreator {
    uplink: bool,
    confirmed: bool,
    dev_addr: DevAddr,
    fctrl: FCtrl,
    fcnt: u16,
    f_port: Option<u8>,
}

impl Default for DataPayloadCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPayloadCreator {
    /// An unconfirmed uplink with everything else zero.
    pub fn new() -> Self {
        Self {
            uplink: true,
            confirmed: false,
            dev_addr: DevAddr::default(),
            fctrl: FCtrl::new(0, true),
            fcnt: 0,
            f_port: None,
        }
    }

    /// Sets whether the packet is uplink or downlink.
    pub fn set_uplink(&mut self, uplink: bool) -> &mut Self {
        self.uplink = uplink;
        self.fctrl.1 = uplink;
        self
    }

    /// Sets whether the packet is confirmed or unconfirmed.
    pub fn set_confirmed(&mut self, confirmed: bool) -> &mut Self {
        self.confirmed = confirmed;
        self
    }

    /// Sets the device address of the DataPayload to the provided value.
    pub fn set_dev_addr<T: Into<DevAddr>>(&mut self, dev_addr: T) -> &mut Self {
        self.dev_addr = dev_addr.into();
        self
    }

    /// Sets the FCtrl header; FOptsLen is recomputed on build.
    pub fn set_fctrl(&mut self, fctrl: &FCtrl) -> &mut Self {
        self.fctrl = FCtrl::new(fctrl.raw_value(), self.uplink);
        self
    }

    /// Sets the FCnt header of the DataPayload packet to the specified value.
    pub fn set_fcnt(&mut self, fcnt: u16) -> &mut Self {
        self.fcnt = fcnt;
        self
    }

    /// Sets the FPort of the DataPayload packet.
    ///
    /// With port 0 the MAC commands are carried in FRMPayload instead of FOpts.
    pub fn set_f_port(&mut self, f_port: u8) -> &mut Self {
        self.f_port = Some(f_port);
        self
    }

    /// Writes the frame into `out`: MHDR, FHDR, optional FPort, FRMPayload and a zero MIC.
    pub fn build<const N: usize>(
        &self,
        payload: &[u8],
        cmds: &[MacCommand],
        out: &mut RadioBuffer<N>,
    ) -> Result<(), Error> {
        if cmds.iter().any(|cmd| cmd.uplink() != self.uplink) {
            return Err(Error::WrongDirection);
        }
        let port_zero = self.f_port == Some(0);
        if port_zero && !payload.is_empty() {
            return Err(Error::DataAndMacCommandsInPayloadNotAllowed);
        }
        if self.f_port.is_none() && !payload.is_empty() {
            return Err(Error::MissingFPort);
        }

        let mut fhdr = FrameHeader::new(self.dev_addr, self.uplink, self.fcnt);
        fhdr.fctrl = self.fctrl;
        if !port_zero {
            for cmd in cmds {
                fhdr.push_command(*cmd)?;
            }
        }

        out.clear();
        let mhdr = MHDR::from_parts(MType::data(self.uplink, self.confirmed), Major::LoRaWANR1);
        out.push(mhdr.raw_value()).map_err(|_| Error::BufferTooSmall)?;
        fhdr.write(out)?;
        if let Some(port) = self.f_port {
            out.push(port).map_err(|_| Error::BufferTooSmall)?;
        }
        if port_zero {
            for cmd in cmds {
                out.push(cmd.cid()).map_err(|_| Error::BufferTooSmall)?;
                out.extend_from_slice(cmd.payload_bytes()).map_err(|_| Error::BufferTooSmall)?;
            }
        } else {
            out.extend_from_slice(payload).map_err(|_| Error::BufferTooSmall)?;
        }
        out.extend_from_slice(&[0; MIC_LEN]).map_err(|_| Error::BufferTooSmall)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoding::maccommands::*;
    use crate::encoding::parser::DataFrame;

    #[test]
    fn uplink_with_fopts_parses_back() {
        let mut out: RadioBuffer<64> = RadioBuffer::new();
        let mut ans = LinkADRAnsPayload::default();
        ans.set_tx_power_ack(true).set_data_rate_ack(true).set_channel_mask_ack(true);
        let mut fctrl = FCtrl::new(0, true);
        fctrl.set_adr(true);
        DataPayloadCreator::new()
            .set_confirmed(true)
            .set_dev_addr(7u32)
            .set_fctrl(&fctrl)
            .set_fcnt(42)
            .set_f_port(10)
            .build(&[1, 2, 3], &[ans.into(), LinkCheckReqPayload::default().into()], &mut out)
            .unwrap();

        let frame = DataFrame::parse(out.as_ref()).unwrap();
        assert_eq!(frame.mtype(), MType::ConfirmedDataUp);
        assert_eq!(frame.fhdr().dev_addr.value(), 7);
        assert_eq!(frame.fhdr().fcnt, 42);
        assert!(frame.fhdr().fctrl.adr());
        assert_eq!(frame.fhdr().fctrl.f_opts_len(), 3);
        assert_eq!(frame.f_port(), Some(10));
        assert_eq!(frame.frm_payload(), &[1, 2, 3]);
        assert_eq!(frame.mac_commands().count(), 2);
    }

    #[test]
    fn port_zero_carries_commands_in_payload() {
        let mut out: RadioBuffer<64> = RadioBuffer::new();
        let mut creator = DataPayloadCreator::new();
        creator.set_uplink(false).set_f_port(0);
        creator.build(&[], &[DevStatusReqPayload::default().into()], &mut out).unwrap();
        let frame = DataFrame::parse(out.as_ref()).unwrap();
        assert_eq!(frame.fhdr().fctrl.f_opts_len(), 0);
        assert_eq!(frame.frm_payload(), &[0x06]);

        assert_eq!(
            creator.build(&[1], &[], &mut out),
            Err(Error::DataAndMacCommandsInPayloadNotAllowed)
        );
    }

    #[test]
    fn build_rejects_bad_input() {
        let mut out: RadioBuffer<64> = RadioBuffer::new();
        assert_eq!(DataPayloadCreator::new().build(&[1], &[], &mut out), Err(Error::MissingFPort));
        assert_eq!(
            DataPayloadCreator::new().build(&[], &[DevStatusReqPayload::default().into()], &mut out),
            Err(Error::WrongDirection)
        );
        let mut small: RadioBuffer<8> = RadioBuffer::new();
        assert_eq!(
            DataPayloadCreator::new().set_f_port(1).build(&[0; 4], &[], &mut small),
            Err(Error::BufferTooSmall)
        );
    }
}
