// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Frame codec.
//!
//! ```text
//! supervision / unnumbered:  | FLAG | A | C | A^C | FLAG |
//! information:               | FLAG | A | C | A^C | stuffed(data) | stuffed(BCC2) | FLAG |
//! ```
//!
//! The four header bytes are sent verbatim; none of the address or control
//! values collide with FLAG or ESC. BCC2 is the XOR of the unstuffed data.

use crate::protocol::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Set,
    UnnumberedAck,
    Disconnect,
    ReceiverReady(Sequence),
    Reject(Sequence),
    Information(Sequence, Vec<u8>),
}

impl Frame {
    pub fn control(&self) -> u8 {
        match self {
            Frame::Set => C_SET,
            Frame::UnnumberedAck => C_UA,
            Frame::Disconnect => C_DISC,
            Frame::ReceiverReady(seq) => seq.ready_control(),
            Frame::Reject(seq) => seq.reject_control(),
            Frame::Information(seq, _) => seq.information_control(),
        }
    }

    /// Address field for this frame when sent by `from`.
    ///
    /// Everything travels under the transmitter address except the
    /// receiver's own DISC, which the sender awaits under `A_RX`.
    pub fn address(&self, from: Role) -> u8 {
        match (self, from) {
            (Frame::Disconnect, Role::Receiver) => A_RX,
            _ => A_TX,
        }
    }

    /// Rebuild a frame from a parsed control byte and, for information
    /// frames, the unstuffed data.
    pub fn from_parts(control: u8, payload: Vec<u8>) -> Option<Frame> {
        let frame = match control {
            C_SET => Frame::Set,
            C_UA => Frame::UnnumberedAck,
            C_DISC => Frame::Disconnect,
            C_RR0 => Frame::ReceiverReady(Sequence::Zero),
            C_RR1 => Frame::ReceiverReady(Sequence::One),
            C_REJ0 => Frame::Reject(Sequence::Zero),
            C_REJ1 => Frame::Reject(Sequence::One),
            C_I0 => Frame::Information(Sequence::Zero, payload),
            C_I1 => Frame::Information(Sequence::One, payload),
            _ => return None,
        };
        Some(frame)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Set => "SET",
            Frame::UnnumberedAck => "UA",
            Frame::Disconnect => "DISC",
            Frame::ReceiverReady(_) => "RR",
            Frame::Reject(_) => "REJ",
            Frame::Information(_, _) => "I",
        }
    }

    pub fn encode(&self, from: Role) -> Vec<u8> {
        let address = self.address(from);
        match self {
            Frame::Information(seq, payload) => encode_information(payload, address, *seq),
            _ => {
                let control = self.control();
                vec![FLAG, address, control, address ^ control, FLAG]
            }
        }
    }
}

/// Encode an information frame, stuffing the data and its checksum.
pub fn encode_information(payload: &[u8], address: u8, seq: Sequence) -> Vec<u8> {
    let control = seq.information_control();
    let mut out = Vec::with_capacity(4 + 2 * payload.len() + 2 + 1);
    out.extend_from_slice(&[FLAG, address, control, address ^ control]);

    let mut bcc2 = 0u8;
    for &byte in payload {
        bcc2 ^= byte;
        stuff(byte, &mut out);
    }
    stuff(bcc2, &mut out);

    out.push(FLAG);
    out
}

fn stuff(byte: u8, out: &mut Vec<u8>) {
    match byte {
        FLAG | ESC => {
            out.push(ESC);
            out.push(byte ^ ESC_MASK);
        }
        _ => out.push(byte),
    }
}
