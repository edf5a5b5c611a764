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

//! Byte-at-a-time frame recognizer.
//!
//! A parser is built for one kind of awaited frame. Anything that does not
//! fit the expected address and control bytes is dropped and the parser
//! resynchronizes on the next FLAG; it never reports an error.

use crate::frame::Frame;
use crate::protocol::*;

// ============================================================================
// Expected Frame
// ============================================================================

/// The frame an operation is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Set,
    UnnumberedAck,
    /// RR or REJ in reply to an information frame
    Acknowledgement,
    Information,
    /// DISC, as awaited by `awaiting`
    Disconnect { awaiting: Role },
}

impl Expect {
    pub fn address(self) -> u8 {
        match self {
            Expect::Disconnect { awaiting: Role::Sender } => A_RX,
            _ => A_TX,
        }
    }

    pub fn accepts(self, control: u8) -> bool {
        match self {
            Expect::Set => control == C_SET,
            Expect::UnnumberedAck => control == C_UA,
            Expect::Acknowledgement => matches!(control, C_RR0 | C_RR1 | C_REJ0 | C_REJ1),
            Expect::Information => matches!(control, C_I0 | C_I1),
            Expect::Disconnect { .. } => control == C_DISC,
        }
    }

    fn carries_data(self) -> bool {
        self == Expect::Information
    }
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Start,
    SawFlag,
    SawAddress,
    SawControl,
    InData,
    InEscape,
}

/// A complete frame pulled off the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub frame: Frame,
    /// BCC2 matched the data; always true for frames without data
    pub intact: bool,
}

pub struct FrameParser {
    expect: Expect,
    state: ParseState,
    control: u8,
    payload: Vec<u8>,
    running_bcc: u8,
    max_payload: usize,
}

impl FrameParser {
    /// `max_payload` bounds the data of an information frame; longer runs
    /// are dropped as noise.
    pub fn new(expect: Expect, max_payload: usize) -> Self {
        FrameParser {
            expect,
            state: ParseState::Start,
            control: 0,
            payload: Vec::new(),
            running_bcc: 0,
            max_payload,
        }
    }

    pub fn reset(&mut self) {
        self.state = ParseState::Start;
        self.control = 0;
        self.payload.clear();
        self.running_bcc = 0;
    }

    fn resync(&mut self, byte: u8) {
        self.reset();
        if byte == FLAG {
            self.state = ParseState::SawFlag;
        }
    }

    /// Feed one byte; returns the frame it completes, if any.
    pub fn feed(&mut self, byte: u8) -> Option<Decoded> {
        match self.state {
            ParseState::Start => {
                if byte == FLAG {
                    self.state = ParseState::SawFlag;
                }
                None
            }
            ParseState::SawFlag => {
                if byte == self.expect.address() {
                    self.state = ParseState::SawAddress;
                } else {
                    self.resync(byte);
                }
                None
            }
            ParseState::SawAddress => {
                if self.expect.accepts(byte) {
                    self.control = byte;
                    self.state = ParseState::SawControl;
                } else {
                    self.resync(byte);
                }
                None
            }
            ParseState::SawControl => {
                if byte != self.expect.address() ^ self.control {
                    self.resync(byte);
                    return None;
                }
                if self.expect.carries_data() {
                    self.state = ParseState::InData;
                    return None;
                }
                let frame = Frame::from_parts(self.control, Vec::new());
                self.reset();
                frame.map(|frame| Decoded { frame, intact: true })
            }
            ParseState::InData => match byte {
                FLAG => self.finish_information(),
                ESC => {
                    self.state = ParseState::InEscape;
                    None
                }
                _ => {
                    self.push_data(byte);
                    None
                }
            },
            ParseState::InEscape => {
                if byte == FLAG {
                    // Aborted frame; this FLAG may open the next one
                    self.resync(byte);
                } else {
                    self.push_data(byte ^ ESC_MASK);
                    self.state = ParseState::InData;
                }
                None
            }
        }
    }

    fn push_data(&mut self, byte: u8) {
        // Data plus the trailing BCC2
        if self.payload.len() > self.max_payload {
            tracing::trace!(max = self.max_payload, "oversized frame dropped");
            self.reset();
            return;
        }
        self.payload.push(byte);
        self.running_bcc ^= byte;
    }

    fn finish_information(&mut self) -> Option<Decoded> {
        let Some(received_bcc) = self.payload.pop() else {
            // FLAG straight after the header: no BCC2, start over on this FLAG
            self.resync(FLAG);
            return None;
        };
        let data_bcc = self.running_bcc ^ received_bcc;
        let intact = data_bcc == received_bcc;

        let payload = std::mem::take(&mut self.payload);
        let frame = Frame::from_parts(self.control, payload);
        self.reset();
        frame.map(|frame| Decoded { frame, intact })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_information;

    fn feed_all(parser: &mut FrameParser, bytes: &[u8]) -> Vec<Decoded> {
        bytes.iter().filter_map(|&b| parser.feed(b)).collect()
    }

    fn decode_information(bytes: &[u8]) -> Vec<Decoded> {
        let mut parser = FrameParser::new(Expect::Information, MAX_PAYLOAD_SIZE);
        feed_all(&mut parser, bytes)
    }

    #[test]
    fn test_control_frame() {
        let mut parser = FrameParser::new(Expect::UnnumberedAck, MAX_PAYLOAD_SIZE);
        let decoded = feed_all(&mut parser, &Frame::UnnumberedAck.encode(Role::Receiver));
        // The closing FLAG is read as the opening flag of the next frame
        assert_eq!(decoded, vec![Decoded { frame: Frame::UnnumberedAck, intact: true }]);
    }

    #[test]
    fn test_noise_before_frame() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        let mut bytes = vec![0x00, 0x03, 0x55, 0xFF];
        bytes.extend_from_slice(&Frame::Set.encode(Role::Sender));
        assert_eq!(feed_all(&mut parser, &bytes).len(), 1);
    }

    #[test]
    fn test_repeated_flags_resync() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        let decoded = feed_all(&mut parser, &[FLAG, FLAG, FLAG, A_TX, C_SET, A_TX ^ C_SET, FLAG]);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_flag_mid_header_restarts() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        let decoded = feed_all(&mut parser, &[FLAG, A_TX, FLAG, A_TX, C_SET, A_TX ^ C_SET, FLAG]);
        assert_eq!(decoded.len(), 1);

        let decoded = feed_all(&mut parser, &[FLAG, A_TX, C_SET, FLAG, A_TX, C_SET, A_TX ^ C_SET]);
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_bad_header_checksum_rejected() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        assert!(feed_all(&mut parser, &[FLAG, A_TX, C_SET, 0x01, FLAG]).is_empty());
    }

    #[test]
    fn test_wrong_control_ignored() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        assert!(feed_all(&mut parser, &Frame::UnnumberedAck.encode(Role::Receiver)).is_empty());
    }

    #[test]
    fn test_disconnect_address_depends_on_awaiting_role() {
        let from_receiver = Frame::Disconnect.encode(Role::Receiver);
        let from_sender = Frame::Disconnect.encode(Role::Sender);

        let mut sender_side = FrameParser::new(Expect::Disconnect { awaiting: Role::Sender }, MAX_PAYLOAD_SIZE);
        assert!(feed_all(&mut sender_side, &from_sender).is_empty());
        assert_eq!(feed_all(&mut sender_side, &from_receiver).len(), 1);

        let mut receiver_side = FrameParser::new(Expect::Disconnect { awaiting: Role::Receiver }, MAX_PAYLOAD_SIZE);
        assert!(feed_all(&mut receiver_side, &from_receiver).is_empty());
        assert_eq!(feed_all(&mut receiver_side, &from_sender).len(), 1);
    }

    #[test]
    fn test_acknowledgements() {
        let mut parser = FrameParser::new(Expect::Acknowledgement, MAX_PAYLOAD_SIZE);
        for frame in [
            Frame::ReceiverReady(Sequence::Zero),
            Frame::ReceiverReady(Sequence::One),
            Frame::Reject(Sequence::Zero),
            Frame::Reject(Sequence::One),
        ] {
            let decoded = feed_all(&mut parser, &frame.encode(Role::Receiver));
            assert_eq!(decoded, vec![Decoded { frame, intact: true }]);
        }
    }

    #[test]
    fn test_information_round_trip() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x7E],
            vec![0x7D],
            vec![0x7E, 0x01, 0x7D],
            vec![0x7D, 0x7E, 0x7D, 0x7E],
            vec![0x5E, 0x5D, 0x20],
            (0..=255).collect(),
        ];

        for payload in payloads {
            for seq in [Sequence::Zero, Sequence::One] {
                let decoded = decode_information(&encode_information(&payload, A_TX, seq));
                assert_eq!(
                    decoded,
                    vec![Decoded { frame: Frame::Information(seq, payload.clone()), intact: true }],
                    "payload {:02X?}",
                    payload
                );
            }
        }
    }

    #[test]
    fn test_single_bit_flip_detected() {
        let payload = vec![0x7E, 0x01, 0x7D, 0x42, 0x00, 0xFF];
        let encoded = encode_information(&payload, A_TX, Sequence::One);

        for i in 4..encoded.len() - 1 {
            for bit in 0..8 {
                let flipped = encoded[i] ^ (1 << bit);
                if flipped == FLAG || flipped == ESC {
                    continue;
                }
                let mut corrupted = encoded.clone();
                corrupted[i] = flipped;

                let decoded = decode_information(&corrupted);
                assert_eq!(decoded.len(), 1, "byte {} bit {}", i, bit);
                assert!(!decoded[0].intact, "byte {} bit {} went unnoticed", i, bit);
                assert!(matches!(decoded[0].frame, Frame::Information(Sequence::One, _)));
            }
        }
    }

    #[test]
    fn test_flag_after_header_is_not_a_frame() {
        let mut bytes = vec![FLAG, A_TX, C_I0, A_TX ^ C_I0];
        bytes.extend_from_slice(&encode_information(&[9], A_TX, Sequence::Zero));
        let decoded = decode_information(&bytes);
        assert_eq!(decoded, vec![Decoded { frame: Frame::Information(Sequence::Zero, vec![9]), intact: true }]);
    }

    #[test]
    fn test_escape_then_flag_aborts() {
        let mut bytes = vec![FLAG, A_TX, C_I0, A_TX ^ C_I0, 0x11, ESC];
        bytes.extend_from_slice(&encode_information(&[7, 8], A_TX, Sequence::Zero));
        let decoded = decode_information(&bytes);
        assert_eq!(decoded, vec![Decoded { frame: Frame::Information(Sequence::Zero, vec![7, 8]), intact: true }]);
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut parser = FrameParser::new(Expect::Information, 4);
        let long = encode_information(&[1, 2, 3, 4, 5, 6], A_TX, Sequence::Zero);
        assert!(feed_all(&mut parser, &long).is_empty());

        let fits = encode_information(&[1, 2, 3, 4], A_TX, Sequence::Zero);
        assert_eq!(feed_all(&mut parser, &fits).len(), 1);
    }

    #[test]
    fn test_reset_discards_partial_frame() {
        let mut parser = FrameParser::new(Expect::Set, MAX_PAYLOAD_SIZE);
        assert!(feed_all(&mut parser, &[FLAG, A_TX, C_SET]).is_empty());
        parser.reset();
        assert!(feed_all(&mut parser, &[A_TX ^ C_SET, FLAG]).is_empty());
    }
}
