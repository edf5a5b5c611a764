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

//! Link layer wire constants

use std::time::Duration;

/// Frame delimiter - opens and closes every frame
pub const FLAG: u8 = 0x7E;

/// Escape - the next byte is XORed with `ESC_MASK` to recover FLAG or ESC
pub const ESC: u8 = 0x7D;

/// Mask applied to the byte following an escape
pub const ESC_MASK: u8 = 0x20;

/// Address for commands from the transmitter and replies to them
pub const A_TX: u8 = 0x03;

/// Address for the receiver's own disconnect request
pub const A_RX: u8 = 0x01;

/// Set up - transmitter requests a connection
pub const C_SET: u8 = 0x03;

/// Unnumbered acknowledgment - confirms SET or DISC
pub const C_UA: u8 = 0x07;

/// Disconnect - either side requests teardown
pub const C_DISC: u8 = 0x0B;

/// Information frame carrying sequence bit 0
pub const C_I0: u8 = 0x00;

/// Information frame carrying sequence bit 1
pub const C_I1: u8 = 0x40;

/// Receiver ready, expecting sequence bit 0
pub const C_RR0: u8 = 0x05;

/// Receiver ready, expecting sequence bit 1
pub const C_RR1: u8 = 0x85;

/// Reject, resend the frame with sequence bit 0
pub const C_REJ0: u8 = 0x01;

/// Reject, resend the frame with sequence bit 1
pub const C_REJ1: u8 = 0x81;

/// Largest payload the application layer may hand to a single `send`
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// How long a single read waits for a byte before yielding to the timer
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Role & Sequence
// ============================================================================

/// Which end of the link a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Modulo-2 sequence number of an information frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Zero,
    One,
}

impl Sequence {
    pub fn flip(self) -> Self {
        match self {
            Sequence::Zero => Sequence::One,
            Sequence::One => Sequence::Zero,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Sequence::Zero => 0,
            Sequence::One => 1,
        }
    }

    pub fn information_control(self) -> u8 {
        match self {
            Sequence::Zero => C_I0,
            Sequence::One => C_I1,
        }
    }

    pub fn ready_control(self) -> u8 {
        match self {
            Sequence::Zero => C_RR0,
            Sequence::One => C_RR1,
        }
    }

    pub fn reject_control(self) -> u8 {
        match self {
            Sequence::Zero => C_REJ0,
            Sequence::One => C_REJ1,
        }
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes_never_need_stuffing() {
        let addresses = [A_TX, A_RX];
        let controls = [C_SET, C_UA, C_DISC, C_I0, C_I1, C_RR0, C_RR1, C_REJ0, C_REJ1];

        for a in addresses {
            for c in controls {
                for byte in [a, c, a ^ c] {
                    assert_ne!(byte, FLAG, "A=0x{:02X} C=0x{:02X}", a, c);
                    assert_ne!(byte, ESC, "A=0x{:02X} C=0x{:02X}", a, c);
                }
            }
        }
    }

    #[test]
    fn test_sequence_controls() {
        assert_eq!(Sequence::Zero.flip(), Sequence::One);
        assert_eq!(Sequence::One.flip().flip(), Sequence::One);
        assert_eq!(Sequence::One.information_control(), 0x40);
        assert_eq!(Sequence::One.ready_control(), 0x85);
        assert_eq!(Sequence::Zero.reject_control(), 0x01);
    }
}
