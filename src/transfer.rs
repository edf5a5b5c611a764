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

//! Stop-and-wait transfer of information frames over an open session.

use crate::error::LinkError;
use crate::frame::Frame;
use crate::parser::{Expect, FrameParser};
use crate::protocol::*;
use crate::session::{Open, Session};

/// Stale RRs that restore the retry budget during one `send`; past this
/// they use up attempts like a timeout does
const STALE_ACK_LIMIT: u32 = 8;

impl Session<Open> {
    /// Send one payload and wait until the peer acknowledges it.
    ///
    /// Returns the number of payload bytes delivered. Fails with
    /// `TransferExhausted` once `retry_budget + 1` transmissions in a row go
    /// unanswered or are rejected. An RR repeating the current sequence bit
    /// restarts the count, up to `STALE_ACK_LIMIT` times.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        if payload.len() > self.max_payload {
            return Err(LinkError::PayloadTooLarge { len: payload.len(), max: self.max_payload });
        }

        let seq = self.sequence;
        let frame = Frame::Information(seq, payload.to_vec()).encode(self.role);
        let budget = self.retry_budget + 1;
        let mut attempts_left = budget;
        let mut transmissions = 0u32;
        let mut stale_acks = 0u32;
        let mut parser = FrameParser::new(Expect::Acknowledgement, self.max_payload);

        while attempts_left > 0 {
            attempts_left -= 1;
            if transmissions > 0 {
                self.stats.retransmissions += 1;
            }
            transmissions += 1;
            tracing::debug!(seq = %seq, len = payload.len(), attempt = transmissions, "sending I frame");
            self.transmit_information(&frame)?;

            let Some(decoded) = self.await_frame(&mut parser, Some(self.timeout))? else {
                self.stats.timeouts += 1;
                tracing::warn!(seq = %seq, attempt = transmissions, "acknowledgement timed out");
                continue;
            };

            match decoded.frame {
                Frame::ReceiverReady(next) if next != seq => {
                    self.sequence = next;
                    tracing::debug!(seq = %seq, next = %next, "I frame acknowledged");
                    return Ok(payload.len());
                }
                Frame::ReceiverReady(_) => {
                    stale_acks += 1;
                    if stale_acks <= STALE_ACK_LIMIT {
                        attempts_left = budget;
                    }
                    tracing::debug!(seq = %seq, stale_acks, "stale RR, retransmitting");
                }
                Frame::Reject(rejected) if rejected == seq => {
                    tracing::debug!(seq = %seq, "I frame rejected, retransmitting");
                }
                Frame::Reject(rejected) => {
                    tracing::debug!(seq = %seq, rejected = %rejected, "REJ for the other frame, retransmitting");
                }
                _ => {}
            }
        }

        Err(LinkError::TransferExhausted { attempts: transmissions })
    }

    /// Block until the next new payload arrives intact.
    ///
    /// Corrupted frames are rejected and retransmissions of an already
    /// delivered frame are acknowledged again and dropped.
    pub fn receive(&mut self) -> Result<Vec<u8>, LinkError> {
        let mut parser = FrameParser::new(Expect::Information, self.max_payload);

        loop {
            let Some(decoded) = self.await_frame(&mut parser, None)? else {
                continue;
            };
            let Frame::Information(seq, payload) = decoded.frame else {
                continue;
            };
            if let Some(payload) = self.acknowledge(decoded.intact, seq, payload)? {
                return Ok(payload);
            }
        }
    }

    /// Reply to an information frame; returns the payload if it is to be
    /// delivered.
    fn acknowledge(&mut self, intact: bool, seq: Sequence, payload: Vec<u8>) -> Result<Option<Vec<u8>>, LinkError> {
        let expected = self.sequence;

        if !intact {
            self.stats.error_frames_received += 1;
            if seq == expected {
                tracing::debug!(seq = %seq, "bad BCC2, rejecting");
                self.send_frame(&Frame::Reject(expected))?;
            } else {
                tracing::debug!(seq = %seq, "bad BCC2 on an old frame");
                self.send_frame(&Frame::ReceiverReady(expected))?;
            }
            return Ok(None);
        }

        if seq != expected {
            tracing::debug!(seq = %seq, expected = %expected, "duplicate I frame dropped");
            self.send_frame(&Frame::ReceiverReady(expected))?;
            return Ok(None);
        }

        self.sequence = expected.flip();
        self.send_frame(&Frame::ReceiverReady(self.sequence))?;
        tracing::debug!(seq = %seq, len = payload.len(), "I frame delivered");
        Ok(Some(payload))
    }

    fn transmit_information(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        match self.injector.as_mut().and_then(|injector| injector.corrupt(frame)) {
            Some(corrupted) => {
                self.stats.error_frames_sent += 1;
                tracing::debug!("sending deliberately corrupted I frame");
                self.transmit(&corrupted)
            }
            None => self.transmit(frame),
        }
    }
}


#[cfg(test)]
mod pipe_tests {
    use super::*;
    use crate::serial::pipe_pair;
    use crate::session::pipe_session;

    fn payloads() -> Vec<Vec<u8>> {
        (0..20u8)
            .map(|i| {
                let mut p = vec![FLAG, ESC, i];
                p.extend(std::iter::repeat(i.wrapping_mul(31)).take(i as usize * 10));
                p
            })
            .collect()
    }

    fn run_link(frame_error_rate: f64) {
        crate::logging::init_for_tests();
        let (a, b) = pipe_pair();

        let receiver = std::thread::spawn(move || {
            let mut session = pipe_session(Role::Receiver, b, 10, 0.0, 0).open()?;
            let mut received = Vec::new();
            for _ in 0..20 {
                received.push(session.receive()?);
            }
            let stats = session.close(false)?;
            Ok::<_, LinkError>((received, stats))
        });

        let mut session = pipe_session(Role::Sender, a, 10, frame_error_rate, 7).open().unwrap();
        for payload in payloads() {
            assert_eq!(session.send(&payload).unwrap(), payload.len());
        }
        let sender_stats = session.close(false).unwrap();

        let (received, receiver_stats) = receiver.join().unwrap().unwrap();
        assert_eq!(received, payloads());
        assert_eq!(sender_stats.error_frames_sent, receiver_stats.error_frames_received);
    }

    #[test]
    fn test_clean_line_delivers_in_order() {
        run_link(0.0);
    }

    #[test]
    fn test_corrupted_frames_are_resent() {
        run_link(0.3);
    }
}
