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

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, Parity, StopBits};

// ============================================================================
// ByteChannel Trait
// ============================================================================

/// Byte-oriented channel the link layer runs over
pub trait ByteChannel: Send {
    /// Write the whole buffer and flush it; returns the number of bytes written
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Wait up to `poll` for one byte; `None` if nothing arrived
    fn read_byte(&mut self, poll: Duration) -> std::io::Result<Option<u8>>;
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Serial line opened through the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
    poll: Duration,
}

impl RealSerialPort {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let poll = crate::protocol::POLL_INTERVAL;
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(poll)
            .open()?;

        // Stale bytes from a previous session would only confuse the parser
        port.clear(serialport::ClearBuffer::All)?;

        Ok(RealSerialPort { port, poll })
    }
}

impl ByteChannel for RealSerialPort {
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(buf.len())
    }

    fn read_byte(&mut self, poll: Duration) -> std::io::Result<Option<u8>> {
        if poll != self.poll {
            self.port.set_timeout(poll)
                .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
            self.poll = poll;
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

/// Silent polls after the script runs out before a read fails outright
#[cfg(test)]
const MOCK_IDLE_LIMIT: usize = 100_000;

/// Scripted channel: `Some(byte)` is delivered, `None` is a silent poll that
/// advances the shared clock by the poll interval.
#[cfg(test)]
pub struct MockSerialPort {
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    idle_polls: usize,
    write_log: Vec<u8>,
    expected_writes: Vec<u8>,
    clock: crate::timer::MockClock,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>, clock: crate::timer::MockClock) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            idle_polls: 0,
            write_log: Vec::new(),
            expected_writes,
            clock,
        }
    }
}

/// Enough silent polls for a timer of `timeout` to run out
#[cfg(test)]
pub fn silence(timeout: Duration) -> Vec<Option<u8>> {
    let polls = timeout.as_millis().div_ceil(crate::protocol::POLL_INTERVAL.as_millis());
    vec![None; polls as usize]
}

/// Script entries delivering `bytes` back to back
#[cfg(test)]
pub fn bytes(bytes: &[u8]) -> Vec<Option<u8>> {
    bytes.iter().map(|&b| Some(b)).collect()
}

#[cfg(test)]
impl ByteChannel for MockSerialPort {
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_log.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn read_byte(&mut self, poll: Duration) -> std::io::Result<Option<u8>> {
        if self.read_pos >= self.read_buffer.len() {
            self.idle_polls += 1;
            if self.idle_polls > MOCK_IDLE_LIMIT {
                return Err(std::io::Error::new(ErrorKind::TimedOut, "Mock script exhausted"));
            }
            self.clock.advance(poll);
            return Ok(None);
        }

        let next = self.read_buffer[self.read_pos];
        self.read_pos += 1;
        if next.is_none() {
            self.clock.advance(poll);
        }
        Ok(next)
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        // Control frames complete on their header checksum, so the closing
        // FLAG of the last one may still be on the line
        let unconsumed = &self.read_buffer[self.read_pos..];
        assert!(
            unconsumed.iter().all(|b| *b == Some(crate::protocol::FLAG)),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {}): {:02X?}",
            unconsumed.len(),
            self.read_pos,
            self.read_buffer.len(),
            unconsumed
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

// ============================================================================
// In-Memory Pipe for End-to-End Tests
// ============================================================================

/// One end of a full-duplex in-memory line
#[cfg(test)]
pub struct PipeChannel {
    tx: std::sync::mpsc::Sender<u8>,
    rx: std::sync::mpsc::Receiver<u8>,
}

#[cfg(test)]
pub fn pipe_pair() -> (PipeChannel, PipeChannel) {
    let (a_tx, b_rx) = std::sync::mpsc::channel();
    let (b_tx, a_rx) = std::sync::mpsc::channel();
    (PipeChannel { tx: a_tx, rx: a_rx }, PipeChannel { tx: b_tx, rx: b_rx })
}

#[cfg(test)]
impl ByteChannel for PipeChannel {
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for &b in buf {
            // A peer that already hung up just loses the bytes, like a real line
            let _ = self.tx.send(b);
        }
        Ok(buf.len())
    }

    fn read_byte(&mut self, poll: Duration) -> std::io::Result<Option<u8>> {
        match self.rx.recv_timeout(poll) {
            Ok(b) => Ok(Some(b)),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "peer closed the pipe"))
            }
        }
    }
}
