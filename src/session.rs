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

use std::marker::PhantomData;
use std::time::Duration;
use serialport::{DataBits, Parity, StopBits};
use crate::error::LinkError;
use crate::fault::FaultInjector;
use crate::frame::Frame;
use crate::parser::{Decoded, Expect, FrameParser};
use crate::protocol::*;
use crate::serial::{ByteChannel, RealSerialPort};
use crate::stats::Statistics;
use crate::timer::{Clock, SystemClock, Timer};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub role: Role,
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Retransmissions allowed per operation, on top of the first attempt
    pub retry_budget: u32,
    pub timeout_secs: u32,
    pub max_payload: usize,
    /// Probability of deliberately corrupting an outgoing information frame
    pub frame_error_rate: f64,
}

impl LinkConfig {
    pub fn new(role: Role, port: impl Into<String>) -> Self {
        LinkConfig {
            role,
            port: port.into(),
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            retry_budget: 3,
            timeout_secs: 4,
            max_payload: MAX_PAYLOAD_SIZE,
            frame_error_rate: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if self.retry_budget == 0 {
            return Err(LinkError::InvalidConfig("retry budget must be positive".into()));
        }
        if self.timeout_secs == 0 {
            return Err(LinkError::InvalidConfig("timeout must be positive".into()));
        }
        if self.max_payload == 0 {
            return Err(LinkError::InvalidConfig("maximum payload must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.frame_error_rate) {
            return Err(LinkError::InvalidConfig(format!(
                "frame error rate {} is outside [0, 1]",
                self.frame_error_rate
            )));
        }
        Ok(())
    }
}

// ============================================================================
// States
// ============================================================================

pub struct Closed;
pub struct Open;

// ============================================================================
// Session Structure
// ============================================================================

/// All protocol state for one connection.
///
/// `Session<Closed>` can only be opened; `Session<Open>` can send, receive
/// and close. Closing consumes the session and releases the channel.
pub struct Session<State> {
    state: PhantomData<State>,
    pub(crate) role: Role,
    pub(crate) channel: Box<dyn ByteChannel>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) retry_budget: u32,
    pub(crate) timeout: Duration,
    pub(crate) max_payload: usize,
    /// Sender: bit of the next frame to send. Receiver: bit expected next.
    pub(crate) sequence: Sequence,
    pub(crate) stats: Statistics,
    pub(crate) injector: Option<FaultInjector>,
}

/// Open the serial line named in `config` and run the opening handshake.
pub fn open(config: &LinkConfig) -> Result<Session<Open>, LinkError> {
    config.validate()?;
    let port = RealSerialPort::open(
        &config.port,
        config.baud_rate,
        config.data_bits,
        config.parity,
        config.stop_bits,
    )
    .map_err(|source| LinkError::ChannelUnavailable { port: config.port.clone(), source })?;

    tracing::debug!(port = %config.port, baud = config.baud_rate, "serial port opened");
    Session::<Closed>::new(config, Box::new(port), Box::new(SystemClock::new()))?.open()
}

// ============================================================================
// Helpers shared by every state
// ============================================================================

impl<S> Session<S> {
    fn transition<T>(self) -> Session<T> {
        Session {
            state: PhantomData,
            role: self.role,
            channel: self.channel,
            clock: self.clock,
            retry_budget: self.retry_budget,
            timeout: self.timeout,
            max_payload: self.max_payload,
            sequence: self.sequence,
            stats: self.stats,
            injector: self.injector,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Write one already-encoded frame.
    pub(crate) fn transmit(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let written = self.channel.write_bytes(bytes)?;
        self.stats.bytes_sent += written as u64;
        self.stats.frames_sent += 1;
        tracing::trace!(bytes = ?bytes, "frame written");
        Ok(())
    }

    pub(crate) fn send_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        tracing::debug!(frame = frame.name(), "sending");
        let bytes = frame.encode(self.role);
        self.transmit(&bytes)
    }

    /// Poll the channel until `parser` completes a frame or `timeout` runs
    /// out. Without a timeout this blocks until a frame arrives.
    pub(crate) fn await_frame(
        &mut self,
        parser: &mut FrameParser,
        timeout: Option<Duration>,
    ) -> Result<Option<Decoded>, LinkError> {
        parser.reset();
        let timer = timeout.map(|t| Timer::start(self.clock.as_ref(), t));

        loop {
            if let Some(timer) = &timer {
                if timer.expired(self.clock.as_ref()) {
                    return Ok(None);
                }
            }

            let Some(byte) = self.channel.read_byte(POLL_INTERVAL)? else {
                continue;
            };
            self.stats.bytes_received += 1;

            if let Some(decoded) = parser.feed(byte) {
                self.stats.frames_received += 1;
                tracing::trace!(frame = decoded.frame.name(), intact = decoded.intact, "frame read");
                return Ok(Some(decoded));
            }
        }
    }

    /// Send `frame` and wait for the `expect`ed reply, retransmitting on
    /// every timeout until the retry budget is spent.
    pub(crate) fn exchange(&mut self, frame: &Frame, expect: Expect) -> Result<Decoded, LinkError> {
        let bytes = frame.encode(self.role);
        let attempts = self.retry_budget + 1;
        let mut parser = FrameParser::new(expect, self.max_payload);

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.stats.retransmissions += 1;
                tracing::warn!(frame = frame.name(), attempt, "no reply, retransmitting");
            }
            tracing::debug!(frame = frame.name(), attempt, "sending");
            self.transmit(&bytes)?;

            if let Some(decoded) = self.await_frame(&mut parser, Some(self.timeout))? {
                return Ok(decoded);
            }
            self.stats.timeouts += 1;
        }

        Err(LinkError::HandshakeTimeout { frame: frame.name(), attempts })
    }
}

// ============================================================================
// Opening
// ============================================================================

impl Session<Closed> {
    pub fn new(config: &LinkConfig, channel: Box<dyn ByteChannel>, clock: Box<dyn Clock>) -> Result<Self, LinkError> {
        config.validate()?;
        let injector = (config.frame_error_rate > 0.0).then(|| FaultInjector::new(config.frame_error_rate));
        Ok(Session {
            state: PhantomData,
            role: config.role,
            channel,
            clock,
            retry_budget: config.retry_budget,
            timeout: Duration::from_secs(config.timeout_secs as u64),
            max_payload: config.max_payload,
            sequence: Sequence::Zero,
            stats: Statistics::default(),
            injector,
        })
    }

    /// Run the SET/UA handshake for this session's role.
    pub fn open(mut self) -> Result<Session<Open>, LinkError> {
        match self.role {
            Role::Sender => {
                self.exchange(&Frame::Set, Expect::UnnumberedAck)?;
            }
            Role::Receiver => {
                let mut parser = FrameParser::new(Expect::Set, self.max_payload);
                self.await_frame(&mut parser, None)?;
                self.send_frame(&Frame::UnnumberedAck)?;
            }
        }

        tracing::info!(role = ?self.role, "link established");
        Ok(self.transition::<Open>())
    }
}

// ============================================================================
// Closing
// ============================================================================

impl Session<Open> {
    /// Run the DISC/DISC/UA teardown and release the channel.
    pub fn close(mut self, report_stats: bool) -> Result<Statistics, LinkError> {
        match self.role {
            Role::Sender => {
                self.exchange(&Frame::Disconnect, Expect::Disconnect { awaiting: Role::Sender })?;
                self.send_frame(&Frame::UnnumberedAck)?;
            }
            Role::Receiver => {
                let mut parser = FrameParser::new(Expect::Disconnect { awaiting: Role::Receiver }, self.max_payload);
                self.await_frame(&mut parser, None)?;
                self.exchange(&Frame::Disconnect, Expect::UnnumberedAck)?;
            }
        }

        let stats = self.stats;
        tracing::info!(role = ?self.role, "link closed");
        if report_stats {
            println!("{}", stats);
        }

        let _closed = self.transition::<Closed>();
        Ok(stats)
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

#[cfg(test)]
pub(crate) fn mock_session(
    role: Role,
    retry_budget: u32,
    timeout_secs: u32,
    responses: Vec<Option<u8>>,
    expected_writes: Vec<u8>,
) -> Session<Closed> {
    use crate::serial::MockSerialPort;
    use crate::timer::MockClock;

    let mut config = LinkConfig::new(role, "mock");
    config.retry_budget = retry_budget;
    config.timeout_secs = timeout_secs;

    let clock = MockClock::default();
    let port = MockSerialPort::new(responses, expected_writes, clock.clone());
    Session::<Closed>::new(&config, Box::new(port), Box::new(clock)).expect("valid mock config")
}

/// Session over one end of an in-memory pipe, on the wall clock.
#[cfg(test)]
pub(crate) fn pipe_session(
    role: Role,
    channel: crate::serial::PipeChannel,
    retry_budget: u32,
    frame_error_rate: f64,
    seed: u64,
) -> Session<Closed> {
    let mut config = LinkConfig::new(role, "pipe");
    config.retry_budget = retry_budget;
    config.timeout_secs = 1;

    let mut session = Session::<Closed>::new(&config, Box::new(channel), Box::new(SystemClock::new()))
        .expect("valid pipe config");
    if frame_error_rate > 0.0 {
        session.injector = Some(FaultInjector::seeded(frame_error_rate, seed));
    }
    session
}

#[cfg(test)]
impl Session<Closed> {
    /// Skip the handshake, for tests that start mid-connection.
    pub(crate) fn assume_open(self) -> Session<Open> {
        self.transition::<Open>()
    }
}
