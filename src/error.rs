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

//! Link layer error types

/// Fatal outcomes of a link operation.
///
/// Malformed frames, checksum mismatches and stray bytes are absorbed by the
/// state machines and never show up here; only exhausted retries and channel
/// faults do.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("channel unavailable: {port}: {source}")]
    ChannelUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("no reply to {frame} after {attempts} attempts")]
    HandshakeTimeout { frame: &'static str, attempts: u32 },
    #[error("information frame not acknowledged after {attempts} attempts")]
    TransferExhausted { attempts: u32 },
    #[error("channel error: {0}")]
    ChannelError(#[from] std::io::Error),
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
