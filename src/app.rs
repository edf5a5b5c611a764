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

//! File transfer on top of the link.
//!
//! ```text
//! data:     | 0x01 | L2 | L1 | data (L2*256 + L1 bytes) |
//! control:  | C | 0x00 | L | size (L bytes, big-endian) | 0x01 | L | name |
//! ```
//!
//! C is 0x02 for the start packet and 0x03 for the end packet; both carry
//! the same size and name.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use crate::error::LinkError;
use crate::session::{Open, Session};

/// Data packet
pub const PKT_DATA: u8 = 0x01;

/// Start of file control packet
pub const PKT_START: u8 = 0x02;

/// End of file control packet
pub const PKT_END: u8 = 0x03;

/// File size parameter of a control packet
pub const TLV_FILE_SIZE: u8 = 0x00;

/// File name parameter of a control packet
pub const TLV_FILE_NAME: u8 = 0x01;

/// Default data bytes per packet
pub const DEFAULT_PACKET_SIZE: usize = 256;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type 0x{0:02X}")]
    UnknownType(u8),
    #[error("packet truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("expected parameter 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedParameter { expected: u8, found: u8 },
    #[error("file size field of {0} bytes does not fit in 64 bits")]
    SizeTooLong(usize),
    #[error("file name of {0} bytes is too long")]
    NameTooLong(usize),
    #[error("data block of {0} bytes is too long")]
    DataTooLong(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),
    #[error("protocol error: {0}")]
    Protocol(String),
}

// ============================================================================
// Packets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start(FileInfo),
    Data(Vec<u8>),
    End(FileInfo),
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Packet::Data(data) => {
                if data.len() > u16::MAX as usize {
                    return Err(PacketError::DataTooLong(data.len()));
                }
                let mut out = Vec::with_capacity(3 + data.len());
                out.push(PKT_DATA);
                out.extend_from_slice(&(data.len() as u16).to_be_bytes());
                out.extend_from_slice(data);
                Ok(out)
            }
            Packet::Start(info) => encode_control(PKT_START, info),
            Packet::End(info) => encode_control(PKT_END, info),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
        let (&kind, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
        match kind {
            PKT_DATA => {
                let header = take(rest, 2)?;
                let len = u16::from_be_bytes([header[0], header[1]]) as usize;
                let data = take(&rest[2..], len)?;
                Ok(Packet::Data(data.to_vec()))
            }
            PKT_START => Ok(Packet::Start(decode_control(rest)?)),
            PKT_END => Ok(Packet::End(decode_control(rest)?)),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

fn take(bytes: &[u8], len: usize) -> Result<&[u8], PacketError> {
    bytes.get(..len).ok_or(PacketError::Truncated { expected: len, actual: bytes.len() })
}

fn encode_control(kind: u8, info: &FileInfo) -> Result<Vec<u8>, PacketError> {
    let size_bytes = info.size.to_be_bytes();
    let first = size_bytes.iter().position(|&b| b != 0).unwrap_or(size_bytes.len());
    let size = &size_bytes[first..];

    let name = info.name.as_bytes();
    if name.len() > u8::MAX as usize {
        return Err(PacketError::NameTooLong(name.len()));
    }

    let mut out = Vec::with_capacity(5 + size.len() + name.len());
    out.extend_from_slice(&[kind, TLV_FILE_SIZE, size.len() as u8]);
    out.extend_from_slice(size);
    out.extend_from_slice(&[TLV_FILE_NAME, name.len() as u8]);
    out.extend_from_slice(name);
    Ok(out)
}

fn decode_control(bytes: &[u8]) -> Result<FileInfo, PacketError> {
    let (size_field, rest) = decode_parameter(bytes, TLV_FILE_SIZE)?;
    if size_field.len() > 8 {
        return Err(PacketError::SizeTooLong(size_field.len()));
    }
    let size = size_field.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);

    let (name_field, _) = decode_parameter(rest, TLV_FILE_NAME)?;
    let name = String::from_utf8_lossy(name_field).into_owned();

    Ok(FileInfo { size, name })
}

/// Split one type-length-value parameter off the front of `bytes`.
fn decode_parameter(bytes: &[u8], expected: u8) -> Result<(&[u8], &[u8]), PacketError> {
    let header = take(bytes, 2)?;
    if header[0] != expected {
        return Err(PacketError::UnexpectedParameter { expected, found: header[0] });
    }
    let len = header[1] as usize;
    let value = take(&bytes[2..], len)?;
    Ok((value, &bytes[2 + len..]))
}

// ============================================================================
// Sending
// ============================================================================

/// Send one file as a start packet, data packets of at most `packet_size`
/// bytes, and an end packet. Returns the number of file bytes sent.
pub fn send_file(session: &mut Session<Open>, path: &Path, packet_size: usize) -> Result<u64, TransferError> {
    if packet_size == 0 || packet_size > session.max_payload().saturating_sub(3) {
        return Err(TransferError::Protocol(format!(
            "packet size {} does not fit a {} byte frame",
            packet_size,
            session.max_payload()
        )));
    }

    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::Protocol(format!("not a file: {}", path.display())))?;
    let info = FileInfo { size, name };

    tracing::info!(name = %info.name, size, "sending file");
    session.send(&Packet::Start(info.clone()).encode()?)?;

    let mut buffer = vec![0u8; packet_size];
    let mut sent = 0u64;
    loop {
        let n = fill(&mut file, &mut buffer)?;
        if n == 0 {
            break;
        }
        session.send(&Packet::Data(buffer[..n].to_vec()).encode()?)?;
        sent += n as u64;
        tracing::debug!(sent, size, "data packet sent");
    }

    if sent != size {
        return Err(TransferError::Protocol(format!(
            "{} changed while sending: read {} of {} bytes",
            path.display(),
            sent,
            size
        )));
    }

    session.send(&Packet::End(info).encode()?)?;
    Ok(sent)
}

/// Read until `buf` is full or the file ends.
fn fill(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

// ============================================================================
// Receiving
// ============================================================================

/// Receive one file. If `output` is a directory the announced name is
/// created inside it, otherwise `output` itself is written.
pub fn receive_file(session: &mut Session<Open>, output: &Path) -> Result<(PathBuf, FileInfo), TransferError> {
    let start = match Packet::decode(&session.receive()?)? {
        Packet::Start(info) => info,
        other => {
            return Err(TransferError::Protocol(format!("expected start packet, got {:?}", kind(&other))));
        }
    };

    let target = if output.is_dir() {
        let name = Path::new(&start.name)
            .file_name()
            .ok_or_else(|| TransferError::Protocol(format!("unusable file name {:?}", start.name)))?;
        output.join(name)
    } else {
        output.to_path_buf()
    };

    tracing::info!(name = %start.name, size = start.size, path = %target.display(), "receiving file");
    let mut file = File::create(&target)?;
    let mut received = 0u64;

    loop {
        match Packet::decode(&session.receive()?)? {
            Packet::Data(data) => {
                file.write_all(&data)?;
                received += data.len() as u64;
                tracing::debug!(received, size = start.size, "data packet received");
            }
            Packet::End(end) => {
                if end != start {
                    return Err(TransferError::Protocol(format!(
                        "end packet {:?} does not match start packet {:?}",
                        end, start
                    )));
                }
                break;
            }
            Packet::Start(_) => {
                return Err(TransferError::Protocol("start packet in the middle of a file".into()));
            }
        }
    }

    if received != start.size {
        return Err(TransferError::Protocol(format!(
            "received {} bytes, expected {}",
            received, start.size
        )));
    }

    file.flush()?;
    Ok((target, start))
}

fn kind(packet: &Packet) -> &'static str {
    match packet {
        Packet::Start(_) => "start",
        Packet::Data(_) => "data",
        Packet::End(_) => "end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use crate::serial::pipe_pair;
    use crate::session::pipe_session;

    #[test]
    fn test_data_packet() {
        let encoded = Packet::Data(vec![0xAA; 300]).encode().unwrap();
        assert_eq!(&encoded[..3], &[PKT_DATA, 0x01, 0x2C]);
        assert_eq!(encoded.len(), 303);
        assert_eq!(Packet::decode(&encoded).unwrap(), Packet::Data(vec![0xAA; 300]));
    }

    #[test]
    fn test_control_packet_layout() {
        let info = FileInfo { size: 10968, name: "pinguim.gif".into() };
        let encoded = Packet::Start(info.clone()).encode().unwrap();

        let mut expected = vec![PKT_START, TLV_FILE_SIZE, 2, 0x2A, 0xD8, TLV_FILE_NAME, 11];
        expected.extend_from_slice(b"pinguim.gif");
        assert_eq!(encoded, expected);

        assert_eq!(Packet::decode(&encoded).unwrap(), Packet::Start(info));
    }

    #[test]
    fn test_empty_file_size_field() {
        let info = FileInfo { size: 0, name: "empty".into() };
        let encoded = Packet::End(info.clone()).encode().unwrap();
        assert_eq!(&encoded[..4], &[PKT_END, TLV_FILE_SIZE, 0, TLV_FILE_NAME]);
        assert_eq!(Packet::decode(&encoded).unwrap(), Packet::End(info));
    }

    #[test]
    fn test_malformed_packets() {
        assert!(matches!(Packet::decode(&[]), Err(PacketError::Empty)));
        assert!(matches!(Packet::decode(&[0x09]), Err(PacketError::UnknownType(0x09))));
        assert!(matches!(
            Packet::decode(&[PKT_DATA, 0x00, 0x05, 1, 2]),
            Err(PacketError::Truncated { expected: 5, actual: 2 })
        ));
        assert!(matches!(
            Packet::decode(&[PKT_START, TLV_FILE_NAME, 0]),
            Err(PacketError::UnexpectedParameter { expected: TLV_FILE_SIZE, found: TLV_FILE_NAME })
        ));
        assert!(matches!(
            Packet::decode(&[PKT_START, TLV_FILE_SIZE, 9, 0, 0, 0, 0, 0, 0, 0, 0, 1, TLV_FILE_NAME, 0]),
            Err(PacketError::SizeTooLong(9))
        ));
    }

    #[test]
    fn test_name_too_long() {
        let info = FileInfo { size: 1, name: "n".repeat(256) };
        assert!(matches!(Packet::Start(info).encode(), Err(PacketError::NameTooLong(256))));
    }

    #[test]
    fn test_file_transfer_over_pipe() {
        crate::logging::init_for_tests();

        let dir = std::env::temp_dir().join(format!("hdlink_transfer_{}", std::process::id()));
        let out_dir = dir.join("out");
        std::fs::create_dir_all(&out_dir).unwrap();

        let source = dir.join("payload.bin");
        let content: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&source, &content).unwrap();

        let (a, b) = pipe_pair();
        let receive_dir = out_dir.clone();
        let receiver = std::thread::spawn(move || {
            let mut session = pipe_session(Role::Receiver, b, 5, 0.0, 0).open()?;
            let result = receive_file(&mut session, &receive_dir)?;
            session.close(false)?;
            Ok::<_, TransferError>(result)
        });

        let mut session = pipe_session(Role::Sender, a, 5, 0.0, 0).open().unwrap();
        let sent = send_file(&mut session, &source, DEFAULT_PACKET_SIZE).unwrap();
        let stats = session.close(false).unwrap();

        let (path, info) = receiver.join().unwrap().unwrap();
        assert_eq!(sent, 2000);
        assert_eq!(info, FileInfo { size: 2000, name: "payload.bin".into() });
        assert_eq!(path, out_dir.join("payload.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), content);
        // SET, start + 8 data packets + end, then DISC and UA
        assert_eq!(stats.frames_sent, 1 + 10 + 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_packet_size_must_fit_frame() {
        let (a, _b) = pipe_pair();
        let mut session = pipe_session(Role::Sender, a, 1, 0.0, 0).assume_open();
        let result = send_file(&mut session, Path::new("Cargo.toml"), 998);
        assert!(matches!(result, Err(TransferError::Protocol(_))));

        let result = send_file(&mut session, Path::new("Cargo.toml"), usize::MAX);
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }
}
