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

/// Per-session counters, reported when the link closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Information frames corrupted on purpose before transmission
    pub error_frames_sent: u64,
    /// Information frames that arrived with a bad BCC2
    pub error_frames_received: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Link statistics:")?;
        writeln!(f, "  Bytes sent:            {}", self.bytes_sent)?;
        writeln!(f, "  Bytes received:        {}", self.bytes_received)?;
        writeln!(f, "  Frames sent:           {}", self.frames_sent)?;
        writeln!(f, "  Frames received:       {}", self.frames_received)?;
        writeln!(f, "  Error frames sent:     {}", self.error_frames_sent)?;
        writeln!(f, "  Error frames received: {}", self.error_frames_received)?;
        writeln!(f, "  Retransmissions:       {}", self.retransmissions)?;
        write!(f, "  Timeouts:              {}", self.timeouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lists_every_counter() {
        let stats = Statistics {
            bytes_sent: 11,
            bytes_received: 22,
            error_frames_received: 3,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.starts_with("Link statistics:"));
        assert!(text.contains("Bytes sent:            11"));
        assert!(text.contains("Bytes received:        22"));
        assert!(text.contains("Error frames received: 3"));
        assert_eq!(text.lines().count(), 9);
    }
}
