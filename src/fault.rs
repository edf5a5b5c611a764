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

//! Deliberate corruption of outgoing information frames, for exercising the
//! receiver's REJ path on a clean line.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::protocol::{ESC, FLAG};

pub struct FaultInjector {
    rng: StdRng,
    frame_error_rate: f64,
}

impl FaultInjector {
    pub fn new(frame_error_rate: f64) -> Self {
        FaultInjector { rng: StdRng::from_entropy(), frame_error_rate }
    }

    #[cfg(test)]
    pub fn seeded(frame_error_rate: f64, seed: u64) -> Self {
        FaultInjector { rng: StdRng::seed_from_u64(seed), frame_error_rate }
    }

    /// With the configured probability, return a copy of `frame` with one bit
    /// of one body byte flipped. The header and closing FLAG are left alone
    /// and the flip never yields FLAG or ESC, so the frame still parses.
    pub fn corrupt(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if self.frame_error_rate <= 0.0 || frame.len() < 6 {
            return None;
        }
        if !self.rng.gen_bool(self.frame_error_rate.min(1.0)) {
            return None;
        }

        let index = self.rng.gen_range(4..frame.len() - 1);
        let first_bit = self.rng.gen_range(0..8u32);
        for offset in 0..8 {
            let flipped = frame[index] ^ (1 << ((first_bit + offset) % 8));
            if flipped != FLAG && flipped != ESC {
                let mut corrupted = frame.to_vec();
                corrupted[index] = flipped;
                return Some(corrupted);
            }
        }
        None
    }
}
