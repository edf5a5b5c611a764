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

use std::time::{Duration, Instant};

// ============================================================================
// Clock Trait
// ============================================================================

/// Monotonic time source sampled by the retry loops
pub trait Clock: Send {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ============================================================================
// Countdown Timer
// ============================================================================

/// Deadline for one wait on the peer, checked once per poll
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Duration,
    timeout: Duration,
}

impl Timer {
    pub fn start(clock: &dyn Clock, timeout: Duration) -> Self {
        Timer { started: clock.now(), timeout }
    }

    pub fn expired(&self, clock: &dyn Clock) -> bool {
        clock.now().saturating_sub(self.started) >= self.timeout
    }
}

// ============================================================================
// Manual Clock for Testing
// ============================================================================

#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockClock {
    millis: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(test)]
impl MockClock {
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_expiry() {
        let clock = MockClock::default();
        let timer = Timer::start(&clock, Duration::from_secs(1));
        assert!(!timer.expired(&clock));

        clock.advance(Duration::from_millis(900));
        assert!(!timer.expired(&clock));

        clock.advance(Duration::from_millis(100));
        assert!(timer.expired(&clock));
    }

    #[test]
    fn test_timer_restart_uses_current_time() {
        let clock = MockClock::default();
        clock.advance(Duration::from_secs(5));

        let timer = Timer::start(&clock, Duration::from_secs(2));
        clock.advance(Duration::from_secs(1));
        assert!(!timer.expired(&clock));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
