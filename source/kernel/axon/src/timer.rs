// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Timer frequency published by device bring-up
//! OWNERS: @kernel-team
//! PUBLIC API: time_base(), set_time_base(), tick_interval()
//! DEPENDS_ON: core::sync::atomic, config::TICKS_PER_SEC
//! INVARIANTS: Written once by the primary before secondaries are released; read-only afterwards

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::TICKS_PER_SEC;

/// Serializes unit tests that publish a time base.
#[cfg(test)]
pub(crate) static TEST_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Timer ticks per second as reported by firmware (zero until bring-up).
static TIME_BASE: AtomicU64 = AtomicU64::new(0);

/// Returns the timer frequency in Hz.
#[inline]
pub fn time_base() -> u64 {
    TIME_BASE.load(Ordering::Relaxed)
}

/// Publishes the timer frequency. Visibility to other harts rides on the
/// release/acquire pairing of the secondary release signal.
#[inline]
pub fn set_time_base(hz: u64) {
    TIME_BASE.store(hz, Ordering::Relaxed);
}

/// Timer ticks between two scheduling interrupts.
#[inline]
pub fn tick_interval() -> u64 {
    (time_base() / TICKS_PER_SEC).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_scales_with_time_base() {
        let _guard = TEST_LOCK.lock();
        set_time_base(10_000_000);
        assert_eq!(tick_interval(), 10_000_000 / TICKS_PER_SEC);
    }

    #[test]
    fn tick_interval_never_zero() {
        let _guard = TEST_LOCK.lock();
        set_time_base(0);
        assert_eq!(tick_interval(), 1);
    }
}
