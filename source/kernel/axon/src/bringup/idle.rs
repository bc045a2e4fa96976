// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-core steady state: clear leftovers, arm the tick, drop the kernel lock, idle in `wfi`.

use crate::bringup::smp::{HartPhase, HartSync};
use crate::hal::CpuOps;
use crate::types::CpuId;

/// Brings `cpu` into steady state without entering the idle loop.
///
/// Does not pick a task; the first timer interrupt hands the core to the
/// scheduler.
pub fn prepare_steady_state(sync: &HartSync, cpu: CpuId, cpu_ops: &mut dyn CpuOps) {
    cpu_ops.clear_soft_pending();
    if cfg!(feature = "timer_irq") {
        cpu_ops.arm_timer(crate::timer::tick_interval());
    }
    if !sync.kernel_lock().release_if_held(cpu) {
        log_debug!(target: "idle", "cpu {} entered steady state without the kernel lock", cpu);
    }
    cpu_ops.enable_interrupts();
    sync.set_phase(cpu, HartPhase::Steady);
}

/// Enters steady state and idles forever.
pub fn enter_steady_state(sync: &HartSync, cpu: CpuId, cpu_ops: &mut dyn CpuOps) -> ! {
    prepare_steady_state(sync, cpu, cpu_ops);
    loop {
        cpu_ops.enable_interrupts();
        cpu_ops.wait_for_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::smp::testing::FakeCpu;

    #[test]
    fn steady_state_releases_the_lock_and_enables_interrupts() {
        let _guard = crate::timer::TEST_LOCK.lock();
        crate::timer::set_time_base(10_000_000);
        let sync = HartSync::new(2);
        let cpu = CpuId::from_raw(1);
        sync.kernel_lock().lock(cpu);
        let mut ops = FakeCpu::default();

        prepare_steady_state(&sync, cpu, &mut ops);

        assert_eq!(ops.soft_cleared, 1);
        assert_eq!(ops.irqs_enabled, 1);
        assert_eq!(sync.kernel_lock().holder(), None);
        assert_eq!(sync.phase(cpu), HartPhase::Steady);
        if cfg!(feature = "timer_irq") {
            assert_eq!(ops.timer_armed, Some(10_000_000 / crate::config::TICKS_PER_SEC));
        } else {
            assert_eq!(ops.timer_armed, None);
        }
    }

    #[test]
    fn lock_held_by_another_core_is_left_alone() {
        let sync = HartSync::new(2);
        sync.kernel_lock().lock(CpuId::BOOT);
        prepare_steady_state(&sync, CpuId::from_raw(1), &mut FakeCpu::default());
        assert_eq!(sync.kernel_lock().holder(), Some(CpuId::BOOT));
    }
}
