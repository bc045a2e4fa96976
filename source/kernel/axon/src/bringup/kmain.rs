// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-hart kernel entry: primary bootstrap, hart synchronization, steady state
//! OWNERS: @kernel-team
//! PUBLIC API: kmain(), bring_up_hart(), HartPorts, BringUpError
//! DEPENDS_ON: bringup::{boot, smp, idle, kernel}
//! INVARIANTS: Fatal bring-up errors panic; harts outside the configured set park

use core::fmt;

use crate::bringup::boot::{run_primary_boot, BootCollaborators, BootFailure};
use crate::bringup::idle::enter_steady_state;
use crate::bringup::kernel::Kernel;
use crate::bringup::smp::{self, ProtocolError, SpinForever, WaitStrategy};
use crate::hal::{CpuOps, DeviceDrivers, FirmwareConfig, HartWake, IoRemap, KernelSubsystems};
use crate::mm::boot_map::BootMappingOps;
use crate::task::TaskLauncher;
use crate::types::{CpuId, HartId};

#[cfg(feature = "boot_banner")]
const BANNER: &str = r#"
    _   __  __ ___  _   _
   /_\  \ \/ // _ \| \ | |
  / _ \  >  <| (_) |  \| |
 /_/ \_\/_/\_\\___/|_|\_|
"#;

/// Every collaborator a hart may need during bring-up.
pub struct HartPorts<'a> {
    pub firmware: &'a dyn FirmwareConfig,
    pub remap: &'a mut dyn IoRemap,
    pub drivers: &'a mut dyn DeviceDrivers,
    pub launcher: &'a mut dyn TaskLauncher,
    pub subsystems: &'a mut dyn KernelSubsystems,
    pub wake: &'a mut dyn HartWake,
    pub cpu: &'a mut dyn CpuOps,
    pub boot_map: &'a mut dyn BootMappingOps,
}

/// Why a hart could not reach steady state.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpError {
    Boot(BootFailure),
    Protocol(ProtocolError),
}

impl From<BootFailure> for BringUpError {
    fn from(value: BootFailure) -> Self {
        Self::Boot(value)
    }
}

impl From<ProtocolError> for BringUpError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl fmt::Display for BringUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot(failure) => write!(f, "bootstrap: {}", failure),
            Self::Protocol(err) => write!(f, "hart sync: {}", err),
        }
    }
}

/// Runs everything up to (not including) steady state on `hart`.
///
/// Returns with the kernel lock held by this hart.
pub fn bring_up_hart(
    kernel: &Kernel,
    hart: HartId,
    ports: &mut HartPorts<'_>,
    strategy: &dyn WaitStrategy,
) -> Result<CpuId, BringUpError> {
    let cpu = CpuId::from_hart(hart);
    let sync = kernel.sync();

    if cpu.is_boot() {
        #[cfg(feature = "boot_banner")]
        boot_marker!("{}", BANNER);

        let report = run_primary_boot(
            kernel,
            cpu,
            BootCollaborators {
                firmware: ports.firmware,
                remap: &mut *ports.remap,
                drivers: &mut *ports.drivers,
                launcher: &mut *ports.launcher,
                subsystems: &mut *ports.subsystems,
            },
        )?;
        log_info!(target: "boot", "primary bootstrap done shell={}", report.shell);
        boot_marker!("Core {} start up", cpu);

        let mapping = kernel.take_boot_mapping().ok_or(ProtocolError::MappingTaken)?;
        let retired = smp::primary_protocol(
            sync,
            cpu,
            &mut *ports.wake,
            &mut *ports.cpu,
            mapping,
            &mut *ports.boot_map,
            strategy,
        )?;
        log_info!(
            target: "boot",
            "temporary mapping retired root={} index={} previous=0x{:x}",
            retired.root,
            retired.index,
            retired.previous
        );
    } else {
        smp::secondary_protocol(sync, cpu, &mut *ports.subsystems, strategy)?;
    }
    Ok(cpu)
}

/// Kernel entry for every hart (`a0` = hart id, `a1` = device tree).
///
/// Never returns: harts end in the idle loop, fatal errors panic.
pub fn kmain(kernel: &Kernel, hart: HartId, dtb: usize, mut ports: HartPorts<'_>) -> ! {
    log_debug!(target: "boot", "hart {} entered dtb=0x{:x}", hart, dtb);
    if CpuId::from_hart(hart).as_index() >= kernel.cores() {
        log_warn!(target: "boot", "hart {} outside configured set, parking", hart);
        crate::arch::riscv::halt();
    }

    match bring_up_hart(kernel, hart, &mut ports, &SpinForever) {
        Ok(cpu) => enter_steady_state(kernel.sync(), cpu, ports.cpu),
        Err(err) => {
            log_error!(target: "boot", "hart {} bring-up failed: {}", hart, err);
            panic!("hart {} bring-up failed: {}", hart, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::idle::prepare_steady_state;
    use crate::bringup::smp::testing::{CheckedMapOps, FakeCpu, FakeSubsystems, RecordingWake};
    use crate::bringup::smp::{HartPhase, SpinBudget};
    use crate::config::NUM_MAX_TASK;
    use crate::syscall::{Syscall, SyscallTable};
    use crate::devices::testing::{FakeDrivers, FakeFirmware, FakeRemap};
    use crate::task::testing::FakeLauncher;
    use crate::task::{TaskRef, TaskStatus};

    const BUDGET: SpinBudget = SpinBudget(200_000_000);

    /// Runs one simulated hart to steady state; returns its retired-mapping count.
    fn run_hart(kernel: &Kernel, hart: u16) -> (CpuId, usize) {
        let firmware = FakeFirmware::board();
        let mut remap = FakeRemap::default();
        let mut drivers = FakeDrivers::default();
        let mut launcher = FakeLauncher::new();
        let mut subsystems = FakeSubsystems::default();
        let mut wake = RecordingWake::default();
        let mut cpu_ops = FakeCpu::default();
        let mut boot_map = CheckedMapOps::new(kernel.sync());
        let mut ports = HartPorts {
            firmware: &firmware,
            remap: &mut remap,
            drivers: &mut drivers,
            launcher: &mut launcher,
            subsystems: &mut subsystems,
            wake: &mut wake,
            cpu: &mut cpu_ops,
            boot_map: &mut boot_map,
        };
        let cpu = bring_up_hart(kernel, HartId::from_raw(hart), &mut ports, &BUDGET).unwrap();
        prepare_steady_state(kernel.sync(), cpu, &mut cpu_ops);
        assert_eq!(cpu_ops.irqs_enabled, 1);
        (cpu, boot_map.clears.len())
    }

    #[test]
    fn four_harts_reach_steady_state() {
        let _guard = crate::timer::TEST_LOCK.lock();
        let kernel = Kernel::new(4);

        let retired: usize = std::thread::scope(|s| {
            let handles: std::vec::Vec<_> =
                (0..4u16).map(|hart| {
                    let kernel = &kernel;
                    s.spawn(move || run_hart(kernel, hart))
                }).collect();
            handles.into_iter().map(|h| h.join().unwrap().1).sum()
        });

        assert_eq!(retired, 1);
        assert!(kernel.take_boot_mapping().is_none());
        assert_eq!(kernel.sync().acknowledged(), 3);
        assert_eq!(kernel.sync().kernel_lock().holder(), None);
        assert_eq!(kernel.syscall_table().map(SyscallTable::bound), Some(Syscall::COUNT));
        let tables = kernel.tables();
        assert_eq!(tables.pcb.count(TaskStatus::Running), 1);
        assert_eq!(tables.pcb.count(TaskStatus::Exited), NUM_MAX_TASK - 1);
        for index in 0..4u16 {
            let cpu = CpuId::from_raw(index);
            assert_eq!(kernel.sync().phase(cpu), HartPhase::Steady);
            assert_eq!(tables.current(cpu), Some(TaskRef::Idle(cpu)));
        }
    }

    #[test]
    fn secondary_before_primary_still_converges() {
        let _guard = crate::timer::TEST_LOCK.lock();
        let kernel = Kernel::new(2);
        std::thread::scope(|s| {
            let secondary = s.spawn(|| run_hart(&kernel, 1));
            while kernel.sync().phase(CpuId::from_raw(1)) != HartPhase::WaitForRelease {
                std::thread::yield_now();
            }
            let (_, retired) = run_hart(&kernel, 0);
            assert_eq!(retired, 1);
            assert_eq!(secondary.join().unwrap().1, 0);
        });
        assert!(kernel.syscall_table().is_some());
    }
}
