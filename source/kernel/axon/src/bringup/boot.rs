// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Primary-hart bootstrap sequence
//! OWNERS: @kernel-boot-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (ordering, fail-fast, single-run guard)
//! PUBLIC API: run_primary_boot(), BootCollaborators, BootStages, BootError, BootFailure
//! DEPENDS_ON: task, devices, syscall, hal::KernelSubsystems, bringup::kernel::Kernel
//! INVARIANTS: Runs once, on the primary, before secondaries are released; every stage is a hard
//!             precondition of the next

use core::fmt;

use bitflags::bitflags;

use crate::bringup::kernel::Kernel;
use crate::devices::{self, Device, DeviceError};
use crate::hal::{ConfigKey, DeviceDrivers, FirmwareConfig, IoRemap, KernelSubsystems};
use crate::syscall::build_syscall_table;
use crate::task::{initialize_process_tables, ExecError, TaskLauncher};
use crate::types::{CpuId, Pid};

bitflags! {
    /// Primary bootstrap stages, in execution order.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BootStages: u8 {
        const PROCESS_TABLES = 1 << 0;
        const DEVICES = 1 << 1;
        const FUTEX = 1 << 2;
        const EXCEPTIONS = 1 << 3;
        const SYSCALLS = 1 << 4;
        const NET_POLL = 1 << 5;
        const SCREEN = 1 << 6;
    }
}

/// Fatal bootstrap error.
#[must_use = "boot errors halt the kernel"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    MissingFirmwareKey(ConfigKey),
    InvalidFirmwareValue(ConfigKey),
    DeviceInit { device: Device, code: i64 },
    Exec(ExecError),
    NotPrimary,
    AlreadyBooted,
}

impl From<ExecError> for BootError {
    fn from(value: ExecError) -> Self {
        Self::Exec(value)
    }
}

impl From<DeviceError> for BootError {
    fn from(value: DeviceError) -> Self {
        match value {
            DeviceError::MissingKey(key) => Self::MissingFirmwareKey(key),
            DeviceError::OutOfRange(key) => Self::InvalidFirmwareValue(key),
            DeviceError::Init { device, code } => Self::DeviceInit { device, code },
        }
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFirmwareKey(key) => write!(f, "firmware key {} missing", key),
            Self::InvalidFirmwareValue(key) => write!(f, "firmware key {} out of range", key),
            Self::DeviceInit { device, code } => {
                write!(f, "{} initialization failed (status {})", device, code)
            }
            Self::Exec(err) => write!(f, "shell launch failed: {}", err),
            Self::NotPrimary => f.write_str("primary bootstrap on a secondary hart"),
            Self::AlreadyBooted => f.write_str("primary bootstrap ran twice"),
        }
    }
}

/// Error plus the stages that finished before it.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootFailure {
    pub error: BootError,
    pub completed: BootStages,
}

impl fmt::Display for BootFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (completed {:?})", self.error, self.completed)
    }
}

/// External entry points the primary bootstrap drives.
pub struct BootCollaborators<'a> {
    pub firmware: &'a dyn FirmwareConfig,
    pub remap: &'a mut dyn IoRemap,
    pub drivers: &'a mut dyn DeviceDrivers,
    pub launcher: &'a mut dyn TaskLauncher,
    pub subsystems: &'a mut dyn KernelSubsystems,
}

/// Outcome of a successful primary bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootReport {
    pub shell: Pid,
    pub stages: BootStages,
}

struct Progress {
    completed: BootStages,
}

impl Progress {
    fn fail(&self, error: impl Into<BootError>) -> BootFailure {
        let error = error.into();
        log_error!(target: "boot", "bootstrap failed: {}", error);
        BootFailure { error, completed: self.completed }
    }

    fn done(&mut self, stage: BootStages) {
        self.completed |= stage;
        log_trace!(target: "boot", "stage {:?} done", stage);
    }
}

/// Runs the primary bootstrap on `cpu`.
///
/// Order: process tables, devices, futex, exception vectors, syscall table,
/// network poll mode, screen. The first failure stops the sequence.
pub fn run_primary_boot(
    kernel: &Kernel,
    cpu: CpuId,
    deps: BootCollaborators<'_>,
) -> Result<BootReport, BootFailure> {
    let mut progress = Progress { completed: BootStages::empty() };
    if !cpu.is_boot() {
        return Err(progress.fail(BootError::NotPrimary));
    }
    if !kernel.claim_primary_boot() {
        return Err(progress.fail(BootError::AlreadyBooted));
    }

    let shell = {
        let mut tables = kernel.tables();
        initialize_process_tables(&mut tables, kernel.cores(), deps.launcher)
            .map_err(|err| progress.fail(err))?
    };
    progress.done(BootStages::PROCESS_TABLES);
    boot_marker!("> [INIT] PCB initialization succeeded.");

    let map = devices::bring_up_devices(deps.firmware, deps.remap, deps.drivers)
        .map_err(|err| progress.fail(err))?;
    kernel.publish_devices(map);
    progress.done(BootStages::DEVICES);

    deps.subsystems.init_futex();
    progress.done(BootStages::FUTEX);

    deps.subsystems.init_exception();
    progress.done(BootStages::EXCEPTIONS);
    boot_marker!("> [INIT] Interrupt processing initialization succeeded.");

    kernel.publish_syscalls(build_syscall_table());
    progress.done(BootStages::SYSCALLS);
    boot_marker!("> [INIT] System call initialized successfully.");

    kernel.set_net_poll_mode(true);
    progress.done(BootStages::NET_POLL);

    deps.subsystems.init_screen();
    progress.done(BootStages::SCREEN);
    boot_marker!("> [INIT] SCREEN initialization succeeded.");

    Ok(BootReport { shell, stages: progress.completed })
}
