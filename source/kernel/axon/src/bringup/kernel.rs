// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Ownership root for state created during bring-up
//! OWNERS: @kernel-team
//! PUBLIC API: Kernel, KERNEL
//! DEPENDS_ON: task::ProcessTables, syscall::SyscallTable, devices::DeviceMap, bringup::smp::HartSync
//! INVARIANTS: Syscall table and device map published once and read-only afterwards

use core::sync::atomic::{AtomicBool, Ordering};

use spin::{Mutex, MutexGuard, Once};

use crate::bringup::smp::HartSync;
use crate::config::NR_CPUS;
use crate::devices::DeviceMap;
use crate::mm::boot_map::TemporaryMapping;
use crate::syscall::{self, Args, SysResult, SyscallBackend, SyscallTable};
use crate::task::ProcessTables;

/// Cores brought up by this build.
pub const BOOT_CORES: usize = if cfg!(feature = "smp") { NR_CPUS } else { 1 };

/// The kernel instance used by the target entry.
pub static KERNEL: Kernel = Kernel::new(BOOT_CORES);

/// Everything the bring-up core creates, with its sharing discipline spelled out in the types.
pub struct Kernel {
    tables: Mutex<ProcessTables>,
    syscalls: Once<SyscallTable>,
    devices: Once<DeviceMap>,
    net_poll_mode: AtomicBool,
    sync: HartSync,
    primary_booted: AtomicBool,
    boot_mapping: Mutex<Option<TemporaryMapping>>,
}

impl Kernel {
    pub const fn new(cores: usize) -> Self {
        Self {
            tables: Mutex::new(ProcessTables::new()),
            syscalls: Once::new(),
            devices: Once::new(),
            net_poll_mode: AtomicBool::new(false),
            sync: HartSync::new(cores),
            primary_booted: AtomicBool::new(false),
            boot_mapping: Mutex::new(Some(TemporaryMapping::boot_identity())),
        }
    }

    pub fn cores(&self) -> usize {
        self.sync.cores()
    }

    pub fn sync(&self) -> &HartSync {
        &self.sync
    }

    pub fn tables(&self) -> MutexGuard<'_, ProcessTables> {
        self.tables.lock()
    }

    /// Claims the single primary boot; false if it already ran.
    pub(crate) fn claim_primary_boot(&self) -> bool {
        self.primary_booted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn publish_syscalls(&self, table: SyscallTable) -> &SyscallTable {
        self.syscalls.call_once(|| table)
    }

    pub(crate) fn publish_devices(&self, map: DeviceMap) -> &DeviceMap {
        self.devices.call_once(|| map)
    }

    /// Dispatch table, once the primary built it.
    pub fn syscall_table(&self) -> Option<&SyscallTable> {
        self.syscalls.get()
    }

    pub fn devices(&self) -> Option<&DeviceMap> {
        self.devices.get()
    }

    /// Whether the network driver polls instead of taking interrupts.
    pub fn net_poll_mode(&self) -> bool {
        self.net_poll_mode.load(Ordering::Acquire)
    }

    pub fn set_net_poll_mode(&self, enabled: bool) {
        self.net_poll_mode.store(enabled, Ordering::Release);
    }

    /// Hands out the temporary mapping handle; `None` after the first call.
    pub fn take_boot_mapping(&self) -> Option<TemporaryMapping> {
        self.boot_mapping.lock().take()
    }

    /// Routes a trap-layer syscall through the published table.
    pub fn dispatch_syscall(
        &self,
        number: usize,
        backend: &mut dyn SyscallBackend,
        args: &Args,
    ) -> SysResult<usize> {
        match self.syscall_table() {
            Some(table) => table.dispatch(number, backend, args),
            None => Err(syscall::Error::InvalidSyscall),
        }
    }
}
