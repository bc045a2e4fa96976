// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process control blocks, per-core idle tasks and the boot-time table reset
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + proptest (rest invariant after reset)
//! PUBLIC API: Pcb, PcbTable, ProcessTables, TaskRef, TaskLauncher, initialize_process_tables()
//! DEPENDS_ON: config::{NUM_MAX_TASK, MAX_CPUS}, types::{CpuId, Pid, PageDirRoot}
//! INVARIANTS: Unassigned slots are Exited; every configured core has a Running idle PCB and points at it

use core::fmt;

use crate::config::{MAX_CPUS, NUM_MAX_TASK};
use crate::types::{CpuId, PageDirRoot, Pid};

/// Program launched once the tables are ready.
pub const SHELL_NAME: &str = "shell";

/// Lifecycle state of a PCB slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Slot is free.
    Exited,
    Running,
    /// Runnable, waiting for a core (scheduler-owned).
    Ready,
    /// Waiting on a kernel object (scheduler-owned).
    Blocked,
}

/// Terminal cursor position owned by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
}

impl Cursor {
    /// Top-left cell of the terminal (1-based).
    pub const ORIGIN: Self = Self { x: 1, y: 1 };
}

/// Process control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pcb {
    pub status: TaskStatus,
    /// Resources still need to be reclaimed by teardown.
    pub needs_cleanup: bool,
    /// Owned top-level page directory, `None` for free slots.
    pub pgdir: Option<PageDirRoot>,
    pub cursor: Cursor,
    pub pid: Option<Pid>,
}

impl Pcb {
    /// A free slot.
    pub const EXITED: Self = Self {
        status: TaskStatus::Exited,
        needs_cleanup: false,
        pgdir: None,
        cursor: Cursor::ORIGIN,
        pid: None,
    };

    /// Idle task of a core: runs on the kernel page directory from boot on.
    pub const fn idle() -> Self {
        Self {
            status: TaskStatus::Running,
            needs_cleanup: false,
            pgdir: Some(PageDirRoot::kernel()),
            cursor: Cursor::ORIGIN,
            pid: Some(Pid::KERNEL),
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.status == TaskStatus::Exited
    }
}

/// Fixed-capacity table of general PCBs.
pub struct PcbTable {
    slots: [Pcb; NUM_MAX_TASK],
}

impl PcbTable {
    pub const fn new() -> Self {
        Self { slots: [Pcb::EXITED; NUM_MAX_TASK] }
    }

    pub fn slots(&self) -> &[Pcb] {
        &self.slots
    }

    pub fn get(&self, slot: usize) -> Option<&Pcb> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Pcb> {
        self.slots.get_mut(slot)
    }

    /// Index of the lowest free slot.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Pcb::is_free)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.slots.iter().filter(|pcb| pcb.status == status).count()
    }

    /// Slot holding `pid`, if any.
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.slots.iter().position(|pcb| !pcb.is_free() && pcb.pid == Some(pid))
    }

    fn reset(&mut self) {
        self.slots = [Pcb::EXITED; NUM_MAX_TASK];
    }
}

impl Default for PcbTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning reference to the task a core is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRef {
    Idle(CpuId),
    Slot(usize),
}

/// All process bookkeeping: general PCBs, idle PCBs and the per-core current pointer.
pub struct ProcessTables {
    pub pcb: PcbTable,
    idle: [Pcb; MAX_CPUS],
    current: [Option<TaskRef>; MAX_CPUS],
    cores: usize,
}

impl ProcessTables {
    pub const fn new() -> Self {
        Self {
            pcb: PcbTable::new(),
            idle: [Pcb::EXITED; MAX_CPUS],
            current: [None; MAX_CPUS],
            cores: 0,
        }
    }

    /// Cores covered by the last initialization.
    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn idle(&self, cpu: CpuId) -> Option<&Pcb> {
        if cpu.as_index() < self.cores {
            self.idle.get(cpu.as_index())
        } else {
            None
        }
    }

    pub fn current(&self, cpu: CpuId) -> Option<TaskRef> {
        self.current.get(cpu.as_index()).copied().flatten()
    }

    /// Resolves a task reference to its PCB.
    pub fn resolve(&self, task: TaskRef) -> Option<&Pcb> {
        match task {
            TaskRef::Idle(cpu) => self.idle(cpu),
            TaskRef::Slot(slot) => self.pcb.get(slot),
        }
    }
}

impl Default for ProcessTables {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens to a task's PCB when it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Resources are reclaimed as soon as the task exits.
    AutoCleanupOnExit,
    /// The slot stays occupied until a parent waits on it.
    EnterZombieOnExit,
}

/// Program launch request handed to the task-creation collaborator.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    pub name: &'a str,
    pub argv: &'a [&'a str],
    pub policy: CleanupPolicy,
}

/// Failure reported by the task-creation collaborator.
#[must_use = "exec failures must be handled explicitly"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// No program image by that name.
    NotFound,
    /// PCB table is full.
    NoFreeSlot,
    /// Loader-specific failure status.
    Loader(i64),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("program not found"),
            Self::NoFreeSlot => f.write_str("no free pcb slot"),
            Self::Loader(code) => write!(f, "loader status {}", code),
        }
    }
}

/// Task creation entry point (`exec`), implemented outside the bring-up core.
pub trait TaskLauncher {
    /// Creates a task in `pcbs` and returns its PID.
    fn exec(&mut self, pcbs: &mut PcbTable, request: &ExecRequest<'_>) -> Result<Pid, ExecError>;
}

/// Resets every table, installs one idle task per configured core and launches the shell.
///
/// Must run once, on the primary, before any core takes interrupts. `cores`
/// is clamped to `MAX_CPUS`. Launcher failures are returned unchanged.
pub fn initialize_process_tables(
    tables: &mut ProcessTables,
    cores: usize,
    launcher: &mut dyn TaskLauncher,
) -> Result<Pid, ExecError> {
    let cores = cores.min(MAX_CPUS);

    tables.pcb.reset();
    tables.idle = [Pcb::EXITED; MAX_CPUS];
    tables.current = [None; MAX_CPUS];
    for index in 0..cores {
        let cpu = CpuId::from_raw(index as u16);
        tables.idle[index] = Pcb::idle();
        tables.current[index] = Some(TaskRef::Idle(cpu));
    }
    tables.cores = cores;
    log_debug!(target: "task", "idle pcbs installed cores={}", cores);

    let argv = [SHELL_NAME];
    let request =
        ExecRequest { name: SHELL_NAME, argv: &argv, policy: CleanupPolicy::AutoCleanupOnExit };
    let pid = launcher.exec(&mut tables.pcb, &request)?;
    log_info!(target: "task", "launched {} pid={}", SHELL_NAME, pid);
    Ok(pid)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Launcher that places each program in the lowest free slot.
    pub struct FakeLauncher {
        pub next_pid: u32,
        pub fail: Option<ExecError>,
        pub launched: usize,
    }

    impl FakeLauncher {
        pub fn new() -> Self {
            Self { next_pid: 1, fail: None, launched: 0 }
        }

        pub fn failing(error: ExecError) -> Self {
            Self { next_pid: 1, fail: Some(error), launched: 0 }
        }
    }

    impl TaskLauncher for FakeLauncher {
        fn exec(
            &mut self,
            pcbs: &mut PcbTable,
            request: &ExecRequest<'_>,
        ) -> Result<Pid, ExecError> {
            if let Some(error) = self.fail {
                return Err(error);
            }
            assert_eq!(request.argv.first().copied(), Some(request.name));
            let slot = pcbs.first_free_slot().ok_or(ExecError::NoFreeSlot)?;
            let pid = Pid::from_raw(self.next_pid);
            self.next_pid += 1;
            self.launched += 1;
            let pcb = pcbs.get_mut(slot).ok_or(ExecError::NoFreeSlot)?;
            pcb.status = TaskStatus::Running;
            pcb.pid = Some(pid);
            pcb.pgdir = Some(PageDirRoot::from_kva(0x8000_0000 + slot * 0x1000));
            pcb.needs_cleanup = request.policy == CleanupPolicy::AutoCleanupOnExit;
            Ok(pid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeLauncher;
    use super::*;

    #[test]
    fn reset_leaves_only_the_shell_running() {
        let mut tables = ProcessTables::new();
        let mut launcher = FakeLauncher::new();
        let pid = initialize_process_tables(&mut tables, 2, &mut launcher).unwrap();

        assert_eq!(tables.pcb.count(TaskStatus::Running), 1);
        assert_eq!(tables.pcb.count(TaskStatus::Exited), NUM_MAX_TASK - 1);
        let slot = tables.pcb.find(pid).unwrap();
        assert!(tables.pcb.get(slot).unwrap().needs_cleanup);
        assert_eq!(launcher.launched, 1);
    }

    #[test]
    fn every_core_points_at_its_idle_task() {
        for cores in [1, 2, MAX_CPUS] {
            let mut tables = ProcessTables::new();
            initialize_process_tables(&mut tables, cores, &mut FakeLauncher::new()).unwrap();
            for index in 0..cores {
                let cpu = CpuId::from_raw(index as u16);
                assert_eq!(tables.current(cpu), Some(TaskRef::Idle(cpu)));
                let idle = tables.resolve(TaskRef::Idle(cpu)).unwrap();
                assert_eq!(idle.status, TaskStatus::Running);
                assert_eq!(idle.pgdir, Some(PageDirRoot::kernel()));
                assert_eq!(idle.cursor, Cursor::ORIGIN);
                assert!(!idle.needs_cleanup);
            }
            for index in cores..MAX_CPUS {
                let cpu = CpuId::from_raw(index as u16);
                assert_eq!(tables.current(cpu), None);
                assert!(tables.idle(cpu).is_none());
            }
        }
    }

    #[test]
    fn launcher_failure_is_propagated() {
        let mut tables = ProcessTables::new();
        let mut launcher = FakeLauncher::failing(ExecError::Loader(-2));
        let err = initialize_process_tables(&mut tables, 1, &mut launcher).unwrap_err();
        assert_eq!(err, ExecError::Loader(-2));
        // Tables are still reset even though the shell never started.
        assert_eq!(tables.pcb.count(TaskStatus::Exited), NUM_MAX_TASK);
    }

    #[test]
    fn zombie_policy_keeps_the_slot_after_exit() {
        let mut pcbs = PcbTable::new();
        let mut launcher = FakeLauncher::new();
        let request = ExecRequest {
            name: "worker",
            argv: &["worker"],
            policy: CleanupPolicy::EnterZombieOnExit,
        };
        let pid = launcher.exec(&mut pcbs, &request).unwrap();
        let slot = pcbs.find(pid).unwrap();
        assert!(!pcbs.get(slot).unwrap().needs_cleanup);
    }

    #[test]
    fn test_reject_core_count_beyond_ceiling() {
        let mut tables = ProcessTables::new();
        initialize_process_tables(&mut tables, MAX_CPUS + 3, &mut FakeLauncher::new()).unwrap();
        assert_eq!(tables.cores(), MAX_CPUS);
    }
}

#[cfg(test)]
mod tests_prop {
    use super::testing::FakeLauncher;
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Exited),
            Just(TaskStatus::Running),
            Just(TaskStatus::Ready),
            Just(TaskStatus::Blocked),
        ]
    }

    proptest! {
        #[test]
        fn stale_slots_never_survive_reset(
            statuses in proptest::collection::vec(arb_status(), NUM_MAX_TASK),
            cores in 1usize..=MAX_CPUS,
        ) {
            let mut tables = ProcessTables::new();
            for (slot, status) in statuses.iter().enumerate() {
                let pcb = tables.pcb.get_mut(slot).unwrap();
                pcb.status = *status;
                pcb.needs_cleanup = true;
                pcb.pid = Some(Pid::from_raw(100 + slot as u32));
            }

            let pid = initialize_process_tables(&mut tables, cores, &mut FakeLauncher::new()).unwrap();

            for (slot, pcb) in tables.pcb.slots().iter().enumerate() {
                if Some(slot) == tables.pcb.find(pid) {
                    prop_assert_eq!(pcb.status, TaskStatus::Running);
                } else {
                    prop_assert_eq!(*pcb, Pcb::EXITED);
                }
            }
        }
    }
}
