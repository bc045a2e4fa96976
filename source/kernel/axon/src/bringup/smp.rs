// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Boot-time hart synchronization (release signal, acknowledgments, kernel lock)
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests simulating 1, 2 and 4 harts with std threads
//! PUBLIC API: HartSync, KernelLock, WaitStrategy (SpinForever, SpinBudget), AllSecondariesBooted,
//!             primary_protocol(), secondary_protocol()
//! DEPENDS_ON: hal::{HartWake, CpuOps, KernelSubsystems}, mm::boot_map::TemporaryMapping
//! INVARIANTS: Release flag stored once (Release) and observed with Acquire; acknowledgment count is
//!             monotonic; the temporary mapping is retired once, after every secondary acknowledged;
//!             the primary never holds the kernel lock while waiting for acknowledgments

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::config::MAX_CPUS;
use crate::hal::{CpuOps, HartWake, KernelSubsystems};
use crate::mm::boot_map::{BootMappingOps, RetiredMapping, TemporaryMapping};
use crate::types::CpuId;

/// Protocol violation or timeout.
#[must_use = "protocol errors are fatal during bring-up"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Secondaries were already released.
    AlreadyReleased,
    /// A primary-only step ran on a secondary.
    NotPrimary,
    /// A secondary-only step ran on the primary.
    NotSecondary,
    /// CPU index is outside the configured core set.
    CpuOutOfRange(CpuId),
    /// The CPU acknowledged twice.
    DuplicateAcknowledge(CpuId),
    /// The temporary mapping handle was already consumed.
    MappingTaken,
    /// A bounded wait expired.
    TimedOut,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyReleased => f.write_str("secondaries already released"),
            Self::NotPrimary => f.write_str("not the primary hart"),
            Self::NotSecondary => f.write_str("not a secondary hart"),
            Self::CpuOutOfRange(cpu) => write!(f, "cpu {} outside configured set", cpu),
            Self::DuplicateAcknowledge(cpu) => write!(f, "cpu {} acknowledged twice", cpu),
            Self::MappingTaken => f.write_str("temporary mapping already consumed"),
            Self::TimedOut => f.write_str("wait timed out"),
        }
    }
}

/// A bounded wait gave up before its condition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimedOut;

impl From<WaitTimedOut> for ProtocolError {
    fn from(_: WaitTimedOut) -> Self {
        Self::TimedOut
    }
}

/// How a hart busy-waits for a cross-hart condition.
pub trait WaitStrategy {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) -> Result<(), WaitTimedOut>;
}

/// Spins until the condition holds. Boot uses this: a missing hart hangs the primary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinForever;

impl WaitStrategy for SpinForever {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) -> Result<(), WaitTimedOut> {
        while !ready() {
            core::hint::spin_loop();
        }
        Ok(())
    }
}

/// Spins at most `.0` iterations before reporting [`WaitTimedOut`].
#[derive(Debug, Clone, Copy)]
pub struct SpinBudget(pub usize);

impl WaitStrategy for SpinBudget {
    fn wait_until(&self, ready: &mut dyn FnMut() -> bool) -> Result<(), WaitTimedOut> {
        for _ in 0..self.0 {
            if ready() {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        if ready() {
            Ok(())
        } else {
            Err(WaitTimedOut)
        }
    }
}

/// Boot phase of one hart, recorded for diagnostics.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HartPhase {
    Parked = 0,
    // primary
    Init = 1,
    ReleaseSecondaries = 2,
    WaitAllSecondariesBooted = 3,
    RetireTempMapping = 4,
    // secondary
    WaitForRelease = 5,
    AcquireKernelLock = 6,
    LocalExceptionInit = 7,
    AcknowledgeBooted = 8,
    // both
    Steady = 9,
}

impl HartPhase {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Init,
            2 => Self::ReleaseSecondaries,
            3 => Self::WaitAllSecondariesBooted,
            4 => Self::RetireTempMapping,
            5 => Self::WaitForRelease,
            6 => Self::AcquireKernelLock,
            7 => Self::LocalExceptionInit,
            8 => Self::AcknowledgeBooted,
            9 => Self::Steady,
            _ => Self::Parked,
        }
    }
}

const NO_OWNER: usize = usize::MAX;

/// Big kernel lock: a spin lock that records which CPU holds it.
///
/// Held across function boundaries during bring-up (a secondary takes it
/// before local exception setup and drops it on steady-state entry), so it is
/// released explicitly rather than through a guard.
pub struct KernelLock {
    owner: AtomicUsize,
}

impl KernelLock {
    pub const fn new() -> Self {
        Self { owner: AtomicUsize::new(NO_OWNER) }
    }

    pub fn lock(&self, cpu: CpuId) {
        let me = cpu.as_index();
        while self
            .owner
            .compare_exchange_weak(NO_OWNER, me, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    pub fn try_lock(&self, cpu: CpuId) -> bool {
        self.owner
            .compare_exchange(NO_OWNER, cpu.as_index(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the lock if `cpu` holds it; returns whether it did.
    pub fn release_if_held(&self, cpu: CpuId) -> bool {
        self.owner
            .compare_exchange(cpu.as_index(), NO_OWNER, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    pub fn holder(&self) -> Option<CpuId> {
        match self.owner.load(Ordering::Relaxed) {
            NO_OWNER => None,
            index => Some(CpuId::from_raw(index as u16)),
        }
    }
}

impl Default for KernelLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that every configured secondary acknowledged boot.
///
/// Only [`HartSync::wait_all_secondaries_booted`] hands these out; it gates
/// [`TemporaryMapping::retire`].
#[derive(Debug)]
pub struct AllSecondariesBooted {
    _private: (),
}

impl AllSecondariesBooted {
    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self { _private: () }
    }
}

/// Shared bring-up state between the primary and the secondaries.
pub struct HartSync {
    cores: usize,
    lock: KernelLock,
    released: AtomicBool,
    ack_count: AtomicUsize,
    ack_mask: AtomicUsize,
    phases: [AtomicU8; MAX_CPUS],
}

impl HartSync {
    /// Synchronization for `cores` harts (clamped to `1..=MAX_CPUS`).
    pub const fn new(cores: usize) -> Self {
        let cores = if cores == 0 {
            1
        } else if cores > MAX_CPUS {
            MAX_CPUS
        } else {
            cores
        };
        Self {
            cores,
            lock: KernelLock::new(),
            released: AtomicBool::new(false),
            ack_count: AtomicUsize::new(0),
            ack_mask: AtomicUsize::new(0),
            phases: [const { AtomicU8::new(HartPhase::Parked as u8) }; MAX_CPUS],
        }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn kernel_lock(&self) -> &KernelLock {
        &self.lock
    }

    /// Hart mask of every configured secondary.
    pub fn secondary_mask(&self) -> usize {
        ((1usize << self.cores) - 1) & !1
    }

    fn check_cpu(&self, cpu: CpuId) -> Result<(), ProtocolError> {
        if cpu.as_index() < self.cores {
            Ok(())
        } else {
            Err(ProtocolError::CpuOutOfRange(cpu))
        }
    }

    pub fn set_phase(&self, cpu: CpuId, phase: HartPhase) {
        if let Some(slot) = self.phases.get(cpu.as_index()) {
            slot.store(phase as u8, Ordering::Relaxed);
        }
    }

    pub fn phase(&self, cpu: CpuId) -> HartPhase {
        self.phases
            .get(cpu.as_index())
            .map(|slot| HartPhase::from_raw(slot.load(Ordering::Relaxed)))
            .unwrap_or(HartPhase::Parked)
    }

    /// Publishes the release signal once and wakes parked secondaries.
    ///
    /// Everything the primary wrote before this call is visible to a
    /// secondary once its [`wait_for_release`](Self::wait_for_release) returns.
    pub fn release_secondaries(
        &self,
        cpu: CpuId,
        wake: &mut dyn HartWake,
    ) -> Result<(), ProtocolError> {
        if !cpu.is_boot() {
            return Err(ProtocolError::NotPrimary);
        }
        self.released
            .compare_exchange(false, true, Ordering::Release, Ordering::Relaxed)
            .map_err(|_| ProtocolError::AlreadyReleased)?;
        let mask = self.secondary_mask();
        if mask != 0 {
            wake.wake(mask);
        }
        log_debug!(target: "smp", "released secondaries mask=0x{:x}", mask);
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn wait_for_release(&self, strategy: &dyn WaitStrategy) -> Result<(), ProtocolError> {
        strategy.wait_until(&mut || self.is_released())?;
        Ok(())
    }

    /// Records that `cpu` finished local setup; returns the new acknowledgment count.
    pub fn acknowledge_booted(&self, cpu: CpuId) -> Result<usize, ProtocolError> {
        if cpu.is_boot() {
            return Err(ProtocolError::NotSecondary);
        }
        self.check_cpu(cpu)?;
        let bit = cpu.mask_bit().ok_or(ProtocolError::CpuOutOfRange(cpu))?;
        let prev = self.ack_mask.fetch_or(bit, Ordering::Relaxed);
        if prev & bit != 0 {
            return Err(ProtocolError::DuplicateAcknowledge(cpu));
        }
        Ok(self.ack_count.fetch_add(1, Ordering::Release) + 1)
    }

    pub fn acknowledged(&self) -> usize {
        self.ack_count.load(Ordering::Acquire)
    }

    pub fn acknowledged_mask(&self) -> usize {
        self.ack_mask.load(Ordering::Relaxed)
    }

    /// Waits until every configured secondary has acknowledged and mints the proof token.
    pub fn wait_all_secondaries_booted(
        &self,
        cpu: CpuId,
        strategy: &dyn WaitStrategy,
    ) -> Result<AllSecondariesBooted, ProtocolError> {
        if !cpu.is_boot() {
            return Err(ProtocolError::NotPrimary);
        }
        let expected = self.cores - 1;
        strategy.wait_until(&mut || self.acknowledged() >= expected)?;
        Ok(AllSecondariesBooted { _private: () })
    }
}

/// Primary side: release, wait for every secondary, retire the boot mapping.
///
/// Returns holding the kernel lock; steady-state entry drops it.
pub fn primary_protocol(
    sync: &HartSync,
    cpu: CpuId,
    wake: &mut dyn HartWake,
    cpu_ops: &mut dyn CpuOps,
    mapping: TemporaryMapping,
    map_ops: &mut dyn BootMappingOps,
    strategy: &dyn WaitStrategy,
) -> Result<RetiredMapping, ProtocolError> {
    if !cpu.is_boot() {
        return Err(ProtocolError::NotPrimary);
    }
    sync.set_phase(cpu, HartPhase::Init);

    sync.set_phase(cpu, HartPhase::ReleaseSecondaries);
    sync.release_secondaries(cpu, wake)?;
    // The broadcast IPI may have targeted this hart too.
    cpu_ops.clear_soft_pending();

    sync.set_phase(cpu, HartPhase::WaitAllSecondariesBooted);
    let proof = sync.wait_all_secondaries_booted(cpu, strategy)?;
    log_info!(target: "smp", "all secondaries booted count={}", sync.acknowledged());

    sync.kernel_lock().lock(cpu);
    sync.set_phase(cpu, HartPhase::RetireTempMapping);
    Ok(mapping.retire(proof, map_ops))
}

/// Secondary side: wait for release, take the kernel lock, set up traps, acknowledge.
///
/// Returns holding the kernel lock; steady-state entry drops it.
pub fn secondary_protocol(
    sync: &HartSync,
    cpu: CpuId,
    subsystems: &mut dyn KernelSubsystems,
    strategy: &dyn WaitStrategy,
) -> Result<(), ProtocolError> {
    if cpu.is_boot() {
        return Err(ProtocolError::NotSecondary);
    }
    sync.check_cpu(cpu)?;

    sync.set_phase(cpu, HartPhase::WaitForRelease);
    sync.wait_for_release(strategy)?;

    sync.set_phase(cpu, HartPhase::AcquireKernelLock);
    sync.kernel_lock().lock(cpu);
    boot_marker!("Core {} start up", cpu);

    sync.set_phase(cpu, HartPhase::LocalExceptionInit);
    subsystems.setup_exception(cpu);

    sync.set_phase(cpu, HartPhase::AcknowledgeBooted);
    let count = sync.acknowledge_booted(cpu)?;
    log_debug!(target: "smp", "cpu {} acknowledged count={}", cpu, count);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::{CheckedMapOps, FakeCpu, FakeSubsystems, RecordingWake};
    use super::*;
    use crate::types::PageDirRoot;
    use core::sync::atomic::AtomicU64;

    const BUDGET: SpinBudget = SpinBudget(200_000_000);

    fn mapping() -> TemporaryMapping {
        TemporaryMapping::at(PageDirRoot::from_kva(0x9000), 1)
    }

    fn run_protocol(cores: usize) {
        let sync = HartSync::new(cores);
        let published = AtomicU64::new(0);

        let (retired, flushes, clears) = std::thread::scope(|s| {
            for index in 1..cores {
                let sync = &sync;
                let published = &published;
                s.spawn(move || {
                    let cpu = CpuId::from_raw(index as u16);
                    let mut subsystems = FakeSubsystems::default();
                    secondary_protocol(sync, cpu, &mut subsystems, &BUDGET).unwrap();
                    // Primary wrote before releasing; must be visible here.
                    assert_eq!(published.load(Ordering::Relaxed), 0xdead_beef);
                    assert_eq!(subsystems.local_setup, [cpu]);
                    assert_eq!(sync.kernel_lock().holder(), Some(cpu));
                    assert!(sync.kernel_lock().release_if_held(cpu));
                });
            }

            published.store(0xdead_beef, Ordering::Relaxed);
            let mut wake = RecordingWake::default();
            let mut cpu_ops = FakeCpu::default();
            let mut map_ops = CheckedMapOps::new(&sync);
            let retired = primary_protocol(
                &sync,
                CpuId::BOOT,
                &mut wake,
                &mut cpu_ops,
                mapping(),
                &mut map_ops,
                &BUDGET,
            )
            .unwrap();
            assert_eq!(cpu_ops.soft_cleared, 1);
            if cores > 1 {
                assert_eq!(wake.masks, [sync.secondary_mask()]);
            } else {
                assert!(wake.masks.is_empty());
            }
            assert!(sync.kernel_lock().release_if_held(CpuId::BOOT));
            (retired, map_ops.flushes, map_ops.clears)
        });

        assert_eq!(retired.index, 1);
        assert_eq!(flushes, 1);
        assert_eq!(clears.len(), 1, "temporary mapping retired exactly once");
        assert_eq!(clears[0].2, cores - 1, "retired only after every acknowledgment");
        assert_eq!(sync.acknowledged(), cores - 1);
        assert_eq!(sync.acknowledged_mask(), sync.secondary_mask());
        for index in 1..cores {
            assert_eq!(sync.phase(CpuId::from_raw(index as u16)), HartPhase::AcknowledgeBooted);
        }
        assert_eq!(sync.phase(CpuId::BOOT), HartPhase::RetireTempMapping);
    }

    #[test]
    fn single_core_boot_completes() {
        run_protocol(1);
    }

    #[test]
    fn dual_core_boot_completes() {
        run_protocol(2);
    }

    #[test]
    fn quad_core_boot_completes() {
        run_protocol(4);
    }

    #[test]
    fn test_reject_second_release() {
        let sync = HartSync::new(2);
        let mut wake = RecordingWake::default();
        sync.release_secondaries(CpuId::BOOT, &mut wake).unwrap();
        assert_eq!(
            sync.release_secondaries(CpuId::BOOT, &mut wake),
            Err(ProtocolError::AlreadyReleased)
        );
        assert_eq!(wake.masks.len(), 1);
    }

    #[test]
    fn test_reject_release_from_secondary() {
        let sync = HartSync::new(2);
        let err = sync.release_secondaries(CpuId::from_raw(1), &mut RecordingWake::default());
        assert_eq!(err, Err(ProtocolError::NotPrimary));
        assert!(!sync.is_released());
    }

    #[test]
    fn test_reject_duplicate_acknowledge() {
        let sync = HartSync::new(4);
        let cpu = CpuId::from_raw(2);
        assert_eq!(sync.acknowledge_booted(cpu), Ok(1));
        assert_eq!(sync.acknowledge_booted(cpu), Err(ProtocolError::DuplicateAcknowledge(cpu)));
        assert_eq!(sync.acknowledged(), 1);
        assert_eq!(sync.acknowledge_booted(CpuId::BOOT), Err(ProtocolError::NotSecondary));
        assert_eq!(
            sync.acknowledge_booted(CpuId::from_raw(4)),
            Err(ProtocolError::CpuOutOfRange(CpuId::from_raw(4)))
        );
    }

    #[test]
    fn bounded_waits_time_out() {
        let sync = HartSync::new(2);
        assert_eq!(sync.wait_for_release(&SpinBudget(16)), Err(ProtocolError::TimedOut));
        assert_eq!(
            sync.wait_all_secondaries_booted(CpuId::BOOT, &SpinBudget(16)).map(|_| ()),
            Err(ProtocolError::TimedOut)
        );
    }

    #[test]
    fn missing_secondary_blocks_retirement() {
        let sync = HartSync::new(3);
        sync.acknowledge_booted(CpuId::from_raw(1)).unwrap();
        let mut map_ops = CheckedMapOps::new(&sync);
        let err = primary_protocol(
            &sync,
            CpuId::BOOT,
            &mut RecordingWake::default(),
            &mut FakeCpu::default(),
            mapping(),
            &mut map_ops,
            &SpinBudget(64),
        );
        assert_eq!(err, Err(ProtocolError::TimedOut));
        assert!(map_ops.clears.is_empty());
        assert_eq!(sync.kernel_lock().holder(), None);
    }

    #[test]
    fn kernel_lock_tracks_owner() {
        let lock = KernelLock::new();
        let cpu = CpuId::from_raw(1);
        lock.lock(cpu);
        assert_eq!(lock.holder(), Some(cpu));
        assert!(!lock.try_lock(CpuId::BOOT));
        assert!(!lock.release_if_held(CpuId::BOOT));
        assert!(lock.release_if_held(cpu));
        assert_eq!(lock.holder(), None);
        assert!(!lock.release_if_held(cpu));
    }

    #[test]
    fn secondary_mask_excludes_primary() {
        assert_eq!(HartSync::new(1).secondary_mask(), 0);
        assert_eq!(HartSync::new(2).secondary_mask(), 0b10);
        assert_eq!(HartSync::new(4).secondary_mask(), 0b1110);
        assert_eq!(HartSync::new(9).cores(), MAX_CPUS);
    }
}
