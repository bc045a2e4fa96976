// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Newtypes shared across the bring-up core
//! OWNERS: @kernel-team
//! PUBLIC API: HartId, CpuId, Pid, PageDirRoot
//! DEPENDS_ON: config::MAX_CPUS
//! INVARIANTS: Hardware hart identity kept distinct from logical CPU indices

use core::fmt;

use crate::config::MAX_CPUS;

/// Hardware hart identifier as handed over by the bootloader (`a0` at entry).
///
/// We keep this distinct from per-CPU table indices so call-sites cannot
/// accidentally mix hardware identity with logical routing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HartId(u16);

impl HartId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Logical CPU identifier used to index per-CPU kernel state.
///
/// This is a 1:1 mapping from `HartId`; hart 0 is the designated primary.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CpuId(u16);

impl CpuId {
    pub const BOOT: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn from_hart(hart: HartId) -> Self {
        Self(hart.as_raw())
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_boot(self) -> bool {
        self.0 == 0
    }

    /// Returns the CPU's bit in an online/acknowledge mask, `None` beyond `MAX_CPUS`.
    #[inline]
    pub const fn mask_bit(self) -> Option<usize> {
        if self.as_index() < MAX_CPUS {
            Some(1usize << self.as_index())
        } else {
            None
        }
    }
}

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Process identifier handed out by the task-creation collaborator.
///
/// **Invariant**: PID 0 is reserved for the kernel (never exposed to userspace).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Kernel PID (reserved).
    pub const KERNEL: Self = Self(0);
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Kernel-virtual address of a top-level page directory.
///
/// **Ownership**: held by exactly one PCB (idle tasks share the kernel root by
/// value; each idle PCB owns its copy of the handle).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PageDirRoot(usize);

impl PageDirRoot {
    #[inline]
    pub const fn from_kva(kva: usize) -> Self {
        Self(kva)
    }

    /// Kernel page directory (`pa2kva(PGDIR_PA)`).
    #[inline]
    pub const fn kernel() -> Self {
        Self(crate::config::pa2kva(crate::config::PGDIR_PA))
    }

    #[inline]
    pub const fn kva(self) -> usize {
        self.0
    }
}

impl fmt::Display for PageDirRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_cpu_is_hart_zero() {
        assert!(CpuId::from_hart(HartId::from_raw(0)).is_boot());
        assert!(!CpuId::from_hart(HartId::from_raw(1)).is_boot());
    }

    #[test]
    fn test_reject_mask_bit_beyond_ceiling() {
        assert_eq!(CpuId::from_raw(3).mask_bit(), Some(0b1000));
        assert_eq!(CpuId::from_raw(MAX_CPUS as u16).mask_bit(), None);
    }

    #[test]
    fn kernel_root_lives_in_direct_map() {
        let root = PageDirRoot::kernel();
        assert_eq!(root.kva(), crate::config::PGDIR_PA + crate::config::KERNEL_VA_OFFSET);
    }
}
