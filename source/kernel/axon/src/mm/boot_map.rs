// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Temporary boot identity mapping and its one-shot retirement
//! OWNERS: @kernel-mm-team
//! PUBLIC API: TemporaryMapping::{boot_identity, retire}, BootMappingOps, Sv39BootMap
//! DEPENDS_ON: bringup::smp::AllSecondariesBooted, arch::riscv::flush_tlb_all
//! INVARIANTS: Retired exactly once, only with proof that every secondary acknowledged; TLB flushed after the write

use core::ptr;

use super::{PteFlags, PT_ENTRIES};
use crate::bringup::smp::AllSecondariesBooted;
use crate::config::TEMP_MAPPING_ROOT_INDEX;
use crate::types::PageDirRoot;

/// Page-table edits needed to drop the boot identity window.
pub trait BootMappingOps {
    /// Clears root entry `index` of `root` and returns the previous raw entry.
    fn clear_root_entry(&mut self, root: PageDirRoot, index: usize) -> u64;
    /// Invalidates every cached translation on this hart.
    fn flush_tlb(&mut self);
}

/// Writes straight into the root table through the kernel direct map.
pub struct Sv39BootMap {
    _private: (),
}

impl Sv39BootMap {
    /// # Safety
    ///
    /// Every `PageDirRoot` later passed to `clear_root_entry` must address a
    /// live, writable 4 KiB page directory that no other hart is editing.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl BootMappingOps for Sv39BootMap {
    fn clear_root_entry(&mut self, root: PageDirRoot, index: usize) -> u64 {
        if index >= PT_ENTRIES {
            return 0;
        }
        let entry = (root.kva() as *mut u64).wrapping_add(index);
        // SAFETY: `new` requires `root` to be a live page directory owned by this
        // hart for the duration of the call; `index` is bounds-checked above.
        unsafe {
            let old = ptr::read_volatile(entry);
            ptr::write_volatile(entry, 0);
            old
        }
    }

    fn flush_tlb(&mut self) {
        crate::arch::riscv::flush_tlb_all();
    }
}

/// The bootloader's identity window in the kernel page directory.
///
/// Move-only: exactly one handle exists and `retire` consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct TemporaryMapping {
    root: PageDirRoot,
    index: usize,
}

/// Receipt returned by [`TemporaryMapping::retire`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetiredMapping {
    pub root: PageDirRoot,
    pub index: usize,
    /// Raw root entry as it was before the clear.
    pub previous: u64,
}

impl TemporaryMapping {
    /// Root entry of the kernel page directory installed by the bootloader.
    pub const fn boot_identity() -> Self {
        Self { root: PageDirRoot::kernel(), index: TEMP_MAPPING_ROOT_INDEX }
    }

    pub(crate) const fn at(root: PageDirRoot, index: usize) -> Self {
        Self { root, index }
    }

    pub fn root(&self) -> PageDirRoot {
        self.root
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Clears the root entry and flushes the local TLB.
    ///
    /// The proof token can only be obtained from the hart synchronization
    /// protocol once every secondary has acknowledged.
    pub fn retire(
        self,
        _proof: AllSecondariesBooted,
        ops: &mut dyn BootMappingOps,
    ) -> RetiredMapping {
        let previous = ops.clear_root_entry(self.root, self.index);
        ops.flush_tlb();
        if !PteFlags::of(previous).contains(PteFlags::VALID) {
            log_warn!(target: "mm", "temporary root entry {} was not valid", self.index);
        }
        log_info!(target: "mm", "temporary mapping retired root={} index={}", self.root, self.index);
        RetiredMapping { root: self.root, index: self.index, previous }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(4096))]
    struct PageDir([u64; PT_ENTRIES]);

    #[test]
    fn retire_clears_only_the_identity_entry() {
        let mut dir = PageDir([0; PT_ENTRIES]);
        let identity = (0x8000_0u64 << 10) | (PteFlags::VALID | PteFlags::READ | PteFlags::EXECUTE).bits();
        dir.0[0] = 0x55;
        dir.0[TEMP_MAPPING_ROOT_INDEX] = identity;
        dir.0[TEMP_MAPPING_ROOT_INDEX + 1] = 0x77;
        let root = PageDirRoot::from_kva(dir.0.as_mut_ptr() as usize);

        // SAFETY: `dir` is a live page directory owned by this test.
        let mut ops = unsafe { Sv39BootMap::new() };
        let mapping = TemporaryMapping::at(root, TEMP_MAPPING_ROOT_INDEX);
        let retired = mapping.retire(AllSecondariesBooted::for_test(), &mut ops);

        assert_eq!(retired.previous, identity);
        assert!(PteFlags::of(retired.previous).is_leaf());
        assert_eq!(dir.0[TEMP_MAPPING_ROOT_INDEX], 0);
        assert_eq!(dir.0[0], 0x55);
        assert_eq!(dir.0[TEMP_MAPPING_ROOT_INDEX + 1], 0x77);
    }

    #[test]
    fn boot_identity_targets_kernel_root() {
        let mapping = TemporaryMapping::boot_identity();
        assert_eq!(mapping.root(), PageDirRoot::kernel());
        assert_eq!(mapping.index(), TEMP_MAPPING_ROOT_INDEX);
    }

    #[test]
    fn test_reject_out_of_table_index() {
        // SAFETY: the index is rejected before any access.
        let mut ops = unsafe { Sv39BootMap::new() };
        assert_eq!(ops.clear_root_entry(PageDirRoot::from_kva(0x1000), PT_ENTRIES), 0);
    }
}
