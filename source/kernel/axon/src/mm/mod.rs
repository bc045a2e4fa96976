// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Boot-window view of the Sv39 kernel page directory.

pub mod boot_map;

use bitflags::bitflags;

/// Number of entries per Sv39 page table.
pub const PT_ENTRIES: usize = 512;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    /// Flags stored in an Sv39 PTE.
    pub struct PteFlags: u64 {
        const VALID = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER = 1 << 4;
        const GLOBAL = 1 << 5;
        const ACCESSED = 1 << 6;
        const DIRTY = 1 << 7;
    }
}

impl PteFlags {
    /// Flags of a raw entry.
    #[inline]
    pub const fn of(pte: u64) -> Self {
        Self::from_bits_truncate(pte)
    }

    /// Leaf entries carry at least one of R/W/X.
    #[inline]
    pub fn is_leaf(self) -> bool {
        self.intersects(Self::READ | Self::WRITE | Self::EXECUTE)
    }
}

pub use boot_map::{BootMappingOps, RetiredMapping, Sv39BootMap, TemporaryMapping};
