// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel bring-up: primary bootstrap, hart synchronization, steady-state entry
//! OWNERS: @kernel-boot-team
//! PUBLIC API: boot, smp, idle, kernel, kmain
//! DEPENDS_ON: task, syscall, devices, mm::boot_map, hal
//! INVARIANTS: Primary boots alone; secondaries released once; all harts converge on steady state

pub mod boot;
pub mod idle;
pub mod kernel;
pub mod kmain;
pub mod smp;

pub use kernel::{Kernel, KERNEL};
pub use kmain::{bring_up_hart, kmain, BringUpError, HartPorts};
