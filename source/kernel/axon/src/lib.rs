// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: AXON kernel bring-up core library
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Host unit tests (`cargo test -p axon`), harts simulated with std threads
//! PUBLIC API: bringup::kmain(), bringup::Kernel, hal traits, syscall table, task tables
//! DEPENDS_ON: spin, bitflags, riscv, sbi-rt (target), static_assertions
//! INVARIANTS: No allocation; no unwrap in kernel paths; target-only code gated on riscv64-none

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), forbid(clippy::unwrap_used))]

#[macro_use]
pub mod log;

pub mod arch;
pub mod bringup;
pub mod config;
pub mod devices;
pub mod hal;
pub mod mm;
mod panic;
pub mod syscall;
pub mod task;
pub mod timer;
pub mod types;
pub mod uart;
