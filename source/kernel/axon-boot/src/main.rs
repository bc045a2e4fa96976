// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Boot wrapper for the AXON kernel. Every hart enters `_start` with
//! `a0 = hartid` and `a1 = dtb`, gets its own stack and hands over to
//! `axon::bringup::kmain()`. The `platform` module binds the bring-up traits
//! to the memory manager, drivers, task loader and syscall bodies linked into
//! the final image.
#![cfg_attr(all(target_arch = "riscv64", target_os = "none"), no_std, no_main)]

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
core::arch::global_asm!(
    r#"
    .section .text._start, "ax", @progbits
    .globl _start
    .align 4
_start:
    /* a0 = hartid, a1 = dtb; both preserved for start_rust */
    csrw  sie, zero
    csrw  sip, zero
    mv    tp, a0
    .option push
    .option norelax
    la    gp, __global_pointer$
    .option pop
    /* sp = __stack_top - hartid * AXON_HART_STACK_SIZE */
    la    sp, __stack_top
    li    t0, 0x4000
    mul   t1, a0, t0
    sub   sp, sp, t1
    bnez  a0, 2f
    la    t0, __bss_start
    la    t1, __bss_end
1:
    bgeu  t0, t1, 2f
    sd    zero, (t0)
    addi  t0, t0, 8
    j     1b
2:
    j     start_rust
"#
);

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod platform {
    //! FFI bindings for the collaborators the bring-up core drives.

    use axon::hal::{DeviceDrivers, DriverError, EmacConfig, IoRemap, KernelSubsystems};
    use axon::syscall::api::NetRecvRequest;
    use axon::syscall::{Error, SysResult, SyscallBackend};
    use axon::task::{CleanupPolicy, ExecError, ExecRequest, PcbTable, TaskLauncher, TaskStatus};
    use axon::types::{CpuId, PageDirRoot, Pid};

    extern "C" {
        fn ioremap(phys: u64, len: u64) -> usize;
        fn plic_init(base: usize, nr_irqs: u32) -> i64;
        fn emacps_set_slcr_base(base: usize);
        fn emacps_configure(device_id: u16, base_address: usize, cache_coherent: u32);
        fn emacps_init() -> i64;
        fn task_load_image(name: *const u8, name_len: usize, argc: usize, out_pgdir: *mut usize) -> i64;

        fn init_system_futex();
        fn init_exception();
        fn setup_exception();
        fn init_screen();

        fn do_spawn(info: usize, arg: usize, mode: usize) -> i64;
        fn do_exit() -> i64;
        fn do_sleep(seconds: u32) -> i64;
        fn do_kill(pid: u32) -> i64;
        fn do_waitpid(pid: u32) -> i64;
        fn do_process_show() -> i64;
        fn do_getpid() -> i64;
        fn do_exec(name: usize, argc: usize, argv: usize, mode: usize) -> i64;
        fn do_show_exec() -> i64;
        fn futex_wait(key: usize) -> i64;
        fn futex_wakeup(key: usize, count: usize) -> i64;
        fn shm_page_get(key: usize) -> i64;
        fn shm_page_dt(addr: usize) -> i64;
        fn screen_move_cursor(x: u16, y: u16) -> i64;
        fn screen_reflush() -> i64;
        fn screen_write(buf: usize) -> i64;
        fn screen_clear() -> i64;
        fn console_getchar() -> i64;
        fn do_net_recv(buf: usize, len: usize, packets: usize, frame_lengths: usize) -> i64;
        fn do_net_send(buf: usize, len: usize) -> i64;
        fn do_net_irq_mode(mode: usize) -> i64;
    }

    fn driver_status(code: i64) -> Result<(), DriverError> {
        if code == 0 {
            Ok(())
        } else {
            Err(DriverError { code })
        }
    }

    fn status(code: i64) -> SysResult<usize> {
        if code < 0 {
            Err(Error::Backend(code))
        } else {
            Ok(code as usize)
        }
    }

    pub struct Collaborators;

    impl IoRemap for Collaborators {
        fn ioremap(&mut self, phys: usize, len: usize) -> usize {
            // SAFETY: the memory manager is initialized before kmain runs.
            unsafe { ioremap(phys as u64, len as u64) }
        }
    }

    impl DeviceDrivers for Collaborators {
        fn plic_init(&mut self, base: usize, nr_irqs: u32) -> Result<(), DriverError> {
            // SAFETY: `base` is the mapped PLIC window.
            driver_status(unsafe { plic_init(base, nr_irqs) })
        }

        fn set_slcr_base(&mut self, base: usize) {
            // SAFETY: `base` is the mapped SLCR window.
            unsafe { emacps_set_slcr_base(base) }
        }

        fn configure_emac(&mut self, config: EmacConfig) {
            // SAFETY: plain value handoff to the driver's config block.
            unsafe {
                emacps_configure(config.device_id, config.base_address, config.cache_coherent as u32)
            }
        }

        fn emac_init(&mut self) -> Result<(), DriverError> {
            // SAFETY: called once after `configure_emac`.
            driver_status(unsafe { emacps_init() })
        }
    }

    impl TaskLauncher for Collaborators {
        fn exec(&mut self, pcbs: &mut PcbTable, request: &ExecRequest<'_>) -> Result<Pid, ExecError> {
            let slot = pcbs.first_free_slot().ok_or(ExecError::NoFreeSlot)?;
            let mut pgdir = 0usize;
            // SAFETY: `name` is valid for `name_len` bytes; `out_pgdir` points to a local.
            let pid = unsafe {
                task_load_image(
                    request.name.as_ptr(),
                    request.name.len(),
                    request.argv.len(),
                    &mut pgdir,
                )
            };
            if pid < 0 {
                return Err(ExecError::Loader(pid));
            }
            let pid = u32::try_from(pid).map_err(|_| ExecError::Loader(pid))?;
            let pcb = pcbs.get_mut(slot).ok_or(ExecError::NoFreeSlot)?;
            pcb.status = TaskStatus::Running;
            pcb.pid = Some(Pid::from_raw(pid));
            pcb.pgdir = Some(PageDirRoot::from_kva(pgdir));
            pcb.needs_cleanup = request.policy == CleanupPolicy::AutoCleanupOnExit;
            Ok(Pid::from_raw(pid))
        }
    }

    impl KernelSubsystems for Collaborators {
        fn init_futex(&mut self) {
            // SAFETY: primary only, before interrupts.
            unsafe { init_system_futex() }
        }

        fn init_exception(&mut self) {
            // SAFETY: primary only, before interrupts.
            unsafe { init_exception() }
        }

        fn setup_exception(&mut self, _cpu: CpuId) {
            // SAFETY: installs this hart's trap vector; called under the kernel lock.
            unsafe { setup_exception() }
        }

        fn init_screen(&mut self) {
            // SAFETY: primary only, before interrupts.
            unsafe { init_screen() }
        }
    }

    pub struct Syscalls;

    // SAFETY (all methods): handler bodies validate user pointers themselves.
    impl SyscallBackend for Syscalls {
        fn spawn(&mut self, info: usize, arg: usize, mode: usize) -> SysResult<usize> {
            status(unsafe { do_spawn(info, arg, mode) })
        }
        fn exit(&mut self) -> SysResult<usize> {
            status(unsafe { do_exit() })
        }
        fn sleep(&mut self, seconds: u32) -> SysResult<usize> {
            status(unsafe { do_sleep(seconds) })
        }
        fn kill(&mut self, pid: Pid) -> SysResult<usize> {
            status(unsafe { do_kill(pid.as_raw()) })
        }
        fn waitpid(&mut self, pid: Pid) -> SysResult<usize> {
            status(unsafe { do_waitpid(pid.as_raw()) })
        }
        fn process_show(&mut self) -> SysResult<usize> {
            status(unsafe { do_process_show() })
        }
        fn getpid(&mut self) -> SysResult<usize> {
            status(unsafe { do_getpid() })
        }
        fn exec(&mut self, name: usize, argc: usize, argv: usize, mode: usize) -> SysResult<usize> {
            status(unsafe { do_exec(name, argc, argv, mode) })
        }
        fn show_exec(&mut self) -> SysResult<usize> {
            status(unsafe { do_show_exec() })
        }
        fn futex_wait(&mut self, key: usize) -> SysResult<usize> {
            status(unsafe { futex_wait(key) })
        }
        fn futex_wakeup(&mut self, key: usize, count: usize) -> SysResult<usize> {
            status(unsafe { futex_wakeup(key, count) })
        }
        fn shm_page_get(&mut self, key: usize) -> SysResult<usize> {
            status(unsafe { shm_page_get(key) })
        }
        fn shm_page_detach(&mut self, addr: usize) -> SysResult<usize> {
            status(unsafe { shm_page_dt(addr) })
        }
        fn move_cursor(&mut self, x: u16, y: u16) -> SysResult<usize> {
            status(unsafe { screen_move_cursor(x, y) })
        }
        fn reflush(&mut self) -> SysResult<usize> {
            status(unsafe { screen_reflush() })
        }
        fn write(&mut self, buf: usize) -> SysResult<usize> {
            status(unsafe { screen_write(buf) })
        }
        fn screen_clear(&mut self) -> SysResult<usize> {
            status(unsafe { screen_clear() })
        }
        fn get_char(&mut self) -> SysResult<usize> {
            status(unsafe { console_getchar() })
        }
        fn net_recv(&mut self, request: NetRecvRequest) -> SysResult<usize> {
            status(unsafe {
                do_net_recv(request.buf, request.len, request.packets, request.frame_lengths)
            })
        }
        fn net_send(&mut self, buf: usize, len: usize) -> SysResult<usize> {
            status(unsafe { do_net_send(buf, len) })
        }
        fn net_irq_mode(&mut self, enabled: bool) -> SysResult<usize> {
            status(unsafe { do_net_irq_mode(enabled as usize) })
        }
    }
}

/// Syscall entry for the trap layer: `number` from a7, arguments from a0-a5.
#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[no_mangle]
pub extern "C" fn axon_dispatch_syscall(
    number: usize,
    a0: usize,
    a1: usize,
    a2: usize,
    a3: usize,
    a4: usize,
    a5: usize,
) -> isize {
    let args = axon::syscall::Args::new([a0, a1, a2, a3, a4, a5]);
    match axon::bringup::KERNEL.dispatch_syscall(number, &mut platform::Syscalls, &args) {
        Ok(value) => value as isize,
        Err(err) => err.to_status(),
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[no_mangle]
pub extern "C" fn start_rust(hartid: usize, dtb: usize) -> ! {
    use axon::arch::riscv::RiscvCpu;
    use axon::bringup::{kmain, HartPorts, KERNEL};
    use axon::hal::sbi::{SbiFirmware, SbiHartWake};
    use axon::mm::Sv39BootMap;
    use axon::types::HartId;

    let mut remap = platform::Collaborators;
    let mut drivers = platform::Collaborators;
    let mut launcher = platform::Collaborators;
    let mut subsystems = platform::Collaborators;
    // SAFETY: the kernel page directory is live and only the primary edits it.
    let mut boot_map = unsafe { Sv39BootMap::new() };
    let ports = HartPorts {
        firmware: &SbiFirmware,
        remap: &mut remap,
        drivers: &mut drivers,
        launcher: &mut launcher,
        subsystems: &mut subsystems,
        wake: &mut SbiHartWake,
        cpu: &mut RiscvCpu,
        boot_map: &mut boot_map,
    };
    kmain(&KERNEL, HartId::from_raw(hartid as u16), dtb, ports)
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
fn main() {}
