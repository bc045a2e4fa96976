// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handler shims and the backend contract they forward to
//! OWNERS: @kernel-team
//! PUBLIC API: SyscallBackend, handler_for(Syscall)
//! DEPENDS_ON: syscall::{Args, Error, Handler, SysResult, Syscall}, timer, arch::riscv
//! INVARIANTS: Decode -> Check -> Execute; handler_for is exhaustive over Syscall

use super::{Args, Error, Handler, SysResult, Syscall};
use crate::types::Pid;

/// Handler bodies owned by the scheduler, futex, screen, memory and network layers.
///
/// Pointers are user virtual addresses and are validated by the implementor.
pub trait SyscallBackend {
    fn spawn(&mut self, info: usize, arg: usize, mode: usize) -> SysResult<usize>;
    fn exit(&mut self) -> SysResult<usize>;
    fn sleep(&mut self, seconds: u32) -> SysResult<usize>;
    fn kill(&mut self, pid: Pid) -> SysResult<usize>;
    fn waitpid(&mut self, pid: Pid) -> SysResult<usize>;
    fn process_show(&mut self) -> SysResult<usize>;
    fn getpid(&mut self) -> SysResult<usize>;
    fn exec(&mut self, name: usize, argc: usize, argv: usize, mode: usize) -> SysResult<usize>;
    fn show_exec(&mut self) -> SysResult<usize>;

    fn futex_wait(&mut self, key: usize) -> SysResult<usize>;
    fn futex_wakeup(&mut self, key: usize, count: usize) -> SysResult<usize>;
    fn shm_page_get(&mut self, key: usize) -> SysResult<usize>;
    fn shm_page_detach(&mut self, addr: usize) -> SysResult<usize>;

    fn move_cursor(&mut self, x: u16, y: u16) -> SysResult<usize>;
    fn reflush(&mut self) -> SysResult<usize>;
    fn write(&mut self, buf: usize) -> SysResult<usize>;
    fn screen_clear(&mut self) -> SysResult<usize>;
    fn get_char(&mut self) -> SysResult<usize>;

    fn net_recv(&mut self, request: NetRecvRequest) -> SysResult<usize>;
    fn net_send(&mut self, buf: usize, len: usize) -> SysResult<usize>;
    fn net_irq_mode(&mut self, enabled: bool) -> SysResult<usize>;
}

// Typed decoders

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct CursorArgsTyped {
    x: u16,
    y: u16,
}

impl CursorArgsTyped {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        let x = u16::try_from(args.get(0)).map_err(|_| Error::InvalidArgument)?;
        let y = u16::try_from(args.get(1)).map_err(|_| Error::InvalidArgument)?;
        Ok(Self { x, y })
    }
}

/// Decoded receive request: `packets` frames into `buf`, per-frame lengths into `frame_lengths`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NetRecvRequest {
    pub buf: usize,
    pub len: usize,
    pub packets: usize,
    pub frame_lengths: usize,
}

impl NetRecvRequest {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        let request = Self {
            buf: args.get(0),
            len: args.get(1),
            packets: args.get(2),
            frame_lengths: args.get(3),
        };
        if request.buf == 0 || request.frame_lengths == 0 || request.packets == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(request)
    }
}

#[inline]
fn decode_pid(raw: usize) -> Result<Pid, Error> {
    u32::try_from(raw).map(Pid::from_raw).map_err(|_| Error::InvalidArgument)
}

/// Returns the shim serving `syscall`.
pub fn handler_for(syscall: Syscall) -> Handler {
    match syscall {
        Syscall::Spawn => sys_spawn,
        Syscall::Exit => sys_exit,
        Syscall::Sleep => sys_sleep,
        Syscall::Kill => sys_kill,
        Syscall::Waitpid => sys_waitpid,
        Syscall::Ps => sys_ps,
        Syscall::Getpid => sys_getpid,
        Syscall::Exec => sys_exec,
        Syscall::ShowExec => sys_show_exec,
        Syscall::FutexWait => sys_futex_wait,
        Syscall::FutexWakeup => sys_futex_wakeup,
        Syscall::ShmPageGet => sys_shm_page_get,
        Syscall::ShmPageDetach => sys_shm_page_detach,
        Syscall::Cursor => sys_cursor,
        Syscall::Reflush => sys_reflush,
        Syscall::Write => sys_write,
        Syscall::ScreenClear => sys_screen_clear,
        Syscall::GetChar => sys_get_char,
        Syscall::GetTimebase => sys_get_timebase,
        Syscall::GetTick => sys_get_tick,
        Syscall::NetRecv => sys_net_recv,
        Syscall::NetSend => sys_net_send,
        Syscall::NetIrqMode => sys_net_irq_mode,
    }
}

fn sys_spawn(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    if args.get(0) == 0 {
        return Err(Error::InvalidArgument);
    }
    backend.spawn(args.get(0), args.get(1), args.get(2))
}

fn sys_exit(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.exit()?;
    Err(Error::TaskExit)
}

fn sys_sleep(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    let seconds = u32::try_from(args.get(0)).map_err(|_| Error::InvalidArgument)?;
    backend.sleep(seconds)
}

fn sys_kill(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.kill(decode_pid(args.get(0))?)
}

fn sys_waitpid(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.waitpid(decode_pid(args.get(0))?)
}

fn sys_ps(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.process_show()
}

fn sys_getpid(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.getpid()
}

fn sys_exec(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    if args.get(0) == 0 {
        return Err(Error::InvalidArgument);
    }
    backend.exec(args.get(0), args.get(1), args.get(2), args.get(3))
}

fn sys_show_exec(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.show_exec()
}

fn sys_futex_wait(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.futex_wait(args.get(0))
}

fn sys_futex_wakeup(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.futex_wakeup(args.get(0), args.get(1))
}

fn sys_shm_page_get(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.shm_page_get(args.get(0))
}

fn sys_shm_page_detach(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.shm_page_detach(args.get(0))
}

fn sys_cursor(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    let typed = CursorArgsTyped::decode(args)?;
    backend.move_cursor(typed.x, typed.y)
}

fn sys_reflush(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.reflush()
}

fn sys_write(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    if args.get(0) == 0 {
        return Err(Error::InvalidArgument);
    }
    backend.write(args.get(0))
}

fn sys_screen_clear(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.screen_clear()
}

fn sys_get_char(backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    backend.get_char()
}

fn sys_get_timebase(_backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    Ok(crate::timer::time_base() as usize)
}

fn sys_get_tick(_backend: &mut dyn SyscallBackend, _args: &Args) -> SysResult<usize> {
    Ok(crate::arch::riscv::read_time() as usize)
}

fn sys_net_recv(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.net_recv(NetRecvRequest::decode(args)?)
}

fn sys_net_send(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    if args.get(0) == 0 {
        return Err(Error::InvalidArgument);
    }
    backend.net_send(args.get(0), args.get(1))
}

fn sys_net_irq_mode(backend: &mut dyn SyscallBackend, args: &Args) -> SysResult<usize> {
    backend.net_irq_mode(args.get(0) != 0)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Backend that remembers which entry point was reached last.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub last: Option<Syscall>,
        pub cursor: Option<(u16, u16)>,
        pub irq_mode: Option<bool>,
    }

    impl RecordingBackend {
        fn hit(&mut self, syscall: Syscall) -> SysResult<usize> {
            self.last = Some(syscall);
            Ok(syscall.number())
        }
    }

    impl SyscallBackend for RecordingBackend {
        fn spawn(&mut self, _info: usize, _arg: usize, _mode: usize) -> SysResult<usize> {
            self.hit(Syscall::Spawn)
        }
        fn exit(&mut self) -> SysResult<usize> {
            self.hit(Syscall::Exit)
        }
        fn sleep(&mut self, _seconds: u32) -> SysResult<usize> {
            self.hit(Syscall::Sleep)
        }
        fn kill(&mut self, _pid: Pid) -> SysResult<usize> {
            self.hit(Syscall::Kill)
        }
        fn waitpid(&mut self, _pid: Pid) -> SysResult<usize> {
            self.hit(Syscall::Waitpid)
        }
        fn process_show(&mut self) -> SysResult<usize> {
            self.hit(Syscall::Ps)
        }
        fn getpid(&mut self) -> SysResult<usize> {
            self.hit(Syscall::Getpid)
        }
        fn exec(&mut self, _name: usize, _argc: usize, _argv: usize, _mode: usize) -> SysResult<usize> {
            self.hit(Syscall::Exec)
        }
        fn show_exec(&mut self) -> SysResult<usize> {
            self.hit(Syscall::ShowExec)
        }
        fn futex_wait(&mut self, _key: usize) -> SysResult<usize> {
            self.hit(Syscall::FutexWait)
        }
        fn futex_wakeup(&mut self, _key: usize, _count: usize) -> SysResult<usize> {
            self.hit(Syscall::FutexWakeup)
        }
        fn shm_page_get(&mut self, _key: usize) -> SysResult<usize> {
            self.hit(Syscall::ShmPageGet)
        }
        fn shm_page_detach(&mut self, _addr: usize) -> SysResult<usize> {
            self.hit(Syscall::ShmPageDetach)
        }
        fn move_cursor(&mut self, x: u16, y: u16) -> SysResult<usize> {
            self.cursor = Some((x, y));
            self.hit(Syscall::Cursor)
        }
        fn reflush(&mut self) -> SysResult<usize> {
            self.hit(Syscall::Reflush)
        }
        fn write(&mut self, _buf: usize) -> SysResult<usize> {
            self.hit(Syscall::Write)
        }
        fn screen_clear(&mut self) -> SysResult<usize> {
            self.hit(Syscall::ScreenClear)
        }
        fn get_char(&mut self) -> SysResult<usize> {
            self.hit(Syscall::GetChar)
        }
        fn net_recv(&mut self, _request: NetRecvRequest) -> SysResult<usize> {
            self.hit(Syscall::NetRecv)
        }
        fn net_send(&mut self, _buf: usize, _len: usize) -> SysResult<usize> {
            self.hit(Syscall::NetSend)
        }
        fn net_irq_mode(&mut self, enabled: bool) -> SysResult<usize> {
            self.irq_mode = Some(enabled);
            self.hit(Syscall::NetIrqMode)
        }
    }
}
