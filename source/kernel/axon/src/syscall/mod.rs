// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall numbering, dispatch table and error type
//! OWNERS: @kernel-team
//! PUBLIC API: Syscall, SyscallTable, build_syscall_table(), Args, Error, Handler, SysResult
//! DEPENDS_ON: syscall::api (handler shims + SyscallBackend)
//! INVARIANTS: Closed dense numbering; every Syscall bound exactly once; table immutable once published

pub mod api;

use core::fmt;

pub use api::SyscallBackend;

/// Capacity of the dispatch table.
pub const MAX_SYSCALL: usize = 32;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Syscall arguments passed in registers a0-a5.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Args {
    regs: [usize; 6],
}

impl Args {
    pub const fn new(regs: [usize; 6]) -> Self {
        Self { regs }
    }

    /// Returns the raw register at `index` (zero past a5).
    pub fn get(&self, index: usize) -> usize {
        self.regs.get(index).copied().unwrap_or(0)
    }
}

/// Declares [`Syscall`] together with its number-ordered `ALL` list and names,
/// so a variant cannot exist without being listed.
macro_rules! syscalls {
    ($($variant:ident = $number:literal => $name:literal,)+) => {
        /// Every system call the kernel serves. The discriminant is the user-visible number.
        #[repr(usize)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Syscall {
            $($variant = $number,)+
        }

        impl Syscall {
            /// All syscalls in number order.
            pub const ALL: &'static [Syscall] = &[$(Self::$variant,)+];

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

syscalls! {
    // process control
    Spawn = 0 => "spawn",
    Exit = 1 => "exit",
    Sleep = 2 => "sleep",
    Kill = 3 => "kill",
    Waitpid = 4 => "waitpid",
    Ps = 5 => "ps",
    Getpid = 6 => "getpid",
    Exec = 7 => "exec",
    ShowExec = 8 => "show_exec",
    // synchronization and shared memory
    FutexWait = 9 => "futex_wait",
    FutexWakeup = 10 => "futex_wakeup",
    ShmPageGet = 11 => "shmpageget",
    ShmPageDetach = 12 => "shmpagedt",
    // screen and terminal I/O
    Cursor = 13 => "cursor",
    Reflush = 14 => "reflush",
    Write = 15 => "write",
    ScreenClear = 16 => "screen_clear",
    GetChar = 17 => "getchar",
    // timekeeping
    GetTimebase = 18 => "get_timebase",
    GetTick = 19 => "get_tick",
    // network
    NetRecv = 20 => "net_recv",
    NetSend = 21 => "net_send",
    NetIrqMode = 22 => "net_irq_mode",
}

impl Syscall {
    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub const fn number(self) -> usize {
        self as usize
    }

    /// Decodes a user-supplied syscall number.
    pub fn from_number(number: usize) -> Option<Self> {
        Self::ALL.get(number).copied()
    }

    /// True when `ALL[i]` carries number `i` for every entry.
    const fn is_dense() -> bool {
        let mut index = 0;
        while index < Self::COUNT {
            if Self::ALL[index].number() != index {
                return false;
            }
            index += 1;
        }
        true
    }
}

static_assertions::const_assert!(Syscall::COUNT <= MAX_SYSCALL);
static_assertions::const_assert!(Syscall::is_dense());

/// Error returned by the dispatcher and handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Syscall number not present in the dispatch table.
    InvalidSyscall,
    /// Argument failed decoding (bad pointer, out-of-range value).
    InvalidArgument,
    /// Handler body reported a negative status.
    Backend(i64),
    /// Current task terminated and should not resume.
    TaskExit,
}

impl Error {
    /// Value written back to a0 for the trap path (negative on error).
    pub const fn to_status(self) -> isize {
        match self {
            Self::InvalidSyscall => -38,
            Self::InvalidArgument => -22,
            Self::Backend(code) => {
                if code < 0 {
                    code as isize
                } else {
                    -(code as isize)
                }
            }
            Self::TaskExit => 0,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSyscall => f.write_str("invalid syscall"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::Backend(code) => write!(f, "handler status {}", code),
            Self::TaskExit => f.write_str("task exited"),
        }
    }
}

/// Type alias for a syscall handler.
pub type Handler = fn(&mut dyn SyscallBackend, &Args) -> SysResult<usize>;

/// Dispatch table storing handlers by syscall number.
///
/// Only [`build_syscall_table`] can populate one; once published behind a
/// shared reference it is read-only.
pub struct SyscallTable {
    handlers: [Option<Handler>; MAX_SYSCALL],
}

impl SyscallTable {
    const fn empty() -> Self {
        const NONE: Option<Handler> = None;
        Self { handlers: [NONE; MAX_SYSCALL] }
    }

    fn bind(&mut self, syscall: Syscall, handler: Handler) {
        self.handlers[syscall.number()] = Some(handler);
    }

    /// Handler bound to `number`, if any.
    pub fn handler(&self, number: usize) -> Option<Handler> {
        self.handlers.get(number).and_then(|entry| *entry)
    }

    /// Number of bound entries.
    pub fn bound(&self) -> usize {
        self.handlers.iter().filter(|entry| entry.is_some()).count()
    }

    /// Executes the handler referenced by `number`.
    #[must_use]
    pub fn dispatch(
        &self,
        number: usize,
        backend: &mut dyn SyscallBackend,
        args: &Args,
    ) -> SysResult<usize> {
        self.handler(number).ok_or(Error::InvalidSyscall).and_then(|handler| handler(backend, args))
    }
}

/// Builds the dispatch table with every [`Syscall`] bound to its handler shim.
pub fn build_syscall_table() -> SyscallTable {
    let mut table = SyscallTable::empty();
    for &syscall in Syscall::ALL {
        table.bind(syscall, api::handler_for(syscall));
    }
    log_debug!(target: "syscall", "table built entries={}", table.bound());
    table
}

#[cfg(test)]
mod tests {
    use super::api::testing::RecordingBackend;
    use super::*;

    #[test]
    fn numbering_is_dense_and_ordered() {
        for (index, syscall) in Syscall::ALL.iter().enumerate() {
            assert_eq!(syscall.number(), index);
            assert_eq!(Syscall::from_number(index), Some(*syscall));
        }
        assert_eq!(Syscall::from_number(Syscall::COUNT), None);
    }

    #[test]
    fn every_syscall_is_bound() {
        let table = build_syscall_table();
        assert_eq!(table.bound(), Syscall::COUNT);
        for &syscall in Syscall::ALL {
            assert!(table.handler(syscall.number()).is_some(), "{} unbound", syscall.name());
        }
    }

    #[test]
    fn table_binds_exactly_the_declared_numbers() {
        let table = build_syscall_table();
        for number in 0..MAX_SYSCALL {
            assert_eq!(
                table.handler(number).is_some(),
                Syscall::from_number(number).is_some(),
                "number {}",
                number
            );
        }
        let mut names: std::vec::Vec<_> = Syscall::ALL.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Syscall::COUNT);
    }

    #[test]
    fn every_syscall_reaches_its_backend_entry() {
        let table = build_syscall_table();
        for &syscall in Syscall::ALL {
            let mut backend = RecordingBackend::default();
            let _ = table.dispatch(syscall.number(), &mut backend, &Args::new([1, 2, 3, 4, 0, 0]));
            match syscall {
                Syscall::GetTimebase | Syscall::GetTick => assert_eq!(backend.last, None),
                _ => assert_eq!(backend.last, Some(syscall), "{}", syscall.name()),
            }
        }
    }

    #[test]
    fn test_reject_unbound_numbers() {
        let table = build_syscall_table();
        let mut backend = RecordingBackend::default();
        let args = Args::default();
        for number in [Syscall::COUNT, MAX_SYSCALL - 1, MAX_SYSCALL, usize::MAX] {
            assert_eq!(table.dispatch(number, &mut backend, &args), Err(Error::InvalidSyscall));
        }
        assert_eq!(backend.last, None);
    }

    #[test]
    fn error_status_is_negative() {
        assert!(Error::InvalidSyscall.to_status() < 0);
        assert_eq!(Error::Backend(-5).to_status(), -5);
        assert_eq!(Error::Backend(5).to_status(), -5);
    }
}
