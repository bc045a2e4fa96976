// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Minimal structured logging with severity levels for the bring-up core
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (level gating); host builds route to a no-op UART sink
//! PUBLIC API: log_* macros, boot_marker!, emit(level,target,args), marker(args)
//! DEPENDS_ON: uart::KernelUart
//! INVARIANTS: Debug only in debug builds, Trace additionally behind `debug_uart`; single-line emission

use core::fmt::{Arguments, Write};

/// Logging severity used by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    const fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn enabled(self) -> bool {
        match self {
            Level::Debug => cfg!(debug_assertions),
            Level::Trace => cfg!(all(debug_assertions, feature = "debug_uart")),
            _ => true,
        }
    }
}

/// Emits a structured log line if the level is enabled for the current build.
pub fn emit(level: Level, target: &'static str, args: Arguments<'_>) {
    if !level.enabled() {
        return;
    }

    let mut uart = crate::uart::KernelUart::lock();
    let writer = &mut *uart;
    let _ = writer.write_fmt(format_args!("[{} {}] ", level.tag(), target));
    let _ = writer.write_fmt(args);
    let _ = writer.write_char('\n');
}

/// Emits an unprefixed boot marker line (`> [INIT] ...`, `Core N start up`).
///
/// Markers are the stable contract scraped by the QEMU boot harness, so they
/// bypass level tags.
pub fn marker(args: Arguments<'_>) {
    let mut uart = crate::uart::KernelUart::lock();
    let writer = &mut *uart;
    let _ = writer.write_fmt(args);
    let _ = writer.write_char('\n');
}

#[macro_export]
macro_rules! boot_marker {
    ($($arg:tt)+) => {{
        $crate::log::marker(format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_error {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Error, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_warn {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Warn, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_info {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Info, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_debug {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Debug, module_path!(), format_args!($($arg)+));
    }};
}

#[macro_export]
macro_rules! log_trace {
    (target: $target:expr, $($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, $target, format_args!($($arg)+));
    }};
    ($($arg:tt)+) => {{
        $crate::log::emit($crate::log::Level::Trace, module_path!(), format_args!($($arg)+));
    }};
}

#[cfg(test)]
mod tests {
    use super::Level;

    #[test]
    fn errors_and_info_are_always_emitted() {
        assert!(Level::Error.enabled());
        assert!(Level::Warn.enabled());
        assert!(Level::Info.enabled());
    }

    #[test]
    fn trace_requires_debug_uart() {
        assert_eq!(Level::Trace.enabled(), cfg!(all(debug_assertions, feature = "debug_uart")));
        assert_eq!(Level::Error.tag(), "ERROR");
    }

    #[test]
    fn host_sink_accepts_lines() {
        log_info!(target: "test", "hart {} online", 1);
        boot_marker!("> [INIT] {} succeeded.", "PCB initialization");
    }
}
