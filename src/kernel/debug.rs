// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Logging
//!
//! Backs the `log` facade with the early console once the hypervisor runs
//! through its virtual map. Every record is written as
//!
//! ```text
//! [LEVEL] target: message
//! ```
//!
//! with the level coloured when colours are enabled. Nothing is logged
//! before [`init`]: the facade's max level stays `Off` until then, which
//! keeps the pre-MMU path free of formatting.
//!
//! # Usage
//!
//! ```rust,ignore
//! debug::init(console, LevelFilter::Info, true);
//! log::info!("fixmap at {:#x}", FIXMAP_VIRT_START);
//! ```

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::err::BootError;
use crate::kernel::dev::uart::{EarlyConsole, SerialConsole};

/// ANSI colour for `level`
pub const fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[36m", // Cyan
        Level::Debug => "\x1b[34m", // Blue
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

const ANSI_RESET: &str = "\x1b[0m";

struct Sink<C> {
    console: C,
    use_colors: bool,
}

/// Writer for logging
struct ConsoleWriter<'a, C: SerialConsole>(&'a mut C);

impl<C: SerialConsole> Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.puts(s);
        Ok(())
    }
}

pub struct ConsoleLogger<C> {
    sink: Mutex<Option<Sink<C>>>,
}

impl<C: SerialConsole> ConsoleLogger<C> {
    pub const fn new() -> Self {
        Self { sink: Mutex::new(None) }
    }

    /// Route output to `console`, replacing any previous one.
    pub fn attach(&self, console: C, use_colors: bool) {
        *self.sink.lock() = Some(Sink { console, use_colors });
    }

    /// Run `f` on the attached console.
    pub fn with_console<R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        self.sink.lock().as_mut().map(|sink| f(&mut sink.console))
    }
}

impl<C: SerialConsole + Send> Log for ConsoleLogger<C> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut guard = self.sink.lock();
        let Some(sink) = guard.as_mut() else {
            return;
        };

        let level = record.level();
        let mut out = ConsoleWriter(&mut sink.console);
        let _ = if sink.use_colors {
            write!(out, "{}[{}]{} ", level_color(level), level, ANSI_RESET)
        } else {
            write!(out, "[{}] ", level)
        };
        let _ = write!(out, "{}: {}\n", record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger<EarlyConsole> = ConsoleLogger::new();

/// Install the console logger and open the facade up to `level`.
pub fn init(console: EarlyConsole, level: LevelFilter, use_colors: bool) {
    LOGGER.attach(console, use_colors);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Run `f` on the logger's console, if one is installed.
pub fn with_console<R>(f: impl FnOnce(&mut EarlyConsole) -> R) -> Option<R> {
    LOGGER.with_console(f)
}

/// Describe a failed boot step with raw console output only.
///
/// Range errors carry the whole range. Everything else prints the
/// [`BootError::detail`] word: slot, region index or field value.
pub fn report_failure<C: SerialConsole>(console: &mut C, err: &BootError) {
    console.puts("boot failed, code ");
    console.put_hex(err.code() as u64);
    match *err {
        BootError::Misaligned { vaddr, paddr, size }
        | BootError::AddressOutOfRange { vaddr, paddr, size } => {
            console.puts(" range ");
            console.put_hex(vaddr);
            console.puts(" -> ");
            console.put_hex(paddr);
            console.puts(" size ");
            console.put_hex(size);
        }
        BootError::RangeConflict { vaddr, existing, requested } => {
            console.puts(" page ");
            console.put_hex(vaddr);
            console.puts(" mapped ");
            console.put_hex(existing);
            console.puts(" requested ");
            console.put_hex(requested);
        }
        BootError::LayoutNotPacked { region, expected } => {
            console.puts(" region ");
            console.put_hex(region as u64);
            console.puts(" expected ");
            console.put_hex(expected);
        }
        _ => {
            console.puts(" at ");
            console.put_hex(err.detail());
        }
    }
    console.puts("\n");
}
