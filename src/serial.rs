//! UART-backed serial output and the `log` facade backend.
//!
//! The teacher crate declared a dependency on `uart_16550` but never wired it
//! up; `println!`/`serial_print!` were referenced throughout the tree with no
//! implementation behind them. This module provides both: a raw serial port
//! for the `serial_print!`/`serial_println!` macros used by the test harness,
//! and a `log::Log` implementation installed by `physmem::bootstrap` so the
//! allocator can report boot progress and panics through the normal logging
//! facade rather than ad hoc prints.

use core::fmt::{self, Write};
use spin::Mutex;
use uart_16550::SerialPort;

const SERIAL_IO_PORT: u16 = 0x3F8;

static SERIAL1: Mutex<Option<SerialPort>> = Mutex::new(None);

/// Brings up the COM1 UART. Safe to call more than once.
pub fn init() {
    let mut guard = SERIAL1.lock();
    if guard.is_none() {
        let mut port = unsafe { SerialPort::new(SERIAL_IO_PORT) };
        port.init();
        *guard = Some(port);
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let mut guard = SERIAL1.lock();
    match guard.as_mut() {
        Some(port) => {
            let _ = port.write_fmt(args);
        }
        // Logging before `serial::init()` has run is dropped rather than
        // panicking or lazily bringing up the port under a potential
        // interrupt context.
        None => {}
    }
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            serial_println!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs the serial-backed logger as the global `log` facade backend.
///
/// Called once from `physmem::bootstrap`. Safe to call more than once;
/// subsequent calls are no-ops (matching `log::set_logger`'s own contract).
pub fn init_logger() {
    init();
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Trace));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn double_init_is_harmless() {
        init();
        init();
        serial_println!("serial double-init test");
    }
}
