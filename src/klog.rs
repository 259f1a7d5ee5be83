//! Kernel logger: the `log` facade over the console printer.

use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};

use crate::console::Printer;
use crate::lock::Spinlock;

static PRINTER: Spinlock<Printer> = Spinlock::new("PRINTLN", Printer);

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut printer = PRINTER.lock();
        let _ = writeln!(
            printer,
            "[ {:5} ] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install the logger. Called once, before the first subsystem logs.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Print through the shared printer, skipping its lock after a panic so
/// the dying message is never lost behind a held lock.
pub fn print_fmt(args: core::fmt::Arguments<'_>) {
    if crate::kernel::is_panicked() {
        // SAFETY: the panicked CPU is the only one left running.
        let printer = unsafe { &mut *PRINTER.get_mut_raw() };
        let _ = printer.write_fmt(args);
    } else {
        let _ = PRINTER.lock().write_fmt(args);
    }
}
