//! Console input and output.
//!
//! Input arrives a byte at a time from the keyboard and serial IRQ
//! handlers into a ring buffer with canonical line editing (backspace,
//! kill-line, ^D). Readers sleep until a whole line is committed.
//! Output goes to the serial port; the `Printer` behind the print
//! macros writes here too, bypassing its lock once the kernel has
//! panicked so dying messages still escape.

use alloc::sync::Arc;
use core::fmt;

use crate::arch::x86_64::uart;
use crate::error::{Errno, Result};
use crate::fs::devfs::{CharDevice, DevFs};
use crate::lock::Sleepablelock;

const INPUT_BUF: usize = 128;

const CTRL_D: u8 = 4;
const CTRL_U: u8 = 21;
const BACKSPACE: u8 = 8;
const DEL: u8 = 127;

struct Input {
    buf: [u8; INPUT_BUF],
    /// Read index.
    r: usize,
    /// Write (committed) index.
    w: usize,
    /// Edit index (uncommitted line tail).
    e: usize,
}

pub struct Console {
    input: Sleepablelock<Input>,
}

pub static CONSOLE: Console = Console {
    input: Sleepablelock::new(
        "CONS",
        Input {
            buf: [0; INPUT_BUF],
            r: 0,
            w: 0,
            e: 0,
        },
    ),
};

fn putc(c: u8) {
    if c == BACKSPACE || c == DEL {
        uart::putc(8);
        uart::putc(b' ');
        uart::putc(8);
    } else {
        uart::putc(c);
    }
}

impl Console {
    /// One input byte from an interrupt handler.
    pub fn intr(&self, c: u8) {
        let mut input = self.input.lock();
        match c {
            CTRL_U => {
                while input.e != input.w {
                    input.e -= 1;
                    putc(BACKSPACE);
                }
            }
            BACKSPACE | DEL => {
                if input.e != input.w {
                    input.e -= 1;
                    putc(BACKSPACE);
                }
            }
            _ => {
                if input.e - input.r < INPUT_BUF {
                    let c = if c == b'\r' { b'\n' } else { c };
                    putc(c);
                    let at = input.e % INPUT_BUF;
                    input.buf[at] = c;
                    input.e += 1;
                    if c == b'\n' || c == CTRL_D || input.e - input.r == INPUT_BUF {
                        input.w = input.e;
                        input.wakeup();
                    }
                }
            }
        }
    }

    /// Blocking canonical read; returns at end of line or EOF.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut input = self.input.lock();
        let mut n = 0;
        while n < buf.len() {
            while input.r == input.w {
                if n > 0 {
                    return Ok(n);
                }
                if !input.sleep() {
                    return Err(Errno::EINTR);
                }
            }
            let c = input.buf[input.r % INPUT_BUF];
            input.r += 1;
            if c == CTRL_D {
                return Ok(n);
            }
            buf[n] = c;
            n += 1;
            if c == b'\n' {
                break;
            }
        }
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> usize {
        for &c in buf {
            uart::putc(c);
        }
        buf.len()
    }
}

/// The devfs face of the console; fds 0/1/2 resolve here.
pub struct ConsoleDev;

impl CharDevice for ConsoleDev {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        CONSOLE.read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        Ok(CONSOLE.write(buf))
    }

    fn ioctl(&self, _cmd: usize, _arg: usize) -> Result<usize> {
        // A real tty would speak termios here.
        Err(Errno::ENOTTY)
    }
}

/// Register the console (and the standard pseudo devices) in devfs.
pub fn register_devices(devfs: &DevFs) {
    devfs.register("console", Arc::new(ConsoleDev));
    devfs.register("null", Arc::new(crate::fs::devfs::NullDev));
    devfs.register("zero", Arc::new(crate::fs::devfs::ZeroDev));
}

/// Formatter target for the print macros.
pub struct Printer;

impl fmt::Write for Printer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let _ = CONSOLE.write(s.as_bytes());
        Ok(())
    }
}
