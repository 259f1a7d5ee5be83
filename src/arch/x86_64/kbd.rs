//! PS/2 keyboard: scancode set 1 to ASCII.
//!
//! Only what the console consumes: printable characters, shift, enter,
//! backspace, and control chords. Extended codes are dropped.

use super::asm::inb;
use super::memlayout::{KBD_DATA, KBD_STATUS};

const NORMAL: [u8; 0x3B] = [
    0, 0x1B, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

const SHIFTED: [u8; 0x3B] = [
    0, 0x1B, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0x08, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0, b'A', b'S',
    b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;

static mut SHIFT_DOWN: bool = false;
static mut CTRL_DOWN: bool = false;

/// Drain one scancode and translate it. Called from the IRQ 1 handler
/// with interrupts off.
pub fn getc() -> Option<u8> {
    // SAFETY: only called from the keyboard IRQ path, interrupts off,
    // single CPU.
    unsafe {
        if inb(KBD_STATUS) & 0x01 == 0 {
            return None;
        }
        let sc = inb(KBD_DATA);
        match sc {
            LSHIFT | RSHIFT => {
                SHIFT_DOWN = true;
                None
            }
            CTRL => {
                CTRL_DOWN = true;
                None
            }
            _ if sc & 0x80 != 0 => {
                match sc & 0x7F {
                    LSHIFT | RSHIFT => SHIFT_DOWN = false,
                    CTRL => CTRL_DOWN = false,
                    _ => {}
                }
                None
            }
            _ if (sc as usize) < NORMAL.len() => {
                let c = if SHIFT_DOWN { SHIFTED[sc as usize] } else { NORMAL[sc as usize] };
                if c == 0 {
                    None
                } else if CTRL_DOWN {
                    Some(c & 0x1F)
                } else {
                    Some(c)
                }
            }
            _ => None,
        }
    }
}
