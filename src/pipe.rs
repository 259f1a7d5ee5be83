//! Pipes.
//!
//! A fixed ring buffer with one read end and one write end. Readers
//! sleep on empty while a writer remains; writers sleep on full while a
//! reader remains. Closing the last write end makes readers see EOF;
//! writing with no readers is a broken pipe.

use alloc::sync::Arc;

use crate::error::{Errno, Result};
use crate::lock::Sleepablelock;
use crate::param::PIPESIZE;

struct PipeInner {
    data: [u8; PIPESIZE],
    /// Number of bytes read.
    nread: usize,
    /// Number of bytes written.
    nwrite: usize,
    readopen: bool,
    writeopen: bool,
}

impl PipeInner {
    fn len(&self) -> usize {
        self.nwrite - self.nread
    }
}

pub struct Pipe {
    inner: Sleepablelock<PipeInner>,
}

impl Pipe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Sleepablelock::new(
                "pipe",
                PipeInner {
                    data: [0; PIPESIZE],
                    nread: 0,
                    nwrite: 0,
                    readopen: true,
                    writeopen: true,
                },
            ),
        })
    }

    /// Called when one end's last handle closes.
    pub fn close(&self, write_end: bool) {
        let mut inner = self.inner.lock();
        if write_end {
            inner.writeopen = false;
        } else {
            inner.readopen = false;
        }
        // Whoever sleeps on the other end must re-check.
        inner.wakeup();
    }

    /// Read up to `buf.len()` bytes; blocks while the pipe is empty and
    /// a writer remains. Returns 0 at EOF.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        while inner.len() == 0 && inner.writeopen {
            if !inner.sleep() {
                return Err(Errno::EINTR);
            }
        }
        let n = buf.len().min(inner.len());
        for b in buf[..n].iter_mut() {
            *b = inner.data[inner.nread % PIPESIZE];
            inner.nread += 1;
        }
        inner.wakeup();
        Ok(n)
    }

    /// Write `buf`; blocks while the pipe is full and a reader remains.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut done = 0;
        while done < buf.len() {
            if !inner.readopen {
                return Err(Errno::EPIPE);
            }
            if inner.len() == PIPESIZE {
                inner.wakeup();
                if !inner.sleep() {
                    return if done > 0 { Ok(done) } else { Err(Errno::EINTR) };
                }
                continue;
            }
            let at = inner.nwrite % PIPESIZE;
            inner.data[at] = buf[done];
            inner.nwrite += 1;
            done += 1;
        }
        inner.wakeup();
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_in_order() {
        let p = Pipe::new();
        assert_eq!(p.write(b"abc").unwrap(), 3);
        assert_eq!(p.write(b"de").unwrap(), 2);
        let mut buf = [0u8; 4];
        assert_eq!(p.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        let mut rest = [0u8; 8];
        assert_eq!(p.read(&mut rest).unwrap(), 1);
        assert_eq!(rest[0], b'e');
    }

    #[test]
    fn eof_after_writer_closes() {
        let p = Pipe::new();
        p.write(b"tail").unwrap();
        p.close(true);
        let mut buf = [0u8; 16];
        assert_eq!(p.read(&mut buf).unwrap(), 4);
        // Drained and no writer: EOF, not a block.
        assert_eq!(p.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn broken_pipe_on_write() {
        let p = Pipe::new();
        p.close(false);
        assert_eq!(p.write(b"x"), Err(Errno::EPIPE));
    }

    #[test]
    fn ring_wraps() {
        let p = Pipe::new();
        let chunk = [7u8; PIPESIZE / 2 + 1];
        let mut sink = [0u8; PIPESIZE / 2 + 1];
        for _ in 0..5 {
            assert_eq!(p.write(&chunk).unwrap(), chunk.len());
            assert_eq!(p.read(&mut sink).unwrap(), chunk.len());
            assert!(sink.iter().all(|&b| b == 7));
        }
    }
}
