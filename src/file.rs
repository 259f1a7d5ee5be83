//! Open-file handles and the per-process descriptor table.
//!
//! A `File` pairs something readable/writable (a vnode on some mount,
//! or one end of a pipe) with an offset and the open flags. Handles are
//! reference counted: `dup` and fork share the same offset, and the
//! filesystem's `close` hook runs when the last reference drops.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use array_macro::array;

use crate::error::{Errno, Result};
use crate::fs::{Filesystem, OpenFlags, Vfs, Vnode};
use crate::lock::Sleeplock;
use crate::param::{NFILE, NOFILE};
use crate::pipe::Pipe;
use crate::stat::{InodeType, Stat};

/// Open files across the whole system.
static NOPEN: AtomicUsize = AtomicUsize::new(0);

pub enum FileClass {
    /// A file on a mounted filesystem.
    Vnode {
        fs: Arc<Filesystem>,
        vnode: Vnode,
        dev: u32,
    },
    /// One end of a pipe.
    Pipe { pipe: Arc<Pipe>, write_end: bool },
}

pub struct File {
    pub class: FileClass,
    readable: bool,
    writable: bool,
    append: bool,
    /// Byte offset; the lock spans whole transfers so concurrent users
    /// of one handle advance it atomically.
    off: Sleeplock<u64>,
}

pub const SEEK_SET: usize = 0;
pub const SEEK_CUR: usize = 1;
pub const SEEK_END: usize = 2;

impl File {
    fn new(class: FileClass, readable: bool, writable: bool, append: bool) -> Result<Arc<Self>> {
        // System-wide open-file cap.
        if NOPEN.fetch_add(1, Ordering::Relaxed) >= NFILE {
            NOPEN.fetch_sub(1, Ordering::Relaxed);
            return Err(Errno::ENFILE);
        }
        Ok(Arc::new(Self {
            class,
            readable,
            writable,
            append,
            off: Sleeplock::new("file", 0),
        }))
    }

    /// Open `abs` (already normalized) through the mount table.
    pub fn open(vfs: &Vfs, abs: &str, flags: OpenFlags, mode: u16) -> Result<Arc<Self>> {
        let r = vfs.resolve(abs)?;
        let vnode = r.fs.ops().open(&r.suffix, flags, mode)?;
        File::new(
            FileClass::Vnode {
                fs: r.fs,
                vnode,
                dev: r.dev,
            },
            flags.readable(),
            flags.writable(),
            flags.contains(OpenFlags::APPEND),
        )
    }

    /// The two ends of a fresh pipe: (read, write).
    pub fn pipe() -> Result<(Arc<Self>, Arc<Self>)> {
        let pipe = Pipe::new();
        let read = File::new(
            FileClass::Pipe {
                pipe: pipe.clone(),
                write_end: false,
            },
            true,
            false,
            false,
        )?;
        let write = File::new(
            FileClass::Pipe {
                pipe,
                write_end: true,
            },
            false,
            true,
            false,
        )?;
        Ok((read, write))
    }

    pub fn readable(&self) -> bool {
        self.readable
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    /// Read at the handle's offset, advancing it.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.readable {
            return Err(Errno::EBADF);
        }
        match &self.class {
            FileClass::Pipe { pipe, .. } => pipe.read(buf),
            FileClass::Vnode { fs, vnode, .. } => {
                let mut off = self.off.lock();
                let n = fs.ops().read(vnode, *off, buf)?;
                *off += n as u64;
                Ok(n)
            }
        }
    }

    /// Write at the handle's offset (end of file with O_APPEND),
    /// advancing it.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.writable {
            return Err(Errno::EBADF);
        }
        match &self.class {
            FileClass::Pipe { pipe, .. } => pipe.write(buf),
            FileClass::Vnode { fs, vnode, .. } => {
                let mut off = self.off.lock();
                if self.append {
                    *off = fs.ops().fstat(vnode)?.size;
                }
                let n = fs.ops().write(vnode, *off, buf)?;
                *off += n as u64;
                Ok(n)
            }
        }
    }

    /// Reposition the offset. No-op on devices that do not opt into
    /// seeking; pipes cannot seek at all.
    pub fn lseek(&self, pos: i64, whence: usize) -> Result<u64> {
        let (fs, vnode) = match &self.class {
            FileClass::Pipe { .. } => return Err(Errno::ESPIPE),
            FileClass::Vnode { fs, vnode, .. } => (fs, vnode),
        };
        let mut off = self.off.lock();
        if !fs.ops().seekable(vnode) {
            return Ok(*off);
        }
        let base = match whence {
            SEEK_SET => 0,
            SEEK_CUR => *off as i64,
            SEEK_END => fs.ops().fstat(vnode)?.size as i64,
            _ => return Err(Errno::EINVAL),
        };
        let target = base.checked_add(pos).ok_or(Errno::EINVAL)?;
        if target < 0 {
            return Err(Errno::EINVAL);
        }
        *off = target as u64;
        Ok(*off)
    }

    pub fn stat(&self) -> Result<Stat> {
        match &self.class {
            FileClass::Pipe { .. } => Ok(Stat {
                mode: InodeType::Fifo.to_mode_bits() | 0o600,
                nlink: 1,
                ..Stat::default()
            }),
            FileClass::Vnode { fs, vnode, dev } => {
                let mut st = fs.ops().fstat(vnode)?;
                st.dev = *dev;
                Ok(st)
            }
        }
    }

    pub fn ioctl(&self, cmd: usize, arg: usize) -> Result<usize> {
        match &self.class {
            FileClass::Pipe { .. } => Err(Errno::ENOTTY),
            FileClass::Vnode { fs, vnode, .. } => fs.ops().ioctl(vnode, cmd, arg),
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        NOPEN.fetch_sub(1, Ordering::Relaxed);
        match &self.class {
            FileClass::Pipe { pipe, write_end } => pipe.close(*write_end),
            FileClass::Vnode { fs, vnode, .. } => fs.ops().close(vnode),
        }
    }
}

/// The per-process descriptor table. Slots hold shared handles; 0/1/2
/// are wired to the console at process setup.
pub struct FdTable {
    slots: [Option<Arc<File>>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: array![_ => None; NOFILE],
        }
    }

    /// Store `file` in the lowest free slot.
    pub fn alloc(&mut self, file: Arc<File>) -> Result<usize> {
        let fd = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Errno::EMFILE)?;
        self.slots[fd] = Some(file);
        Ok(fd)
    }

    pub fn get(&self, fd: usize) -> Result<Arc<File>> {
        self.slots
            .get(fd)
            .and_then(|s| s.clone())
            .ok_or(Errno::EBADF)
    }

    pub fn close(&mut self, fd: usize) -> Result<()> {
        match self.slots.get_mut(fd) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(Errno::EBADF),
        }
    }

    /// `dup`: share the handle under the lowest free descriptor.
    pub fn dup(&mut self, fd: usize) -> Result<usize> {
        let file = self.get(fd)?;
        self.alloc(file)
    }

    /// `dup2`: share the handle under exactly `new`, closing what was
    /// there.
    pub fn dup2(&mut self, old: usize, new: usize) -> Result<usize> {
        let file = self.get(old)?;
        if new >= NOFILE {
            return Err(Errno::EBADF);
        }
        if old != new {
            self.slots[new] = Some(file);
        }
        Ok(new)
    }

    /// An independent copy sharing every open handle; what fork gives
    /// the child.
    pub fn clone_for_fork(&self) -> Self {
        Self {
            slots: array![i => self.slots[i].clone(); NOFILE],
        }
    }

    /// Drop every handle; process exit.
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::tmpfs::Tmpfs;

    fn vfs() -> Vfs {
        let vfs = Vfs::new();
        vfs.mount("/", "none", Filesystem::Tmpfs(Tmpfs::new(1 << 20)))
            .unwrap();
        vfs
    }

    #[test]
    fn offset_advances_across_reads() {
        let vfs = vfs();
        let f = File::open(
            &vfs,
            "/f",
            OpenFlags::RDWR | OpenFlags::CREATE,
            0o644,
        )
        .unwrap();
        f.write(b"hello world").unwrap();
        f.lseek(0, SEEK_SET).unwrap();
        let mut a = [0u8; 5];
        let mut b = [0u8; 6];
        f.read(&mut a).unwrap();
        f.read(&mut b).unwrap();
        assert_eq!(&a, b"hello");
        assert_eq!(&b, b" world");
    }

    #[test]
    fn append_writes_at_end() {
        let vfs = vfs();
        let f = File::open(
            &vfs,
            "/f",
            OpenFlags::RDWR | OpenFlags::CREATE,
            0o644,
        )
        .unwrap();
        f.write(b"base").unwrap();
        let g = File::open(&vfs, "/f", OpenFlags::WRONLY | OpenFlags::APPEND, 0).unwrap();
        g.write(b"+tail").unwrap();
        assert_eq!(f.stat().unwrap().size, 9);
    }

    #[test]
    fn open_write_close_open_read_round_trip() {
        let vfs = vfs();
        {
            let f = File::open(
                &vfs,
                "/data",
                OpenFlags::WRONLY | OpenFlags::CREATE,
                0o644,
            )
            .unwrap();
            f.write(b"persisted").unwrap();
        }
        let f = File::open(&vfs, "/data", OpenFlags::RDONLY, 0).unwrap();
        let mut buf = [0u8; 16];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"persisted");
    }

    #[test]
    fn fd_table_lowest_free_and_dup2() {
        let vfs = vfs();
        let mut fds = FdTable::new();
        let f = File::open(&vfs, "/f", OpenFlags::RDWR | OpenFlags::CREATE, 0o644).unwrap();
        assert_eq!(fds.alloc(f.clone()).unwrap(), 0);
        assert_eq!(fds.alloc(f.clone()).unwrap(), 1);
        fds.close(0).unwrap();
        // Lowest free slot is reused.
        assert_eq!(fds.alloc(f.clone()).unwrap(), 0);
        assert_eq!(fds.dup2(1, 5).unwrap(), 5);
        assert!(Arc::ptr_eq(&fds.get(1).unwrap(), &fds.get(5).unwrap()));
        assert_eq!(fds.get(9).err(), Some(Errno::EBADF));
        assert_eq!(fds.dup2(1, NOFILE).err(), Some(Errno::EBADF));
    }

    #[test]
    fn dup_shares_offset() {
        let vfs = vfs();
        let mut fds = FdTable::new();
        let f = File::open(&vfs, "/f", OpenFlags::RDWR | OpenFlags::CREATE, 0o644).unwrap();
        f.write(b"abcdef").unwrap();
        f.lseek(0, SEEK_SET).unwrap();
        let fd = fds.alloc(f).unwrap();
        let dup = fds.dup(fd).unwrap();
        let mut a = [0u8; 3];
        fds.get(fd).unwrap().read(&mut a).unwrap();
        let mut b = [0u8; 3];
        fds.get(dup).unwrap().read(&mut b).unwrap();
        assert_eq!(&a, b"abc");
        assert_eq!(&b, b"def");
    }

    #[test]
    fn pipe_through_files() {
        let (r, w) = File::pipe().unwrap();
        assert_eq!(w.write(b"through").unwrap(), 7);
        let mut buf = [0u8; 7];
        assert_eq!(r.read(&mut buf).unwrap(), 7);
        assert_eq!(&buf, b"through");
        assert_eq!(r.lseek(0, SEEK_SET).err(), Some(Errno::ESPIPE));
        // Closing the writer yields EOF.
        drop(w);
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }
}
