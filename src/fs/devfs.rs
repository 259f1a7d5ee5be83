//! devfs: named character devices.
//!
//! A driver registers `{open, close, read, write, ioctl}` callbacks
//! under a name; file descriptors opened below the mount route straight
//! through them. Offsets are meaningless on a character device, so
//! seeking is a no-op unless the device opts in.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::BSIZE;
use crate::stat::{InodeType, Stat};

use super::{DirEntry, FsOps, OpenFlags, Vnode};

/// The callback set a character device registers.
pub trait CharDevice: Send + Sync {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) {}

    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, buf: &[u8]) -> Result<usize>;

    fn ioctl(&self, _cmd: usize, _arg: usize) -> Result<usize> {
        Err(Errno::ENOTTY)
    }

    /// Devices that honor offsets opt in.
    fn seekable(&self) -> bool {
        false
    }
}

const ROOT_INO: u64 = 1;

pub struct DevFs {
    devices: Spinlock<Vec<(String, Arc<dyn CharDevice>)>>,
}

impl DevFs {
    pub fn new() -> Self {
        Self {
            devices: Spinlock::new("DEVFS", Vec::new()),
        }
    }

    /// Attach a device under `name`.
    pub fn register(&self, name: &str, dev: Arc<dyn CharDevice>) {
        self.devices.lock().push((String::from(name), dev));
    }

    fn device(&self, vnode: &Vnode) -> Result<Arc<dyn CharDevice>> {
        let idx = vnode.ino.checked_sub(ROOT_INO + 1).ok_or(Errno::EISDIR)? as usize;
        self.devices
            .lock()
            .get(idx)
            .map(|(_, d)| d.clone())
            .ok_or(Errno::ENODEV)
    }
}

impl FsOps for DevFs {
    fn lookup(&self, path: &str) -> Result<Vnode> {
        if path.is_empty() {
            return Ok(Vnode {
                ino: ROOT_INO,
                typ: InodeType::Dir,
                cookie: 0,
            });
        }
        if path.contains('/') {
            return Err(Errno::ENOENT);
        }
        let idx = self
            .devices
            .lock()
            .iter()
            .position(|(n, _)| n == path)
            .ok_or(Errno::ENOENT)?;
        Ok(Vnode {
            ino: ROOT_INO + 1 + idx as u64,
            typ: InodeType::CharDev,
            cookie: 0,
        })
    }

    fn fstat(&self, vnode: &Vnode) -> Result<Stat> {
        if vnode.ino != ROOT_INO {
            let _ = self.device(vnode)?;
        }
        Ok(Stat {
            dev: 0,
            ino: vnode.ino,
            mode: vnode.typ.to_mode_bits() | if vnode.ino == ROOT_INO { 0o555 } else { 0o666 },
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blksize: BSIZE as u32,
            blocks: 0,
        })
    }

    fn open(&self, path: &str, _flags: OpenFlags, _mode: u16) -> Result<Vnode> {
        let v = self.lookup(path)?;
        if v.ino != ROOT_INO {
            self.device(&v)?.open()?;
        }
        Ok(v)
    }

    fn close(&self, vnode: &Vnode) {
        if let Ok(dev) = self.device(vnode) {
            dev.close();
        }
    }

    fn read(&self, vnode: &Vnode, _off: u64, buf: &mut [u8]) -> Result<usize> {
        self.device(vnode)?.read(buf)
    }

    fn write(&self, vnode: &Vnode, _off: u64, buf: &[u8]) -> Result<usize> {
        self.device(vnode)?.write(buf)
    }

    fn ioctl(&self, vnode: &Vnode, cmd: usize, arg: usize) -> Result<usize> {
        self.device(vnode)?.ioctl(cmd, arg)
    }

    fn seekable(&self, vnode: &Vnode) -> bool {
        self.device(vnode).map_or(false, |d| d.seekable())
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        if !path.is_empty() {
            return Err(Errno::ENOTDIR);
        }
        Ok(self
            .devices
            .lock()
            .iter()
            .enumerate()
            .map(|(i, (name, _))| DirEntry {
                ino: ROOT_INO + 1 + i as u64,
                typ: InodeType::CharDev,
                name: name.clone(),
            })
            .collect())
    }
}

/// Discards writes, reads nothing.
pub struct NullDev;

impl CharDevice for NullDev {
    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        Ok(buf.len())
    }
}

/// Reads zeros forever, discards writes.
pub struct ZeroDev;

impl CharDevice for ZeroDev {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> DevFs {
        let fs = DevFs::new();
        fs.register("null", Arc::new(NullDev));
        fs.register("zero", Arc::new(ZeroDev));
        fs
    }

    #[test]
    fn callbacks_route() {
        let fs = fixture();
        let null = fs.open("null", OpenFlags::RDWR, 0).unwrap();
        let mut buf = [0xAAu8; 8];
        assert_eq!(fs.read(&null, 0, &mut buf).unwrap(), 0);
        assert_eq!(fs.write(&null, 0, &buf).unwrap(), 8);

        let zero = fs.open("zero", OpenFlags::RDONLY, 0).unwrap();
        assert_eq!(fs.read(&zero, 0, &mut buf).unwrap(), 8);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn devices_are_not_seekable_by_default() {
        let fs = fixture();
        let v = fs.lookup("null").unwrap();
        assert!(!fs.seekable(&v));
        assert_eq!(fs.ioctl(&v, 1, 0), Err(Errno::ENOTTY));
    }

    #[test]
    fn listing_and_missing() {
        let fs = fixture();
        let names: Vec<String> = fs.readdir("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, alloc::vec![String::from("null"), String::from("zero")]);
        assert!(matches!(fs.lookup("tty9"), Err(Errno::ENOENT)));
    }
}
