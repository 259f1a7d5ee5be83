//! Virtual file system.
//!
//! Paths are routed textually: normalized, longest-prefix matched
//! against the mount table, and the suffix below the mount point is
//! handed to that filesystem's operations. Every filesystem implements
//! one shared operations table (`FsOps`); operations it does not
//! support fall through to the defaults, which return `ENOSYS`.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::NMOUNT;
use crate::stat::{InodeType, Stat};

pub mod path;

pub mod devfs;
pub mod minix;
pub mod procfs;
pub mod sysfs;
pub mod tmpfs;

bitflags::bitflags! {
    /// Open flags, xv6-style values.
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 0x001;
        const RDWR = 0x002;
        const CREATE = 0x200;
        const TRUNC = 0x400;
        const APPEND = 0x800;
    }
}

impl OpenFlags {
    pub fn readable(self) -> bool {
        !self.contains(Self::WRONLY)
    }

    pub fn writable(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// A filesystem's handle for one open or looked-up file: the inode
/// number, its type, and an opaque per-fs cookie.
#[derive(Debug, Clone, Copy)]
pub struct Vnode {
    pub ino: u64,
    pub typ: InodeType,
    pub cookie: u64,
}

/// One `{inode, type, name}` record in a readdir stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub typ: InodeType,
    pub name: String,
}

/// The shared operations table.
///
/// `lookup` and `fstat` are mandatory; everything else defaults to
/// `ENOSYS` (or a sensible generic behavior built on the mandatory
/// pair), so a filesystem implements only what it supports.
pub trait FsOps: Send + Sync {
    /// Resolve a mount-relative path (`""` is the mount root).
    fn lookup(&self, path: &str) -> Result<Vnode>;

    /// Metadata for a resolved vnode.
    fn fstat(&self, vnode: &Vnode) -> Result<Stat>;

    /// Open, honoring CREATE and TRUNC.
    fn open(&self, path: &str, flags: OpenFlags, mode: u16) -> Result<Vnode> {
        match self.lookup(path) {
            Ok(v) => {
                if v.typ == InodeType::Dir && flags.writable() {
                    return Err(Errno::EISDIR);
                }
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    self.truncate(&v)?;
                }
                Ok(v)
            }
            Err(Errno::ENOENT) if flags.contains(OpenFlags::CREATE) => self.create(path, mode),
            Err(e) => Err(e),
        }
    }

    /// Balance an `open`; a filesystem tracking live handles hooks this.
    fn close(&self, _vnode: &Vnode) {}

    fn read(&self, _vnode: &Vnode, _off: u64, _buf: &mut [u8]) -> Result<usize> {
        Err(Errno::ENOSYS)
    }

    fn write(&self, _vnode: &Vnode, _off: u64, _buf: &[u8]) -> Result<usize> {
        Err(Errno::ENOSYS)
    }

    fn truncate(&self, _vnode: &Vnode) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    fn create(&self, _path: &str, _mode: u16) -> Result<Vnode> {
        Err(Errno::ENOSYS)
    }

    fn mkdir(&self, _path: &str, _mode: u16) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    fn rmdir(&self, _path: &str) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    fn unlink(&self, _path: &str) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    /// Add the name `new` for the file at `old`, both mount-relative.
    fn link(&self, _old: &str, _new: &str) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    fn readdir(&self, _path: &str) -> Result<Vec<DirEntry>> {
        Err(Errno::ENOSYS)
    }

    /// Device control; only meaningful on device files.
    fn ioctl(&self, _vnode: &Vnode, _cmd: usize, _arg: usize) -> Result<usize> {
        Err(Errno::ENOTTY)
    }

    /// May the file offset be repositioned? Devices opt in.
    fn seekable(&self, _vnode: &Vnode) -> bool {
        true
    }

    /// Metadata for a mount-relative path.
    fn stat(&self, path: &str) -> Result<Stat> {
        let v = self.lookup(path)?;
        self.fstat(&v)
    }
}

/// A mounted filesystem: the tagged variant the mount table stores.
pub enum Filesystem {
    Minix(minix::MinixFs),
    Tmpfs(tmpfs::Tmpfs),
    Ramfs(tmpfs::Tmpfs),
    Procfs(procfs::ProcFs),
    Sysfs(sysfs::SysFs),
    Devfs(devfs::DevFs),
}

impl Filesystem {
    pub fn ops(&self) -> &dyn FsOps {
        match self {
            Self::Minix(fs) => fs,
            Self::Tmpfs(fs) | Self::Ramfs(fs) => fs,
            Self::Procfs(fs) => fs,
            Self::Sysfs(fs) => fs,
            Self::Devfs(fs) => fs,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Minix(_) => "minix",
            Self::Tmpfs(_) => "tmpfs",
            Self::Ramfs(_) => "ramfs",
            Self::Procfs(_) => "procfs",
            Self::Sysfs(_) => "sysfs",
            Self::Devfs(_) => "devfs",
        }
    }
}

struct Mount {
    prefix: String,
    dev_name: String,
    fs: Arc<Filesystem>,
}

/// The mount table. Longest-prefix match decides routing; the device id
/// reported by `stat` is the mount's index.
pub struct Vfs {
    mounts: Spinlock<Vec<Mount>>,
}

/// A resolved path: which mount, and the suffix below it.
pub struct Resolved {
    pub dev: u32,
    pub fs: Arc<Filesystem>,
    pub suffix: String,
}

impl Vfs {
    pub const fn new() -> Self {
        Self {
            mounts: Spinlock::new("MOUNTS", Vec::new()),
        }
    }

    /// Mount `fs` at the normalized absolute `prefix`.
    pub fn mount(&self, prefix: &str, dev_name: &str, fs: Filesystem) -> Result<()> {
        let mut mounts = self.mounts.lock();
        if mounts.len() >= NMOUNT {
            return Err(Errno::ENFILE);
        }
        if mounts.iter().any(|m| m.prefix == prefix) {
            return Err(Errno::EBUSY);
        }
        mounts.push(Mount {
            prefix: String::from(prefix),
            dev_name: String::from(dev_name),
            fs: Arc::new(fs),
        });
        Ok(())
    }

    /// Route a normalized absolute path to its filesystem.
    pub fn resolve(&self, abs: &str) -> Result<Resolved> {
        let mounts = self.mounts.lock();
        let best = path::longest_prefix(abs, mounts.iter().map(|m| m.prefix.as_str()))
            .ok_or(Errno::ENOENT)?;
        let (dev, mount) = mounts
            .iter()
            .enumerate()
            .find(|(_, m)| m.prefix == best)
            .expect("mount vanished");
        Ok(Resolved {
            dev: dev as u32,
            fs: mount.fs.clone(),
            suffix: String::from(path::strip_prefix(abs, best)),
        })
    }

    /// `(prefix, device, type)` of every mount, for `/proc` and `mount`.
    pub fn mount_list(&self) -> Vec<(String, String, &'static str)> {
        self.mounts
            .lock()
            .iter()
            .map(|m| (m.prefix.clone(), m.dev_name.clone(), m.fs.type_name()))
            .collect()
    }

    pub fn stat(&self, abs: &str) -> Result<Stat> {
        let r = self.resolve(abs)?;
        let mut st = r.fs.ops().stat(&r.suffix)?;
        st.dev = r.dev;
        Ok(st)
    }

    pub fn readdir(&self, abs: &str) -> Result<Vec<DirEntry>> {
        let r = self.resolve(abs)?;
        r.fs.ops().readdir(&r.suffix)
    }

    pub fn mkdir(&self, abs: &str, mode: u16) -> Result<()> {
        let r = self.resolve(abs)?;
        r.fs.ops().mkdir(&r.suffix, mode)
    }

    pub fn rmdir(&self, abs: &str) -> Result<()> {
        let r = self.resolve(abs)?;
        if r.suffix.is_empty() {
            // The mount root itself.
            return Err(Errno::EBUSY);
        }
        r.fs.ops().rmdir(&r.suffix)
    }

    pub fn unlink(&self, abs: &str) -> Result<()> {
        let r = self.resolve(abs)?;
        if r.suffix.is_empty() {
            return Err(Errno::EBUSY);
        }
        r.fs.ops().unlink(&r.suffix)
    }

    /// Hard link; both names must land on the same mount.
    pub fn link(&self, old_abs: &str, new_abs: &str) -> Result<()> {
        let old = self.resolve(old_abs)?;
        let new = self.resolve(new_abs)?;
        if !Arc::ptr_eq(&old.fs, &new.fs) {
            return Err(Errno::EINVAL);
        }
        old.fs.ops().link(&old.suffix, &new.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs_with_tmpfs() -> Vfs {
        let vfs = Vfs::new();
        vfs.mount("/", "none", Filesystem::Tmpfs(tmpfs::Tmpfs::new(1 << 20)))
            .unwrap();
        vfs.mount("/tmp", "none", Filesystem::Tmpfs(tmpfs::Tmpfs::new(1 << 20)))
            .unwrap();
        vfs
    }

    #[test]
    fn routing_picks_longest_prefix() {
        let vfs = vfs_with_tmpfs();
        assert_eq!(vfs.resolve("/tmp/x").unwrap().dev, 1);
        assert_eq!(vfs.resolve("/tmpx").unwrap().dev, 0);
        assert_eq!(vfs.resolve("/").unwrap().dev, 0);
    }

    #[test]
    fn double_mount_rejected() {
        let vfs = vfs_with_tmpfs();
        assert_eq!(
            vfs.mount("/tmp", "none", Filesystem::Tmpfs(tmpfs::Tmpfs::new(1))),
            Err(Errno::EBUSY)
        );
    }

    #[test]
    fn stat_reports_mount_device() {
        let vfs = vfs_with_tmpfs();
        vfs.mkdir("/tmp/d", 0o755).unwrap();
        let st = vfs.stat("/tmp/d").unwrap();
        assert_eq!(st.dev, 1);
        assert_eq!(st.typ(), Some(InodeType::Dir));
    }
}
