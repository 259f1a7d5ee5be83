//! sysfs: a small writable registry.
//!
//! Each entry reads from and optionally writes to a process-wide
//! variable in `SysVars`. Writable entries parse a decimal (or `0`/`1`)
//! payload, validate bounds, and update the variable; everything else
//! is rejected with `EACCES`.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::{BSIZE, KERNEL_VERSION, NPROC};
use crate::stat::{InodeType, Stat};

use super::{DirEntry, FsOps, OpenFlags, Vnode};

/// The process-wide variables sysfs exposes.
pub struct SysVars {
    hostname: Spinlock<Option<String>>,
    max_processes: AtomicUsize,
    cpu0_online: AtomicBool,
}

impl SysVars {
    pub const fn new() -> Self {
        Self {
            hostname: Spinlock::new("HOSTNAME", None),
            max_processes: AtomicUsize::new(NPROC),
            cpu0_online: AtomicBool::new(true),
        }
    }

    pub fn hostname(&self) -> String {
        self.hostname
            .lock()
            .clone()
            .unwrap_or_else(|| String::from("ir0"))
    }

    pub fn set_hostname(&self, name: &str) -> Result<()> {
        let name = name.trim_end_matches('\n');
        if name.is_empty() || name.len() > 64 {
            return Err(Errno::EINVAL);
        }
        *self.hostname.lock() = Some(name.to_string());
        Ok(())
    }

    /// Soft cap consulted by fork.
    pub fn max_processes(&self) -> usize {
        self.max_processes.load(Ordering::Relaxed)
    }

    pub fn set_max_processes(&self, n: usize) -> Result<()> {
        if n == 0 || n > NPROC {
            return Err(Errno::ERANGE);
        }
        self.max_processes.store(n, Ordering::Relaxed);
        Ok(())
    }

    pub fn cpu0_online(&self) -> bool {
        self.cpu0_online.load(Ordering::Relaxed)
    }
}

/// The kernel-wide instance.
pub static SYS_VARS: SysVars = SysVars::new();

struct Entry {
    /// Mount-relative path, slash separated.
    path: &'static str,
    read: fn() -> String,
    write: Option<fn(&str) -> Result<()>>,
}

fn read_version() -> String {
    alloc::format!("{}\n", KERNEL_VERSION)
}

fn read_hostname() -> String {
    alloc::format!("{}\n", SYS_VARS.hostname())
}

fn write_hostname(s: &str) -> Result<()> {
    SYS_VARS.set_hostname(s)
}

fn read_max_processes() -> String {
    alloc::format!("{}\n", SYS_VARS.max_processes())
}

fn write_max_processes(s: &str) -> Result<()> {
    let n: usize = s.trim().parse().map_err(|_| Errno::EINVAL)?;
    SYS_VARS.set_max_processes(n)
}

fn read_cpu0_online() -> String {
    alloc::format!("{}\n", SYS_VARS.cpu0_online() as u8)
}

fn write_cpu0_online(s: &str) -> Result<()> {
    match s.trim() {
        "1" => {
            SYS_VARS.cpu0_online.store(true, Ordering::Relaxed);
            Ok(())
        }
        // The only CPU cannot go offline.
        "0" => Err(Errno::EBUSY),
        _ => Err(Errno::EINVAL),
    }
}

fn read_block_devices() -> String {
    let mut s = String::new();
    for (name, sectors) in crate::dev::names() {
        s.push_str(&alloc::format!("{} {}\n", name, sectors));
    }
    s
}

enum NodeKind {
    Dir,
    File(usize),
}

struct Node {
    path: String,
    kind: NodeKind,
}

pub struct SysFs {
    entries: Vec<Entry>,
    /// Flattened tree; a node's inode is its index + 1.
    nodes: Vec<Node>,
}

impl SysFs {
    pub fn new() -> Self {
        let entries = alloc::vec![
            Entry {
                path: "kernel/version",
                read: read_version,
                write: None,
            },
            Entry {
                path: "kernel/hostname",
                read: read_hostname,
                write: Some(write_hostname),
            },
            Entry {
                path: "kernel/max_processes",
                read: read_max_processes,
                write: Some(write_max_processes),
            },
            Entry {
                path: "devices/system/cpu0/online",
                read: read_cpu0_online,
                write: Some(write_cpu0_online),
            },
            Entry {
                path: "devices/block",
                read: read_block_devices,
                write: None,
            },
        ];

        // Derive the directory set from the entry paths.
        let mut nodes = alloc::vec![Node {
            path: String::new(),
            kind: NodeKind::Dir,
        }];
        for (i, e) in entries.iter().enumerate() {
            let mut at = String::new();
            for comp in super::path::components(e.path) {
                if !at.is_empty() {
                    at.push('/');
                }
                at.push_str(comp);
                let full = at == e.path;
                if !nodes.iter().any(|n| n.path == at) {
                    nodes.push(Node {
                        path: at.clone(),
                        kind: if full { NodeKind::File(i) } else { NodeKind::Dir },
                    });
                }
            }
        }
        Self { entries, nodes }
    }

    fn node(&self, path: &str) -> Result<(u64, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .find(|(_, n)| n.path == path)
            .map(|(i, n)| (i as u64 + 1, n))
            .ok_or(Errno::ENOENT)
    }

    fn entry_of(&self, vnode: &Vnode) -> Result<&Entry> {
        let node = self
            .nodes
            .get((vnode.ino - 1) as usize)
            .ok_or(Errno::ENOENT)?;
        match node.kind {
            NodeKind::File(i) => Ok(&self.entries[i]),
            NodeKind::Dir => Err(Errno::EISDIR),
        }
    }
}

impl FsOps for SysFs {
    fn lookup(&self, path: &str) -> Result<Vnode> {
        let (ino, node) = self.node(path)?;
        Ok(Vnode {
            ino,
            typ: match node.kind {
                NodeKind::Dir => InodeType::Dir,
                NodeKind::File(_) => InodeType::Regular,
            },
            cookie: 0,
        })
    }

    fn fstat(&self, vnode: &Vnode) -> Result<Stat> {
        let node = self
            .nodes
            .get((vnode.ino - 1) as usize)
            .ok_or(Errno::ENOENT)?;
        let (mode, size) = match node.kind {
            NodeKind::Dir => (0o555, 0),
            NodeKind::File(i) => {
                let writable = self.entries[i].write.is_some();
                ((if writable { 0o644 } else { 0o444 }), (self.entries[i].read)().len() as u64)
            }
        };
        Ok(Stat {
            dev: 0,
            ino: vnode.ino,
            mode: vnode.typ.to_mode_bits() | mode,
            nlink: 1,
            uid: 0,
            gid: 0,
            size,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blksize: BSIZE as u32,
            blocks: 0,
        })
    }

    fn open(&self, path: &str, flags: OpenFlags, _mode: u16) -> Result<Vnode> {
        let v = self.lookup(path)?;
        if flags.writable() {
            let entry = self.entry_of(&v)?;
            if entry.write.is_none() {
                return Err(Errno::EACCES);
            }
        }
        Ok(v)
    }

    fn read(&self, vnode: &Vnode, off: u64, buf: &mut [u8]) -> Result<usize> {
        let entry = self.entry_of(vnode)?;
        let content = (entry.read)();
        let bytes = content.as_bytes();
        let off = off as usize;
        if off >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - off);
        buf[..n].copy_from_slice(&bytes[off..off + n]);
        Ok(n)
    }

    /// Writes replace the whole value; the offset is ignored, matching
    /// the one-shot `echo x > file` usage these knobs exist for.
    fn write(&self, vnode: &Vnode, _off: u64, buf: &[u8]) -> Result<usize> {
        let entry = self.entry_of(vnode)?;
        let write = entry.write.ok_or(Errno::EACCES)?;
        let s = core::str::from_utf8(buf).map_err(|_| Errno::EINVAL)?;
        write(s)?;
        Ok(buf.len())
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let (_, node) = self.node(path)?;
        if !matches!(node.kind, NodeKind::Dir) {
            return Err(Errno::ENOTDIR);
        }
        let prefix = if node.path.is_empty() {
            String::new()
        } else {
            alloc::format!("{}/", node.path)
        };
        let mut out = Vec::new();
        for (i, n) in self.nodes.iter().enumerate() {
            if let Some(rest) = n.path.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() && !rest.contains('/') {
                    out.push(DirEntry {
                        ino: i as u64 + 1,
                        typ: match n.kind {
                            NodeKind::Dir => InodeType::Dir,
                            NodeKind::File(_) => InodeType::Regular,
                        },
                        name: String::from(rest),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_layout() {
        let fs = SysFs::new();
        let root: Vec<String> = fs.readdir("").unwrap().into_iter().map(|e| e.name).collect();
        assert!(root.contains(&String::from("kernel")));
        assert!(root.contains(&String::from("devices")));

        let kernel: Vec<String> =
            fs.readdir("kernel").unwrap().into_iter().map(|e| e.name).collect();
        assert!(kernel.contains(&String::from("version")));
        assert!(kernel.contains(&String::from("hostname")));
        assert!(kernel.contains(&String::from("max_processes")));

        assert!(fs.lookup("devices/system/cpu0/online").is_ok());
        assert!(matches!(fs.lookup("nope"), Err(Errno::ENOENT)));
    }

    #[test]
    fn version_is_read_only() {
        let fs = SysFs::new();
        let v = fs.lookup("kernel/version").unwrap();
        assert_eq!(fs.write(&v, 0, b"2.0"), Err(Errno::EACCES));
        assert_eq!(
            fs.open("kernel/version", OpenFlags::WRONLY, 0).err(),
            Some(Errno::EACCES)
        );
        let mut buf = [0u8; 32];
        let n = fs.read(&v, 0, &mut buf).unwrap();
        assert!(core::str::from_utf8(&buf[..n]).unwrap().contains(KERNEL_VERSION));
    }

    #[test]
    fn max_processes_bounds_checked() {
        let fs = SysFs::new();
        let v = fs.lookup("kernel/max_processes").unwrap();
        assert_eq!(fs.write(&v, 0, b"0"), Err(Errno::ERANGE));
        assert_eq!(fs.write(&v, 0, b"100000"), Err(Errno::ERANGE));
        assert_eq!(fs.write(&v, 0, b"abc"), Err(Errno::EINVAL));
        let n = alloc::format!("{}\n", NPROC / 2);
        assert_eq!(fs.write(&v, 0, n.as_bytes()).unwrap(), n.len());
        assert_eq!(SYS_VARS.max_processes(), NPROC / 2);
        // Restore for other tests.
        SYS_VARS.set_max_processes(NPROC).unwrap();
    }

    #[test]
    fn cpu0_cannot_go_offline() {
        let fs = SysFs::new();
        let v = fs.lookup("devices/system/cpu0/online").unwrap();
        assert_eq!(fs.write(&v, 0, b"0"), Err(Errno::EBUSY));
        assert_eq!(fs.write(&v, 0, b"2"), Err(Errno::EINVAL));
        assert_eq!(fs.write(&v, 0, b"1").unwrap(), 1);
        let mut buf = [0u8; 4];
        let n = fs.read(&v, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"1\n");
    }
}
