//! procfs: files generated on demand.
//!
//! Nothing is stored; each entry carries a generator producing a
//! bounded UTF-8 buffer. A file opened through the VFS snapshots its
//! content under the handle's cookie, so a reader tiling the file with
//! small reads at advancing offsets reconstructs exactly one
//! materialization even while the underlying numbers move. Reads
//! without an open handle (kernel-internal peeks) regenerate.
//!
//! The `[pid]/status` subtree is synthesized from two hooks so the
//! filesystem itself stays independent of the process table.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::BSIZE;
use crate::stat::{InodeType, Stat};

use super::{DirEntry, FsOps, OpenFlags, Vnode};

/// Generator for one synthetic file.
pub type Generator = fn() -> String;

/// Hook returning the live pid list.
pub type PidList = fn() -> Vec<i32>;

/// Hook generating `[pid]/status`, `None` when the pid is gone.
pub type PidStatus = fn(i32) -> Option<String>;

const ROOT_INO: u64 = 1;
/// Flat entries start here.
const ENTRY_INO: u64 = 2;
/// `[pid]` directory inodes are `PID_DIR_INO + pid`.
const PID_DIR_INO: u64 = 0x1000;
/// `[pid]/status` inodes are `PID_FILE_INO + pid`.
const PID_FILE_INO: u64 = 0x100_0000;

pub struct ProcFs {
    entries: Vec<(&'static str, Generator)>,
    pid_list: PidList,
    pid_status: PidStatus,
    /// Snapshots of open files, keyed by handle cookie.
    snapshots: Spinlock<Snapshots>,
}

struct Snapshots {
    next_cookie: u64,
    open: BTreeMap<u64, String>,
}

impl ProcFs {
    pub fn new(
        entries: Vec<(&'static str, Generator)>,
        pid_list: PidList,
        pid_status: PidStatus,
    ) -> Self {
        Self {
            entries,
            pid_list,
            pid_status,
            snapshots: Spinlock::new(
                "PROCFS",
                Snapshots {
                    next_cookie: 1,
                    open: BTreeMap::new(),
                },
            ),
        }
    }

    /// Generate the current content behind a vnode.
    fn generate(&self, ino: u64) -> Result<String> {
        if ino >= PID_FILE_INO {
            let pid = (ino - PID_FILE_INO) as i32;
            return (self.pid_status)(pid).ok_or(Errno::ENOENT);
        }
        let idx = ino.checked_sub(ENTRY_INO).ok_or(Errno::EISDIR)? as usize;
        let (_, gen) = self.entries.get(idx).ok_or(Errno::ENOENT)?;
        Ok(gen())
    }
}

impl FsOps for ProcFs {
    fn lookup(&self, path: &str) -> Result<Vnode> {
        let mut comps = super::path::components(path);
        let vnode = match (comps.next(), comps.next()) {
            (None, _) => Vnode {
                ino: ROOT_INO,
                typ: InodeType::Dir,
                cookie: 0,
            },
            (Some(name), None) => {
                if let Some(idx) = self.entries.iter().position(|(n, _)| *n == name) {
                    Vnode {
                        ino: ENTRY_INO + idx as u64,
                        typ: InodeType::Regular,
                        cookie: 0,
                    }
                } else {
                    let pid: i32 = name.parse().map_err(|_| Errno::ENOENT)?;
                    if !(self.pid_list)().contains(&pid) {
                        return Err(Errno::ENOENT);
                    }
                    Vnode {
                        ino: PID_DIR_INO + pid as u64,
                        typ: InodeType::Dir,
                        cookie: 0,
                    }
                }
            }
            (Some(dir), Some("status")) => {
                let pid: i32 = dir.parse().map_err(|_| Errno::ENOENT)?;
                let _ = (self.pid_status)(pid).ok_or(Errno::ENOENT)?;
                Vnode {
                    ino: PID_FILE_INO + pid as u64,
                    typ: InodeType::Regular,
                    cookie: 0,
                }
            }
            _ => return Err(Errno::ENOENT),
        };
        if comps.next().is_some() {
            return Err(Errno::ENOTDIR);
        }
        Ok(vnode)
    }

    fn fstat(&self, vnode: &Vnode) -> Result<Stat> {
        let (mode, size) = match vnode.typ {
            InodeType::Dir => (0o555, 0),
            _ => (0o444, self.generate(vnode.ino)?.len() as u64),
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
        if flags.writable() {
            return Err(Errno::EACCES);
        }
        let mut v = self.lookup(path)?;
        if v.typ == InodeType::Regular {
            // Materialize once; the handle reads this snapshot.
            let content = self.generate(v.ino)?;
            let mut snaps = self.snapshots.lock();
            let cookie = snaps.next_cookie;
            snaps.next_cookie += 1;
            let _ = snaps.open.insert(cookie, content);
            v.cookie = cookie;
        }
        Ok(v)
    }

    fn close(&self, vnode: &Vnode) {
        if vnode.cookie != 0 {
            let _ = self.snapshots.lock().open.remove(&vnode.cookie);
        }
    }

    fn read(&self, vnode: &Vnode, off: u64, buf: &mut [u8]) -> Result<usize> {
        if vnode.typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        let snaps = self.snapshots.lock();
        let fresh;
        let content = match snaps.open.get(&vnode.cookie) {
            Some(s) => s,
            None => {
                fresh = self.generate(vnode.ino)?;
                &fresh
            }
        };
        let bytes = content.as_bytes();
        let off = off as usize;
        if off >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - off);
        buf[..n].copy_from_slice(&bytes[off..off + n]);
        Ok(n)
    }

    fn write(&self, _vnode: &Vnode, _off: u64, _buf: &[u8]) -> Result<usize> {
        Err(Errno::EACCES)
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let v = self.lookup(path)?;
        let mut out = Vec::new();
        match v.ino {
            ROOT_INO => {
                for (i, (name, _)) in self.entries.iter().enumerate() {
                    out.push(DirEntry {
                        ino: ENTRY_INO + i as u64,
                        typ: InodeType::Regular,
                        name: String::from(*name),
                    });
                }
                for pid in (self.pid_list)() {
                    out.push(DirEntry {
                        ino: PID_DIR_INO + pid as u64,
                        typ: InodeType::Dir,
                        name: alloc::format!("{}", pid),
                    });
                }
            }
            ino if ino >= PID_DIR_INO && ino < PID_FILE_INO => {
                let pid = ino - PID_DIR_INO;
                out.push(DirEntry {
                    ino: PID_FILE_INO + pid,
                    typ: InodeType::Regular,
                    name: String::from("status"),
                });
            }
            _ => return Err(Errno::ENOTDIR),
        }
        Ok(out)
    }

    fn seekable(&self, _vnode: &Vnode) -> bool {
        true
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        /// The kernel's /proc, wired to the live subsystems.
        pub fn kernel_procfs() -> ProcFs {
            ProcFs::new(
                alloc::vec![
                    ("meminfo", gen_meminfo as Generator),
                    ("uptime", gen_uptime),
                    ("version", gen_version),
                    ("ps", gen_ps),
                    ("netinfo", gen_netinfo),
                    ("drivers", gen_drivers),
                ],
                crate::proc::live_pids,
                crate::proc::pid_status,
            )
        }

        fn gen_meminfo() -> String {
            let (total, free) = crate::kalloc::stats();
            let pg = crate::page::PGSIZE / 1024;
            alloc::format!(
                "MemTotal: {:>8} kB\nMemFree:  {:>8} kB\nMemUsed:  {:>8} kB\n",
                total * pg,
                free * pg,
                (total - free) * pg,
            )
        }

        fn gen_uptime() -> String {
            let ticks = crate::trap::ticks();
            let hz = crate::param::TICK_HZ;
            alloc::format!("{}.{:02}\n", ticks / hz, (ticks % hz) * 100 / hz)
        }

        fn gen_version() -> String {
            alloc::format!(
                "{} version {} ({})\n",
                crate::param::KERNEL_NAME,
                crate::param::KERNEL_VERSION,
                crate::param::KERNEL_ARCH,
            )
        }

        fn gen_ps() -> String {
            crate::proc::ps()
        }

        fn gen_netinfo() -> String {
            // Interface listing only; there is no network stack.
            String::from("lo: up mtu 65536\n")
        }

        fn gen_drivers() -> String {
            let mut s = String::from("console\nkbd\nuart\npit\n");
            for (name, sectors) in crate::dev::names() {
                s.push_str(&alloc::format!("{} ({} sectors)\n", name, sectors));
            }
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ProcFs {
        fn mem() -> String {
            String::from("MemTotal: 1024 kB\nMemFree: 512 kB\n")
        }
        fn pids() -> Vec<i32> {
            alloc::vec![1, 7]
        }
        fn status(pid: i32) -> Option<String> {
            (pid == 1 || pid == 7).then(|| alloc::format!("pid:\t{}\nstate:\tR\n", pid))
        }
        ProcFs::new(alloc::vec![("meminfo", mem as Generator)], pids, status)
    }

    #[test]
    fn tiled_reads_reconstruct_whole_content() {
        let fs = fixture();
        let v = fs.open("meminfo", OpenFlags::RDONLY, 0).unwrap();
        let whole = {
            let mut buf = [0u8; 256];
            let n = fs.read(&v, 0, &mut buf).unwrap();
            buf[..n].to_vec()
        };

        // 8 bytes at 0, 8 at 8, then the rest at 16.
        let mut tiled = Vec::new();
        for (off, len) in [(0u64, 8usize), (8, 8), (16, 256)] {
            let mut chunk = alloc::vec![0u8; len];
            let n = fs.read(&v, off, &mut chunk).unwrap();
            tiled.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(tiled, whole);
        fs.close(&v);
    }

    #[test]
    fn read_past_end_returns_zero() {
        let fs = fixture();
        let v = fs.lookup("meminfo").unwrap();
        let size = fs.fstat(&v).unwrap().size;
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(&v, size, &mut buf).unwrap(), 0);
        assert_eq!(fs.read(&v, size + 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn writes_rejected() {
        let fs = fixture();
        let v = fs.lookup("meminfo").unwrap();
        assert_eq!(fs.write(&v, 0, b"x"), Err(Errno::EACCES));
        assert_eq!(
            fs.open("meminfo", OpenFlags::WRONLY, 0).err(),
            Some(Errno::EACCES)
        );
    }

    #[test]
    fn pid_subtree() {
        let fs = fixture();
        let names: Vec<String> = fs.readdir("").unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&String::from("meminfo")));
        assert!(names.contains(&String::from("7")));

        let v = fs.lookup("7/status").unwrap();
        let mut buf = [0u8; 64];
        let n = fs.read(&v, 0, &mut buf).unwrap();
        assert!(core::str::from_utf8(&buf[..n]).unwrap().contains("pid:\t7"));

        assert!(matches!(fs.lookup("99/status"), Err(Errno::ENOENT)));
        assert!(matches!(fs.lookup("abc"), Err(Errno::ENOENT)));
    }
}
