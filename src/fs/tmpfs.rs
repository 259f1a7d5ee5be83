//! tmpfs: a tree of in-memory inodes.
//!
//! Directories hold `(name, ino)` pairs; regular files own a growable
//! byte vector. Inode numbers come from a counter and are never reused
//! while a name or an open handle references them. The mount carries a
//! byte limit for file data; growth past it fails with `EDQUOT`.
//!
//! ramfs is the same filesystem populated with a fixed set of files at
//! boot; `with_boot_files` builds one.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::BSIZE;
use crate::stat::{InodeType, Stat};

use super::{path, DirEntry, FsOps, OpenFlags, Vnode};

const ROOT_INO: u64 = 1;

struct Node {
    typ: InodeType,
    mode: u16,
    uid: u16,
    gid: u16,
    nlink: u16,
    mtime: u32,
    /// Regular file contents.
    data: Vec<u8>,
    /// Directory entries, insertion-ordered.
    children: Vec<(String, u64)>,
    parent: u64,
    /// Live open handles; the node survives unlink until this drains.
    open_refs: u32,
}

impl Node {
    fn new_dir(mode: u16, parent: u64) -> Self {
        Self {
            typ: InodeType::Dir,
            mode,
            uid: 0,
            gid: 0,
            nlink: 2,
            mtime: 0,
            data: Vec::new(),
            children: Vec::new(),
            parent,
            open_refs: 0,
        }
    }

    fn new_file(mode: u16, parent: u64) -> Self {
        Self {
            typ: InodeType::Regular,
            mode,
            uid: 0,
            gid: 0,
            nlink: 1,
            mtime: 0,
            data: Vec::new(),
            children: Vec::new(),
            parent,
            open_refs: 0,
        }
    }
}

struct State {
    nodes: BTreeMap<u64, Node>,
    next_ino: u64,
    /// Bytes of file data across the mount.
    used: usize,
}

pub struct Tmpfs {
    state: Spinlock<State>,
    /// Mount parameter: bytes of file data allowed.
    limit: usize,
}

impl Tmpfs {
    pub fn new(limit: usize) -> Self {
        let mut nodes = BTreeMap::new();
        let _ = nodes.insert(ROOT_INO, Node::new_dir(0o755, ROOT_INO));
        Self {
            state: Spinlock::new(
                "TMPFS",
                State {
                    nodes,
                    next_ino: ROOT_INO + 1,
                    used: 0,
                },
            ),
            limit,
        }
    }

    /// A tmpfs preloaded with files: the ramfs boot image.
    pub fn with_boot_files(limit: usize, files: &[(&str, &[u8])]) -> Self {
        let fs = Self::new(limit);
        for (p, bytes) in files {
            if let Some((parent, _)) = path::split_parent(p) {
                let mut at = String::new();
                for comp in path::components(parent) {
                    at.push('/');
                    at.push_str(comp);
                    match fs.mkdir(at.trim_start_matches('/'), 0o755) {
                        Ok(()) | Err(Errno::EEXIST) => {}
                        Err(e) => panic!("ramfs preload: {}", e),
                    }
                }
            }
            let suffix = p.trim_start_matches('/');
            let v = fs.create(suffix, 0o644).expect("ramfs preload");
            let _ = fs.write(&v, 0, bytes).expect("ramfs preload");
        }
        fs
    }

    fn walk(&self, state: &State, path: &str) -> Result<u64> {
        let mut ino = ROOT_INO;
        for comp in path::components(path) {
            let node = state.nodes.get(&ino).ok_or(Errno::ENOENT)?;
            if node.typ != InodeType::Dir {
                return Err(Errno::ENOTDIR);
            }
            ino = node
                .children
                .iter()
                .find(|(n, _)| n == comp)
                .map(|(_, i)| *i)
                .ok_or(Errno::ENOENT)?;
        }
        Ok(ino)
    }

    /// Resolve `path`'s parent directory and final name.
    fn walk_parent<'p>(&self, state: &State, path: &'p str) -> Result<(u64, &'p str)> {
        let full = alloc::format!("/{}", path);
        let (parent, name) = path::split_parent(&full).ok_or(Errno::EEXIST)?;
        let pino = self.walk(state, parent.trim_start_matches('/'))?;
        // `name` borrows from `full`; re-slice out of the caller's str.
        let name = &path[path.len() - name.len()..];
        Ok((pino, name))
    }

    fn insert_child(
        &self,
        state: &mut State,
        pino: u64,
        name: &str,
        node: Node,
    ) -> Result<u64> {
        if name.is_empty() {
            return Err(Errno::EINVAL);
        }
        let parent = state.nodes.get(&pino).ok_or(Errno::ENOENT)?;
        if parent.typ != InodeType::Dir {
            return Err(Errno::ENOTDIR);
        }
        if parent.children.iter().any(|(n, _)| n == name) {
            return Err(Errno::EEXIST);
        }
        let ino = state.next_ino;
        state.next_ino += 1;
        let is_dir = node.typ == InodeType::Dir;
        let _ = state.nodes.insert(ino, node);
        let parent = state.nodes.get_mut(&pino).expect("parent vanished");
        parent.children.push((name.to_string(), ino));
        if is_dir {
            parent.nlink += 1;
        }
        Ok(ino)
    }

    /// Drop a node once neither names nor handles reference it.
    fn reap(state: &mut State, ino: u64) {
        let dead = match state.nodes.get(&ino) {
            Some(n) => n.nlink == 0 && n.open_refs == 0,
            None => return,
        };
        if dead {
            let freed = state.nodes.remove(&ino).map_or(0, |n| n.data.len());
            state.used -= freed;
        }
    }
}

impl FsOps for Tmpfs {
    fn lookup(&self, path: &str) -> Result<Vnode> {
        let state = self.state.lock();
        let ino = self.walk(&state, path)?;
        let node = state.nodes.get(&ino).ok_or(Errno::ENOENT)?;
        Ok(Vnode {
            ino,
            typ: node.typ,
            cookie: 0,
        })
    }

    fn fstat(&self, vnode: &Vnode) -> Result<Stat> {
        let state = self.state.lock();
        let node = state.nodes.get(&vnode.ino).ok_or(Errno::ENOENT)?;
        Ok(Stat {
            dev: 0,
            ino: vnode.ino,
            mode: node.typ.to_mode_bits() | node.mode,
            nlink: node.nlink,
            uid: node.uid,
            gid: node.gid,
            size: node.data.len() as u64,
            atime: node.mtime,
            mtime: node.mtime,
            ctime: node.mtime,
            blksize: BSIZE as u32,
            blocks: (node.data.len() as u64 + 511) / 512,
        })
    }

    fn open(&self, path: &str, flags: OpenFlags, mode: u16) -> Result<Vnode> {
        let v = match self.lookup(path) {
            Ok(v) => {
                if v.typ == InodeType::Dir && flags.writable() {
                    return Err(Errno::EISDIR);
                }
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    self.truncate(&v)?;
                }
                v
            }
            Err(Errno::ENOENT) if flags.contains(OpenFlags::CREATE) => self.create(path, mode)?,
            Err(e) => return Err(e),
        };
        let mut state = self.state.lock();
        if let Some(n) = state.nodes.get_mut(&v.ino) {
            n.open_refs += 1;
        }
        Ok(v)
    }

    fn close(&self, vnode: &Vnode) {
        let mut state = self.state.lock();
        if let Some(n) = state.nodes.get_mut(&vnode.ino) {
            n.open_refs = n.open_refs.saturating_sub(1);
        }
        Self::reap(&mut state, vnode.ino);
    }

    fn read(&self, vnode: &Vnode, off: u64, buf: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        let node = state.nodes.get(&vnode.ino).ok_or(Errno::ENOENT)?;
        if node.typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        let off = off as usize;
        if off >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - off);
        buf[..n].copy_from_slice(&node.data[off..off + n]);
        Ok(n)
    }

    fn write(&self, vnode: &Vnode, off: u64, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let used = state.used;
        let off = off as usize;
        let end = off.checked_add(buf.len()).ok_or(Errno::EINVAL)?;
        let grow = {
            let node = state.nodes.get_mut(&vnode.ino).ok_or(Errno::ENOENT)?;
            if node.typ == InodeType::Dir {
                return Err(Errno::EISDIR);
            }
            let grow = end.saturating_sub(node.data.len());
            if grow > 0 {
                if used + grow > self.limit {
                    return Err(Errno::EDQUOT);
                }
                node.data.resize(end, 0);
            }
            node.data[off..end].copy_from_slice(buf);
            grow
        };
        state.used = used + grow;
        Ok(buf.len())
    }

    fn truncate(&self, vnode: &Vnode) -> Result<()> {
        let mut state = self.state.lock();
        let node = state.nodes.get_mut(&vnode.ino).ok_or(Errno::ENOENT)?;
        let freed = node.data.len();
        node.data.clear();
        node.data.shrink_to_fit();
        state.used -= freed;
        Ok(())
    }

    fn create(&self, path: &str, mode: u16) -> Result<Vnode> {
        let mut state = self.state.lock();
        let (pino, name) = self.walk_parent(&state, path)?;
        let ino = self.insert_child(&mut state, pino, name, Node::new_file(mode, pino))?;
        Ok(Vnode {
            ino,
            typ: InodeType::Regular,
            cookie: 0,
        })
    }

    fn mkdir(&self, path: &str, mode: u16) -> Result<()> {
        let mut state = self.state.lock();
        let (pino, name) = self.walk_parent(&state, path)?;
        let _ = self.insert_child(&mut state, pino, name, Node::new_dir(mode, pino))?;
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock();
        let ino = self.walk(&state, path)?;
        if ino == ROOT_INO {
            return Err(Errno::EBUSY);
        }
        let node = state.nodes.get(&ino).ok_or(Errno::ENOENT)?;
        if node.typ != InodeType::Dir {
            return Err(Errno::ENOTDIR);
        }
        if !node.children.is_empty() {
            return Err(Errno::ENOTEMPTY);
        }
        let pino = node.parent;
        let _ = state.nodes.remove(&ino);
        let parent = state.nodes.get_mut(&pino).expect("parent vanished");
        parent.children.retain(|(_, i)| *i != ino);
        parent.nlink -= 1;
        Ok(())
    }

    fn unlink(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock();
        let (pino, name) = self.walk_parent(&state, path)?;
        let parent = state.nodes.get(&pino).ok_or(Errno::ENOENT)?;
        let ino = parent
            .children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, i)| *i)
            .ok_or(Errno::ENOENT)?;
        if state.nodes[&ino].typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        let parent = state.nodes.get_mut(&pino).expect("parent vanished");
        parent.children.retain(|(n, _)| n != name);
        let node = state.nodes.get_mut(&ino).expect("node vanished");
        node.nlink -= 1;
        Self::reap(&mut state, ino);
        Ok(())
    }

    fn link(&self, old: &str, new: &str) -> Result<()> {
        let mut state = self.state.lock();
        let ino = self.walk(&state, old)?;
        if state.nodes[&ino].typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        let (pino, name) = self.walk_parent(&state, new)?;
        let parent = state.nodes.get(&pino).ok_or(Errno::ENOENT)?;
        if parent.typ != InodeType::Dir {
            return Err(Errno::ENOTDIR);
        }
        if parent.children.iter().any(|(n, _)| n == name) {
            return Err(Errno::EEXIST);
        }
        let parent = state.nodes.get_mut(&pino).expect("parent vanished");
        parent.children.push((name.to_string(), ino));
        state.nodes.get_mut(&ino).expect("node vanished").nlink += 1;
        Ok(())
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let state = self.state.lock();
        let ino = self.walk(&state, path)?;
        let node = state.nodes.get(&ino).ok_or(Errno::ENOENT)?;
        if node.typ != InodeType::Dir {
            return Err(Errno::ENOTDIR);
        }
        let mut out = Vec::with_capacity(node.children.len() + 2);
        out.push(DirEntry {
            ino,
            typ: InodeType::Dir,
            name: String::from("."),
        });
        out.push(DirEntry {
            ino: node.parent,
            typ: InodeType::Dir,
            name: String::from(".."),
        });
        for (name, cino) in &node.children {
            let child = state.nodes.get(cino).ok_or(Errno::EIO)?;
            out.push(DirEntry {
                ino: *cino,
                typ: child.typ,
                name: name.clone(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fs: &Tmpfs, path: &str) -> Vec<String> {
        fs.readdir(path).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn create_write_read_round_trip() {
        let fs = Tmpfs::new(1 << 20);
        fs.mkdir("a", 0o755).unwrap();
        let v = fs.create("a/f", 0o644).unwrap();
        assert_eq!(fs.write(&v, 0, b"hello").unwrap(), 5);
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(&v, 0, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        // Read past end returns 0 bytes.
        assert_eq!(fs.read(&v, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn sparse_write_zero_fills() {
        let fs = Tmpfs::new(1 << 20);
        let v = fs.create("f", 0o644).unwrap();
        fs.write(&v, 10, b"x").unwrap();
        let mut buf = [0xFFu8; 11];
        assert_eq!(fs.read(&v, 0, &mut buf).unwrap(), 11);
        assert_eq!(&buf[..10], &[0; 10]);
        assert_eq!(buf[10], b'x');
    }

    #[test]
    fn mkdir_rmdir_restores_listing() {
        let fs = Tmpfs::new(1 << 20);
        fs.mkdir("a", 0o755).unwrap();
        let before = names(&fs, "a");
        fs.mkdir("a/b", 0o755).unwrap();
        fs.rmdir("a/b").unwrap();
        assert_eq!(names(&fs, "a"), before);
    }

    #[test]
    fn rmdir_refuses_nonempty() {
        let fs = Tmpfs::new(1 << 20);
        fs.mkdir("a", 0o755).unwrap();
        fs.create("a/f", 0o644).unwrap();
        assert_eq!(fs.rmdir("a"), Err(Errno::ENOTEMPTY));
    }

    #[test]
    fn quota_enforced() {
        let fs = Tmpfs::new(100);
        let v = fs.create("f", 0o644).unwrap();
        assert_eq!(fs.write(&v, 0, &[0u8; 100]).unwrap(), 100);
        assert_eq!(fs.write(&v, 100, b"x"), Err(Errno::EDQUOT));
        // Rewrites within the existing size still work.
        assert_eq!(fs.write(&v, 0, b"y").unwrap(), 1);
    }

    #[test]
    fn unlinked_file_lives_until_close() {
        let fs = Tmpfs::new(1 << 20);
        let v = fs.open("f", OpenFlags::RDWR | OpenFlags::CREATE, 0o644).unwrap();
        fs.write(&v, 0, b"data").unwrap();
        fs.unlink("f").unwrap();
        assert!(matches!(fs.lookup("f"), Err(Errno::ENOENT)));
        // Still readable through the open handle.
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(&v, 0, &mut buf).unwrap(), 4);
        fs.close(&v);
        assert!(fs.fstat(&v).is_err());
    }

    #[test]
    fn hard_links_share_data() {
        let fs = Tmpfs::new(1 << 20);
        let v = fs.create("f", 0o644).unwrap();
        fs.write(&v, 0, b"shared").unwrap();
        fs.link("f", "g").unwrap();
        assert_eq!(fs.stat("g").unwrap().nlink, 2);
        let g = fs.lookup("g").unwrap();
        assert_eq!(g.ino, v.ino);
        fs.unlink("f").unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(fs.read(&g, 0, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"shared");
    }

    #[test]
    fn ramfs_preload() {
        let fs = Tmpfs::with_boot_files(1 << 20, &[("/etc/motd", b"hi"), ("/init", b"\x7fELF")]);
        assert_eq!(fs.stat("etc/motd").unwrap().size, 2);
        assert_eq!(fs.stat("init").unwrap().size, 4);
        assert!(names(&fs, "").contains(&String::from("etc")));
    }
}
