//! MINIX-v1 filesystem.
//!
//! Disk layout, in 1024-byte blocks:
//!
//! ```text
//! [ boot | superblock | inode bitmap | zone bitmap | inode table | data ]
//!    0        1           imap_blocks    zmap_blocks
//! ```
//!
//! Zones equal blocks here (log zone size 0) and zone pointers are
//! absolute block numbers, so only zones at or above the first data
//! zone are ever allocatable. The superblock magic is 0x137F.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::bio::Bcache;
use crate::dev::BlockDevice;
use crate::error::{Errno, Result};
use crate::lock::Spinlock;
use crate::param::BSIZE;
use crate::stat::{InodeType, Stat, S_IFDIR, S_IFREG};

use super::{path, DirEntry, FsOps, OpenFlags, Vnode};

mod bitmap;
mod inode;

pub use inode::{check_name, DDirent, Dinode, DIRENT_SIZE, IPB, NDIRECT, NINDIRECT};

use bitmap::BPB;

/// Superblock magic.
pub const MINIX_MAGIC: u16 = 0x137F;

/// Root directory inode number.
pub const ROOT_INO: u32 = 1;

/// On-disk superblock, block 1.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, AsBytes, FromBytes)]
pub struct Superblock {
    pub s_ninodes: u16,
    pub s_nzones: u16,
    pub s_imap_blocks: u16,
    pub s_zmap_blocks: u16,
    pub s_firstdatazone: u16,
    /// log2 of zone size over block size; always 0 here.
    pub s_log_zone_size: u16,
    pub s_max_size: u32,
    pub s_magic: u16,
    pub s_state: u16,
}

const_assert_eq!(core::mem::size_of::<Superblock>(), 20);

impl Superblock {
    /// Block of the first inode-bitmap block.
    pub const fn imap_start(&self) -> u32 {
        2
    }

    /// Block of the first zone-bitmap block.
    pub const fn zmap_start(&self) -> u32 {
        2 + self.s_imap_blocks as u32
    }

    /// Block of the first inode-table block.
    pub const fn inode_table_start(&self) -> u32 {
        self.zmap_start() + self.s_zmap_blocks as u32
    }

    /// Block containing inode `ino`.
    pub const fn inode_block(&self, ino: u32) -> u32 {
        self.inode_table_start() + (ino - 1) / IPB as u32
    }
}

/// Per-inode live-handle bookkeeping: open handles keep an unlinked
/// inode's storage alive until the last close.
struct OpenState {
    refs: BTreeMap<u32, u32>,
}

/// In-memory free tallies, kept in lockstep with the bitmap blocks.
struct Counts {
    free_inodes: usize,
    free_zones: usize,
}

pub struct MinixFs {
    cache: Bcache,
    sb: Superblock,
    open: Spinlock<OpenState>,
    counts: Spinlock<Counts>,
}

/// The largest file the zone pointers can address.
const fn max_file_size() -> u32 {
    ((NDIRECT + NINDIRECT + NINDIRECT * NINDIRECT) * BSIZE) as u32
}

/// Build an empty filesystem on `dev`.
pub fn mkfs(dev: Arc<dyn BlockDevice>, ninodes: u16, nzones: u16) -> Result<()> {
    let imap_blocks = ((ninodes as usize + 1 + BPB - 1) / BPB) as u16;
    let zmap_blocks = ((nzones as usize + BPB - 1) / BPB) as u16;
    let table_blocks = ((ninodes as usize + IPB - 1) / IPB) as u16;
    let firstdatazone = 2 + imap_blocks + zmap_blocks + table_blocks;
    if firstdatazone as usize >= nzones as usize {
        return Err(Errno::EINVAL);
    }

    let sb = Superblock {
        s_ninodes: ninodes,
        s_nzones: nzones,
        s_imap_blocks: imap_blocks,
        s_zmap_blocks: zmap_blocks,
        s_firstdatazone: firstdatazone,
        s_log_zone_size: 0,
        s_max_size: max_file_size(),
        s_magic: MINIX_MAGIC,
        s_state: 1,
    };

    let cache = Bcache::new(dev);

    // Boot block and superblock.
    cache.zeroed(0).write()?;
    let mut buf = cache.zeroed(1);
    buf[..core::mem::size_of::<Superblock>()].copy_from_slice(sb.as_bytes());
    buf.write()?;

    // Inode bitmap: all free, then bit 0 (unused) and the root inode.
    for b in 0..imap_blocks as u32 {
        let mut buf = cache.zeroed(sb.imap_start() + b);
        buf.fill(0xFF);
        buf.write()?;
    }
    {
        let mut buf = cache.read(sb.imap_start())?;
        buf[0] &= !0b11;
        buf.write()?;
    }

    // Zone bitmap: all free, then the metadata blocks and the root
    // directory's zone.
    for b in 0..zmap_blocks as u32 {
        let mut buf = cache.zeroed(sb.zmap_start() + b);
        buf.fill(0xFF);
        buf.write()?;
    }
    for z in 0..=firstdatazone as usize {
        let mut buf = cache.read(sb.zmap_start() + (z / BPB) as u32)?;
        buf[(z % BPB) / 8] &= !(1 << (z % 8));
        buf.write()?;
    }

    // Zeroed inode table.
    for b in 0..table_blocks as u32 {
        cache.zeroed(sb.inode_table_start() + b).write()?;
    }

    // Root directory: one zone holding "." and "..".
    let root = Dinode {
        mode: S_IFDIR | 0o755,
        uid: 0,
        size: (2 * DIRENT_SIZE) as u32,
        mtime: 0,
        gid: 0,
        nlinks: 2,
        zones: [firstdatazone, 0, 0, 0, 0, 0, 0, 0, 0],
    };
    let mut buf = cache.read(sb.inode_block(ROOT_INO))?;
    buf[..32].copy_from_slice(root.as_bytes());
    buf.write()?;

    let mut buf = cache.zeroed(firstdatazone as u32);
    let mut dot = DDirent {
        ino: ROOT_INO as u16,
        name: [0; 14],
    };
    dot.set_name(b".");
    buf[..DIRENT_SIZE].copy_from_slice(dot.as_bytes());
    dot.set_name(b"..");
    buf[DIRENT_SIZE..2 * DIRENT_SIZE].copy_from_slice(dot.as_bytes());
    buf.write()
}

impl MinixFs {
    /// Mount the filesystem on `dev`, verifying the superblock.
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        let cache = Bcache::new(dev);
        let sb = {
            let buf = cache.read(1)?;
            Superblock::read_from_prefix(&buf[..]).ok_or(Errno::EIO)?
        };
        if sb.s_magic != MINIX_MAGIC {
            return Err(Errno::EINVAL);
        }
        if sb.s_log_zone_size != 0 {
            // Zones larger than a block are out of scope.
            return Err(Errno::EINVAL);
        }

        let free_inodes = bitmap::count_free(
            &cache,
            sb.imap_start(),
            sb.s_imap_blocks,
            sb.s_ninodes as usize + 1,
        )?;
        let free_zones = bitmap::count_free(
            &cache,
            sb.zmap_start(),
            sb.s_zmap_blocks,
            sb.s_nzones as usize,
        )?;
        log::info!(
            "minix: mounted, {} free inodes, {} free zones",
            free_inodes,
            free_zones
        );

        Ok(Self {
            cache,
            sb,
            open: Spinlock::new("MINIX_OPEN", OpenState { refs: BTreeMap::new() }),
            counts: Spinlock::new(
                "MINIX_CNT",
                Counts {
                    free_inodes,
                    free_zones,
                },
            ),
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// (free inodes, free zones), tracked in memory.
    pub fn free_counts(&self) -> (usize, usize) {
        let c = self.counts.lock();
        (c.free_inodes, c.free_zones)
    }

    /// Recount the bitmaps and compare with the in-memory tallies.
    pub fn bitmaps_consistent(&self) -> Result<bool> {
        let inodes = bitmap::count_free(
            &self.cache,
            self.sb.imap_start(),
            self.sb.s_imap_blocks,
            self.sb.s_ninodes as usize + 1,
        )?;
        let zones = bitmap::count_free(
            &self.cache,
            self.sb.zmap_start(),
            self.sb.s_zmap_blocks,
            self.sb.s_nzones as usize,
        )?;
        let c = self.counts.lock();
        Ok(inodes == c.free_inodes && zones == c.free_zones)
    }

    /// Allocate a data zone (>= first data zone by construction).
    pub(super) fn alloc_zone(&self) -> Result<usize> {
        let z = bitmap::alloc_bit(
            &self.cache,
            self.sb.zmap_start(),
            self.sb.s_zmap_blocks,
            self.sb.s_nzones as usize,
            self.sb.s_firstdatazone as usize,
        )?;
        self.counts.lock().free_zones -= 1;
        Ok(z)
    }

    pub(super) fn free_zone(&self, z: usize) -> Result<()> {
        assert!(
            z >= self.sb.s_firstdatazone as usize && z < self.sb.s_nzones as usize,
            "free_zone {} out of range",
            z
        );
        bitmap::free_bit(&self.cache, self.sb.zmap_start(), z)?;
        self.counts.lock().free_zones += 1;
        Ok(())
    }

    /// Allocate an inode and write its initial on-disk record.
    pub(super) fn alloc_inode(&self, mode: u16, nlinks: u8) -> Result<u32> {
        let ino = bitmap::alloc_bit(
            &self.cache,
            self.sb.imap_start(),
            self.sb.s_imap_blocks,
            self.sb.s_ninodes as usize + 1,
            1,
        )? as u32;
        self.counts.lock().free_inodes -= 1;
        let d = Dinode {
            mode,
            nlinks,
            ..Dinode::default()
        };
        self.write_dinode(ino, &d)?;
        Ok(ino)
    }

    /// Free an inode. Its zone pointers must already be zero.
    pub(super) fn free_inode(&self, ino: u32) -> Result<()> {
        let d = self.read_dinode(ino)?;
        assert!(d.zones.iter().all(|&z| z == 0), "free_inode {} with zones", ino);
        self.write_dinode(ino, &Dinode::default())?;
        bitmap::free_bit(&self.cache, self.sb.imap_start(), ino as usize)?;
        self.counts.lock().free_inodes += 1;
        Ok(())
    }

    /// Resolve a suffix's parent directory inode and final name.
    fn walk_parent<'p>(&self, suffix: &'p str) -> Result<(u32, &'p [u8])> {
        let full = alloc::format!("/{}", suffix);
        let (parent, name) = path::split_parent(&full).ok_or(Errno::EEXIST)?;
        let pino = self.walk(parent.trim_start_matches('/'))?;
        let name = &suffix[suffix.len() - name.len()..];
        Ok((pino, check_name(name)?))
    }

    fn vnode_of(&self, ino: u32) -> Result<Vnode> {
        let d = self.read_dinode(ino)?;
        Ok(Vnode {
            ino: ino as u64,
            typ: d.typ()?,
            cookie: 0,
        })
    }

    /// Drop an inode's storage if it has no names and no handles left.
    fn reap_if_orphan(&self, ino: u32) -> Result<()> {
        let live = *self.open.lock().refs.get(&ino).unwrap_or(&0);
        if live > 0 {
            return Ok(());
        }
        let d = self.read_dinode(ino)?;
        if d.nlinks == 0 {
            self.trunc_ino(ino)?;
            self.free_inode(ino)?;
        }
        Ok(())
    }
}

impl FsOps for MinixFs {
    fn lookup(&self, suffix: &str) -> Result<Vnode> {
        let ino = self.walk(suffix)?;
        self.vnode_of(ino)
    }

    fn fstat(&self, vnode: &Vnode) -> Result<Stat> {
        let d = self.read_dinode(vnode.ino as u32)?;
        Ok(Stat {
            dev: 0,
            ino: vnode.ino,
            mode: d.mode,
            nlink: d.nlinks as u16,
            uid: d.uid,
            gid: d.gid as u16,
            size: d.size as u64,
            atime: d.mtime,
            mtime: d.mtime,
            ctime: d.mtime,
            blksize: BSIZE as u32,
            blocks: (d.size as u64 + 511) / 512,
        })
    }

    fn open(&self, suffix: &str, flags: OpenFlags, mode: u16) -> Result<Vnode> {
        let v = match self.lookup(suffix) {
            Ok(v) => {
                if v.typ == InodeType::Dir && flags.writable() {
                    return Err(Errno::EISDIR);
                }
                if flags.contains(OpenFlags::TRUNC) && flags.writable() {
                    self.trunc_ino(v.ino as u32)?;
                }
                v
            }
            Err(Errno::ENOENT) if flags.contains(OpenFlags::CREATE) => self.create(suffix, mode)?,
            Err(e) => return Err(e),
        };
        *self.open.lock().refs.entry(v.ino as u32).or_insert(0) += 1;
        Ok(v)
    }

    fn close(&self, vnode: &Vnode) {
        let ino = vnode.ino as u32;
        {
            let mut open = self.open.lock();
            match open.refs.get_mut(&ino) {
                Some(r) if *r > 1 => {
                    *r -= 1;
                    return;
                }
                Some(_) => {
                    let _ = open.refs.remove(&ino);
                }
                None => return,
            }
        }
        if let Err(e) = self.reap_if_orphan(ino) {
            log::warn!("minix: orphan reap of inode {} failed: {}", ino, e);
        }
    }

    fn read(&self, vnode: &Vnode, off: u64, buf: &mut [u8]) -> Result<usize> {
        if vnode.typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        self.read_at(vnode.ino as u32, off, buf)
    }

    fn write(&self, vnode: &Vnode, off: u64, buf: &[u8]) -> Result<usize> {
        if vnode.typ == InodeType::Dir {
            return Err(Errno::EISDIR);
        }
        self.write_at(vnode.ino as u32, off, buf)
    }

    fn truncate(&self, vnode: &Vnode) -> Result<()> {
        self.trunc_ino(vnode.ino as u32)
    }

    fn create(&self, suffix: &str, mode: u16) -> Result<Vnode> {
        let (pino, name) = self.walk_parent(suffix)?;
        if self.lookup_in_dir(pino, name)?.is_some() {
            return Err(Errno::EEXIST);
        }
        let ino = self.alloc_inode(S_IFREG | (mode & 0o7777), 1)?;
        let guard = scopeguard::guard((), |()| {
            let _ = self.free_inode(ino);
        });
        self.add_dirent(pino, name, ino)?;
        scopeguard::ScopeGuard::into_inner(guard);
        Ok(Vnode {
            ino: ino as u64,
            typ: InodeType::Regular,
            cookie: 0,
        })
    }

    fn mkdir(&self, suffix: &str, mode: u16) -> Result<()> {
        let (pino, name) = self.walk_parent(suffix)?;
        if self.lookup_in_dir(pino, name)?.is_some() {
            return Err(Errno::EEXIST);
        }
        let ino = self.alloc_inode(S_IFDIR | (mode & 0o7777), 2)?;
        let guard = scopeguard::guard((), |()| {
            let _ = self.trunc_ino(ino);
            let _ = self.free_inode(ino);
        });
        self.add_dirent(ino, b".", ino)?;
        self.add_dirent(ino, b"..", pino)?;
        self.add_dirent(pino, name, ino)?;
        scopeguard::ScopeGuard::into_inner(guard);

        // ".." in the child links the parent.
        let mut pd = self.read_dinode(pino)?;
        pd.nlinks += 1;
        self.write_dinode(pino, &pd)
    }

    fn rmdir(&self, suffix: &str) -> Result<()> {
        let (pino, name) = self.walk_parent(suffix)?;
        let (ino, _) = self.lookup_in_dir(pino, name)?.ok_or(Errno::ENOENT)?;
        let d = self.read_dinode(ino)?;
        if !d.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        if !self.dir_is_empty(ino)? {
            return Err(Errno::ENOTEMPTY);
        }
        let _ = self.remove_dirent(pino, name)?;
        self.trunc_ino(ino)?;
        self.free_inode(ino)?;
        let mut pd = self.read_dinode(pino)?;
        pd.nlinks -= 1;
        self.write_dinode(pino, &pd)
    }

    fn unlink(&self, suffix: &str) -> Result<()> {
        let (pino, name) = self.walk_parent(suffix)?;
        let (ino, _) = self.lookup_in_dir(pino, name)?.ok_or(Errno::ENOENT)?;
        let d = self.read_dinode(ino)?;
        if d.is_dir() {
            return Err(Errno::EISDIR);
        }
        let _ = self.remove_dirent(pino, name)?;
        let mut d = d;
        d.nlinks -= 1;
        self.write_dinode(ino, &d)?;
        if d.nlinks == 0 {
            self.reap_if_orphan(ino)?;
        }
        Ok(())
    }

    fn link(&self, old: &str, new: &str) -> Result<()> {
        let ino = self.walk(old)?;
        let d = self.read_dinode(ino)?;
        if d.is_dir() {
            return Err(Errno::EISDIR);
        }
        let (pino, name) = self.walk_parent(new)?;
        if self.lookup_in_dir(pino, name)?.is_some() {
            return Err(Errno::EEXIST);
        }
        self.add_dirent(pino, name, ino)?;
        let mut d = d;
        d.nlinks += 1;
        self.write_dinode(ino, &d)
    }

    fn readdir(&self, suffix: &str) -> Result<Vec<DirEntry>> {
        let dir = self.walk(suffix)?;
        let mut out = Vec::new();
        for (ino, name) in self.dir_entries(dir)? {
            let d = self.read_dinode(ino)?;
            out.push(DirEntry {
                ino: ino as u64,
                typ: d.typ()?,
                name,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::MemDisk;
    use crate::param::SECTOR_SIZE;

    /// A small filesystem: 64 inodes, 64 zones.
    fn fresh_fs() -> MinixFs {
        let nzones = 64u16;
        let dev = Arc::new(MemDisk::new(nzones as u32 * (BSIZE / SECTOR_SIZE) as u32));
        mkfs(dev.clone(), 64, nzones).unwrap();
        MinixFs::mount(dev).unwrap()
    }

    fn names(fs: &MinixFs, p: &str) -> Vec<String> {
        fs.readdir(p).unwrap().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn mkfs_produces_sane_root() {
        let fs = fresh_fs();
        assert_eq!(fs.sb.s_magic, MINIX_MAGIC);
        let root = fs.read_dinode(ROOT_INO).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.nlinks, 2);
        assert_eq!(names(&fs, ""), alloc::vec![String::from("."), String::from("..")]);
    }

    #[test]
    fn mkdir_tree_and_listing() {
        let fs = fresh_fs();
        fs.mkdir("a", 0o755).unwrap();
        fs.mkdir("a/b", 0o755).unwrap();
        let _ = fs.create("a/b/f", 0o644).unwrap();

        let entries = fs.readdir("a/b").unwrap();
        let mut got: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        got.sort_unstable();
        assert_eq!(got, ["." , "..", "f"]);
        let mut inos: Vec<u64> = entries.iter().map(|e| e.ino).collect();
        assert!(inos.iter().all(|&i| i != 0));
        inos.sort_unstable();
        inos.dedup();
        // "." and "f" and ".." are three distinct inodes.
        assert_eq!(inos.len(), 3);

        // Parent link counts: root gained "a", "a" gained "b".
        assert_eq!(fs.read_dinode(ROOT_INO).unwrap().nlinks, 3);
    }

    #[test]
    fn fourteen_byte_names_exact() {
        let fs = fresh_fs();
        let ok = "a".repeat(14);
        let too_long = "a".repeat(15);
        let _ = fs.create(&ok, 0o644).unwrap();
        assert!(fs.lookup(&ok).is_ok());
        assert_eq!(fs.create(&too_long, 0o644).err(), Some(Errno::EINVAL));
    }

    #[test]
    fn write_read_round_trip_through_indirect() {
        let fs = fresh_fs();
        let v = fs.create("big", 0o644).unwrap();
        // Spans all direct zones into the single indirect.
        let len = (NDIRECT + 3) * BSIZE + 123;
        let data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(fs.write(&v, 0, &data).unwrap(), len);
        assert_eq!(fs.fstat(&v).unwrap().size, len as u64);

        let mut back = alloc::vec![0u8; len + 100];
        let n = fs.read(&v, 0, &mut back).unwrap();
        assert_eq!(n, len);
        assert_eq!(&back[..n], &data[..]);
        assert!(fs.bitmaps_consistent().unwrap());
    }

    #[test]
    fn chunked_reads_tile_the_file() {
        let fs = fresh_fs();
        let v = fs.create("f", 0o644).unwrap();
        let data: Vec<u8> = (0..3000).map(|i| (i % 256) as u8).collect();
        fs.write(&v, 0, &data).unwrap();

        let mut tiled = Vec::new();
        let mut off = 0u64;
        for chunk in [1usize, 7, 512, 1024, 4096] {
            let mut buf = alloc::vec![0u8; chunk];
            let n = fs.read(&v, off, &mut buf).unwrap();
            tiled.extend_from_slice(&buf[..n]);
            off += n as u64;
        }
        assert_eq!(tiled, data);
    }

    #[test]
    fn zone_bitmap_round_trip() {
        let fs = fresh_fs();
        let (_, free) = fs.free_counts();
        let mut zones = Vec::new();
        for _ in 0..free {
            zones.push(fs.alloc_zone().unwrap());
        }
        assert_eq!(fs.alloc_zone().err(), Some(Errno::ENOSPC));

        let z = zones.pop().unwrap();
        fs.free_zone(z).unwrap();
        // First-fit returns the zone just freed.
        assert_eq!(fs.alloc_zone().unwrap(), z);
        assert!(fs.bitmaps_consistent().unwrap());
    }

    #[test]
    fn write_past_max_size_rejected() {
        let fs = fresh_fs();
        let v = fs.create("f", 0o644).unwrap();
        let max = fs.sb.s_max_size as u64;
        assert_eq!(fs.write(&v, max, b"x").err(), Some(Errno::ENOSPC));
    }

    #[test]
    fn disk_full_surfaces_enospc() {
        let fs = fresh_fs();
        let v = fs.create("hog", 0o644).unwrap();
        let blob = alloc::vec![0xAAu8; 200 * BSIZE];
        // Eventually the data zones run out.
        let mut off = 0u64;
        let err = loop {
            match fs.write(&v, off, &blob) {
                Ok(n) => off += n as u64,
                Err(e) => break e,
            }
        };
        assert_eq!(err, Errno::ENOSPC);
        assert!(fs.bitmaps_consistent().unwrap());
    }

    #[test]
    fn unlink_keeps_inode_until_close() {
        let fs = fresh_fs();
        let v = fs.open("f", OpenFlags::RDWR | OpenFlags::CREATE, 0o644).unwrap();
        fs.write(&v, 0, b"still here").unwrap();
        let (free_inodes_before, _) = fs.free_counts();

        fs.unlink("f").unwrap();
        assert!(matches!(fs.lookup("f"), Err(Errno::ENOENT)));
        let mut buf = [0u8; 10];
        assert_eq!(fs.read(&v, 0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, b"still here");

        fs.close(&v);
        let (free_inodes_after, _) = fs.free_counts();
        assert_eq!(free_inodes_after, free_inodes_before + 1);
        assert!(fs.bitmaps_consistent().unwrap());
    }

    #[test]
    fn hard_link_counts() {
        let fs = fresh_fs();
        let v = fs.create("f", 0o644).unwrap();
        fs.write(&v, 0, b"x").unwrap();
        fs.link("f", "g").unwrap();
        assert_eq!(fs.stat("f").unwrap().nlink, 2);
        fs.unlink("f").unwrap();
        assert_eq!(fs.stat("g").unwrap().nlink, 1);
        let mut buf = [0u8; 1];
        let g = fs.lookup("g").unwrap();
        assert_eq!(fs.read(&g, 0, &mut buf).unwrap(), 1);
    }

    #[test]
    fn mkdir_rmdir_restores_parent() {
        let fs = fresh_fs();
        fs.mkdir("a", 0o755).unwrap();
        let before = names(&fs, "a");
        let counts = fs.free_counts();
        fs.mkdir("a/b", 0o755).unwrap();
        fs.rmdir("a/b").unwrap();
        assert_eq!(names(&fs, "a"), before);
        assert_eq!(fs.free_counts(), counts);
        assert_eq!(fs.rmdir("a/b").err(), Some(Errno::ENOENT));
    }

    #[test]
    fn remount_sees_persisted_data() {
        let nzones = 64u16;
        let dev = Arc::new(MemDisk::new(nzones as u32 * (BSIZE / SECTOR_SIZE) as u32));
        mkfs(dev.clone(), 64, nzones).unwrap();
        {
            let fs = MinixFs::mount(dev.clone()).unwrap();
            let v = fs.create("persist", 0o644).unwrap();
            fs.write(&v, 0, b"bytes").unwrap();
        }
        let fs = MinixFs::mount(dev).unwrap();
        let v = fs.lookup("persist").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(&v, 0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"bytes");
    }
}
