//! Buffer cache.
//!
//! A fixed set of 1024-byte buffers holding cached copies of disk
//! blocks. The cache is the synchronization point for blocks used by
//! multiple processes: a locked `Buf` gives exclusive access to one
//! block's bytes. Recycling is least-recently-released among buffers
//! with no live references.
//!
//! Interface:
//! * `read` returns a locked buffer with the block's contents.
//! * After changing the data, call `Buf::write` to persist it.
//! * Dropping the `Buf` releases it for reuse.

use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};

use array_macro::array;

use crate::dev::BlockDevice;
use crate::error::Result;
use crate::lock::{Sleeplock, SleeplockGuard, Spinlock};
use crate::param::{BSIZE, NBUF, SECTOR_SIZE};

/// Sectors per block.
const SPB: u32 = (BSIZE / SECTOR_SIZE) as u32;

// Block data is routinely viewed as u16/u32 on-disk structures.
#[repr(align(8))]
pub struct BufData(pub [u8; BSIZE]);

struct BufInner {
    /// Has data been read from disk?
    valid: bool,
    data: BufData,
}

#[derive(Clone, Copy)]
struct BufMeta {
    blockno: u32,
    refcnt: u32,
    /// Release stamp used for LRU victim selection.
    last_release: u64,
    in_use: bool,
}

struct Meta {
    entries: [BufMeta; NBUF],
    stamp: u64,
}

/// One mount's buffer cache over its block device.
pub struct Bcache {
    dev: Arc<dyn BlockDevice>,
    meta: Spinlock<Meta>,
    bufs: [Sleeplock<BufInner>; NBUF],
}

/// A locked buffer: exclusive access to one block's bytes.
pub struct Buf<'b> {
    cache: &'b Bcache,
    idx: usize,
    pub blockno: u32,
    guard: SleeplockGuard<'b, BufInner>,
}

impl Bcache {
    pub fn new(dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            dev,
            meta: Spinlock::new(
                "BCACHE",
                Meta {
                    entries: [BufMeta {
                        blockno: 0,
                        refcnt: 0,
                        last_release: 0,
                        in_use: false,
                    }; NBUF],
                    stamp: 0,
                },
            ),
            bufs: array![_ => Sleeplock::new("buffer", BufInner {
                valid: false,
                data: BufData([0; BSIZE]),
            }); NBUF],
        }
    }

    pub fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.dev
    }

    /// Find the cache slot for `blockno`, recycling the
    /// least-recently-released free buffer on a miss. Returns the index
    /// and whether the slot was recycled.
    fn slot_for(&self, blockno: u32) -> (usize, bool) {
        let mut meta = self.meta.lock();
        if let Some(i) = meta
            .entries
            .iter()
            .position(|e| e.in_use && e.blockno == blockno)
        {
            meta.entries[i].refcnt += 1;
            return (i, false);
        }

        let victim = meta
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.refcnt == 0)
            .min_by_key(|(_, e)| e.last_release)
            .map(|(i, _)| i)
            .expect("bio: out of buffers");
        let e = &mut meta.entries[victim];
        e.blockno = blockno;
        e.refcnt = 1;
        e.in_use = true;
        (victim, true)
    }

    /// Return a locked buf with the contents of the indicated block.
    pub fn read(&self, blockno: u32) -> Result<Buf<'_>> {
        let (idx, recycled) = self.slot_for(blockno);
        let mut guard = self.bufs[idx].lock();
        if recycled {
            guard.valid = false;
        }
        if !guard.valid {
            self.dev.read_sectors(blockno * SPB, &mut guard.data.0)?;
            guard.valid = true;
        }
        Ok(Buf {
            cache: self,
            idx,
            blockno,
            guard,
        })
    }

    /// A locked buf for `blockno` with zeroed contents, skipping the
    /// disk read. For freshly allocated zones.
    pub fn zeroed(&self, blockno: u32) -> Buf<'_> {
        let (idx, _) = self.slot_for(blockno);
        let mut guard = self.bufs[idx].lock();
        guard.data.0.fill(0);
        guard.valid = true;
        Buf {
            cache: self,
            idx,
            blockno,
            guard,
        }
    }
}

impl Buf<'_> {
    /// Persist the buffer's contents to disk.
    pub fn write(&mut self) -> Result<()> {
        self.cache
            .dev
            .write_sectors(self.blockno * SPB, &self.guard.data.0)
    }
}

impl Deref for Buf<'_> {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.guard.data.0
    }
}

impl DerefMut for Buf<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.data.0
    }
}

impl Drop for Buf<'_> {
    fn drop(&mut self) {
        let mut meta = self.cache.meta.lock();
        let stamp = meta.stamp;
        meta.stamp += 1;
        let e = &mut meta.entries[self.idx];
        e.refcnt -= 1;
        e.last_release = stamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::MemDisk;

    fn cache(nblocks: u32) -> Bcache {
        Bcache::new(Arc::new(MemDisk::new(nblocks * SPB)))
    }

    #[test]
    fn write_then_read_back() {
        let bc = cache(8);
        {
            let mut b = bc.read(3).unwrap();
            b[0] = 42;
            b[BSIZE - 1] = 7;
            b.write().unwrap();
        }
        let b = bc.read(3).unwrap();
        assert_eq!(b[0], 42);
        assert_eq!(b[BSIZE - 1], 7);
    }

    #[test]
    fn eviction_persists_through_disk() {
        let bc = cache(NBUF as u32 * 2);
        for i in 0..NBUF as u32 {
            let mut b = bc.read(i).unwrap();
            b[0] = i as u8;
            b.write().unwrap();
        }
        // Touch a second wave to force recycling of every slot.
        for i in NBUF as u32..NBUF as u32 * 2 {
            let _ = bc.read(i).unwrap();
        }
        for i in 0..NBUF as u32 {
            let b = bc.read(i).unwrap();
            assert_eq!(b[0], i as u8, "block {} lost after eviction", i);
        }
    }

    #[test]
    fn zeroed_skips_stale_contents() {
        let bc = cache(4);
        {
            let mut b = bc.read(1).unwrap();
            b.fill(0xFF);
            b.write().unwrap();
        }
        let b = bc.zeroed(1);
        assert!(b.iter().all(|&x| x == 0));
    }
}
