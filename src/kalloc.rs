//! Physical memory allocator, for user pages, kernel stacks, page-table
//! pages and the kernel heap. Allocates whole 4096-byte frames.
//!
//! A bitmap covers every frame below `PHYSTOP`; a set bit means the
//! frame is free (the same convention the MINIX disk bitmaps use).
//! Allocation is a first-fit linear scan.

use bitmaps::Bitmap;
use spin::Once;

use crate::lock::Spinlock;
use crate::page::{pgrounddown, pgroundup, PGSIZE};
use crate::param::PHYSTOP;

/// Frame number: physical address divided by the page size.
pub type Frame = usize;

/// Frames tracked per bitmap chunk.
const CHUNK_BITS: usize = 1024;

/// Number of chunks covering `[0, PHYSTOP)`.
const NCHUNKS: usize = PHYSTOP / PGSIZE / CHUNK_BITS;

pub const fn frame_to_pa(f: Frame) -> usize {
    f * PGSIZE
}

pub const fn pa_to_frame(pa: usize) -> Frame {
    pa / PGSIZE
}

/// The frame bitmap. Everything starts allocated; boot marks the usable
/// ranges free and then re-reserves the kernel image.
pub struct Kmem {
    chunks: [Bitmap<CHUNK_BITS>; NCHUNKS],
    free: usize,
    total: usize,
}

impl Kmem {
    pub fn new() -> Self {
        Self {
            chunks: array_macro::array![_ => Bitmap::new(); NCHUNKS],
            free: 0,
            total: 0,
        }
    }

    /// Mark `[base, base + len)` usable. Partial pages at either end are
    /// dropped.
    pub fn mark_free_range(&mut self, base: usize, len: usize) {
        let start = pgroundup(base);
        let end = pgrounddown(base.saturating_add(len)).min(PHYSTOP);
        for pa in num_iter::range_step(start, end, PGSIZE) {
            let f = pa_to_frame(pa);
            if !self.chunks[f / CHUNK_BITS].set(f % CHUNK_BITS, true) {
                self.free += 1;
                self.total += 1;
            }
        }
    }

    /// Re-reserve `[base, base + len)` (kernel image, boot structures).
    pub fn mark_used_range(&mut self, base: usize, len: usize) {
        let start = pgrounddown(base);
        let end = pgroundup(base.saturating_add(len)).min(PHYSTOP);
        for pa in num_iter::range_step(start, end, PGSIZE) {
            let f = pa_to_frame(pa);
            if self.chunks[f / CHUNK_BITS].set(f % CHUNK_BITS, false) {
                self.free -= 1;
                self.total -= 1;
            }
        }
    }

    /// First-fit scan for a single free frame.
    pub fn alloc(&mut self) -> Option<Frame> {
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            if let Some(bit) = chunk.first_index() {
                let _ = chunk.set(bit, false);
                self.free -= 1;
                return Some(i * CHUNK_BITS + bit);
            }
        }
        None
    }

    /// First-fit scan for `n` physically contiguous frames.
    pub fn alloc_contiguous(&mut self, n: usize) -> Option<Frame> {
        if n == 0 {
            return None;
        }
        let nframes = NCHUNKS * CHUNK_BITS;
        let mut run = 0;
        for f in 0..nframes {
            if self.chunks[f / CHUNK_BITS].get(f % CHUNK_BITS) {
                run += 1;
                if run == n {
                    let start = f + 1 - n;
                    for g in start..=f {
                        let _ = self.chunks[g / CHUNK_BITS].set(g % CHUNK_BITS, false);
                    }
                    self.free -= n;
                    return Some(start);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    pub fn dealloc(&mut self, f: Frame) {
        let was_free = self.chunks[f / CHUNK_BITS].set(f % CHUNK_BITS, true);
        assert!(!was_free, "free of free frame {}", f);
        self.free += 1;
    }

    /// (total usable frames, currently free frames)
    pub fn stats(&self) -> (usize, usize) {
        (self.total, self.free)
    }
}

static KMEM: Once<Spinlock<Kmem>> = Once::new();

/// Install the boot-time bitmap. Called once from `kernel_main`.
pub fn init(kmem: Kmem) {
    let _ = KMEM.call_once(|| Spinlock::new("KMEM", kmem));
}

fn kmem() -> &'static Spinlock<Kmem> {
    KMEM.get().expect("kalloc used before init")
}

/// Allocate one frame, or `None` when physical memory is exhausted.
pub fn alloc_frame() -> Option<Frame> {
    kmem().lock().alloc()
}

/// Allocate one frame and zero it.
pub fn alloc_zeroed_frame() -> Option<Frame> {
    let f = alloc_frame()?;
    // SAFETY: freshly allocated frame, identity-mapped.
    unsafe { core::ptr::write_bytes(frame_to_pa(f) as *mut u8, 0, PGSIZE) };
    Some(f)
}

/// Allocate `n` contiguous frames.
pub fn alloc_contiguous(n: usize) -> Option<Frame> {
    kmem().lock().alloc_contiguous(n)
}

pub fn free_frame(f: Frame) {
    kmem().lock().dealloc(f);
}

/// (total usable frames, currently free frames), for /proc/meminfo.
pub fn stats() -> (usize, usize) {
    match KMEM.get() {
        Some(k) => k.lock().stats(),
        None => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_kmem() -> Kmem {
        let mut k = Kmem::new();
        // 16 usable frames at 1 MiB.
        k.mark_free_range(0x10_0000, 16 * PGSIZE);
        k
    }

    #[test]
    fn first_fit_is_lowest_free() {
        let mut k = small_kmem();
        let a = k.alloc().unwrap();
        let b = k.alloc().unwrap();
        assert_eq!(a, pa_to_frame(0x10_0000));
        assert_eq!(b, a + 1);
        k.dealloc(a);
        // The freed frame is the lowest again.
        assert_eq!(k.alloc().unwrap(), a);
    }

    #[test]
    fn exhaustion_and_stats() {
        let mut k = small_kmem();
        assert_eq!(k.stats(), (16, 16));
        let frames: alloc::vec::Vec<_> = (0..16).map(|_| k.alloc().unwrap()).collect();
        assert_eq!(k.alloc(), None);
        assert_eq!(k.stats(), (16, 0));
        for f in frames {
            k.dealloc(f);
        }
        assert_eq!(k.stats(), (16, 16));
    }

    #[test]
    fn contiguous_skips_holes() {
        let mut k = small_kmem();
        let base = k.alloc().unwrap();
        // Burn two frames, free the first to punch a one-frame hole.
        let hole = k.alloc().unwrap();
        let _wall = k.alloc().unwrap();
        k.dealloc(hole);
        // A two-frame run cannot use the hole next to the wall.
        let run = k.alloc_contiguous(2).unwrap();
        assert!(run > hole, "run {} should start past the hole", run);
        assert_eq!(run, base + 3);
    }

    #[test]
    fn reserving_kernel_image() {
        let mut k = Kmem::new();
        k.mark_free_range(0, 32 * PGSIZE);
        k.mark_used_range(0, 4 * PGSIZE);
        assert_eq!(k.alloc().unwrap(), 4);
    }
}
