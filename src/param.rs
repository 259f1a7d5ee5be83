/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Open files per system.
pub const NFILE: usize = 100;

/// Maximum number of mounted filesystems.
pub const NMOUNT: usize = 8;

/// Maximum major device number in devfs.
pub const NDEV: usize = 10;

/// Device name of the filesystem root disk.
pub const ROOTDEV: &str = "hda";

/// Max exec arguments.
pub const MAXARG: usize = 32;

/// Block size (two 512-byte sectors).
pub const BSIZE: usize = 1024;

/// Sector size of a block device.
pub const SECTOR_SIZE: usize = 512;

/// Size of the disk block cache.
pub const NBUF: usize = 30;

/// Maximum file path name.
pub const MAXPATH: usize = 128;

/// Maximum length of a single path component (MINIX dirent name).
pub const DIRSIZ: usize = 14;

/// Maximum length of a process name.
pub const MAXPROCNAME: usize = 16;

/// Timer interrupt frequency, in ticks per second.
pub const TICK_HZ: u64 = 1000;

/// Default scheduling quantum, in ticks.
pub const QUANTUM: u64 = 10;

/// CFS: smallest slice ever handed out, in ticks.
pub const CFS_MIN_GRANULARITY: u64 = 2;

/// CFS: scheduling period distributed among runnable tasks, in ticks.
pub const CFS_PERIOD: u64 = 48;

/// Number of scheduler priority levels (0 is highest).
pub const NPRIO: usize = 8;

/// Top of physical memory managed by the frame allocator.
pub const PHYSTOP: usize = 0x2000_0000;

/// Size of the kernel heap backing kmalloc.
pub const KHEAP_SIZE: usize = 8 * 1024 * 1024;

/// Bytes of user stack mapped eagerly by exec.
pub const USTACK_SIZE: usize = 8 * 4096;

/// Number of signals.
pub const NSIG: usize = 32;

/// Pipe ring buffer capacity in bytes.
pub const PIPESIZE: usize = 512;

/// tmpfs default mount size limit in bytes.
pub const TMPFS_DEFAULT_LIMIT: usize = 4 * 1024 * 1024;

/// Kernel identification reported by `/proc/version` and `kernel_info`.
pub const KERNEL_NAME: &str = "IR0";
pub const KERNEL_VERSION: &str = "0.1.0";
pub const KERNEL_ARCH: &str = "x86_64";
