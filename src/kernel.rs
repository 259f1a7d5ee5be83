//! Kernel bring-up and globals.
//!
//! `kernel_main` receives the parsed memory map from the arch shim,
//! stands the subsystems up in dependency order (frames, paging, heap,
//! scheduler, devices, mounts, init), and then becomes the idle task.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::x86_64::memlayout::kernel_end;
use crate::arch::x86_64::pic;
use crate::arch::x86_64::start::MemMap;
use crate::arch::x86_64::vm as archvm;
use crate::arch::x86_64::memlayout::{IRQ_ATA0, IRQ_COM1, IRQ_KBD, IRQ_TIMER};
use crate::dev::{self, MemDisk};
use crate::fs::{devfs::DevFs, minix, procfs, sysfs::SysFs, tmpfs::Tmpfs, Filesystem, Vfs};
use crate::kalloc::{self, Kmem};
use crate::page::PGSIZE;
use crate::param::{BSIZE, KERNEL_NAME, KERNEL_VERSION, KHEAP_SIZE, ROOTDEV, SECTOR_SIZE, TMPFS_DEFAULT_LIMIT};
use crate::proc;
use crate::sched::SchedPolicy;

/// The mount table; const-initialized so it needs no boot hand-off.
static VFS: Vfs = Vfs::new();

pub fn vfs() -> &'static Vfs {
    &VFS
}

static PANICKED: AtomicBool = AtomicBool::new(false);

pub fn is_panicked() -> bool {
    PANICKED.load(Ordering::Acquire)
}

/// print! macro prints to the console.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::klog::print_fmt(format_args!($($arg)*));
    };
}

/// println! macro prints to the console.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Handles panic: print the diagnostic and halt.
#[cfg(not(test))]
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo<'_>) -> ! {
    PANICKED.store(true, Ordering::Release);
    crate::arch::intr_off();
    println!();
    println!("KERNEL PANIC (pid {:?}): {}", proc::current_pid(), info);
    loop {
        core::hint::spin_loop();
    }
}

/// Carve the usable memory out of the boot map, reserving low memory
/// and the kernel image.
fn init_frames(memmap: &MemMap) -> (usize, usize) {
    let mut kmem = Kmem::new();
    for region in memmap {
        kmem.mark_free_range(region.base, region.len);
    }
    // Real-mode leftovers and everything up to the end of the image.
    kmem.mark_used_range(0, kernel_end());
    let stats = kmem.stats();
    kalloc::init(kmem);
    stats
}

/// The disk the root filesystem lives on: the ATA primary master when
/// one answers, otherwise a RAM disk formatted on the spot.
fn root_disk() -> Arc<dyn dev::BlockDevice> {
    if let Some(disk) = crate::dev::ata::AtaDisk::probe() {
        dev::register(ROOTDEV, disk.clone());
        return disk;
    }
    log::warn!("no ata disk; using a volatile ram disk as root");
    let disk = Arc::new(MemDisk::new((8 * 1024 * 1024 / SECTOR_SIZE) as u32));
    dev::register("ram0", disk.clone());
    disk
}

fn mount_root(disk: Arc<dyn dev::BlockDevice>) {
    let fs = match minix::MinixFs::mount(disk.clone()) {
        Ok(fs) => fs,
        Err(_) => {
            // Blank media: lay down an empty filesystem first.
            let nblocks = (disk.nsectors() as usize * SECTOR_SIZE / BSIZE).min(0xFFFF) as u16;
            log::info!("formatting root disk: {} blocks", nblocks);
            minix::mkfs(disk.clone(), 1024, nblocks).expect("mkfs failed");
            minix::MinixFs::mount(disk).expect("mount after mkfs failed")
        }
    };
    VFS.mount("/", ROOTDEV, Filesystem::Minix(fs))
        .expect("mounting root");
}

fn mount_pseudo() {
    let devfs = DevFs::new();
    crate::console::register_devices(&devfs);
    VFS.mount("/dev", "none", Filesystem::Devfs(devfs))
        .expect("mounting /dev");
    VFS.mount("/proc", "none", Filesystem::Procfs(procfs::kernel_procfs()))
        .expect("mounting /proc");
    VFS.mount("/sys", "none", Filesystem::Sysfs(SysFs::new()))
        .expect("mounting /sys");
    VFS.mount("/tmp", "none", Filesystem::Tmpfs(Tmpfs::new(TMPFS_DEFAULT_LIMIT)))
        .expect("mounting /tmp");
    VFS.mount(
        "/boot",
        "none",
        Filesystem::Ramfs(Tmpfs::with_boot_files(
            TMPFS_DEFAULT_LIMIT,
            &[("/motd", b"IR0 booted\n" as &[u8])],
        )),
    )
    .expect("mounting /boot");

    // The root must offer the mount-point directories so path walks
    // reach the pseudo filesystems.
    for dir in ["/dev", "/proc", "/sys", "/tmp", "/boot"] {
        match VFS.resolve("/") {
            Ok(root) => {
                let _ = root.fs.ops().mkdir(dir.trim_start_matches('/'), 0o755);
            }
            Err(e) => log::warn!("no root for {}: {}", dir, e),
        }
    }
}

/// Arch hands over here with interrupts off and devices quiet.
pub unsafe fn kernel_main(memmap: MemMap) -> ! {
    crate::klog::init();
    println!();
    println!("{} {} is booting", KERNEL_NAME, KERNEL_VERSION);

    // Physical page allocator.
    let (total, _free) = init_frames(&memmap);
    log::info!("memory: {} frames usable", total);

    // Paging: canonical kernel mappings.
    // SAFETY: boot path, frame allocator is up.
    unsafe {
        archvm::init_kernel_root().expect("building kernel page tables");
        archvm::install_kernel_root();
    }

    // Kernel heap; collections work from here on.
    let heap_frames = KHEAP_SIZE / PGSIZE;
    let heap = kalloc::alloc_contiguous(heap_frames).expect("kernel heap reservation");
    // SAFETY: the frames were just reserved for the heap.
    unsafe { crate::heap::init(kalloc::frame_to_pa(heap), KHEAP_SIZE) };

    // Scheduler.
    proc::init(SchedPolicy::Cfs);

    // Filesystems.
    mount_root(root_disk());
    mount_pseudo();

    // First user process.
    proc::spawn_init().expect("spawning init");

    // Accept device interrupts.
    // SAFETY: handlers are installed; unmasking is now safe.
    unsafe {
        pic::enable(IRQ_TIMER);
        pic::enable(IRQ_KBD);
        pic::enable(IRQ_COM1);
        pic::enable(IRQ_ATA0);
    }

    log::info!("boot complete, entering idle");
    proc::idle_loop()
}
