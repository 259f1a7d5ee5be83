//! exec: load an ELF64 image into the current task.
//!
//! The whole image is read through the VFS, the PT_LOAD segments are
//! copied into a fresh address space, and the argument strings are laid
//! out on the new user stack. Only on success does the current task's
//! memory get replaced; a bad image leaves the caller untouched.

use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::FromBytes;

use crate::arch::x86_64::trap::TrapFrame;
use crate::error::{Errno, Result};
use crate::file::File;
use crate::fs::OpenFlags;
use crate::proc::with_current;
use crate::vm::UserMemory;

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;

/// Largest image exec will read.
const MAX_IMAGE: usize = 4 * 1024 * 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes)]
struct Elf64Ehdr {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

/// Read the whole file behind `abs` into memory.
fn slurp(abs: &str) -> Result<Vec<u8>> {
    let file = File::open(crate::kernel::vfs(), abs, OpenFlags::RDONLY, 0)?;
    let size = file.stat()?.size as usize;
    if size == 0 || size > MAX_IMAGE {
        return Err(Errno::ENOEXEC);
    }
    let mut image = alloc::vec![0u8; size];
    let mut done = 0;
    while done < size {
        let n = file.read(&mut image[done..])?;
        if n == 0 {
            break;
        }
        done += n;
    }
    image.truncate(done);
    Ok(image)
}

/// Copy `args` onto the stack topped at `top`; returns the new stack
/// pointer and the address of the pointer vector.
fn push_args(memory: &mut UserMemory, top: usize, args: &[String]) -> Result<(usize, usize)> {
    let mut sp = top;
    let mut ptrs: Vec<usize> = Vec::with_capacity(args.len() + 1);
    for arg in args.iter().rev() {
        sp -= arg.len() + 1;
        memory.copy_out(sp.into(), arg.as_bytes())?;
        memory.copy_out((sp + arg.len()).into(), &[0u8])?;
        ptrs.push(sp);
    }
    ptrs.reverse();
    ptrs.push(0);

    sp &= !0xF;
    sp -= ptrs.len() * 8;
    let vec_at = sp;
    for (i, p) in ptrs.iter().enumerate() {
        memory.copy_out((vec_at + i * 8).into(), &p.to_le_bytes())?;
    }
    // Keep the entry-time stack 16-byte aligned.
    sp &= !0xF;
    Ok((sp, vec_at))
}

/// Replace the current task's image. On success the trap frame returns
/// to the new entry point and this call "does not return" to the old
/// user code.
pub fn exec(abs: &str, args: &[String], tf: &mut TrapFrame) -> Result<()> {
    let image = slurp(abs)?;

    let ehdr = Elf64Ehdr::read_from_prefix(&image[..]).ok_or(Errno::ENOEXEC)?;
    if ehdr.e_ident[..4] != ELF_MAGIC
        || ehdr.e_ident[4] != ELFCLASS64
        || ehdr.e_machine != EM_X86_64
        || ehdr.e_phnum == 0
    {
        return Err(Errno::ENOEXEC);
    }

    let mut memory = UserMemory::new()?;
    let mut image_end = 0usize;
    for i in 0..ehdr.e_phnum as usize {
        let off = ehdr.e_phoff as usize + i * core::mem::size_of::<Elf64Phdr>();
        let ph = Elf64Phdr::read_from_prefix(image.get(off..).ok_or(Errno::ENOEXEC)?)
            .ok_or(Errno::ENOEXEC)?;
        if ph.p_type != PT_LOAD {
            continue;
        }
        if ph.p_filesz > ph.p_memsz {
            return Err(Errno::ENOEXEC);
        }
        let data = image
            .get(ph.p_offset as usize..(ph.p_offset + ph.p_filesz) as usize)
            .ok_or(Errno::ENOEXEC)?;
        memory.load_segment(ph.p_vaddr as usize, data, ph.p_memsz as usize)?;
        image_end = image_end.max((ph.p_vaddr + ph.p_memsz) as usize);
    }

    let stack_top = memory.setup_stack()?;
    memory.set_heap_base(image_end);
    let (sp, argv) = push_args(&mut memory, stack_top, args)?;

    let name = abs.rsplit('/').next().unwrap_or(abs);
    with_current(|p| {
        // SAFETY: the new table carries the kernel half; switching
        // spaces mid-syscall is safe on the kernel stack.
        unsafe { memory.install() };
        let old = core::mem::replace(&mut p.memory, Some(memory));
        p.set_name(name);
        // The old space's root is no longer installed; drop frees it.
        drop(old);
    });

    tf.rip = ehdr.e_entry as usize;
    tf.rsp = sp;
    tf.rdi = args.len();
    tf.rsi = argv;
    tf.rax = 0;
    Ok(())
}
