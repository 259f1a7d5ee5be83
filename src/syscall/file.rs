//! File-related system calls.

use alloc::string::String;
use alloc::sync::Arc;

use crate::arch::x86_64::trap::TrapFrame;
use crate::error::{Errno, Result};
use crate::file::{File, SEEK_CUR, SEEK_END, SEEK_SET};
use crate::fs::{devfs, minix, procfs, sysfs, tmpfs, Filesystem, OpenFlags};
use crate::param::TMPFS_DEFAULT_LIMIT;
use crate::println;
use crate::proc::with_current;
use crate::stat::{InodeType, Stat};

use super::{argaddr, argint, argraw, copy_in_user, copy_out_user, fetch_path, fetch_str_vec};

/// Shuttle buffer between user memory and the file layer.
const XFER_CHUNK: usize = 512;

fn current_file(fd: usize) -> Result<Arc<File>> {
    with_current(|p| p.files.get(fd))
}

pub fn sys_read(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    let uva = argaddr(tf, 1);
    let n = argraw(tf, 2);
    let file = current_file(fd)?;

    let mut kbuf = [0u8; XFER_CHUNK];
    let mut done = 0;
    while done < n {
        let want = XFER_CHUNK.min(n - done);
        let got = file.read(&mut kbuf[..want])?;
        if got == 0 {
            break;
        }
        copy_out_user(uva.wrapping_add(done), &kbuf[..got])?;
        done += got;
        if got < want {
            break;
        }
    }
    Ok(done as i64)
}

pub fn sys_write(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    let uva = argaddr(tf, 1);
    let n = argraw(tf, 2);
    let file = current_file(fd)?;

    let mut kbuf = [0u8; XFER_CHUNK];
    let mut done = 0;
    while done < n {
        let want = XFER_CHUNK.min(n - done);
        copy_in_user(&mut kbuf[..want], uva.wrapping_add(done))?;
        let put = file.write(&kbuf[..want])?;
        done += put;
        if put < want {
            break;
        }
    }
    Ok(done as i64)
}

pub fn sys_open(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let flags = OpenFlags::from_bits_truncate(argraw(tf, 1) as u32);
    let mode = argraw(tf, 2) as u16;
    let file = File::open(crate::kernel::vfs(), &abs, flags, mode)?;
    let fd = with_current(|p| p.files.alloc(file))?;
    Ok(fd as i64)
}

pub fn sys_close(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    with_current(|p| p.files.close(fd))?;
    Ok(0)
}

pub fn sys_exec(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let mut args = fetch_str_vec(argaddr(tf, 1))?;
    // envp is accepted and appended after the argv terminator slot in
    // the same vector layout.
    let env = fetch_str_vec(argaddr(tf, 2))?;
    if args.is_empty() {
        args.push(abs.clone());
    }
    args.extend(env);
    crate::exec::exec(&abs, &args, tf)?;
    // The return register of the new image, not the old one.
    Ok(tf.rax as i64)
}

pub fn sys_chdir(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let st = crate::kernel::vfs().stat(&abs)?;
    if st.typ() != Some(InodeType::Dir) {
        return Err(Errno::ENOTDIR);
    }
    with_current(|p| p.cwd = abs);
    Ok(0)
}

pub fn sys_getcwd(tf: &mut TrapFrame) -> Result<i64> {
    let uva = argaddr(tf, 0);
    let len = argraw(tf, 1);
    let cwd = with_current(|p| p.cwd.clone());
    if cwd.len() + 1 > len {
        return Err(Errno::ERANGE);
    }
    copy_out_user(uva, cwd.as_bytes())?;
    copy_out_user(uva.wrapping_add(cwd.len()), &[0u8])?;
    Ok(cwd.len() as i64)
}

pub fn sys_mkdir(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let mode = argraw(tf, 1) as u16;
    crate::kernel::vfs().mkdir(&abs, mode)?;
    Ok(0)
}

pub fn sys_rmdir(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    crate::kernel::vfs().rmdir(&abs)?;
    Ok(0)
}

pub fn sys_stat(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let st = crate::kernel::vfs().stat(&abs)?;
    copy_out_user(argaddr(tf, 1), stat_bytes(&st))?;
    Ok(0)
}

pub fn sys_fstat(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    let st = current_file(fd)?.stat()?;
    copy_out_user(argaddr(tf, 1), stat_bytes(&st))?;
    Ok(0)
}

fn stat_bytes(st: &Stat) -> &[u8] {
    // Stat is repr(C) plain data; hand the packed record to user space
    // as the syscall ABI defines it.
    unsafe {
        core::slice::from_raw_parts(st as *const Stat as *const u8, core::mem::size_of::<Stat>())
    }
}

pub fn sys_lseek(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    let pos = argraw(tf, 1) as i64;
    let whence = argraw(tf, 2);
    if !matches!(whence, SEEK_SET | SEEK_CUR | SEEK_END) {
        return Err(Errno::EINVAL);
    }
    let off = current_file(fd)?.lseek(pos, whence)?;
    Ok(off as i64)
}

pub fn sys_dup(tf: &mut TrapFrame) -> Result<i64> {
    let fd = argraw(tf, 0);
    let new = with_current(|p| p.files.dup(fd))?;
    Ok(new as i64)
}

pub fn sys_dup2(tf: &mut TrapFrame) -> Result<i64> {
    let old = argraw(tf, 0);
    let new = argraw(tf, 1);
    let got = with_current(|p| p.files.dup2(old, new))?;
    Ok(got as i64)
}

pub fn sys_pipe(tf: &mut TrapFrame) -> Result<i64> {
    let uva = argaddr(tf, 0);
    let (r, w) = File::pipe()?;
    let (rfd, wfd) = with_current(|p| {
        let rfd = p.files.alloc(r)?;
        match p.files.alloc(w) {
            Ok(wfd) => Ok((rfd, wfd)),
            Err(e) => {
                let _ = p.files.close(rfd);
                Err(e)
            }
        }
    })?;
    let mut fds = [0u8; 8];
    fds[..4].copy_from_slice(&(rfd as i32).to_le_bytes());
    fds[4..].copy_from_slice(&(wfd as i32).to_le_bytes());
    if let Err(e) = copy_out_user(uva, &fds) {
        with_current(|p| {
            let _ = p.files.close(rfd);
            let _ = p.files.close(wfd);
        });
        return Err(e);
    }
    Ok(0)
}

pub fn sys_link(tf: &mut TrapFrame) -> Result<i64> {
    let old = fetch_path(tf, 0)?;
    let new = fetch_path(tf, 1)?;
    crate::kernel::vfs().link(&old, &new)?;
    Ok(0)
}

pub fn sys_unlink(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    crate::kernel::vfs().unlink(&abs)?;
    Ok(0)
}

/// Directory enumeration straight to the console; the debug shell's
/// `ls` builtin.
pub fn sys_ls(tf: &mut TrapFrame) -> Result<i64> {
    let abs = fetch_path(tf, 0)?;
    let detailed = argint(tf, 1) != 0;
    let entries = crate::kernel::vfs().readdir(&abs)?;
    for e in &entries {
        if detailed {
            let full = if abs == "/" {
                alloc::format!("/{}", e.name)
            } else {
                alloc::format!("{}/{}", abs, e.name)
            };
            match crate::kernel::vfs().stat(&full) {
                Ok(st) => println!(
                    "{:>6} {:>5o} {:>8} {}",
                    e.ino, st.mode, st.size, e.name
                ),
                Err(_) => println!("{:>6} {:>5} {:>8} {}", e.ino, "?", "?", e.name),
            }
        } else {
            println!("{}", e.name);
        }
    }
    Ok(entries.len() as i64)
}

pub fn sys_mount(tf: &mut TrapFrame) -> Result<i64> {
    if with_current(|p| p.uid) != 0 {
        return Err(Errno::EPERM);
    }
    let at = fetch_path(tf, 0)?;
    let fstype = super::fetch_str(argaddr(tf, 1))?;
    let dev_name = super::fetch_str(argaddr(tf, 2))?;

    let fs = match fstype.as_str() {
        "minix" => {
            let dev = crate::dev::by_name(&dev_name).ok_or(Errno::ENODEV)?;
            Filesystem::Minix(minix::MinixFs::mount(dev)?)
        }
        "tmpfs" => Filesystem::Tmpfs(tmpfs::Tmpfs::new(TMPFS_DEFAULT_LIMIT)),
        "ramfs" => Filesystem::Ramfs(tmpfs::Tmpfs::new(TMPFS_DEFAULT_LIMIT)),
        "procfs" => Filesystem::Procfs(procfs::kernel_procfs()),
        "sysfs" => Filesystem::Sysfs(sysfs::SysFs::new()),
        "devfs" => Filesystem::Devfs(devfs::DevFs::new()),
        _ => return Err(Errno::ENODEV),
    };
    crate::kernel::vfs().mount(&at, &dev_name, fs)?;
    log::info!("mounted {} at {}", fstype, at);
    Ok(0)
}

pub fn sys_get_block_devices(tf: &mut TrapFrame) -> Result<i64> {
    let uva = argaddr(tf, 0);
    let cap = argraw(tf, 1);
    let mut listing = String::new();
    for (name, sectors) in crate::dev::names() {
        listing.push_str(&alloc::format!("{} {}\n", name, sectors));
    }
    let bytes = listing.as_bytes();
    let n = bytes.len().min(cap);
    copy_out_user(uva, &bytes[..n])?;
    Ok(n as i64)
}
