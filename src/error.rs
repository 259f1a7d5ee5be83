//! Kernel error numbers.
//!
//! Every fallible kernel path returns `Result<T>`; the syscall dispatcher
//! turns `Err(e)` into `-(e as i32)` in the return register. Values follow
//! the classic errno assignment so user code sees familiar numbers.

/// Error number.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted.
    EPERM = 1,
    /// No such file or directory.
    ENOENT = 2,
    /// No such process.
    ESRCH = 3,
    /// Interrupted system call.
    EINTR = 4,
    /// I/O error.
    EIO = 5,
    /// Exec format error.
    ENOEXEC = 8,
    /// Bad file number.
    EBADF = 9,
    /// No child processes.
    ECHILD = 10,
    /// Try again (process table full).
    EAGAIN = 11,
    /// Out of memory.
    ENOMEM = 12,
    /// Permission denied.
    EACCES = 13,
    /// Bad user-space address.
    EFAULT = 14,
    /// Device or resource busy.
    EBUSY = 16,
    /// File exists.
    EEXIST = 17,
    /// No such device.
    ENODEV = 19,
    /// Not a directory.
    ENOTDIR = 20,
    /// Is a directory.
    EISDIR = 21,
    /// Invalid argument.
    EINVAL = 22,
    /// System-wide file table overflow.
    ENFILE = 23,
    /// Too many open files in one process.
    EMFILE = 24,
    /// Not a typewriter.
    ENOTTY = 25,
    /// No space left on device.
    ENOSPC = 28,
    /// Illegal seek.
    ESPIPE = 29,
    /// Broken pipe.
    EPIPE = 32,
    /// Math result not representable.
    ERANGE = 34,
    /// Operation not supported by this filesystem.
    ENOSYS = 38,
    /// Directory not empty.
    ENOTEMPTY = 39,
    /// Quota exceeded (tmpfs mount limit).
    EDQUOT = 122,
}

pub type Result<T> = core::result::Result<T, Errno>;

impl Errno {
    /// The value placed in the syscall return register.
    pub const fn as_neg(self) -> i64 {
        -(self as i32 as i64)
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}
