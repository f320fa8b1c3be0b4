//! Kernel error kinds shared by the filesystem and the paging subsystem.
//!
//! Naming follows the POSIX errno flavor `keos::KernelError` already uses,
//! extended with the kinds the persistence/paging core needs that a
//! general-purpose syscall-facing enum does not: [`KernelError::TooBig`] for
//! writes past the maximum file size, and [`KernelError::Fatal`] for a
//! broken on-disk invariant that the caller cannot meaningfully recover
//! from.

use core::fmt;

/// An error produced by the filesystem or paging core.
///
/// Most public APIs in [`filesys`](../filesys/index.html) and
/// [`vm`](../vm/index.html) collapse `Result<_, KernelError>` into the short
/// counts and booleans the spec describes (see module docs); this type is
/// the shared vocabulary they report internally and across crate
/// boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No such file or directory. (ENOENT)
    NotFound,
    /// File exists. (EEXIST)
    Exists,
    /// Not a directory. (ENOTDIR)
    NotDir,
    /// Is a directory. (EISDIR)
    IsDir,
    /// Directory not empty. (ENOTEMPTY)
    NotEmpty,
    /// No space left on device. (ENOSPC)
    NoSpace,
    /// Write would grow a file past the maximum size the index structure
    /// can address.
    TooBig,
    /// Write attempted while a deny-write hold is in effect.
    ReadOnly,
    /// Malformed path or argument.
    Invalid,
    /// IO error talking to the block device.
    IoError,
    /// Bad file descriptor / handle.
    BadHandle,
    /// A broken on-disk invariant (bad magic, double-free, dangling
    /// reference). Never returned from a public API: the detecting code
    /// panics with this value attached to the message instead, since the
    /// corpus this crate follows treats these as unrecoverable (`keos`'s
    /// `FilesystemCorrupted` carries a `&'static str` for the same reason).
    Fatal(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::NotFound => write!(f, "no such file or directory"),
            KernelError::Exists => write!(f, "file exists"),
            KernelError::NotDir => write!(f, "not a directory"),
            KernelError::IsDir => write!(f, "is a directory"),
            KernelError::NotEmpty => write!(f, "directory not empty"),
            KernelError::NoSpace => write!(f, "no space left on device"),
            KernelError::TooBig => write!(f, "file too big"),
            KernelError::ReadOnly => write!(f, "file is deny-write"),
            KernelError::Invalid => write!(f, "invalid argument"),
            KernelError::IoError => write!(f, "device io error"),
            KernelError::BadHandle => write!(f, "bad handle"),
            KernelError::Fatal(msg) => write!(f, "filesystem corrupted: {msg}"),
        }
    }
}
