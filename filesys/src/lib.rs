//! Inode-based filesystem core.
//!
//! Ties components B–F (free map, inode store, directory layer, path
//! resolver, file handle) into the consumer surface a kernel calls from its
//! syscall layer (§6): `filesys_init`/`filesys_done` mount and unmount the
//! volume bound to [`blockdev::DeviceName::Fs`], and the `*_at` functions
//! take an explicit working-directory sector because the task/cwd
//! abstraction itself lives outside this crate (§1 — externalized
//! collaborators). The root-relative non-`_at` functions exist for
//! callers with no notion of a current directory yet, such as early boot.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod dir;
pub mod disk_layout;
pub mod file;
pub mod freemap;
pub mod inode;
pub mod path;

pub use dir::Directory;
pub use disk_layout::ROOT_DIR_SECTOR;
pub use file::File;
pub use inode::FileSystem;
pub use path::Resolution;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use blockdev::{DeviceName, Sector};
use oscore::sync::RwLock;
use oscore::KernelError;

static MOUNTED: RwLock<Option<Arc<FileSystem>>> = RwLock::new(None);

fn mounted() -> Result<Arc<FileSystem>, KernelError> {
    MOUNTED.read().clone().ok_or(KernelError::IoError)
}

/// Mounts the filesystem bound under [`DeviceName::Fs`], formatting a fresh
/// volume first when `format` is set (§6). Fails with [`KernelError::Fatal`]
/// if a volume is already mounted.
pub fn filesys_init(format: bool) -> Result<(), KernelError> {
    let mut slot = MOUNTED.write();
    if slot.is_some() {
        return Err(KernelError::Fatal("filesystem already mounted"));
    }
    let device = blockdev::fs_device()?;
    let fs = if format {
        FileSystem::format(device)?
    } else {
        FileSystem::mount(device)?
    };
    *slot = Some(fs);
    Ok(())
}

/// Flushes the free map and unmounts the volume (§6).
pub fn filesys_done() -> Result<(), KernelError> {
    let fs = MOUNTED.write().take();
    if let Some(fs) = fs {
        fs.sync()?;
    }
    Ok(())
}

/// Splits `path` into its parent path and final component, for operations
/// on an entry that already exists (§4.E). `.` and `..` are valid parents
/// but never valid bases to split further than the trailing component.
fn split_basename(path: &str) -> Result<(String, String), KernelError> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(KernelError::Invalid);
    }
    match trimmed.rfind('/') {
        Some(0) => Ok(("/".to_string(), trimmed[1..].to_string())),
        Some(idx) => Ok((trimmed[..idx].to_string(), trimmed[idx + 1..].to_string())),
        None => Ok((".".to_string(), trimmed.to_string())),
    }
}

/// Creates a regular file of `initial_size` zeroed bytes at `path`,
/// resolved from `cwd` (§6). Fails with [`KernelError::Exists`] if an entry
/// is already bound to that name.
pub fn filesys_create_at(cwd: Sector, path: &str, initial_size: usize) -> Result<(), KernelError> {
    let fs = mounted()?;
    let (parent, basename) = match path::resolve(&fs, cwd, path)? {
        Resolution::Missing { parent, basename } => (parent, basename),
        Resolution::File(_) | Resolution::Dir(_) => return Err(KernelError::Exists),
    };
    let parent_inode = fs.open(parent)?;
    let dir = match Directory::open(parent_inode) {
        Ok(d) => d,
        Err(e) => {
            fs.close(parent)?;
            return Err(e);
        }
    };
    let result = (|| {
        let sector = fs.allocate_inode_sector()?;
        fs.create_inode_at(sector, initial_size, false)?;
        dir.add(&fs, &basename, sector)
    })();
    fs.close(parent)?;
    result
}

/// [`filesys_create_at`] resolved from the root.
pub fn filesys_create(path: &str, initial_size: usize) -> Result<(), KernelError> {
    filesys_create_at(ROOT_DIR_SECTOR, path, initial_size)
}

/// Creates a subdirectory at `path`, resolved from `cwd`, seeded with `.`
/// and `..` entries (§4.D).
pub fn filesys_mkdir_at(cwd: Sector, path: &str) -> Result<(), KernelError> {
    let fs = mounted()?;
    let (parent, basename) = match path::resolve(&fs, cwd, path)? {
        Resolution::Missing { parent, basename } => (parent, basename),
        Resolution::File(_) | Resolution::Dir(_) => return Err(KernelError::Exists),
    };
    let parent_inode = fs.open(parent)?;
    let dir = match Directory::open(parent_inode) {
        Ok(d) => d,
        Err(e) => {
            fs.close(parent)?;
            return Err(e);
        }
    };
    let result = (|| {
        let sector = fs.allocate_inode_sector()?;
        fs.create_inode_at(sector, 0, true)?;
        let new_inode = fs.open(sector)?;
        let seeded = Directory::format_new(&fs, &new_inode, parent);
        fs.close(sector)?;
        seeded?;
        dir.add(&fs, &basename, sector)
    })();
    fs.close(parent)?;
    result
}

/// Opens the regular file at `path`, resolved from `cwd` (§6). Fails with
/// [`KernelError::IsDir`] if the path names a directory.
pub fn filesys_open_at(cwd: Sector, path: &str) -> Result<File, KernelError> {
    let fs = mounted()?;
    match path::resolve(&fs, cwd, path)? {
        Resolution::File(sector) => Ok(File::new(fs.open(sector)?)),
        Resolution::Dir(_) => Err(KernelError::IsDir),
        Resolution::Missing { .. } => Err(KernelError::NotFound),
    }
}

/// [`filesys_open_at`] resolved from the root.
pub fn filesys_open(path: &str) -> Result<File, KernelError> {
    filesys_open_at(ROOT_DIR_SECTOR, path)
}

/// Opens the directory at `path`, resolved from `cwd`.
pub fn filesys_open_dir_at(cwd: Sector, path: &str) -> Result<Directory, KernelError> {
    let fs = mounted()?;
    match path::resolve(&fs, cwd, path)? {
        Resolution::Dir(sector) => Directory::open(fs.open(sector)?),
        Resolution::File(_) => Err(KernelError::NotDir),
        Resolution::Missing { .. } => Err(KernelError::NotFound),
    }
}

/// Resolves `path` from `cwd` to a directory sector, for callers that need
/// to update their own notion of a current directory (`chdir`). The cwd
/// itself is not tracked by this crate (§1).
pub fn filesys_chdir_at(cwd: Sector, path: &str) -> Result<Sector, KernelError> {
    let fs = mounted()?;
    match path::resolve(&fs, cwd, path)? {
        Resolution::Dir(sector) => Ok(sector),
        Resolution::File(_) => Err(KernelError::NotDir),
        Resolution::Missing { .. } => Err(KernelError::NotFound),
    }
}

/// Removes the entry at `path`, resolved from `cwd` (§6). A directory may
/// only be removed if empty; the root directory can never be removed.
pub fn filesys_remove_at(cwd: Sector, path: &str) -> Result<(), KernelError> {
    let fs = mounted()?;
    let (parent_path, basename) = split_basename(path)?;
    if basename == "." || basename == ".." {
        return Err(KernelError::Invalid);
    }
    let parent = match path::resolve(&fs, cwd, &parent_path)? {
        Resolution::Dir(sector) => sector,
        _ => return Err(KernelError::NotDir),
    };
    let parent_inode = fs.open(parent)?;
    let dir = match Directory::open(parent_inode) {
        Ok(d) => d,
        Err(e) => {
            fs.close(parent)?;
            return Err(e);
        }
    };
    let result = (|| -> Result<(), KernelError> {
        let target = dir.lookup(&fs, &basename)?;
        if target == ROOT_DIR_SECTOR {
            return Err(KernelError::Invalid);
        }
        let target_inode = fs.open(target)?;
        let removable = (|| -> Result<(), KernelError> {
            if target_inode.is_dir() {
                let target_dir = Directory::open(target_inode.clone())?;
                if !target_dir.is_empty(&fs)? {
                    return Err(KernelError::NotEmpty);
                }
            }
            Ok(())
        })();
        if let Err(e) = removable {
            fs.close(target)?;
            return Err(e);
        }
        dir.remove(&fs, &basename)?;
        target_inode.mark_removed();
        fs.close(target)
    })();
    fs.close(parent)?;
    result
}

/// [`filesys_remove_at`] resolved from the root.
pub fn filesys_remove(path: &str) -> Result<(), KernelError> {
    filesys_remove_at(ROOT_DIR_SECTOR, path)
}
