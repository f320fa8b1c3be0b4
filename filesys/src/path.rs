//! Path resolver — component E.
//!
//! Abstracts a path as a sequence of components (`.`, `..`, or a name) and
//! walks them one at a time against [`crate::dir::Directory::lookup`],
//! starting from the root for an absolute path or from the caller-supplied
//! working-directory sector otherwise (§4.E). The walk ends in one of four
//! terminal states, modeled here as [`Resolution`] rather than as four
//! separate boolean flags (§9's "path traversal via string tokenization"
//! redesign note).
use crate::dir::Directory;
use crate::disk_layout::ROOT_DIR_SECTOR;
use crate::inode::FileSystem;
use alloc::string::{String, ToString};
use blockdev::Sector;
use oscore::KernelError;

/// The terminal state of a path walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path named an existing regular file.
    File(Sector),
    /// The path named an existing directory (including `/` itself).
    Dir(Sector),
    /// The path's last component does not exist, but every component
    /// before it does and names a directory — the shape `create` needs.
    Missing { parent: Sector, basename: String },
}

/// Walks `path`, starting from `root` if `path` begins with `/` or from
/// `cwd` otherwise. Empty components (`//`) are ignored (§4.E).
pub fn resolve(fs: &FileSystem, cwd: Sector, path: &str) -> Result<Resolution, KernelError> {
    if path.is_empty() {
        return Err(KernelError::Invalid);
    }
    let mut current = if path.starts_with('/') {
        ROOT_DIR_SECTOR
    } else {
        cwd
    };
    let components: alloc::vec::Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Ok(Resolution::Dir(current));
    }

    for (idx, name) in components.iter().enumerate() {
        let is_last = idx == components.len() - 1;
        let dir_inode = fs.open(current)?;
        let dir = match Directory::open(dir_inode) {
            Ok(d) => d,
            Err(e) => {
                fs.close(current)?;
                return Err(e);
            }
        };
        let lookup = dir.lookup(fs, name);
        fs.close(current)?;

        match lookup {
            Ok(sector) => {
                if is_last {
                    let inode = fs.open(sector)?;
                    let is_dir = inode.is_dir();
                    fs.close(sector)?;
                    return Ok(if is_dir {
                        Resolution::Dir(sector)
                    } else {
                        Resolution::File(sector)
                    });
                }
                let inode = fs.open(sector)?;
                let is_dir = inode.is_dir();
                fs.close(sector)?;
                if !is_dir {
                    return Err(KernelError::NotDir);
                }
                current = sector;
            }
            Err(KernelError::NotFound) if is_last => {
                return Ok(Resolution::Missing {
                    parent: current,
                    basename: name.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("components is non-empty, so the loop always returns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::Directory;
    use alloc::sync::Arc;
    use blockdev::MemDevice;

    fn fresh_fs() -> Arc<FileSystem> {
        let device = Arc::new(MemDevice::new(2048));
        FileSystem::format(device).unwrap()
    }

    #[test]
    fn root_resolves_as_a_directory() {
        let fs = fresh_fs();
        assert_eq!(resolve(&fs, ROOT_DIR_SECTOR, "/").unwrap(), Resolution::Dir(ROOT_DIR_SECTOR));
    }

    #[test]
    fn missing_basename_reports_parent() {
        let fs = fresh_fs();
        let res = resolve(&fs, ROOT_DIR_SECTOR, "/nope").unwrap();
        assert_eq!(
            res,
            Resolution::Missing {
                parent: ROOT_DIR_SECTOR,
                basename: "nope".into()
            }
        );
    }

    #[test]
    fn missing_intermediate_component_fails() {
        let fs = fresh_fs();
        assert_eq!(
            resolve(&fs, ROOT_DIR_SECTOR, "/a/b"),
            Err(KernelError::NotFound)
        );
    }

    #[test]
    fn resolves_a_created_file() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        let sector = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(sector, 0, false).unwrap();
        root.add(&fs, "f", sector).unwrap();
        assert_eq!(resolve(&fs, ROOT_DIR_SECTOR, "/f").unwrap(), Resolution::File(sector));
        assert_eq!(resolve(&fs, ROOT_DIR_SECTOR, "//f").unwrap(), Resolution::File(sector));
    }

    #[test]
    fn using_a_file_as_a_directory_component_fails() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        let sector = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(sector, 0, false).unwrap();
        root.add(&fs, "f", sector).unwrap();
        assert_eq!(
            resolve(&fs, ROOT_DIR_SECTOR, "/f/x"),
            Err(KernelError::NotDir)
        );
    }
}
