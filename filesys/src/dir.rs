//! Directory layer — component D.
//!
//! A directory is just an inode with `is_dir = true` whose data is a flat
//! sequence of fixed-width [`disk_layout::DirEntryRaw`] records (§4.D).
//! Every directory carries `.` (itself) and `..` (its parent, or itself for
//! the root) as ordinary entries.
use crate::disk_layout::{DirEntryRaw, DIR_ENTRY_SIZE, NAME_MAX, ROOT_DIR_SECTOR};
use crate::inode::{FileSystem, Inode};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use blockdev::Sector;
use oscore::KernelError;

/// A directory, backed by an open inode.
pub struct Directory {
    pub(crate) inode: Arc<Inode>,
}

impl Directory {
    /// Opens the directory backed by `inode`. Fails with
    /// [`KernelError::NotDir`] if the inode is not a directory.
    pub fn open(inode: Arc<Inode>) -> Result<Self, KernelError> {
        if !inode.is_dir() {
            return Err(KernelError::NotDir);
        }
        Ok(Self { inode })
    }

    /// Opens the root directory (sector 1).
    pub fn open_root(fs: &FileSystem) -> Result<Self, KernelError> {
        Directory::open(fs.open(ROOT_DIR_SECTOR)?)
    }

    fn entry_count(&self) -> usize {
        self.inode.len() / DIR_ENTRY_SIZE
    }

    fn read_entry(&self, fs: &FileSystem, index: usize) -> Result<DirEntryRaw, KernelError> {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        self.inode.read_at(fs, &mut buf, index * DIR_ENTRY_SIZE)?;
        Ok(DirEntryRaw::decode(&buf))
    }

    fn write_entry(&self, fs: &FileSystem, index: usize, entry: &DirEntryRaw) {
        self.inode
            .write_at(fs, &entry.encode(), index * DIR_ENTRY_SIZE);
    }

    /// Writes the initial `.` and `..` entries into a brand new directory
    /// inode, used both for the root (self-parented) and for every
    /// directory created afterward via [`Self::add`].
    pub(crate) fn format_new(
        fs: &FileSystem,
        inode: &Arc<Inode>,
        parent: Sector,
    ) -> Result<(), KernelError> {
        let dir = Directory {
            inode: inode.clone(),
        };
        dir.write_entry(
            fs,
            0,
            &DirEntryRaw {
                in_use: true,
                name: ".".into(),
                inode_sector: inode.sector(),
            },
        );
        dir.write_entry(
            fs,
            1,
            &DirEntryRaw {
                in_use: true,
                name: "..".into(),
                inode_sector: parent,
            },
        );
        Ok(())
    }

    /// Looks up `name` in this directory. `.` and `..` resolve without a
    /// scan.
    pub fn lookup(&self, fs: &FileSystem, name: &str) -> Result<Sector, KernelError> {
        if name == "." {
            return Ok(self.inode.sector());
        }
        for i in 0..self.entry_count() {
            let entry = self.read_entry(fs, i)?;
            if entry.in_use && entry.name == name {
                return Ok(entry.inode_sector);
            }
        }
        Err(KernelError::NotFound)
    }

    /// Adds `name -> sector` to this directory, reusing a freed slot if
    /// one exists or appending otherwise. Fails with
    /// [`KernelError::Exists`] if the name is already bound, and returns
    /// [`KernelError::Invalid`] if the name exceeds [`NAME_MAX`] bytes.
    pub fn add(&self, fs: &FileSystem, name: &str, sector: Sector) -> Result<(), KernelError> {
        if name.is_empty() || name == "." || name == ".." || name.as_bytes().len() > NAME_MAX {
            return Err(KernelError::Invalid);
        }
        if self.lookup(fs, name).is_ok() {
            return Err(KernelError::Exists);
        }
        let entry = DirEntryRaw {
            in_use: true,
            name: String::from(name),
            inode_sector: sector,
        };
        for i in 0..self.entry_count() {
            let existing = self.read_entry(fs, i)?;
            if !existing.in_use {
                self.write_entry(fs, i, &entry);
                return Ok(());
            }
        }
        self.write_entry(fs, self.entry_count(), &entry);
        Ok(())
    }

    /// Marks the entry for `name` unused. The caller is responsible for
    /// removing the target inode itself.
    pub fn remove(&self, fs: &FileSystem, name: &str) -> Result<Sector, KernelError> {
        if name == "." || name == ".." {
            return Err(KernelError::Invalid);
        }
        for i in 0..self.entry_count() {
            let mut entry = self.read_entry(fs, i)?;
            if entry.in_use && entry.name == name {
                let sector = entry.inode_sector;
                entry.in_use = false;
                self.write_entry(fs, i, &entry);
                return Ok(sector);
            }
        }
        Err(KernelError::NotFound)
    }

    /// True if the directory has no entries besides `.` and `..` (§4.D).
    pub fn is_empty(&self, fs: &FileSystem) -> Result<bool, KernelError> {
        for i in 0..self.entry_count() {
            let entry = self.read_entry(fs, i)?;
            if entry.in_use && entry.name != "." && entry.name != ".." {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Lists the directory's entry names, skipping `.` and `..`, starting
    /// after `cursor` entries already consumed. Returns the name and the
    /// cursor position to resume from.
    pub fn read_dir(
        &self,
        fs: &FileSystem,
        cursor: usize,
    ) -> Result<Option<(String, usize)>, KernelError> {
        let mut i = cursor;
        while i < self.entry_count() {
            let entry = self.read_entry(fs, i)?;
            i += 1;
            if entry.in_use && entry.name != "." && entry.name != ".." {
                return Ok(Some((entry.name, i)));
            }
        }
        Ok(None)
    }

    /// Collects every non-`.`/`..` entry, as `(name, inode_sector)` pairs.
    pub fn entries(&self, fs: &FileSystem) -> Result<Vec<(String, Sector)>, KernelError> {
        let mut out = Vec::new();
        for i in 0..self.entry_count() {
            let entry = self.read_entry(fs, i)?;
            if entry.in_use && entry.name != "." && entry.name != ".." {
                out.push((entry.name, entry.inode_sector));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc as A;
    use blockdev::MemDevice;

    fn fresh_fs() -> A<FileSystem> {
        let device = A::new(MemDevice::new(2048));
        FileSystem::format(device).unwrap()
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        let child_sector = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(child_sector, 0, false).unwrap();
        root.add(&fs, "a", child_sector).unwrap();
        assert_eq!(root.lookup(&fs, "a").unwrap(), child_sector);
        assert_eq!(root.lookup(&fs, ".").unwrap(), root.inode.sector());
    }

    #[test]
    fn add_duplicate_name_fails() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        let s1 = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(s1, 0, false).unwrap();
        root.add(&fs, "dup", s1).unwrap();
        let s2 = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(s2, 0, false).unwrap();
        assert_eq!(root.add(&fs, "dup", s2), Err(KernelError::Exists));
    }

    #[test]
    fn remove_reuses_the_freed_slot() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        let s1 = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(s1, 0, false).unwrap();
        root.add(&fs, "a", s1).unwrap();
        let before = root.entry_count();
        root.remove(&fs, "a").unwrap();
        let s2 = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(s2, 0, false).unwrap();
        root.add(&fs, "b", s2).unwrap();
        assert_eq!(root.entry_count(), before);
    }

    #[test]
    fn empty_directory_has_only_dot_entries() {
        let fs = fresh_fs();
        let root = Directory::open_root(&fs).unwrap();
        assert!(root.is_empty(&fs).unwrap());
        let s1 = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(s1, 0, false).unwrap();
        root.add(&fs, "a", s1).unwrap();
        assert!(!root.is_empty(&fs).unwrap());
    }
}
