//! Open file handle — component F.
//!
//! A file handle is just a cursor over an open inode (§4.F): the inode
//! itself already holds the shared, ref-counted on-disk state, so a handle
//! only needs to remember where its next read or write starts. Nothing
//! here tracks file descriptor numbers or owning tasks — that table lives
//! outside this crate, same as the scheduler it is attached to.
use crate::inode::{FileSystem, Inode};
use alloc::sync::Arc;
use blockdev::Sector;
use oscore::sync::Mutex;
use oscore::KernelError;

/// A cursor over an open inode, returned by [`crate::filesys_open`].
#[derive(Debug)]
pub struct File {
    inode: Arc<Inode>,
    position: Mutex<usize>,
}

impl File {
    pub(crate) fn new(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            position: Mutex::new(0),
        }
    }

    /// The sector of the inode backing this handle.
    pub fn inode_sector(&self) -> Sector {
        self.inode.sector()
    }

    /// Reads into `buf` from the current position, advancing it by the
    /// number of bytes actually read (§4.F).
    pub fn read(&self, fs: &FileSystem, buf: &mut [u8]) -> Result<usize, KernelError> {
        let mut pos = self.position.lock();
        let n = self.inode.read_at(fs, buf, *pos)?;
        *pos += n;
        Ok(n)
    }

    /// Writes `buf` at the current position, advancing it by the number of
    /// bytes actually written — short of `buf.len()` under deny-write or
    /// exhaustion (§4.F, §7).
    pub fn write(&self, fs: &FileSystem, buf: &[u8]) -> usize {
        let mut pos = self.position.lock();
        let n = self.inode.write_at(fs, buf, *pos);
        *pos += n;
        n
    }

    /// Moves the cursor to an absolute byte offset. Seeking past
    /// end-of-file is allowed; the next write will grow the file to meet
    /// it (§4.F).
    pub fn seek(&self, offset: usize) {
        *self.position.lock() = offset;
    }

    /// The cursor's current byte offset.
    pub fn tell(&self) -> usize {
        *self.position.lock()
    }

    /// The file's current length in bytes.
    pub fn length(&self) -> usize {
        self.inode.len()
    }

    /// Prevents writes to the underlying inode through any handle, for as
    /// long as this hold is outstanding (§4.C, §4.F — e.g. a running
    /// executable's own image).
    pub fn deny_write(&self) {
        self.inode.deny_write();
    }

    /// Releases one deny-write hold taken by [`Self::deny_write`].
    pub fn allow_write(&self) {
        self.inode.allow_write();
    }

    /// Closes the handle, releasing its reference on the underlying inode
    /// (§4.C: the inode's blocks are freed only once every handle and
    /// directory reference to it is gone).
    pub fn close(self, fs: &FileSystem) -> Result<(), KernelError> {
        fs.close(self.inode.sector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::Directory;

    fn fresh_fs() -> Arc<FileSystem> {
        let device = Arc::new(blockdev::MemDevice::new(2048));
        FileSystem::format(device).unwrap()
    }

    fn new_file(fs: &Arc<FileSystem>, name: &str) -> File {
        let root = Directory::open_root(fs).unwrap();
        let sector = fs.allocate_inode_sector().unwrap();
        fs.create_inode_at(sector, 0, false).unwrap();
        root.add(fs, name, sector).unwrap();
        File::new(fs.open(sector).unwrap())
    }

    #[test]
    fn write_then_read_follows_the_cursor() {
        let fs = fresh_fs();
        let file = new_file(&fs, "a");
        assert_eq!(file.write(&fs, b"hello"), 5);
        assert_eq!(file.tell(), 5);
        file.seek(0);
        let mut buf = [0u8; 5];
        assert_eq!(file.read(&fs, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(file.tell(), 5);
        assert_eq!(file.length(), 5);
        file.close(&fs).unwrap();
    }

    #[test]
    fn seeking_past_eof_then_writing_grows_the_file() {
        let fs = fresh_fs();
        let file = new_file(&fs, "b");
        file.seek(10);
        assert_eq!(file.write(&fs, b"x"), 1);
        assert_eq!(file.length(), 11);
        file.close(&fs).unwrap();
    }

    #[test]
    fn deny_write_round_trip() {
        let fs = fresh_fs();
        let file = new_file(&fs, "c");
        file.deny_write();
        assert_eq!(file.write(&fs, b"x"), 0);
        file.allow_write();
        assert_eq!(file.write(&fs, b"x"), 1);
        file.close(&fs).unwrap();
    }
}
