//! Inode store — component C.
//!
//! Owns the on-disk inode records and the in-memory open-inode table. The
//! single [`FileSystem`] value created by [`crate::mount`] is the "global
//! mutable table" §9 asks to be a singleton with explicit init/teardown:
//! the free-space map and the open-inode list both live behind its locks,
//! never behind a lazily-constructed global.
use crate::disk_layout::{
    IndirectBlock, InodeFields, DIRECT_BLOCKS, FREE_MAP_SECTOR, INDIRECT_ENTRIES, MAX_FILE_SIZE,
    ROOT_DIR_SECTOR,
};
use crate::freemap::FreeMap;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use blockdev::{BlockDevice, Sector};
use oscore::sync::{Mutex, RwLock};
use oscore::KernelError;

const SECTOR_SIZE: usize = 512;

fn bytes_to_sectors(len: usize) -> usize {
    len.div_ceil(SECTOR_SIZE)
}

/// Lazily-loaded decode caches for an inode's indirect blocks (§9:
/// "Aliased caches... model as `Option<IndirectCache>`").
#[derive(Default, Debug)]
struct IndirectCache {
    single: Option<IndirectBlock>,
    double_top: Option<IndirectBlock>,
    double_blocks: BTreeMap<usize, IndirectBlock>,
}

#[derive(Debug)]
struct InodeState {
    meta: InodeFields,
    open_count: usize,
    removed: bool,
    deny_write_count: usize,
    cache: IndirectCache,
}

/// An in-memory inode, shared by every open handle pointing at the same
/// sector (§3: "at most one in-memory inode per sector number").
#[derive(Debug)]
pub struct Inode {
    sector: Sector,
    state: Mutex<InodeState>,
}

impl Inode {
    /// The inode's own sector.
    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.state.lock().meta.length as usize
    }

    /// Whether the inode represents a directory.
    pub fn is_dir(&self) -> bool {
        self.state.lock().meta.is_dir
    }

    fn byte_to_sector(
        fs: &FileSystem,
        state: &mut InodeState,
        offset: usize,
    ) -> Result<Option<Sector>, KernelError> {
        let mut i = offset / SECTOR_SIZE;
        if i < DIRECT_BLOCKS {
            return Ok(state.meta.direct[i]);
        }
        i -= DIRECT_BLOCKS;
        if i < INDIRECT_ENTRIES {
            let single = match state.meta.single_indirect {
                None => return Ok(None),
                Some(s) => s,
            };
            if state.cache.single.is_none() {
                state.cache.single = Some(fs.read_indirect(single)?);
            }
            return Ok(state.cache.single.unwrap().0[i]);
        }
        i -= INDIRECT_ENTRIES;
        let j = i / INDIRECT_ENTRIES;
        let k = i % INDIRECT_ENTRIES;
        let double = match state.meta.double_indirect {
            None => return Ok(None),
            Some(s) => s,
        };
        if state.cache.double_top.is_none() {
            state.cache.double_top = Some(fs.read_indirect(double)?);
        }
        let iblock_sector = match state.cache.double_top.unwrap().0[j] {
            None => return Ok(None),
            Some(s) => s,
        };
        if !state.cache.double_blocks.contains_key(&j) {
            state
                .cache
                .double_blocks
                .insert(j, fs.read_indirect(iblock_sector)?);
        }
        Ok(state.cache.double_blocks[&j].0[k])
    }

    /// Resolves or lazily allocates the data sector backing `offset`,
    /// mirroring [`Self::byte_to_sector`]'s level walk (§4.C "Allocation
    /// algorithm"). Every newly-touched metadata sector is flushed before
    /// returning so a crash never leaves a dangling link; on any free-map
    /// failure, nothing already linked is rolled back further than what
    /// has already been persisted (the caller treats the failure as the
    /// end of a short write).
    fn allocate_sector_for(
        fs: &FileSystem,
        sector: Sector,
        state: &mut InodeState,
        offset: usize,
    ) -> Result<Sector, KernelError> {
        let mut i = offset / SECTOR_SIZE;
        if i < DIRECT_BLOCKS {
            if let Some(s) = state.meta.direct[i] {
                return Ok(s);
            }
            let data = fs.allocate_block()?;
            state.meta.direct[i] = Some(data);
            fs.write_inode_meta(sector, &state.meta)?;
            return Ok(data);
        }
        i -= DIRECT_BLOCKS;
        if i < INDIRECT_ENTRIES {
            if state.meta.single_indirect.is_none() {
                let block_sector = fs.allocate_block()?;
                fs.write_indirect(block_sector, &IndirectBlock::empty())?;
                state.meta.single_indirect = Some(block_sector);
                state.cache.single = Some(IndirectBlock::empty());
                fs.write_inode_meta(sector, &state.meta)?;
            }
            let single_sector = state.meta.single_indirect.unwrap();
            if state.cache.single.is_none() {
                state.cache.single = Some(fs.read_indirect(single_sector)?);
            }
            let mut block = state.cache.single.unwrap();
            if let Some(s) = block.0[i] {
                return Ok(s);
            }
            let data = fs.allocate_block()?;
            block.0[i] = Some(data);
            fs.write_indirect(single_sector, &block)?;
            state.cache.single = Some(block);
            return Ok(data);
        }
        i -= INDIRECT_ENTRIES;
        let j = i / INDIRECT_ENTRIES;
        let k = i % INDIRECT_ENTRIES;
        if state.meta.double_indirect.is_none() {
            let top_sector = fs.allocate_block()?;
            fs.write_indirect(top_sector, &IndirectBlock::empty())?;
            state.meta.double_indirect = Some(top_sector);
            state.cache.double_top = Some(IndirectBlock::empty());
            fs.write_inode_meta(sector, &state.meta)?;
        }
        let top_sector = state.meta.double_indirect.unwrap();
        if state.cache.double_top.is_none() {
            state.cache.double_top = Some(fs.read_indirect(top_sector)?);
        }
        let mut top = state.cache.double_top.unwrap();
        if top.0[j].is_none() {
            let iblock_sector = fs.allocate_block()?;
            fs.write_indirect(iblock_sector, &IndirectBlock::empty())?;
            top.0[j] = Some(iblock_sector);
            fs.write_indirect(top_sector, &top)?;
            state.cache.double_top = Some(top);
            state.cache.double_blocks.insert(j, IndirectBlock::empty());
        }
        let iblock_sector = state.cache.double_top.unwrap().0[j].unwrap();
        if !state.cache.double_blocks.contains_key(&j) {
            state
                .cache
                .double_blocks
                .insert(j, fs.read_indirect(iblock_sector)?);
        }
        let mut block = state.cache.double_blocks[&j];
        if let Some(s) = block.0[k] {
            return Ok(s);
        }
        let data = fs.allocate_block()?;
        block.0[k] = Some(data);
        fs.write_indirect(iblock_sector, &block)?;
        state.cache.double_blocks.insert(j, block);
        Ok(data)
    }

    /// Reads up to `buf.len()` bytes starting at `offset`. Sparse blocks
    /// (never written) are zero-filled without touching disk (§8's
    /// "sparse zero law"); reads past end-of-file return fewer bytes than
    /// requested.
    pub fn read_at(&self, fs: &FileSystem, buf: &mut [u8], offset: usize) -> Result<usize, KernelError> {
        let mut state = self.state.lock();
        let length = state.meta.length.max(0) as usize;
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            if pos >= length {
                break;
            }
            let sector_off = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_off)
                .min(buf.len() - done)
                .min(length - pos);
            match Self::byte_to_sector(fs, &mut state, pos)? {
                None => buf[done..done + chunk].fill(0),
                Some(sector) => {
                    let mut block = [0u8; SECTOR_SIZE];
                    fs.device.read_sector(sector, &mut block)?;
                    buf[done..done + chunk].copy_from_slice(&block[sector_off..sector_off + chunk]);
                }
            }
            done += chunk;
        }
        Ok(done)
    }

    /// Writes `buf` at `offset`, growing the file if `offset + buf.len()`
    /// exceeds the current length (§4.C "Grow-on-write"). Returns the
    /// number of bytes actually written: 0 while a deny-write hold is in
    /// effect, and fewer than `buf.len()` if the volume runs out of space
    /// or the write would exceed the maximum file size — in both short-write
    /// cases `length` is left consistent with what was actually persisted
    /// (§7).
    pub fn write_at(&self, fs: &FileSystem, buf: &[u8], offset: usize) -> usize {
        let mut state = self.state.lock();
        if state.deny_write_count > 0 {
            return 0;
        }
        let requested_end = offset.saturating_add(buf.len()).min(MAX_FILE_SIZE);
        if requested_end <= offset {
            return 0;
        }
        let limit = requested_end - offset;
        let current_length = state.meta.length.max(0) as usize;
        let grows = requested_end > current_length;
        if grows {
            state.meta.length = requested_end as i32;
            if fs.write_inode_meta(self.sector, &state.meta).is_err() {
                state.meta.length = current_length as i32;
                return 0;
            }
        }
        let mut done = 0;
        while done < limit {
            let pos = offset + done;
            let sector_off = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_off).min(limit - done);
            let sector = match Self::allocate_sector_for(fs, self.sector, &mut state, pos) {
                Ok(s) => s,
                Err(_) => break,
            };
            let wrote = if sector_off == 0 && chunk == SECTOR_SIZE {
                let mut block = [0u8; SECTOR_SIZE];
                block.copy_from_slice(&buf[done..done + SECTOR_SIZE]);
                fs.device.write_sector(sector, &block).is_ok()
            } else {
                let mut block = [0u8; SECTOR_SIZE];
                let ok = fs.device.read_sector(sector, &mut block).is_ok();
                if ok {
                    block[sector_off..sector_off + chunk].copy_from_slice(&buf[done..done + chunk]);
                    fs.device.write_sector(sector, &block).is_ok()
                } else {
                    false
                }
            };
            if !wrote {
                break;
            }
            done += chunk;
        }
        if grows && done < limit {
            let previous_length = state.meta.length;
            state.meta.length = (offset + done) as i32;
            if let Err(e) = fs.write_inode_meta(self.sector, &state.meta) {
                log::warn!("failed to persist shrunk length for inode at {:?}: {e}", self.sector);
                state.meta.length = previous_length;
            }
        }
        done
    }

    /// Marks deny-write, bumping the reference-counted hold (§4.C, §9:
    /// "a per-inode reference count, not a boolean").
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        debug_assert!(state.deny_write_count <= state.open_count);
    }

    /// Releases one deny-write hold.
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.deny_write_count > 0);
        state.deny_write_count = state.deny_write_count.saturating_sub(1);
    }

    /// Marks the inode for deletion; the free-map release happens on the
    /// final [`FileSystem::close`] (§4.C).
    pub fn mark_removed(&self) {
        self.state.lock().removed = true;
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.state.lock().removed
    }
}

/// The mounted filesystem: the `FS` device plus the two global tables §9
/// requires to be explicit singletons rather than lazily constructed.
pub struct FileSystem {
    pub(crate) device: Arc<dyn BlockDevice>,
    free_map: Mutex<FreeMap>,
    open_inodes: Mutex<BTreeMap<Sector, Arc<Inode>>>,
    initialized: RwLock<bool>,
}

impl FileSystem {
    /// Formats a fresh volume: an all-clear free map, a free-map inode at
    /// sector 0 and a root-directory inode at sector 1, both created while
    /// "uninitialized" so their data blocks are eagerly pre-allocated
    /// (§4.C) — the free map cannot describe its own backing store through
    /// the lazy allocator before it exists.
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>, KernelError> {
        let sector_count = device.sector_count();
        let fs = Arc::new(FileSystem {
            device,
            free_map: Mutex::new(FreeMap::new(sector_count)),
            open_inodes: Mutex::new(BTreeMap::new()),
            initialized: RwLock::new(false),
        });
        // Sectors 0 and 1 are reserved for the free-map and root inodes.
        fs.free_map.lock().mark_used(0, 2);

        let free_map_bytes = fs.free_map.lock().to_bytes();
        fs.create_inode_at(FREE_MAP_SECTOR, free_map_bytes.len(), false)?;
        fs.create_inode_at(ROOT_DIR_SECTOR, 0, true)?;

        *fs.initialized.write() = true;

        // Persist the free map's own content now that its inode exists
        // and has pre-allocated backing blocks.
        let free_map = fs.open(FREE_MAP_SECTOR)?;
        let bytes = fs.free_map.lock().to_bytes();
        free_map.write_at(&fs, &bytes, 0);
        fs.close(FREE_MAP_SECTOR)?;

        // Seed `.` and `..` in the root directory.
        let root = fs.open(ROOT_DIR_SECTOR)?;
        crate::dir::Directory::format_new(&fs, &root, ROOT_DIR_SECTOR)?;
        fs.close(ROOT_DIR_SECTOR)?;

        Ok(fs)
    }

    /// Mounts an already-formatted volume: reads the free map back from
    /// its inode.
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Arc<Self>, KernelError> {
        let sector_count = device.sector_count();
        let fs = Arc::new(FileSystem {
            device,
            free_map: Mutex::new(FreeMap::new(sector_count)),
            open_inodes: Mutex::new(BTreeMap::new()),
            initialized: RwLock::new(true),
        });
        let free_map_inode = fs.open(FREE_MAP_SECTOR)?;
        let len = free_map_inode.len();
        let mut bytes = vec![0u8; len];
        free_map_inode.read_at(&fs, &mut bytes, 0)?;
        *fs.free_map.lock() = FreeMap::from_bytes(sector_count, &bytes);
        fs.close(FREE_MAP_SECTOR)?;
        Ok(fs)
    }

    /// Flushes the free map back to its inode. Called on unmount.
    pub fn sync(&self) -> Result<(), KernelError> {
        let free_map_inode = self.open(FREE_MAP_SECTOR)?;
        let bytes = self.free_map.lock().to_bytes();
        free_map_inode.write_at(self, &bytes, 0);
        self.close(FREE_MAP_SECTOR)
    }

    fn allocate_block(&self) -> Result<Sector, KernelError> {
        let start = self.free_map.lock().allocate(1)?;
        Ok(Sector(start))
    }

    fn release_blocks(&self, start: Sector, n: u32) {
        self.free_map.lock().release(start.as_u32(), n);
    }

    fn read_indirect(&self, sector: Sector) -> Result<IndirectBlock, KernelError> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut buf)?;
        Ok(IndirectBlock::decode(&buf))
    }

    fn write_indirect(&self, sector: Sector, block: &IndirectBlock) -> Result<(), KernelError> {
        self.device.write_sector(sector, &block.encode())
    }

    fn write_inode_meta(&self, sector: Sector, meta: &InodeFields) -> Result<(), KernelError> {
        self.device.write_sector(sector, &meta.encode())
    }

    /// Creates an on-disk inode image at `sector` (§4.C). Only used for
    /// the two bootstrap inodes created by [`Self::format`]: every other
    /// inode is created through [`crate::dir::Directory::add`], which
    /// allocates the sector itself.
    pub(crate) fn create_inode_at(
        &self,
        sector: Sector,
        length: usize,
        is_dir: bool,
    ) -> Result<(), KernelError> {
        let mut fields = InodeFields::empty(is_dir, length as i32);
        if !*self.initialized.read() {
            let sectors = bytes_to_sectors(length);
            if sectors > DIRECT_BLOCKS + INDIRECT_ENTRIES {
                return Err(KernelError::Fatal("bootstrap inode too big to preallocate"));
            }
            if sectors > 0 {
                let needs_indirect = sectors > DIRECT_BLOCKS;
                let extra = if needs_indirect { 1 } else { 0 };
                let start = self.free_map.lock().allocate((sectors + extra) as u32)?;
                let zero = [0u8; SECTOR_SIZE];
                let mut indirect = IndirectBlock::empty();
                for idx in 0..sectors {
                    let data_sector = Sector(start + idx as u32);
                    self.device.write_sector(data_sector, &zero)?;
                    if idx < DIRECT_BLOCKS {
                        fields.direct[idx] = Some(data_sector);
                    } else {
                        indirect.0[idx - DIRECT_BLOCKS] = Some(data_sector);
                    }
                }
                if needs_indirect {
                    let indirect_sector = Sector(start + sectors as u32);
                    self.write_indirect(indirect_sector, &indirect)?;
                    fields.single_indirect = Some(indirect_sector);
                }
            }
        }
        self.write_inode_meta(sector, &fields)
    }

    /// Returns the shared in-memory inode for `sector`, reopening it if
    /// already cached (§3: "reopen increments `open_count`"; §8: "two
    /// `inode_open` calls on the same sector return pointer-equal
    /// handles").
    pub fn open(&self, sector: Sector) -> Result<Arc<Inode>, KernelError> {
        let mut table = self.open_inodes.lock();
        if let Some(existing) = table.get(&sector) {
            existing.state.lock().open_count += 1;
            return Ok(existing.clone());
        }
        let mut buf = [0u8; SECTOR_SIZE];
        self.device.read_sector(sector, &mut buf)?;
        let meta = InodeFields::decode(&buf)?;
        let inode = Arc::new(Inode {
            sector,
            state: Mutex::new(InodeState {
                meta,
                open_count: 1,
                removed: false,
                deny_write_count: 0,
                cache: IndirectCache::default(),
            }),
        });
        table.insert(sector, inode.clone());
        Ok(inode)
    }

    /// Closes one reference to the inode at `sector`. At zero references,
    /// the in-memory object is dropped; if it had been marked removed,
    /// every data sector and the inode sector itself are released (§4.C).
    pub fn close(&self, sector: Sector) -> Result<(), KernelError> {
        let mut table = self.open_inodes.lock();
        let should_remove = {
            let inode = match table.get(&sector) {
                Some(i) => i.clone(),
                None => return Ok(()),
            };
            let mut state = inode.state.lock();
            state.open_count -= 1;
            if state.open_count > 0 {
                return Ok(());
            }
            state.removed
        };
        let inode = table.remove(&sector).expect("present under the lock above");
        drop(table);
        if should_remove {
            self.release_all_blocks(&inode)?;
            self.release_blocks(sector, 1);
        }
        Ok(())
    }

    fn release_all_blocks(&self, inode: &Inode) -> Result<(), KernelError> {
        let state = inode.state.lock();
        for slot in state.meta.direct.iter().flatten() {
            self.release_blocks(*slot, 1);
        }
        if let Some(single) = state.meta.single_indirect {
            let block = self.read_indirect(single)?;
            for slot in block.0.iter().flatten() {
                self.release_blocks(*slot, 1);
            }
            self.release_blocks(single, 1);
        }
        if let Some(double) = state.meta.double_indirect {
            let top = self.read_indirect(double)?;
            for iblock_sector in top.0.iter().flatten() {
                let block = self.read_indirect(*iblock_sector)?;
                for slot in block.0.iter().flatten() {
                    self.release_blocks(*slot, 1);
                }
                self.release_blocks(*iblock_sector, 1);
            }
            self.release_blocks(double, 1);
        }
        Ok(())
    }

    /// Sum of 1-bits in the free map, for the conservation property (§8).
    pub fn free_map_used(&self) -> u32 {
        self.free_map.lock().count_used()
    }

    pub(crate) fn allocate_inode_sector(&self) -> Result<Sector, KernelError> {
        self.allocate_block()
    }

}
