//! Fault handler — component J.
//!
//! `restore_page` resolves a fault against a [`SupplementalPageTable`]
//! entry, evicting the FIFO head first if the frame table is at capacity
//! (§4.J). The frame table and swap allocator are the two global singleton
//! tables §9 asks for explicit init/teardown on rather than lazy
//! construction — owned here by [`PagingCore`], mounted once via
//! [`vm_init`] the same way `filesys::filesys_init` mounts the volume.
use crate::entry::{Origin, PageEntry};
use crate::frame::{FrameTable, HeapPool, PhysPool};
use crate::page_table::PageTableOps;
use crate::supplemental::SupplementalPageTable;
use crate::swap::{SwapSlot, SwapTable};
use alloc::sync::Arc;
use blockdev::{BlockDevice, Sector};
use oscore::addressing::{Va, PAGE_SIZE, SECTORS_PER_PAGE, SECTOR_SIZE};
use oscore::sync::{Mutex, RwLock};
use oscore::KernelError;

/// Default frame table capacity, overridable via [`vm_init_with_capacity`]
/// (§9's "fixed-geometry... overridable only by constructing the allocator
/// with an explicit capacity").
pub const FRAME_LIMIT: usize = 512;
/// Default swap table capacity, in slots.
pub const SWAP_LIMIT: u32 = 4096;

/// The two paging-wide singleton tables, plus the device they swap
/// against.
pub struct PagingCore {
    frames: Mutex<FrameTable>,
    swap: Mutex<SwapTable>,
    swap_device: Arc<dyn BlockDevice>,
}

static CORE: RwLock<Option<Arc<PagingCore>>> = RwLock::new(None);

fn core() -> Result<Arc<PagingCore>, KernelError> {
    CORE.read().clone().ok_or(KernelError::IoError)
}

/// Mounts the paging core against [`blockdev::DeviceName::Swap`] with
/// [`FRAME_LIMIT`]/[`SWAP_LIMIT`] capacity.
pub fn vm_init() -> Result<(), KernelError> {
    vm_init_with_capacity(FRAME_LIMIT, SWAP_LIMIT)
}

/// As [`vm_init`], with explicit capacities.
pub fn vm_init_with_capacity(frame_limit: usize, swap_limit: u32) -> Result<(), KernelError> {
    let mut slot = CORE.write();
    if slot.is_some() {
        return Err(KernelError::Fatal("paging core already initialized"));
    }
    let swap_device = blockdev::swap_device()?;
    *slot = Some(Arc::new(PagingCore {
        frames: Mutex::new(FrameTable::new(frame_limit, Arc::new(HeapPool) as Arc<dyn PhysPool>)),
        swap: Mutex::new(SwapTable::new(swap_limit)),
        swap_device,
    }));
    Ok(())
}

/// Tears down the paging core. Every task is expected to have already torn
/// down its own [`SupplementalPageTable`] via
/// [`SupplementalPageTable::teardown_all`].
pub fn vm_done() {
    *CORE.write() = None;
}

fn write_slot(device: &Arc<dyn BlockDevice>, slot: SwapSlot, data: &[u8; PAGE_SIZE]) -> Result<(), KernelError> {
    let start = slot.start_sector();
    for i in 0..SECTORS_PER_PAGE {
        let mut buf = [0u8; SECTOR_SIZE];
        buf.copy_from_slice(&data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        device.write_sector(Sector(start.0 + i as u32), &buf)?;
    }
    Ok(())
}

fn read_slot(device: &Arc<dyn BlockDevice>, slot: SwapSlot, data: &mut [u8; PAGE_SIZE]) -> Result<(), KernelError> {
    let start = slot.start_sector();
    for i in 0..SECTORS_PER_PAGE {
        let mut buf = [0u8; SECTOR_SIZE];
        device.read_sector(Sector(start.0 + i as u32), &mut buf)?;
        data[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&buf);
    }
    Ok(())
}

/// Performs the eviction side effects for an already-dequeued frame
/// (§4.G steps 1-4). Every entry always has a re-derivable `origin`
/// (zeroed or file-backed, never neither), so the spec's "no stable
/// backing" swap-write condition collapses to exactly `dirty`: a clean
/// page can always be reconstructed from its origin (or its already-
/// written swap slot) without touching the swap device again.
fn evict(core: &PagingCore, page_table: &dyn PageTableOps, victim: &Arc<PageEntry>, data: alloc::boxed::Box<[u8; PAGE_SIZE]>) -> Result<(), KernelError> {
    let dirty = page_table.is_dirty(victim.vaddr);
    if dirty {
        let slot = match victim.swap_slot() {
            Some(slot) => slot,
            None => {
                let slot = core.swap.lock().get_swap_sector().ok_or(KernelError::NoSpace)?;
                victim.set_swap_slot(slot);
                slot
            }
        };
        write_slot(&core.swap_device, slot, &data)?;
    }
    page_table.unmap(victim.vaddr);
    victim.set_frame(None);
    Ok(())
}

/// Installs a fresh, non-resident supplemental entry for `vaddr` (§4.I,
/// §6's `install_page`). The page is not populated or mapped until the
/// first fault reaches it.
pub fn install_page(
    supplemental: &SupplementalPageTable,
    vaddr: Va,
    readonly: bool,
    origin: Origin,
) -> Arc<PageEntry> {
    supplemental.install(vaddr, readonly, origin)
}

/// Restores the page backing `vaddr`, evicting the frame-table head first
/// if at capacity (§4.J). A no-op if the page is already resident.
pub fn restore_page(
    supplemental: &SupplementalPageTable,
    page_table: &dyn PageTableOps,
    vaddr: Va,
) -> Result<(), KernelError> {
    let core = core()?;
    let entry = supplemental.lookup(vaddr).ok_or(KernelError::NotFound)?;
    if entry.is_resident() {
        return Ok(());
    }

    let mut frames = core.frames.lock();
    if frames.is_full() {
        let (_, victim, data) = frames.evict_frame().expect("is_full implies a resident victim");
        evict(&core, page_table, &victim, data)?;
    }
    let frame = frames.add_page_to_frames(entry.clone());

    match entry.swap_slot() {
        Some(slot) => {
            let mut buf = [0u8; PAGE_SIZE];
            read_slot(&core.swap_device, slot, &mut buf)?;
            frames.data_mut(frame).copy_from_slice(&buf);
        }
        None => match &entry.origin {
            Origin::Zeroed => frames.data_mut(frame).fill(0),
            Origin::FileBacked { fs, inode, offset } => {
                let mut buf = [0u8; PAGE_SIZE];
                let n = inode
                    .read_at(fs, &mut buf, *offset)
                    .unwrap_or_else(|e| panic!("file-backed page read failed: {e}"));
                if n != PAGE_SIZE {
                    panic!("short file-backed page read at offset {offset}: got {n} of {PAGE_SIZE} bytes");
                }
                frames.data_mut(frame).copy_from_slice(&buf);
            }
        },
    }

    let ptr = frames.data_mut(frame).as_mut_ptr();
    entry.set_frame(Some(frame));
    drop(frames);

    page_table.map(entry.vaddr, ptr, entry.readonly);
    page_table.clear_dirty(entry.vaddr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::TestPageTable;
    use blockdev::{DeviceName, MemDevice};

    fn with_vm<F: FnOnce()>(frame_limit: usize, f: F) {
        blockdev::bind(DeviceName::Swap, Arc::new(MemDevice::new(4096)));
        vm_init_with_capacity(frame_limit, 64).unwrap();
        f();
        vm_done();
        blockdev::unbind(DeviceName::Swap);
    }

    #[test]
    fn restoring_a_zeroed_page_maps_it_and_clears_dirty() {
        with_vm(4, || {
            let supplemental = SupplementalPageTable::new();
            let pt = TestPageTable::new();
            install_page(&supplemental, Va(0x1000), false, Origin::Zeroed);
            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            assert!(pt.is_mapped(Va(0x1000)));
            assert!(!pt.is_dirty(Va(0x1000)));
        });
    }

    #[test]
    fn restore_is_idempotent_once_resident() {
        with_vm(4, || {
            let supplemental = SupplementalPageTable::new();
            let pt = TestPageTable::new();
            install_page(&supplemental, Va(0x1000), false, Origin::Zeroed);
            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
        });
    }

    #[test]
    fn frame_cap_forces_eviction_and_dirty_pages_round_trip_through_swap() {
        with_vm(1, || {
            let supplemental = SupplementalPageTable::new();
            let pt = TestPageTable::new();
            install_page(&supplemental, Va(0x1000), false, Origin::Zeroed);
            install_page(&supplemental, Va(0x2000), false, Origin::Zeroed);

            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            pt.mark_dirty(Va(0x1000));

            // Forces eviction of 0x1000's frame since capacity is 1.
            restore_page(&supplemental, &pt, Va(0x2000)).unwrap();
            assert!(!pt.is_mapped(Va(0x1000)));
            assert!(pt.is_mapped(Va(0x2000)));

            let evicted = supplemental.lookup(Va(0x1000)).unwrap();
            assert!(evicted.swap_slot().is_some(), "dirty eviction must allocate a swap slot");

            // Faulting it back in brings the same frame table to capacity
            // again, evicting 0x2000 in turn.
            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            assert!(pt.is_mapped(Va(0x1000)));
            assert!(!pt.is_mapped(Va(0x2000)));
        });
    }

    #[test]
    fn clean_eviction_never_touches_swap() {
        with_vm(1, || {
            let supplemental = SupplementalPageTable::new();
            let pt = TestPageTable::new();
            install_page(&supplemental, Va(0x1000), false, Origin::Zeroed);
            install_page(&supplemental, Va(0x2000), false, Origin::Zeroed);

            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            // Never dirtied.
            restore_page(&supplemental, &pt, Va(0x2000)).unwrap();

            let evicted = supplemental.lookup(Va(0x1000)).unwrap();
            assert!(evicted.swap_slot().is_none());
        });
    }

    /// Content round trip through swap (spec scenario: evicting a dirty
    /// page and restoring it later must return the original bytes, not
    /// just a resident mapping). Stamps a non-zero, non-uniform pattern
    /// into the resident frame before eviction so a byte-corrupting bug in
    /// `write_slot`/`read_slot` could not pass silently the way an
    /// all-zero page would.
    #[test]
    fn dirty_page_content_survives_an_eviction_round_trip() {
        with_vm(1, || {
            let supplemental = SupplementalPageTable::new();
            let pt = TestPageTable::new();
            let entry_a = install_page(&supplemental, Va(0x1000), false, Origin::Zeroed);
            install_page(&supplemental, Va(0x2000), false, Origin::Zeroed);

            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            let pattern: [u8; PAGE_SIZE] = core::array::from_fn(|i| (i % 251) as u8);
            {
                let paging_core = core().unwrap();
                let frame = entry_a.frame().unwrap();
                paging_core.frames.lock().data_mut(frame).copy_from_slice(&pattern);
            }
            pt.mark_dirty(Va(0x1000));

            // Forces eviction of 0x1000's frame, writing the pattern to swap.
            restore_page(&supplemental, &pt, Va(0x2000)).unwrap();
            assert!(!entry_a.is_resident());

            // Forces eviction of 0x2000 in turn, bringing 0x1000 back from
            // swap.
            restore_page(&supplemental, &pt, Va(0x1000)).unwrap();
            let paging_core = core().unwrap();
            let frame = entry_a.frame().unwrap();
            assert_eq!(paging_core.frames.lock().data(frame), &pattern);
        });
    }
}
