//! Supplemental page table — component I.
//!
//! Per-task map from a user virtual page to its [`PageEntry`] (§4.I). The
//! task itself is external (§1); one `SupplementalPageTable` corresponds to
//! one task's address space, the same granularity
//! `keos-project3`'s `LazyPager` keeps its `VmAreaStruct` list at.
use crate::entry::{Origin, PageEntry};
use crate::frame::FrameTable;
use crate::swap::SwapTable;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use oscore::addressing::Va;
use oscore::sync::Mutex;

/// One task's page-backing records, plus the locks it shares with the
/// frame table and swap allocator it tears down into on exit.
pub struct SupplementalPageTable {
    entries: Mutex<BTreeMap<usize, Arc<PageEntry>>>,
}

impl Default for SupplementalPageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SupplementalPageTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records a fresh, non-resident mapping for `vaddr` (§4.I).
    pub fn install(&self, vaddr: Va, readonly: bool, origin: Origin) -> Arc<PageEntry> {
        let entry = Arc::new(PageEntry::new(vaddr.page_base(), readonly, origin));
        self.entries.lock().insert(vaddr.page_base().0, entry.clone());
        entry
    }

    /// Looks up the entry backing `vaddr`, if any.
    pub fn lookup(&self, vaddr: Va) -> Option<Arc<PageEntry>> {
        self.entries.lock().get(&vaddr.page_base().0).cloned()
    }

    /// Frees every owned entry's frame and swap slot (§4.I). Called once,
    /// on task exit.
    pub fn teardown_all(&self, frames: &Mutex<FrameTable>, swap: &Mutex<SwapTable>) {
        let entries = core::mem::take(&mut *self.entries.lock());
        let mut frame_table = frames.lock();
        let mut swap_table = swap.lock();
        for entry in entries.into_values() {
            if let Some(frame) = entry.frame() {
                frame_table.release(frame);
            }
            if let Some(slot) = entry.swap_slot() {
                swap_table.release(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HeapPool;

    #[test]
    fn install_then_lookup_round_trips() {
        let table = SupplementalPageTable::new();
        let entry = table.install(Va(0x4000), false, Origin::Zeroed);
        let found = table.lookup(Va(0x4000)).unwrap();
        assert!(Arc::ptr_eq(&entry, &found));
    }

    #[test]
    fn lookup_is_page_granular() {
        let table = SupplementalPageTable::new();
        table.install(Va(0x4000), false, Origin::Zeroed);
        assert!(table.lookup(Va(0x4010)).is_some());
        assert!(table.lookup(Va(0x5000)).is_none());
    }

    #[test]
    fn teardown_releases_frames_and_swap_slots() {
        let table = SupplementalPageTable::new();
        let entry = table.install(Va(0x4000), false, Origin::Zeroed);
        let frames = Mutex::new(FrameTable::new(4, Arc::new(HeapPool)));
        let swap = Mutex::new(SwapTable::new(8));
        let frame = frames.lock().add_page_to_frames(entry.clone());
        entry.set_frame(Some(frame));
        let slot = swap.lock().get_swap_sector().unwrap();
        entry.set_swap_slot(slot);

        table.teardown_all(&frames, &swap);

        assert_eq!(frames.lock().resident_count(), 0);
        assert_eq!(swap.lock().used_count(), 0);
    }

    /// Property test (§8's page-backing exclusivity invariant): for a
    /// randomly built table, every entry's frame/swap-slot occupancy is
    /// freed exactly once by teardown, regardless of which entries ever
    /// became resident or were ever swapped out.
    #[test]
    fn random_population_tears_down_cleanly() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xB00C_u64);
        let table = SupplementalPageTable::new();
        let frames = Mutex::new(FrameTable::new(6, Arc::new(HeapPool)));
        let swap = Mutex::new(SwapTable::new(16));

        for i in 0..20u32 {
            let entry = table.install(Va(0x1000 * (i as usize + 1)), false, Origin::Zeroed);
            if rng.gen_bool(0.5) && !frames.lock().is_full() {
                let frame = frames.lock().add_page_to_frames(entry.clone());
                entry.set_frame(Some(frame));
                if rng.gen_bool(0.5) {
                    if let Some(slot) = swap.lock().get_swap_sector() {
                        entry.set_swap_slot(slot);
                    }
                }
            }
        }

        table.teardown_all(&frames, &swap);
        assert_eq!(frames.lock().resident_count(), 0);
        assert_eq!(swap.lock().used_count(), 0);
    }
}
