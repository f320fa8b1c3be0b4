//! The scheduler/page-table collaborator, externalized as a trait.
//!
//! `spec.md` §1 places the task abstraction and its page table out of
//! scope — only their contract matters. [`keos-project2`'s `page_table.rs`]
//! is the concrete page table sitting behind the abstract [`Pager`] trait
//! there; [`PageTableOps`] plays the same role here, queried by
//! [`crate::fault`] for the hardware dirty bit §4.G's eviction step depends
//! on (§9: "Encapsulate as a query `is_dirty(task, vaddr)`... the core
//! eviction logic is independent of it").
use oscore::addressing::Va;

/// Everything the paging core needs from a real page table, without
/// depending on its representation.
pub trait PageTableOps: Send + Sync {
    /// Installs a mapping from `vaddr` to the frame backed by `frame_ptr`,
    /// with `readonly` access.
    fn map(&self, vaddr: Va, frame_ptr: *mut u8, readonly: bool);

    /// Removes any mapping for `vaddr`. A no-op if none exists.
    fn unmap(&self, vaddr: Va);

    /// The hardware dirty bit for the mapping at `vaddr`, or `false` if
    /// unmapped.
    fn is_dirty(&self, vaddr: Va) -> bool;

    /// Clears the dirty bit for the mapping at `vaddr`. Called after a
    /// page is (re)installed (§4.J: "After mapping, dirty bit is
    /// cleared.").
    fn clear_dirty(&self, vaddr: Va);
}

#[cfg(test)]
pub use test_double::TestPageTable;

#[cfg(test)]
mod test_double {
    use super::*;
    use alloc::collections::BTreeMap;
    use oscore::sync::Mutex;

    bitflags::bitflags! {
        /// Per-mapping flags, standing in for the PTE bits
        /// `keos::mm::page_table`'s `PteFlags` packs into the hardware entry.
        struct EntryFlags: u8 {
            const READONLY = 1 << 0;
            const DIRTY = 1 << 1;
        }
    }

    #[allow(dead_code)]
    struct Mapping {
        frame_ptr: usize,
        flags: EntryFlags,
    }

    /// An in-memory page table for the test suite, standing in for the
    /// hardware one a real kernel would provide.
    #[derive(Default)]
    pub struct TestPageTable {
        mappings: Mutex<BTreeMap<usize, Mapping>>,
    }

    impl TestPageTable {
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks the mapping at `vaddr` dirty, simulating a user write
        /// through it.
        pub fn mark_dirty(&self, vaddr: Va) {
            if let Some(m) = self.mappings.lock().get_mut(&vaddr.0) {
                m.flags.insert(EntryFlags::DIRTY);
            }
        }

        /// True if `vaddr` currently has a mapping installed.
        pub fn is_mapped(&self, vaddr: Va) -> bool {
            self.mappings.lock().contains_key(&vaddr.0)
        }
    }

    impl PageTableOps for TestPageTable {
        fn map(&self, vaddr: Va, frame_ptr: *mut u8, readonly: bool) {
            let mut flags = EntryFlags::empty();
            if readonly {
                flags.insert(EntryFlags::READONLY);
            }
            self.mappings.lock().insert(
                vaddr.0,
                Mapping {
                    frame_ptr: frame_ptr as usize,
                    flags,
                },
            );
        }

        fn unmap(&self, vaddr: Va) {
            self.mappings.lock().remove(&vaddr.0);
        }

        fn is_dirty(&self, vaddr: Va) -> bool {
            self.mappings
                .lock()
                .get(&vaddr.0)
                .map(|m| m.flags.contains(EntryFlags::DIRTY))
                .unwrap_or(false)
        }

        fn clear_dirty(&self, vaddr: Va) {
            if let Some(m) = self.mappings.lock().get_mut(&vaddr.0) {
                m.flags.remove(EntryFlags::DIRTY);
            }
        }
    }
}
