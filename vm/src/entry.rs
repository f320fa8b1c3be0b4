//! Supplemental page entry — the data unit component I manages.
//!
//! Mirrors `spec.md` §3's field list directly rather than collapsing it
//! into a single backing enum: `origin` records the page's stable source
//! (immutable once installed), `swap_slot` is populated lazily the first
//! time the page is evicted dirty and then stays put for the entry's
//! lifetime (§4.H), and `frame` tracks current residency. Exactly one of
//! {zeroed, file-backed, swapped, resident} is the *authoritative* source
//! at any instant (§8), but `origin`/`swap_slot` both stay around once set
//! because eviction (§4.G) needs to ask "can this be discarded instead of
//! written to swap?" of a page that is currently resident.
use crate::frame::FrameIndex;
use crate::swap::SwapSlot;
use alloc::sync::Arc;
use filesys::inode::{FileSystem, Inode};
use oscore::addressing::Va;
use oscore::sync::Mutex;

/// The page's stable, re-derivable source — set once at
/// [`crate::supplemental::SupplementalPageTable::install`] and never
/// changed afterward.
#[derive(Clone)]
pub enum Origin {
    /// All-zero content; re-creatable by zeroing a fresh frame.
    Zeroed,
    /// Content comes from `inode` at `offset`, for up to one page.
    FileBacked {
        fs: Arc<FileSystem>,
        inode: Arc<Inode>,
        offset: usize,
    },
}

/// Per-user-virtual-page bookkeeping (§3's "Supplemental page entry").
pub struct PageEntry {
    pub vaddr: Va,
    pub readonly: bool,
    pub origin: Origin,
    swap_slot: Mutex<Option<SwapSlot>>,
    frame: Mutex<Option<FrameIndex>>,
}

impl PageEntry {
    pub fn new(vaddr: Va, readonly: bool, origin: Origin) -> Self {
        Self {
            vaddr,
            readonly,
            origin,
            swap_slot: Mutex::new(None),
            frame: Mutex::new(None),
        }
    }

    pub fn frame(&self) -> Option<FrameIndex> {
        *self.frame.lock()
    }

    pub fn set_frame(&self, frame: Option<FrameIndex>) {
        *self.frame.lock() = frame;
    }

    pub fn swap_slot(&self) -> Option<SwapSlot> {
        *self.swap_slot.lock()
    }

    pub fn set_swap_slot(&self, slot: SwapSlot) {
        *self.swap_slot.lock() = Some(slot);
    }

    pub fn is_resident(&self) -> bool {
        self.frame().is_some()
    }
}
