//! Demand-paged virtual memory core.
//!
//! Ties components G–J (frame table, swap allocator, supplemental page
//! table, fault handler) into the consumer surface a kernel's page-fault
//! entry point calls (§6): `vm_init`/`vm_done` mount and unmount the paging
//! core bound to [`blockdev::DeviceName::Swap`], mirroring how
//! `filesys::filesys_init`/`filesys_done` mount the volume. The page table
//! itself is an external collaborator (§1) — callers supply one through
//! [`page_table::PageTableOps`].
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod entry;
pub mod fault;
pub mod frame;
pub mod page_table;
pub mod supplemental;
pub mod swap;

pub use entry::{Origin, PageEntry};
pub use fault::{install_page, restore_page, vm_done, vm_init, vm_init_with_capacity, PagingCore, FRAME_LIMIT, SWAP_LIMIT};
pub use frame::{FrameIndex, FrameTable, HeapPool, PhysPool};
pub use page_table::PageTableOps;
pub use supplemental::SupplementalPageTable;
pub use swap::{SwapSlot, SwapTable};
