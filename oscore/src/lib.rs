//! Shared kernel-adjacent primitives used by [`blockdev`], [`filesys`] and
//! [`vm`].
//!
//! This crate plays the role `keos` plays for the rest of the workspace: a
//! dependency-free base carrying the error type, the locking primitives, and
//! the address/page-size constants that the filesystem and paging crates are
//! built on. It never touches a block device or a page table itself.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod addressing;
pub mod error;
pub mod logging;
pub mod sync;

pub use error::KernelError;
