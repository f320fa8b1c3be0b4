//! Mutual-exclusion primitives for the shared tables §5 of the design
//! names: the free-map bitmap, the open-inode list, per-inode state, the
//! frame table and the swap bitmap.
//!
//! `keos` hand-rolls its own `SpinLock`/`RwLock` on top of `abyss`, with an
//! API that requires an explicit `guard.unlock()` call because the kernel
//! cannot rely on `Drop` running across a context switch. This workspace has
//! no such constraint, so it reaches for the `spin` crate instead — the
//! registry crate the rest of the retrieved `no_std` corpus uses for the
//! same purpose (`vzwjustin-Rustos`, `yelili422-yeli-os`,
//! `songzhi-ext2-rs`, `oxidecomputer-bldb`) — and keeps the discipline
//! (hold only for the critical section, release before any blocking disk
//! call) rather than the exact unlock API.

pub use spin::{Mutex, MutexGuard, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};
