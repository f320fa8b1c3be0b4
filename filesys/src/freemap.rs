//! Free-space map — component B.
//!
//! A bitmap of every sector on the `FS` device, persisted as the content of
//! the inode at [`disk_layout::FREE_MAP_SECTOR`] (§3, §4.B). Allocation
//! scans from bit 0 so the map stays compact near the front, which keeps
//! behavior deterministic for tests (§4.B).
use alloc::vec;
use alloc::vec::Vec;
use oscore::KernelError;

/// A bitmap over `0..bit_count` sectors, with a word-oriented first-fit
/// allocator.
#[derive(Debug)]
pub struct FreeMap {
    bits: Vec<u64>,
    bit_count: u32,
}

const WORD_BITS: u32 = 64;

impl FreeMap {
    /// Builds a fresh, all-clear map over `bit_count` sectors.
    pub fn new(bit_count: u32) -> Self {
        let words = (bit_count as usize).div_ceil(WORD_BITS as usize);
        Self {
            bits: vec![0u64; words],
            bit_count,
        }
    }

    /// Rebuilds a map from its persisted byte image (the free-map file's
    /// content).
    pub fn from_bytes(bit_count: u32, bytes: &[u8]) -> Self {
        let words = (bit_count as usize).div_ceil(WORD_BITS as usize);
        let mut bits = vec![0u64; words];
        for (i, word) in bits.iter_mut().enumerate() {
            let start = i * 8;
            if start >= bytes.len() {
                break;
            }
            let end = (start + 8).min(bytes.len());
            let mut buf = [0u8; 8];
            buf[..end - start].copy_from_slice(&bytes[start..end]);
            *word = u64::from_le_bytes(buf);
        }
        Self { bits, bit_count }
    }

    /// Serializes the map to its persisted byte image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bits.len() * 8);
        for word in &self.bits {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }

    fn get(&self, bit: u32) -> bool {
        let word = self.bits[(bit / WORD_BITS) as usize];
        (word >> (bit % WORD_BITS)) & 1 != 0
    }

    fn set(&mut self, bit: u32, value: bool) {
        let word = &mut self.bits[(bit / WORD_BITS) as usize];
        if value {
            *word |= 1 << (bit % WORD_BITS);
        } else {
            *word &= !(1 << (bit % WORD_BITS));
        }
    }

    /// Finds `n` contiguous clear bits starting from bit 0, sets them, and
    /// returns their start. Fails with [`KernelError::NoSpace`] if no such
    /// run exists.
    pub fn allocate(&mut self, n: u32) -> Result<u32, KernelError> {
        if n == 0 {
            return Err(KernelError::Invalid);
        }
        let mut run_start = None;
        let mut run_len = 0u32;
        for bit in 0..self.bit_count {
            if !self.get(bit) {
                if run_start.is_none() {
                    run_start = Some(bit);
                }
                run_len += 1;
                if run_len == n {
                    let start = run_start.unwrap();
                    for b in start..start + n {
                        self.set(b, true);
                    }
                    return Ok(start);
                }
            } else {
                run_start = None;
                run_len = 0;
            }
        }
        Err(KernelError::NoSpace)
    }

    /// Clears `n` bits starting at `start`. The caller is responsible for
    /// only releasing sectors it is certain are no longer referenced (§3's
    /// invariant: a bit is 1 iff some reachable inode references that
    /// sector).
    pub fn release(&mut self, start: u32, n: u32) {
        for b in start..start + n {
            self.set(b, false);
        }
    }

    /// Marks `n` sectors starting at `start` as used without scanning —
    /// used while formatting to reserve the sectors a freshly created
    /// inode pre-allocates.
    pub fn mark_used(&mut self, start: u32, n: u32) {
        for b in start..start + n {
            self.set(b, true);
        }
    }

    /// Number of set bits, used by the free-map conservation test (§8).
    pub fn count_used(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }
}
