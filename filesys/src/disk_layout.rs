//! On-disk byte layout — §6 of the design, byte for byte.
//!
//! The teacher's `ffs::disk_layout` reinterprets `#[repr(C, packed)]`
//! structs directly as sector bytes (fine on a single fixed target). This
//! workspace's spec pins the on-disk format to an explicit little-endian
//! byte layout independent of host endianness (§6: "Inode sector (512
//! bytes, little-endian)"), so this module packs/unpacks fields by hand
//! with `to_le_bytes`/`from_le_bytes` instead of transmuting a `repr(C)`
//! struct — the same manual-packing idiom the broader retrieved corpus
//! uses for on-disk structures (e.g. `songzhi-ext2-rs`, `RunningShrimp-os`'s
//! filesystem layer).
use blockdev::Sector;
use oscore::KernelError;

/// Number of direct block pointers an inode carries inline.
pub const DIRECT_BLOCKS: usize = 124;
/// Number of sector-index entries an indirect block holds.
pub const INDIRECT_ENTRIES: usize = 128;
/// On-disk sentinel for "no backing sector" (§3, §9 — preserved for
/// on-disk compatibility; never appears in the in-memory model, which uses
/// `Option<Sector>`).
pub const BAD_SECTOR_RAW: u32 = 0x5555_5555;

const MAGIC_DIR: u32 = 0x494e_4f44;
const MAGIC_FILE: u32 = 0x494e_4f45;

/// Sector holding the inode of the free-space map file.
pub const FREE_MAP_SECTOR: Sector = Sector(0);
/// Sector holding the inode of the root directory.
pub const ROOT_DIR_SECTOR: Sector = Sector(1);

/// Maximum file size addressable by the direct/indirect/double-indirect
/// index structure, in bytes.
pub const MAX_FILE_SIZE: usize =
    (DIRECT_BLOCKS + INDIRECT_ENTRIES + INDIRECT_ENTRIES * INDIRECT_ENTRIES) * 512;

fn encode_slot(slot: Option<Sector>) -> u32 {
    match slot {
        Some(s) => s.as_u32(),
        None => BAD_SECTOR_RAW,
    }
}

fn decode_slot(raw: u32) -> Option<Sector> {
    if raw == BAD_SECTOR_RAW {
        None
    } else {
        Some(Sector(raw))
    }
}

/// The fields of an on-disk inode, decoupled from the bytes that carry
/// them. `length` is kept as `i32` to match §3 ("signed 32-bit, >= 0");
/// callers only ever observe it as a non-negative `usize`.
#[derive(Debug, Clone)]
pub struct InodeFields {
    pub length: i32,
    pub is_dir: bool,
    pub direct: [Option<Sector>; DIRECT_BLOCKS],
    pub single_indirect: Option<Sector>,
    pub double_indirect: Option<Sector>,
}

impl InodeFields {
    /// A fresh inode with every slot unallocated.
    pub fn empty(is_dir: bool, length: i32) -> Self {
        Self {
            length,
            is_dir,
            direct: [None; DIRECT_BLOCKS],
            single_indirect: None,
            double_indirect: None,
        }
    }

    /// Encodes `self` into a 512-byte sector image.
    pub fn encode(&self) -> [u8; 512] {
        let mut buf = [0u8; 512];
        buf[0..4].copy_from_slice(&self.length.to_le_bytes());
        let mut off = 4;
        for slot in self.direct.iter() {
            buf[off..off + 4].copy_from_slice(&encode_slot(*slot).to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&encode_slot(self.single_indirect).to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&encode_slot(self.double_indirect).to_le_bytes());
        off += 4;
        let magic = if self.is_dir { MAGIC_DIR } else { MAGIC_FILE };
        buf[off..off + 4].copy_from_slice(&magic.to_le_bytes());
        off += 4;
        debug_assert_eq!(off, 512);
        buf
    }

    /// Decodes a 512-byte sector image, validating the magic number.
    pub fn decode(buf: &[u8; 512]) -> Result<Self, KernelError> {
        let length = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut direct = [None; DIRECT_BLOCKS];
        let mut off = 4;
        for slot in direct.iter_mut() {
            *slot = decode_slot(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        let single_indirect =
            decode_slot(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        off += 4;
        let double_indirect =
            decode_slot(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        off += 4;
        let magic = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let is_dir = match magic {
            MAGIC_DIR => true,
            MAGIC_FILE => false,
            _ => return Err(KernelError::Fatal("bad inode magic")),
        };
        Ok(Self {
            length,
            is_dir,
            direct,
            single_indirect,
            double_indirect,
        })
    }
}

/// An indirect block: `INDIRECT_ENTRIES` sector indices, one per 4 bytes.
#[derive(Debug, Clone, Copy)]
pub struct IndirectBlock(pub [Option<Sector>; INDIRECT_ENTRIES]);

impl IndirectBlock {
    pub fn empty() -> Self {
        IndirectBlock([None; INDIRECT_ENTRIES])
    }

    pub fn encode(&self) -> [u8; 512] {
        let mut buf = [0u8; 512];
        for (i, slot) in self.0.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&encode_slot(*slot).to_le_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8; 512]) -> Self {
        let mut out = [None; INDIRECT_ENTRIES];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = decode_slot(u32::from_le_bytes(
                buf[i * 4..i * 4 + 4].try_into().unwrap(),
            ));
        }
        IndirectBlock(out)
    }
}

/// Maximum usable bytes in a directory entry name (14, plus a NUL
/// terminator per §6).
pub const NAME_MAX: usize = 14;
const NAME_FIELD: usize = NAME_MAX + 1;
/// Byte width of one packed directory entry.
pub const DIR_ENTRY_SIZE: usize = 1 + NAME_FIELD + 4;

/// One fixed-width directory entry.
#[derive(Debug, Clone)]
pub struct DirEntryRaw {
    pub in_use: bool,
    pub name: alloc::string::String,
    pub inode_sector: Sector,
}

impl DirEntryRaw {
    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        buf[0] = self.in_use as u8;
        let name_bytes = self.name.as_bytes();
        buf[1..1 + name_bytes.len()].copy_from_slice(name_bytes);
        // remaining name bytes and the NUL terminator stay zero.
        let off = 1 + NAME_FIELD;
        buf[off..off + 4].copy_from_slice(&self.inode_sector.as_u32().to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let in_use = buf[0] != 0;
        let name_raw = &buf[1..1 + NAME_FIELD];
        let nul = name_raw.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD);
        let name = alloc::string::String::from_utf8_lossy(&name_raw[..nul]).into_owned();
        let off = 1 + NAME_FIELD;
        let inode_sector = Sector(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        Self {
            in_use,
            name,
            inode_sector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_round_trips_through_encode_decode() {
        let mut fields = InodeFields::empty(false, 4096);
        fields.direct[0] = Some(Sector(5));
        fields.single_indirect = Some(Sector(99));
        let buf = fields.encode();
        let decoded = InodeFields::decode(&buf).unwrap();
        assert_eq!(decoded.length, 4096);
        assert!(!decoded.is_dir);
        assert_eq!(decoded.direct[0], Some(Sector(5)));
        assert_eq!(decoded.direct[1], None);
        assert_eq!(decoded.single_indirect, Some(Sector(99)));
        assert_eq!(decoded.double_indirect, None);
    }

    #[test]
    fn bad_magic_is_fatal() {
        let buf = [0u8; 512];
        assert!(InodeFields::decode(&buf).is_err());
    }

    #[test]
    fn dir_entry_round_trips_with_nul_terminated_name() {
        let e = DirEntryRaw {
            in_use: true,
            name: "hello".into(),
            inode_sector: Sector(7),
        };
        let buf = e.encode();
        let back = DirEntryRaw::decode(&buf);
        assert!(back.in_use);
        assert_eq!(back.name, "hello");
        assert_eq!(back.inode_sector, Sector(7));
    }
}
