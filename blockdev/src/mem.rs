//! In-memory block device, the host-testable analog of `fs/simple_fs`'s
//! `FsDisk` (which wraps a real device slot). Used by every test in
//! `filesys` and `vm`, and by anyone embedding this workspace outside a
//! kernel (e.g. a userspace disk-image builder).
use crate::{BlockDevice, Sector};
use alloc::vec;
use alloc::vec::Vec;
use oscore::sync::Mutex;
use oscore::KernelError;

/// A block device backed by a `Vec` of zeroed sectors.
pub struct MemDevice {
    sectors: Mutex<Vec<[u8; 512]>>,
}

impl MemDevice {
    /// Creates a device with `count` zeroed sectors.
    pub fn new(count: u32) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; 512]; count as usize]),
        }
    }
}

impl BlockDevice for MemDevice {
    fn sector_count(&self) -> u32 {
        self.sectors.lock().len() as u32
    }

    fn read_sector(&self, sector: Sector, buf: &mut [u8; 512]) -> Result<(), KernelError> {
        let sectors = self.sectors.lock();
        let s = sectors.get(sector.as_u32() as usize).ok_or(KernelError::IoError)?;
        buf.copy_from_slice(s);
        Ok(())
    }

    fn write_sector(&self, sector: Sector, buf: &[u8; 512]) -> Result<(), KernelError> {
        let mut sectors = self.sectors.lock();
        let s = sectors
            .get_mut(sector.as_u32() as usize)
            .ok_or(KernelError::IoError)?;
        s.copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_sector() {
        let dev = MemDevice::new(4);
        let mut buf = [0u8; 512];
        buf[0] = 0xab;
        dev.write_sector(Sector(2), &buf).unwrap();
        let mut out = [0u8; 512];
        dev.read_sector(Sector(2), &mut out).unwrap();
        assert_eq!(out[0], 0xab);
    }

    #[test]
    fn out_of_range_is_an_io_error() {
        let dev = MemDevice::new(2);
        let buf = [0u8; 512];
        assert_eq!(dev.write_sector(Sector(5), &buf), Err(KernelError::IoError));
    }

    /// Property test: a random sequence of writes followed by reads at the
    /// same sectors always returns the last value written there, regardless
    /// of write order across sectors.
    #[test]
    fn random_writes_are_read_back_faithfully() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xD15C_u64);
        let dev = MemDevice::new(16);
        let mut model = vec![0u8; 16];

        for _ in 0..200 {
            let sector = rng.gen_range(0..16u32);
            let value: u8 = rng.gen();
            let buf = [value; 512];
            dev.write_sector(Sector(sector), &buf).unwrap();
            model[sector as usize] = value;
        }

        for (i, &expected) in model.iter().enumerate() {
            let mut out = [0u8; 512];
            dev.read_sector(Sector(i as u32), &mut out).unwrap();
            assert!(out.iter().all(|&b| b == expected));
        }
    }
}
