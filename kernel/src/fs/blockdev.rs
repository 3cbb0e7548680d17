//! Block device abstraction: 512-byte sectors behind one spinlock per
//! device (§5 -- the lock is held across the whole operation, including
//! any busy-wait on device status, which rules this kernel's disk driver
//! out of interrupt-handler context by construction).

use alloc::string::String;
use alloc::vec::Vec;

use spin::Mutex;

use crate::error::{FsError, KernelError, KernelResult};

pub const BLOCK_SIZE: usize = 512;

/// A storage device addressed in fixed-size blocks. PCI enumeration and the
/// ATA/IDE register protocol that would back a real implementation of this
/// trait are out of scope; `RamBlockDevice` is the only device this kernel
/// registers.
pub trait BlockDevice: Send + Sync {
    fn name(&self) -> &str;
    fn block_count(&self) -> u64;
    fn read_block(&self, block_num: u64, buf: &mut [u8; BLOCK_SIZE]) -> KernelResult<()>;
    fn write_block(&self, block_num: u64, buf: &[u8; BLOCK_SIZE]) -> KernelResult<()>;
}

/// A RAM-backed block device, registered under devfs as `hda0`-style names.
pub struct RamBlockDevice {
    name: String,
    data: Mutex<Vec<u8>>,
}

impl RamBlockDevice {
    pub fn new(name: String, block_count: u64) -> Self {
        Self {
            name,
            data: Mutex::new(alloc::vec![0u8; block_count as usize * BLOCK_SIZE]),
        }
    }
}

impl BlockDevice for RamBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_count(&self) -> u64 {
        (self.data.lock().len() / BLOCK_SIZE) as u64
    }

    fn read_block(&self, block_num: u64, buf: &mut [u8; BLOCK_SIZE]) -> KernelResult<()> {
        let data = self.data.lock();
        let start = block_num as usize * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        if end > data.len() {
            return Err(KernelError::Fs(FsError::InvalidPath));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_block(&self, block_num: u64, buf: &[u8; BLOCK_SIZE]) -> KernelResult<()> {
        let mut data = self.data.lock();
        let start = block_num as usize * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        if end > data.len() {
            return Err(KernelError::Fs(FsError::InvalidPath));
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_matches_write() {
        let dev = RamBlockDevice::new(String::from("test"), 4);
        let mut write_buf = [0u8; BLOCK_SIZE];
        write_buf[0] = 0x42;
        dev.write_block(1, &write_buf).unwrap();

        let mut read_buf = [0u8; BLOCK_SIZE];
        dev.read_block(1, &mut read_buf).unwrap();
        assert_eq!(read_buf, write_buf);
    }

    #[test]
    fn out_of_range_block_errors() {
        let dev = RamBlockDevice::new(String::from("test"), 1);
        let buf = [0u8; BLOCK_SIZE];
        assert!(dev.read_block(5, &mut [0u8; BLOCK_SIZE]).is_err());
        assert!(dev.write_block(5, &buf).is_err());
    }
}
