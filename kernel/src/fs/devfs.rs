//! Flat device filesystem mounted at `/dev`: a name-to-driver map with no
//! subdirectories, matching how few devices this kernel actually exposes
//! (a console and, once registered, block devices backing disk mounts).

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::{DirEntry, FileOps, FileSystem, NodeType};
use crate::error::{FsError, KernelError, KernelResult};

struct ConsoleDevice;

impl FileOps for ConsoleDevice {
    fn write(&self, _offset: u64, buf: &[u8]) -> KernelResult<usize> {
        for &b in buf {
            crate::drivers::console::write_byte(b);
        }
        Ok(buf.len())
    }

    fn read(&self, _offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let mut n = 0;
        while n < buf.len() {
            match crate::drivers::keyboard::read_byte() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn node_type(&self) -> NodeType {
        NodeType::CharDevice
    }
}

pub struct DevFs {
    nodes: Mutex<Vec<(String, Arc<dyn FileOps>)>>,
}

impl DevFs {
    pub fn new() -> Self {
        let fs = Self { nodes: Mutex::new(Vec::new()) };
        fs.nodes.lock().push(("console".to_string(), Arc::new(ConsoleDevice)));
        fs
    }

    /// Register a new block or character device node under `/dev/<name>`,
    /// called once at boot for each probed device.
    pub fn register(&self, name: &str, ops: Arc<dyn FileOps>) -> KernelResult<()> {
        let mut nodes = self.nodes.lock();
        if nodes.iter().any(|(n, _)| n == name) {
            return Err(KernelError::Fs(FsError::AlreadyExists));
        }
        nodes.push((name.to_string(), ops));
        Ok(())
    }
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for DevFs {
    fn name(&self) -> &str {
        "devfs"
    }

    fn lookup(&self, path: &str) -> KernelResult<Arc<dyn FileOps>> {
        let name = path.trim_start_matches('/');
        if name.is_empty() {
            return Ok(Arc::new(RootListing { fs: self.nodes.lock().iter().map(|(n, _)| n.clone()).collect() }));
        }
        self.nodes
            .lock()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ops)| ops.clone())
            .ok_or(KernelError::Fs(FsError::NotFound))
    }
}

/// A snapshot of `/dev`'s own entries, handed out for `readdir("/dev")`.
struct RootListing {
    fs: Vec<String>,
}

impl FileOps for RootListing {
    fn readdir(&self) -> KernelResult<Vec<DirEntry>> {
        Ok(self
            .fs
            .iter()
            .map(|name| DirEntry { name: name.clone(), node_type: NodeType::CharDevice })
            .collect())
    }

    fn node_type(&self) -> NodeType {
        NodeType::Directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_is_registered_at_boot() {
        let fs = DevFs::new();
        assert!(fs.lookup("console").is_ok());
    }

    #[test]
    fn duplicate_registration_fails() {
        let fs = DevFs::new();
        assert!(fs.register("console", Arc::new(ConsoleDevice)).is_err());
    }

    #[test]
    fn unknown_device_is_not_found() {
        let fs = DevFs::new();
        assert_eq!(fs.lookup("hda0").unwrap_err(), KernelError::Fs(FsError::NotFound));
    }
}
