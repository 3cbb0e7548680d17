//! In-memory filesystem mounted at `/`: a tree of directories and files
//! held entirely in heap-allocated buffers, with no backing block device.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::{DirEntry, FileOps, FileSystem, NodeType};
use crate::error::{FsError, KernelError, KernelResult};

enum Node {
    File(Mutex<Vec<u8>>),
    Directory(Mutex<Vec<(String, Arc<RamNode>)>>),
}

struct RamNode {
    node: Node,
}

impl FileOps for RamNode {
    fn read(&self, offset: u64, buf: &mut [u8]) -> KernelResult<usize> {
        let Node::File(data) = &self.node else {
            return Err(KernelError::Fs(FsError::IsADirectory));
        };
        let data = data.lock();
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> KernelResult<usize> {
        let Node::File(data) = &self.node else {
            return Err(KernelError::Fs(FsError::IsADirectory));
        };
        let mut data = data.lock();
        let offset = offset as usize;
        if data.len() < offset + buf.len() {
            data.resize(offset + buf.len(), 0);
        }
        data[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn readdir(&self) -> KernelResult<Vec<DirEntry>> {
        let Node::Directory(children) = &self.node else {
            return Err(KernelError::Fs(FsError::NotADirectory));
        };
        Ok(children
            .lock()
            .iter()
            .map(|(name, node)| DirEntry { name: name.clone(), node_type: node.node_type() })
            .collect())
    }

    fn size(&self) -> u64 {
        match &self.node {
            Node::File(data) => data.lock().len() as u64,
            Node::Directory(_) => 0,
        }
    }

    fn node_type(&self) -> NodeType {
        match &self.node {
            Node::File(_) => NodeType::File,
            Node::Directory(_) => NodeType::Directory,
        }
    }
}

impl RamNode {
    fn new_file() -> Arc<Self> {
        Arc::new(Self { node: Node::File(Mutex::new(Vec::new())) })
    }

    fn new_dir() -> Arc<Self> {
        Arc::new(Self { node: Node::Directory(Mutex::new(Vec::new())) })
    }

    fn lookup_child(&self, name: &str) -> Option<Arc<RamNode>> {
        let Node::Directory(children) = &self.node else {
            return None;
        };
        children.lock().iter().find(|(n, _)| n == name).map(|(_, node)| node.clone())
    }

    fn insert_child(&self, name: &str, child: Arc<RamNode>) -> KernelResult<()> {
        let Node::Directory(children) = &self.node else {
            return Err(KernelError::Fs(FsError::NotADirectory));
        };
        let mut children = children.lock();
        if children.iter().any(|(n, _)| n == name) {
            return Err(KernelError::Fs(FsError::AlreadyExists));
        }
        children.push((name.to_string(), child));
        Ok(())
    }
}

/// The whole filesystem is one tree rooted at `root`, walked a path
/// component at a time; there is no separate inode-number namespace since
/// `Arc<RamNode>` identity already serves that purpose.
pub struct RamFs {
    root: Arc<RamNode>,
}

impl RamFs {
    pub fn new() -> Self {
        Self { root: RamNode::new_dir() }
    }

    fn walk(&self, path: &str) -> KernelResult<Arc<RamNode>> {
        let mut current = self.root.clone();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = current
                .lookup_child(component)
                .ok_or(KernelError::Fs(FsError::NotFound))?;
        }
        Ok(current)
    }
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RamFs {
    fn name(&self) -> &str {
        "ramfs"
    }

    fn lookup(&self, path: &str) -> KernelResult<Arc<dyn FileOps>> {
        self.walk(path).map(|n| n as Arc<dyn FileOps>)
    }

    fn create(&self, path: &str) -> KernelResult<Arc<dyn FileOps>> {
        let (parent_path, name) = match path.rfind('/') {
            Some(idx) => (&path[..idx], &path[idx + 1..]),
            None => ("", path),
        };
        if name.is_empty() {
            return Err(KernelError::Fs(FsError::InvalidPath));
        }
        let parent = self.walk(parent_path)?;
        let file = RamNode::new_file();
        parent.insert_child(name, file.clone())?;
        Ok(file as Arc<dyn FileOps>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_lookup_round_trips() {
        let fs = RamFs::new();
        let created = fs.create("greeting.txt").unwrap();
        created.write(0, b"hello").unwrap();

        let found = fs.lookup("greeting.txt").unwrap();
        let mut buf = [0u8; 5];
        let n = found.read(0, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn lookup_missing_file_is_not_found() {
        let fs = RamFs::new();
        assert_eq!(fs.lookup("nope").unwrap_err(), KernelError::Fs(FsError::NotFound));
    }

    #[test]
    fn write_past_end_extends_file() {
        let fs = RamFs::new();
        let file = fs.create("sparse").unwrap();
        file.write(4, b"end").unwrap();
        assert_eq!(file.size(), 7);
    }
}
