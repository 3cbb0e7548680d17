//! Virtual filesystem: a mount table over per-filesystem implementations,
//! plus the per-process file descriptor table syscalls operate against.
//!
//! Every filesystem implements [`FileSystem`], which hands back [`Inode`]
//! handles; every open inode exposes its data operations through [`FileOps`],
//! whose default methods return [`FsError::NotSupported`] so a filesystem
//! only has to override what it actually supports (a directory need not
//! implement `read`, a character device need not implement `readdir`).

pub mod blockdev;
pub mod devfs;
pub mod ramfs;

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use spin::Mutex;

use crate::error::{FsError, KernelError, KernelResult};
use crate::sync::once_lock::GlobalState;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ     = 1 << 0;
        const WRITE    = 1 << 1;
        const CREATE   = 1 << 2;
        const APPEND   = 1 << 3;
        const TRUNCATE = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    CharDevice,
}

/// A single entry returned by [`FileOps::readdir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub node_type: NodeType,
}

/// The data operations on an open file. A filesystem implements whichever
/// subset makes sense for a given node and inherits `NotSupported` defaults
/// for the rest -- there is no separate vtable-is-null check at call sites,
/// just an ordinary trait dispatch that happens to return an error.
pub trait FileOps: Send + Sync {
    fn read(&self, _offset: u64, _buf: &mut [u8]) -> KernelResult<usize> {
        Err(KernelError::Fs(FsError::NotSupported))
    }

    fn write(&self, _offset: u64, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Fs(FsError::NotSupported))
    }

    fn readdir(&self) -> KernelResult<Vec<DirEntry>> {
        Err(KernelError::Fs(FsError::NotSupported))
    }

    fn ioctl(&self, _request: u32, _arg: usize) -> KernelResult<isize> {
        Err(KernelError::Fs(FsError::NotSupported))
    }

    fn size(&self) -> u64 {
        0
    }

    fn node_type(&self) -> NodeType {
        NodeType::File
    }
}

/// A mounted filesystem. `lookup` resolves a path relative to the
/// filesystem's own root (the mount-point prefix is already stripped by
/// [`find_mount_point`]) to an open-able inode handle.
pub trait FileSystem: Send + Sync {
    fn name(&self) -> &str;
    fn lookup(&self, path: &str) -> KernelResult<Arc<dyn FileOps>>;
    fn create(&self, _path: &str) -> KernelResult<Arc<dyn FileOps>> {
        Err(KernelError::Fs(FsError::NotSupported))
    }
}

struct MountPoint {
    prefix: String,
    fs: Arc<dyn FileSystem>,
}

impl MountPoint {
    fn prefix_with_slash(&self) -> String {
        if self.prefix == "/" {
            "/".to_string()
        } else {
            let mut s = self.prefix.clone();
            s.push('/');
            s
        }
    }
}

struct MountTable {
    mounts: Vec<MountPoint>,
}

static MOUNTS: GlobalState<Mutex<MountTable>> = GlobalState::new();

/// An open reference to a file's data. Multiple file descriptors (in the
/// same or different processes) may share one `Inode` Arc; each descriptor
/// keeps its own byte offset and flags.
pub struct Inode {
    pub ops: Arc<dyn FileOps>,
}

/// A per-process open-file-table entry.
pub struct FileDescriptor {
    pub inode: Arc<Inode>,
    pub offset: Mutex<u64>,
    pub flags: OpenFlags,
}

impl FileDescriptor {
    pub fn new(inode: Arc<Inode>, flags: OpenFlags) -> Self {
        let offset = if flags.contains(OpenFlags::APPEND) {
            inode.ops.size()
        } else {
            0
        };
        Self { inode, offset: Mutex::new(offset), flags }
    }

    pub fn read(&self, buf: &mut [u8]) -> KernelResult<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(KernelError::Fs(FsError::PermissionDenied));
        }
        let mut offset = self.offset.lock();
        let n = self.inode.ops.read(*offset, buf)?;
        *offset += n as u64;
        Ok(n)
    }

    pub fn write(&self, buf: &[u8]) -> KernelResult<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(KernelError::Fs(FsError::PermissionDenied));
        }
        let mut offset = self.offset.lock();
        // Append-mode writers always land at the current end of file,
        // regardless of where a prior read left the cursor.
        if self.flags.contains(OpenFlags::APPEND) {
            *offset = self.inode.ops.size();
        }
        let n = self.inode.ops.write(*offset, buf)?;
        *offset += n as u64;
        Ok(n)
    }
}

/// Fixed-size per-process file descriptor table. A process is a single
/// thread of control in this kernel, so there is no need for the table
/// itself to be shared or reference counted beyond the process struct that
/// owns it.
pub const MAX_FDS: usize = 32;

pub struct FdTable {
    slots: [Option<Arc<FileDescriptor>>; MAX_FDS],
}

impl FdTable {
    pub const fn new() -> Self {
        Self { slots: [const { None }; MAX_FDS] }
    }

    /// Install `fd` in the lowest free slot, matching the usual POSIX
    /// lowest-available-descriptor convention.
    pub fn insert(&mut self, fd: Arc<FileDescriptor>) -> KernelResult<usize> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(fd);
                return Ok(i);
            }
        }
        Err(KernelError::Fs(FsError::TooManyOpenFiles))
    }

    pub fn get(&self, fd: usize) -> KernelResult<Arc<FileDescriptor>> {
        self.slots
            .get(fd)
            .and_then(|s| s.clone())
            .ok_or(KernelError::Fs(FsError::BadFileDescriptor))
    }

    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        let slot = self.slots.get_mut(fd).ok_or(KernelError::Fs(FsError::BadFileDescriptor))?;
        if slot.take().is_none() {
            return Err(KernelError::Fs(FsError::BadFileDescriptor));
        }
        Ok(())
    }
}

/// Collapse `.`/`..`/repeated slashes and resolve a possibly-relative `path`
/// against `cwd`, always returning an absolute, slash-separated path.
pub fn normalize(path: &str, cwd: &str) -> String {
    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        let mut s = cwd.to_string();
        if !s.ends_with('/') {
            s.push('/');
        }
        s.push_str(path);
        s
    };

    let mut stack: Vec<&str> = Vec::new();
    for component in absolute.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    let mut result = String::from("/");
    result.push_str(&stack.join("/"));
    result
}

/// Find the mount covering `path`, picking the longest matching prefix
/// among all mounted filesystems (so `/dev` wins over `/` for
/// `/dev/hda0`), and return it alongside the path remainder relative to
/// that filesystem's own root.
fn find_mount_point(path: &str) -> KernelResult<(Arc<dyn FileSystem>, String)> {
    MOUNTS
        .with(|m| {
            let table = m.lock();
            let best = table
                .mounts
                .iter()
                .filter(|mp| path == mp.prefix || path.starts_with(&mp.prefix_with_slash()))
                .max_by_key(|mp| mp.prefix.len());

            best.map(|mp| {
                let suffix = path.strip_prefix(&mp.prefix).unwrap_or("");
                let suffix = if suffix.is_empty() { "/" } else { suffix };
                (mp.fs.clone(), suffix.to_string())
            })
        })
        .flatten()
        .ok_or(KernelError::Fs(FsError::NoRootFs))
}

/// Mount `fs` at `prefix` (an absolute path with no trailing slash, except
/// for the root mount `"/"` itself).
pub fn mount(prefix: &str, fs: Arc<dyn FileSystem>) -> KernelResult<()> {
    MOUNTS
        .with_mut(|m| {
            let mut table = m.lock();
            if table.mounts.iter().any(|mp| mp.prefix == prefix) {
                return Err(KernelError::Fs(FsError::AlreadyMounted));
            }
            table.mounts.push(MountPoint { prefix: prefix.to_string(), fs });
            Ok(())
        })
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "fs" }))
}

/// Resolve an absolute path to an openable inode, creating it first if
/// `flags` requests `CREATE` and the lookup fails with `NotFound`.
pub fn resolve_path(path: &str, flags: OpenFlags) -> KernelResult<Arc<Inode>> {
    let (fs, suffix) = find_mount_point(path)?;
    let ops = match fs.lookup(&suffix) {
        Ok(ops) => ops,
        Err(KernelError::Fs(FsError::NotFound)) if flags.contains(OpenFlags::CREATE) => {
            fs.create(&suffix)?
        }
        Err(e) => return Err(e),
    };
    Ok(Arc::new(Inode { ops }))
}

/// Mount the in-memory root filesystem at `/` and a device filesystem at
/// `/dev`. Later boot stages (device probing, disk-backed root) would add
/// more mounts on top of this baseline.
pub fn init() -> KernelResult<()> {
    MOUNTS
        .init(Mutex::new(MountTable { mounts: Vec::new() }))
        .map_err(|_| KernelError::NotInitialized { subsystem: "fs" })?;

    mount("/", Arc::new(ramfs::RamFs::new()))?;
    mount("/dev", Arc::new(devfs::DevFs::new()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(normalize("../etc/./passwd", "/home/user"), "/home/etc/passwd");
        assert_eq!(normalize("/a/b/../c", "/"), "/a/c");
        assert_eq!(normalize("foo", "/"), "/foo");
    }

    struct NullOps;
    impl FileOps for NullOps {}

    #[test]
    fn fd_table_reuses_lowest_free_slot() {
        let mut table = FdTable::new();
        let inode = Arc::new(Inode { ops: Arc::new(NullOps) });
        let fd0 = Arc::new(FileDescriptor::new(inode.clone(), OpenFlags::READ));
        let fd1 = Arc::new(FileDescriptor::new(inode.clone(), OpenFlags::READ));
        let a = table.insert(fd0).unwrap();
        let b = table.insert(fd1).unwrap();
        assert_eq!((a, b), (0, 1));
        table.close(0).unwrap();
        let fd2 = Arc::new(FileDescriptor::new(inode, OpenFlags::READ));
        let c = table.insert(fd2).unwrap();
        assert_eq!(c, 0);
    }
}
