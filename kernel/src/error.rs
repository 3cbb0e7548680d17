//! Kernel error types.
//!
//! `KernelError` is the error type propagated with `?` through internal
//! kernel code. Syscall and VFS entry points flatten it to the C-style
//! integer conventions their callers expect; see [`crate::syscall`] and
//! [`crate::fs`].

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// Memory-related errors
    Mm(MmError),
    /// Process/scheduler-related errors
    Sched(SchedError),
    /// System call errors
    Syscall(SyscallError),
    /// Filesystem-related errors
    Fs(FsError),

    HardwareError { device: &'static str, code: u32 },
    InvalidArgument { name: &'static str, value: &'static str },
    OperationNotSupported { operation: &'static str },
    ResourceExhausted { resource: &'static str },
    PermissionDenied { operation: &'static str },
    AlreadyExists { resource: &'static str, id: u64 },
    NotFound { resource: &'static str, id: u64 },
    NotImplemented { feature: &'static str },
    WouldBlock,
    BrokenPipe,
    NotInitialized { subsystem: &'static str },
}

/// Memory management errors: allocator exhaustion, bad addresses, and
/// address-space operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    OutOfMemory { requested: usize, available: usize },
    OutOfFrames,
    InvalidAddress { addr: u32 },
    UnmappedPage { addr: u32 },
    AlreadyMapped { addr: u32 },
    AddressSpaceExhausted,
}

/// Process and scheduler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    InvalidPriority { priority: u8 },
    ProcessNotFound { pid: u32 },
    TooManyProcesses,
    InvalidState { expected: &'static str, actual: &'static str },
}

/// System call errors, mapped to a negative `errno`-style value at the
/// syscall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall { nr: usize },
    InvalidArgument { arg: usize },
    InvalidPointer { addr: usize },
    BadFileDescriptor,
    NotImplemented,
}

/// Filesystem errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotADirectory,
    NotAFile,
    IsADirectory,
    ReadOnly,
    InvalidPath,
    NoRootFs,
    AlreadyMounted,
    NotMounted,
    IoError,
    DirectoryNotEmpty,
    TooManyOpenFiles,
    BadFileDescriptor,
    NotSupported,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mm(e) => write!(f, "memory error: {:?}", e),
            Self::Sched(e) => write!(f, "scheduler error: {:?}", e),
            Self::Syscall(e) => write!(f, "syscall error: {:?}", e),
            Self::Fs(e) => write!(f, "filesystem error: {:?}", e),
            Self::HardwareError { device, code } => {
                write!(f, "hardware error on {}: code {:#x}", device, code)
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{}': {}", name, value)
            }
            Self::OperationNotSupported { operation } => {
                write!(f, "operation not supported: {}", operation)
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {}", resource),
            Self::PermissionDenied { operation } => {
                write!(f, "permission denied for operation: {}", operation)
            }
            Self::AlreadyExists { resource, id } => {
                write!(f, "{} with id {} already exists", resource, id)
            }
            Self::NotFound { resource, id } => write!(f, "{} with id {} not found", resource, id),
            Self::NotImplemented { feature } => write!(f, "feature not implemented: {}", feature),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {}", subsystem)
            }
        }
    }
}

impl From<MmError> for KernelError {
    fn from(err: MmError) -> Self {
        Self::Mm(err)
    }
}

impl From<SchedError> for KernelError {
    fn from(err: SchedError) -> Self {
        Self::Sched(err)
    }
}

impl From<SyscallError> for KernelError {
    fn from(err: SyscallError) -> Self {
        Self::Syscall(err)
    }
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        Self::Fs(err)
    }
}

/// Flatten a [`KernelError`] to the negative-errno convention used at the
/// syscall ABI boundary.
pub fn to_errno(err: KernelError) -> isize {
    match err {
        KernelError::Mm(MmError::OutOfMemory { .. } | MmError::OutOfFrames) => -12, // ENOMEM
        KernelError::Mm(_) => -14,                                                 // EFAULT
        KernelError::Fs(FsError::NotFound) => -2,                                  // ENOENT
        KernelError::Fs(FsError::PermissionDenied) => -13,                         // EACCES
        KernelError::Fs(FsError::NotADirectory) => -20,                            // ENOTDIR
        KernelError::Fs(FsError::IsADirectory) => -21,                             // EISDIR
        KernelError::Fs(FsError::TooManyOpenFiles) => -24,                         // EMFILE
        KernelError::Fs(FsError::BadFileDescriptor) => -9,                         // EBADF
        KernelError::Fs(_) => -5,                                                  // EIO
        KernelError::Syscall(SyscallError::InvalidSyscall { .. }) => -38,          // ENOSYS
        KernelError::Syscall(_) => -22,                                           // EINVAL
        KernelError::Sched(SchedError::ProcessNotFound { .. }) => -3,             // ESRCH
        KernelError::Sched(_) => -22,
        KernelError::PermissionDenied { .. } => -13,
        KernelError::NotFound { .. } => -2,
        KernelError::WouldBlock => -11, // EAGAIN
        KernelError::InvalidArgument { .. } => -22,
        _ => -22,
    }
}

#[macro_export]
macro_rules! kernel_error {
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}
