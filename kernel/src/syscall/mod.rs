//! System call table and trap entry point.
//!
//! Called exclusively from [`crate::arch::x86::idt::common_interrupt_entry`]'s
//! `int 0x80` branch with the raw register values out of the saved
//! [`crate::arch::x86::idt::InterruptFrame`]; [`dispatch`] is this module's
//! only public entry point; returns the same negative-on-failure, C-style
//! convention the syscall ABI uses, so the result round-trips straight back
//! into `eax` with no further translation at the call site.

use alloc::sync::Arc;

use crate::error::{to_errno, FsError, KernelError, KernelResult, SyscallError};
use crate::fs::{self, FileDescriptor, OpenFlags};
use crate::mm::vmm::{self, MemoryRegion, RegionKind};
use crate::mm::PAGE_SIZE;
use crate::process;

/// Stable syscall numbers. User code is compiled against these values, so
/// they may gain entries but never be renumbered.
pub const SYS_EXIT: usize = 0;
pub const SYS_READ: usize = 1;
pub const SYS_WRITE: usize = 2;
pub const SYS_OPEN: usize = 3;
pub const SYS_CLOSE: usize = 4;
pub const SYS_IOCTL: usize = 5;
pub const SYS_FORK: usize = 6;
pub const SYS_EXECVE: usize = 7;
pub const SYS_WAITPID: usize = 8;
pub const SYS_GETPID: usize = 9;
pub const SYS_SBRK: usize = 10;
pub const SYS_YIELD: usize = 11;
pub const SYS_MMAP: usize = 12;
pub const SYS_MUNMAP: usize = 13;

const MMAP_ANONYMOUS: usize = 0x1;

/// Entry point reached from the `int 0x80` trap. `num` is the raw value of
/// `eax` at trap time; `a1..a4` are `ebx, ecx, edx, esi` respectively, and
/// `a5` is `edi`, giving every syscall up to five arguments as required.
///
/// Never panics: an unknown syscall number, a bad pointer, or a bad file
/// descriptor all flatten to a negative return value rather than faulting
/// the kernel.
pub fn dispatch(num: usize, a1: usize, a2: usize, a3: usize, a4: usize, a5: usize) -> usize {
    let result: KernelResult<usize> = match num {
        SYS_EXIT => sys_exit(a1 as i32),
        SYS_READ => sys_read(a1, a2 as *mut u8, a3),
        SYS_WRITE => sys_write(a1, a2 as *const u8, a3),
        SYS_OPEN => sys_open(a1 as *const u8, a2, a3 as u32),
        SYS_CLOSE => sys_close(a1),
        SYS_IOCTL => sys_ioctl(a1, a2 as u32, a3),
        SYS_GETPID => Ok(process::current_pid().0 as usize),
        SYS_YIELD => sys_yield(),
        SYS_MMAP => sys_mmap(a1 as u32, a2 as u32, a3 as u32, a4 as u32, a5),
        SYS_MUNMAP => sys_munmap(a1 as u32, a2 as u32),
        // ABI-stable stubs: present in the table so user code can assume
        // these numbers exist, but always fail with exactly -1 rather than
        // a cause-specific errno.
        SYS_FORK | SYS_EXECVE | SYS_WAITPID | SYS_SBRK => return -1i32 as usize,
        other => Err(KernelError::Syscall(SyscallError::InvalidSyscall { nr: other })),
    };

    match result {
        Ok(v) => v,
        Err(e) => to_errno(e) as usize,
    }
}

/// Terminate the calling process with `code`, diverging into the scheduler.
/// Declared to return `KernelResult<usize>` only so it fits `dispatch`'s
/// match arms uniformly; the call never actually returns.
fn sys_exit(code: i32) -> KernelResult<usize> {
    process::terminate_current(code);
}

fn sys_yield() -> KernelResult<usize> {
    crate::sched::yield_now();
    Ok(0)
}

/// # Safety (informal)
/// `buf` is a raw pointer straight from user-mode register state; this
/// kernel has no separate user/kernel address validation layer (out of
/// scope), so a wild pointer here faults the same way a bad ring-3 access
/// always does -- through the page-fault handler, which terminates the
/// offending process. That is the documented failure mode for a bad
/// pointer (§9's invalid-argument policy), not a kernel panic.
fn sys_read(fd: usize, buf: *mut u8, len: usize) -> KernelResult<usize> {
    let descriptor = current_fd(fd)?;
    // SAFETY: see module-level note; `buf`/`len` come directly from the
    // trapping process's own registers.
    let slice = unsafe { core::slice::from_raw_parts_mut(buf, len) };
    descriptor.read(slice)
}

fn sys_write(fd: usize, buf: *const u8, len: usize) -> KernelResult<usize> {
    let descriptor = current_fd(fd)?;
    // SAFETY: see `sys_read`.
    let slice = unsafe { core::slice::from_raw_parts(buf, len) };
    descriptor.write(slice)
}

fn sys_open(path_ptr: *const u8, path_len: usize, flags: u32) -> KernelResult<usize> {
    // SAFETY: see `sys_read`.
    let path_bytes = unsafe { core::slice::from_raw_parts(path_ptr, path_len) };
    let path = core::str::from_utf8(path_bytes)
        .map_err(|_| KernelError::Syscall(SyscallError::InvalidPointer { addr: path_ptr as usize }))?;

    let open_flags = OpenFlags::from_bits_truncate(flags);
    let inode = fs::resolve_path(path, open_flags)?;
    let descriptor = Arc::new(FileDescriptor::new(inode, open_flags));

    process::with_current(|pcb| pcb.fd_table.insert(descriptor))
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))
}

fn sys_close(fd: usize) -> KernelResult<usize> {
    process::with_current(|pcb| pcb.fd_table.close(fd))
        .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))?;
    Ok(0)
}

fn sys_ioctl(fd: usize, request: u32, arg: usize) -> KernelResult<usize> {
    let descriptor = current_fd(fd)?;
    descriptor.inode.ops.ioctl(request, arg).map(|v| v as usize)
}

fn current_fd(fd: usize) -> KernelResult<Arc<FileDescriptor>> {
    process::with_current(|pcb| pcb.fd_table.get(fd))
        .unwrap_or(Err(KernelError::Fs(FsError::BadFileDescriptor)))
}

/// `addr` is a hint only: if `0`, the next page-aligned address is taken
/// from the address space's own `mmap` cursor. `fd` is only consulted when
/// `flags` omits `MMAP_ANONYMOUS`; file-backed mapping is otherwise
/// identical, since reading the file's contents in lazily is
/// [`crate::mm::page_fault::populate_from_file`]'s job, not this syscall's.
fn sys_mmap(addr: u32, len: u32, prot: u32, flags: u32, fd: usize) -> KernelResult<usize> {
    let page_count = (len + PAGE_SIZE - 1) / PAGE_SIZE;
    if page_count == 0 {
        return Err(KernelError::InvalidArgument { name: "len", value: "zero" });
    }

    let anonymous = flags as usize & MMAP_ANONYMOUS != 0;
    if !anonymous {
        // A file-backed mapping still needs an open descriptor to read back
        // from later; reject up front if the caller passed a bad one.
        current_fd(fd)?;
    }

    let writable = prot & 0x2 != 0;

    process::with_current(|pcb| -> KernelResult<usize> {
        let base = if addr != 0 {
            crate::mm::page_align_down(addr)
        } else {
            let mut cursor = pcb.address_space.mmap_cursor.lock();
            let base = *cursor;
            *cursor += page_count * PAGE_SIZE;
            base
        };

        pcb.address_space.regions.lock().push(MemoryRegion {
            base,
            length: page_count * PAGE_SIZE,
            kind: if anonymous { RegionKind::Anonymous } else { RegionKind::MappedFile },
            writable,
            user: true,
        });

        Ok(base as usize)
    })
    .unwrap_or(Err(KernelError::NotInitialized { subsystem: "process" }))
}

/// Unmap `len` bytes at `addr`, tolerating pages that were never actually
/// demand-paged in (anonymous mappings are lazily backed, so most of a
/// freshly `mmap`'d range has no frame yet).
fn sys_munmap(addr: u32, len: u32) -> KernelResult<usize> {
    let base = crate::mm::page_align_down(addr);
    let page_count = (len + PAGE_SIZE - 1) / PAGE_SIZE;

    process::with_current(|pcb| {
        for i in 0..page_count {
            let _ = vmm::unmap(&pcb.address_space, base + i * PAGE_SIZE);
        }
        pcb.address_space.regions.lock().retain(|r| r.base != base);
    })
    .ok_or(KernelError::NotInitialized { subsystem: "process" })?;

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_numbers_are_stable() {
        assert_eq!(SYS_EXIT, 0);
        assert_eq!(SYS_GETPID, 9);
        assert_eq!(SYS_MUNMAP, 13);
    }

    #[test]
    fn unknown_syscall_maps_to_enosys() {
        let err = KernelError::Syscall(SyscallError::InvalidSyscall { nr: 999 });
        assert_eq!(to_errno(err), -38);
    }
}
