//! Exercises the mount table, ramfs, and devfs without booting the rest of
//! the kernel -- [`jarvis_kernel::fs::init`] only needs the heap, not
//! process/scheduler/driver bring-up.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use jarvis_kernel::error::{FsError, KernelError, KernelResult};
use jarvis_kernel::fs::{self, OpenFlags};
use jarvis_kernel::test_framework::{exit_qemu, test_panic_handler, QemuExitCode};
use jarvis_kernel::{kernel_assert, kernel_assert_eq, serial_println};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    jarvis_kernel::mm::heap::init().expect("heap init");
    fs::init().expect("fs init");

    serial_println!("Starting VFS tests...");
    run(create_write_read_round_trips, "create_write_read_round_trips");
    run(open_missing_file_without_create_fails, "open_missing_file_without_create_fails");
    run(dev_mount_shadows_root, "dev_mount_shadows_root");
    run(append_always_writes_at_end, "append_always_writes_at_end");
    serial_println!("All tests passed!");

    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn run(test: fn() -> KernelResult<()>, name: &str) {
    serial_println!("test {} ...", name);
    if let Err(e) = test() {
        serial_println!("test {} FAILED: {}", name, e);
        exit_qemu(QemuExitCode::Failed);
    }
}

fn create_write_read_round_trips() -> KernelResult<()> {
    let inode = fs::resolve_path("/greeting.txt", OpenFlags::CREATE | OpenFlags::WRITE)?;
    let writer = fs::FileDescriptor::new(inode, OpenFlags::WRITE);
    let n = writer.write(b"hello, kernel")?;
    kernel_assert_eq!(n, 13);

    let inode = fs::resolve_path("/greeting.txt", OpenFlags::READ)?;
    let reader = fs::FileDescriptor::new(inode, OpenFlags::READ);
    let mut buf = [0u8; 13];
    let n = reader.read(&mut buf)?;
    kernel_assert_eq!(n, 13);
    kernel_assert!(&buf == b"hello, kernel");
    Ok(())
}

fn open_missing_file_without_create_fails() -> KernelResult<()> {
    let result = fs::resolve_path("/does-not-exist", OpenFlags::READ);
    kernel_assert!(matches!(result, Err(KernelError::Fs(FsError::NotFound))));
    Ok(())
}

fn dev_mount_shadows_root() -> KernelResult<()> {
    // "/dev" resolves through the devfs mount rather than falling through to
    // ramfs, even though ramfs is also mounted at "/" and has never heard of
    // a "dev" entry.
    let inode = fs::resolve_path("/dev", OpenFlags::READ)?;
    let entries = inode.ops.readdir()?;
    kernel_assert!(entries.iter().any(|e| e.name == "console"));
    Ok(())
}

fn append_always_writes_at_end() -> KernelResult<()> {
    let inode = fs::resolve_path("/log.txt", OpenFlags::CREATE | OpenFlags::WRITE)?;
    let writer = fs::FileDescriptor::new(inode.clone(), OpenFlags::WRITE);
    writer.write(b"first")?;

    // A fresh append-mode descriptor starts its cursor at the file's
    // current end, regardless of what the first descriptor's offset is.
    let appender = fs::FileDescriptor::new(inode.clone(), OpenFlags::WRITE | OpenFlags::APPEND);
    appender.write(b"-second")?;

    let reader = fs::FileDescriptor::new(inode, OpenFlags::READ);
    let mut buf = [0u8; 12];
    reader.read(&mut buf)?;
    kernel_assert!(&buf == b"first-second");
    Ok(())
}
