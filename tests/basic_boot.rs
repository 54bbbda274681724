#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(pagemem::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::BootInfo;
use core::panic::PanicInfo;
use pagemem::config::MAX_FIRMWARE_ENTRIES;
use pagemem::physmem;
use pagemem::physmem::boot_data::BootData;
use pagemem::physmem::bootstrap::{bootstrap, SetupInput};
use pagemem::physmem::bump::BootPlatform;
use pagemem::physmem::firmware_map::{MemoryType, RawEntry};
use pagemem::physmem::segment::SegmentBounds;
use pagemem::serial_println;

static mut RAW: [RawEntry; MAX_FIRMWARE_ENTRIES] = [RawEntry {
    base: 0,
    length: 0,
    mem_type: MemoryType::Available,
}; MAX_FIRMWARE_ENTRIES];

fn setup_input(boot_info: &'static BootInfo) -> SetupInput<'static> {
    let count = boot_info.memory_map.iter().count().min(MAX_FIRMWARE_ENTRIES);
    let raw: &'static mut [RawEntry] = unsafe {
        for (slot, region) in RAW.iter_mut().zip(boot_info.memory_map.iter()) {
            *slot = physmem::raw_entry_from_bootinfo(region);
        }
        &mut RAW[..count]
    };

    SetupInput {
        memory_map: raw,
        boot_data: BootData::new(),
        biosmem_end: 0x10_0000,
        mem_upper_limit: u64::MAX,
        platform: BootPlatform::Bios,
        bounds: SegmentBounds::default(),
    }
}

#[test_case]
fn test_allocator_reports_free_memory() {
    assert!(physmem::ready());
    serial_println!("free after boot: {} bytes", physmem::mem_free());
    assert!(physmem::mem_free() > 0);
}

fn idle_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

fn run_tests(boot_info: &'static BootInfo) -> ! {
    bootstrap(setup_input(boot_info));
    test_main();
    idle_loop();
}

#[no_mangle]
pub extern "C" fn _start(boot_info: &'static BootInfo) -> ! {
    run_tests(boot_info)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    pagemem::test_panic_handler(info)
}
