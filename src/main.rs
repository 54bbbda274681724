#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(pagemem::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader::BootInfo;
use core::panic::PanicInfo;
use pagemem::config::MAX_FIRMWARE_ENTRIES;
use pagemem::physmem::boot_data::BootData;
use pagemem::physmem::bump::BootPlatform;
use pagemem::physmem::bootstrap::{bootstrap, SetupInput};
use pagemem::physmem::firmware_map::RawEntry;
use pagemem::physmem::segment::SegmentBounds;

extern crate pagemem;

/// Bootloader 0.9.8 already classifies the kernel image, its page tables,
/// and its stack as their own `MemoryRegionType`s distinct from `Usable`,
/// so they never appear as `Available` in the normalized firmware map —
/// this platform needs no explicit boot-data artifact tracking. A
/// hypervisor boot path that hands over one coarse usable range with the
/// kernel sitting inside it would populate `BootData` instead.
fn boot_data() -> BootData {
    BootData::new()
}

/// Below 1 MiB is conventionally reserved for real-mode/BIOS structures;
/// this crate's bootstrap heap never claims it even when the firmware map
/// marks it `Available`.
const BIOSMEM_END: u64 = 0x10_0000;

fn setup_input(boot_info: &'static BootInfo) -> SetupInput<'static> {
    static mut RAW: [RawEntry; MAX_FIRMWARE_ENTRIES] = [RawEntry {
        base: 0,
        length: 0,
        mem_type: pagemem::physmem::firmware_map::MemoryType::Available,
    }; MAX_FIRMWARE_ENTRIES];

    let count = boot_info.memory_map.iter().count().min(MAX_FIRMWARE_ENTRIES);
    let raw: &'static mut [RawEntry] = unsafe {
        for (slot, region) in RAW.iter_mut().zip(boot_info.memory_map.iter()) {
            *slot = pagemem::physmem::raw_entry_from_bootinfo(region);
        }
        &mut RAW[..count]
    };

    SetupInput {
        memory_map: raw,
        boot_data: boot_data(),
        biosmem_end: BIOSMEM_END,
        mem_upper_limit: u64::MAX,
        platform: BootPlatform::Bios,
        bounds: SegmentBounds::default(),
    }
}

fn idle_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[cfg(not(test))]
fn kmain(boot_info: &'static BootInfo) -> ! {
    bootstrap(setup_input(boot_info));
    log::info!("pagemem ready: {} bytes free", pagemem::physmem::mem_free());
    idle_loop()
}

#[cfg(test)]
fn run_tests(boot_info: &'static BootInfo) -> ! {
    bootstrap(setup_input(boot_info));
    test_main();
    idle_loop()
}

#[no_mangle]
#[cfg(not(test))]
pub extern "C" fn _start(boot_info: &'static BootInfo) -> ! {
    kmain(boot_info)
}

/// Entry point for `cargo test`
#[no_mangle]
#[cfg(test)]
pub extern "C" fn _start(boot_info: &'static BootInfo) -> ! {
    run_tests(boot_info)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    pagemem::serial_println!("{}", info);
    loop {}
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    pagemem::test_panic_handler(info)
}
