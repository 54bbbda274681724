//! Boot-time orchestration (`spec.md` §6).
//!
//! Sequences components A through H into the handful of named calls the
//! rest of boot-time code needs: `setup` does everything up through
//! publishing segments, leaving the bootstrap heap alive so (out-of-scope)
//! arch code can keep calling `bootalloc` for its own early page tables and
//! stacks; `free_usable` is called last, once nothing else needs the
//! bootstrap heap, to hand whatever's left to the buddy core. `bootstrap`
//! is the convenience wrapper this crate's own `main.rs` uses, running both
//! steps back to back.

use crate::config;
use crate::physmem::boot_data::BootData;
use crate::physmem::bump::{self, BootPlatform};
use crate::physmem::descriptor::{self, PageType, SegmentSpec};
use crate::physmem::facade;
use crate::physmem::firmware_map::{FirmwareMap, RawEntry};
use crate::physmem::segment::{Segment, SegmentBounds};
use crate::platform;
use crate::types::PhysicalAddress;

/// Everything `setup` needs that this crate can't discover on its own.
pub struct SetupInput<'a> {
    pub memory_map: &'a [RawEntry],
    pub boot_data: BootData,
    pub biosmem_end: u64,
    pub mem_upper_limit: u64,
    pub platform: BootPlatform,
    pub bounds: SegmentBounds,
}

/// What `setup` hands back so a later `free_usable` call can walk the same
/// normalized map and artifact list.
pub struct SetupOutput {
    pub map: FirmwareMap,
    pub boot_data: BootData,
}

/// Normalizes the firmware map, carves out and installs the bootstrap heap,
/// plans segments, builds the page descriptor table, and publishes the
/// resulting segments through [`facade`]. Leaves every available page other
/// than the bootstrap heap region, the descriptor table, and `boot_data`'s
/// artifacts untouched — none of it is handed to the buddy core yet.
pub fn setup(input: SetupInput) -> SetupOutput {
    crate::serial::init_logger();

    let map = FirmwareMap::from_entries(input.memory_map)
        .unwrap_or_else(|_| platform::kernel_panic("firmware memory map normalization failed"));
    log::info!(
        "firmware map normalized: {} bytes available",
        map.available_bytes()
    );

    let (heap_base, heap_limit) = bump::find_bootstrap_region(
        &map,
        &input.boot_data,
        input.biosmem_end,
        input.mem_upper_limit,
    )
    .unwrap_or_else(|| platform::kernel_panic("no usable bootstrap heap region found"));
    bump::init(heap_base, heap_limit, input.platform);
    log::info!("bootstrap heap: {:#x}..{:#x}", heap_base, heap_limit);

    let ranges = crate::physmem::segment::plan_ranges(&map, &input.bounds);
    let mut spec_storage = [
        SegmentSpec { index: 0, start: PhysicalAddress::new(0), end: PhysicalAddress::new(0) },
        SegmentSpec { index: 1, start: PhysicalAddress::new(0), end: PhysicalAddress::new(0) },
        SegmentSpec { index: 2, start: PhysicalAddress::new(0), end: PhysicalAddress::new(0) },
        SegmentSpec { index: 3, start: PhysicalAddress::new(0), end: PhysicalAddress::new(0) },
    ];
    let mut spec_count = 0;
    for (idx, range) in ranges.iter().enumerate() {
        if let Some((start, end)) = range {
            spec_storage[spec_count] = SegmentSpec {
                index: idx as u8,
                start: *start,
                end: *end,
            };
            spec_count += 1;
        }
    }
    let specs = &spec_storage[..spec_count];

    let (table, offsets): (&'static mut [_], _) = descriptor::create_table(specs);
    let table: &'static [_] = &*table;

    let mut segments: [Option<Segment>; config::NUM_SEGMENT_CLASSES] = [None, None, None, None];
    for spec in specs {
        let (offset, count) = offsets[spec.index as usize];
        let slice = &table[offset..offset + count];
        segments[spec.index as usize] = Some(Segment::new(
            spec.index,
            crate::physmem::segment::SEGMENT_NAMES[spec.index as usize],
            spec.start,
            spec.end,
            slice,
        ));
    }
    facade::publish(segments);
    log::info!("physical page allocator ready: {} bytes managed", facade::mem_size());

    SetupOutput {
        map,
        boot_data: input.boot_data,
    }
}

/// Steals `nr_pages` pages from the bootstrap heap, panicking if none
/// remain: `spec.md` §7 classifies bootstrap exhaustion as unrecoverable.
pub fn bootalloc(nr_pages: usize) -> PhysicalAddress {
    bump::alloc_phys(nr_pages * config::PAGE_SIZE)
        .unwrap_or_else(|| platform::kernel_panic("bootalloc: bootstrap heap exhausted"))
}

/// Size in bytes of the `DIRECTMAP` segment, for the (out-of-scope) pmap
/// layer to size its direct map against.
pub fn directmap_size() -> u64 {
    facade::directmap_size()
}

/// Walks every `Available` page in `map` not claimed by `boot_data` or
/// already marked `Table`/`Reserved`-for-other-reasons, and hands it to its
/// segment's buddy core. Iterating in ascending address order lets
/// `Segment::buddy_free`'s merge-on-free coalesce adjacent order-0 frees
/// back into the largest aligned blocks as it goes, the same way a fresh
/// segment would be brought up one page at a time instead of in one bulk
/// `manage_all` call.
pub fn free_usable(output: &SetupOutput) {
    let page_size = config::PAGE_SIZE as u64;
    let mut freed = 0u64;
    for (base, limit) in output.map.available_ranges() {
        let mut addr = base;
        while addr < limit {
            let pa = PhysicalAddress::new(addr);
            if !output.boot_data.contains(addr) {
                if let Some(d) = facade::lookup(pa) {
                    if d.page_type() == PageType::Reserved {
                        facade::manage(pa);
                        freed += page_size;
                    }
                }
            }
            addr += page_size;
        }
    }
    log::info!("free_usable: {} bytes released to the buddy core", freed);
}

/// Convenience wrapper running `setup` then `free_usable` back to back, for
/// callers with no arch-specific bootstrap-heap consumers of their own
/// between the two steps.
pub fn bootstrap(input: SetupInput) {
    let output = setup(input);
    free_usable(&output);
}
