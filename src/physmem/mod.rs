//! Physical page allocator.
//!
//! Ties together the firmware map normalizer (§4.A), boot-data locator
//! (§4.B), bootstrap bump heap (§4.C), segment planner and buddy core
//! (§4.D/F), page descriptor table (§4.E), per-CPU order-0 cache (§4.G),
//! and allocator façade (§4.H) behind the boot-time orchestration in
//! [`bootstrap`].

pub mod boot_data;
pub mod bootstrap;
pub mod bump;
pub mod descriptor;
pub mod facade;
pub mod firmware_map;
pub mod percpu_cache;
pub mod segment;

pub use descriptor::PageType;
pub use facade::{
    alloc, free, info_all, lookup, manage, mem_free, mem_size, ready, seg_name, set_type,
    AllocatedFrame,
};
pub use firmware_map::{MemoryType, RawEntry};
pub use segment::Selector;

use bootloader::bootinfo::{MemoryRegion, MemoryRegionType};

/// Converts one bootloader-supplied region into the `RawEntry` this crate's
/// firmware map normalizer consumes. `Usable` maps to `Available`;
/// `AcpiReclaimable` and `AcpiNvs` keep their own `MemoryType` so a later
/// ACPI table walk (out of scope here) can still find them; `BadMemory`
/// becomes `Unusable`; everything else — bootloader structures, the kernel
/// image, page tables the bootloader built — is `Reserved`, since all of it
/// is non-reclaimable at this layer regardless of why.
pub fn raw_entry_from_bootinfo(region: &MemoryRegion) -> RawEntry {
    let mem_type = match region.region_type {
        MemoryRegionType::Usable => MemoryType::Available,
        MemoryRegionType::AcpiReclaimable => MemoryType::Acpi,
        MemoryRegionType::AcpiNvs => MemoryType::AcpiNvs,
        MemoryRegionType::BadMemory => MemoryType::Unusable,
        _ => MemoryType::Reserved,
    };
    let base = region.range.start_addr();
    let length = region.range.end_addr() - base;
    RawEntry {
        base,
        length,
        mem_type,
    }
}
