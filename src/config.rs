//! Compile-time tunables for the physical page allocator.
//!
//! Grouped the way Theseus's `kernel_config` crate groups its constants: one
//! module of `pub const`s instead of a runtime config format, since the
//! bootstrap allocator runs before there is a filesystem or environment to
//! read configuration from.

/// Page granularity managed by the allocator. 4 KiB on all currently
/// supported targets.
pub const PAGE_SIZE: usize = 4096;

/// Number of free-list orders per segment. Order `MAX_ORDER - 1` blocks are
/// `2^(MAX_ORDER-1)` pages; with `PAGE_SIZE = 4096` and `MAX_ORDER = 11` that
/// is a 4 MiB maximum block.
pub const MAX_ORDER: usize = 11;

/// Sentinel `order` value carried by every non-head page of a free block,
/// and by every page that is not currently the head of any free block.
pub const UNLISTED: u8 = 0xff;

/// Maximum number of raw firmware memory-map entries accepted as input.
pub const MAX_FIRMWARE_ENTRIES: usize = 128;

/// Working-buffer capacity for the overlap resolver, which may split an
/// entry in two; sized at twice the input capacity per `spec.md` §4.A.
pub const MAX_FIRMWARE_WORKING_ENTRIES: usize = MAX_FIRMWARE_ENTRIES * 2;

/// Upper bound on the number of boot-data (non-reclaimable artifact) ranges
/// tracked by `physmem::boot_data`: kernel image, command line, module
/// table, per-module image + command line, and a handful of ELF section
/// records.
pub const MAX_BOOT_DATA_RANGES: usize = 16;

/// Upper bound on logical CPUs. The teacher crate's bootimage test metadata
/// already boots under `-smp cpus=4`; 64 comfortably covers realistic
/// boot/test configurations without heap-allocating the per-CPU cache array.
pub const MAX_CPUS: usize = 64;

/// Per-CPU cache capacity is `ceil(segment_pages / CACHE_DIVISOR)`, clamped
/// to `[CACHE_MIN_CAPACITY, CACHE_MAX_CAPACITY]`.
pub const CACHE_DIVISOR: usize = 1024;
pub const CACHE_MIN_CAPACITY: usize = 1;
pub const CACHE_MAX_CAPACITY: usize = 128;

/// Number of addressability segments named by `spec.md` §3: DMA, DMA32,
/// DIRECTMAP, HIGHMEM, in increasing-index / decreasing-restriction order.
pub const NUM_SEGMENT_CLASSES: usize = 4;

static_assertions::const_assert!(MAX_ORDER < (u8::MAX as usize));
static_assertions::const_assert!(PAGE_SIZE.is_power_of_two());
static_assertions::const_assert!(CACHE_MIN_CAPACITY <= CACHE_MAX_CAPACITY);
