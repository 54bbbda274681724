//! Bootstrap bump heap (`spec.md` §4.C).
//!
//! Adapted from the old `BumpAllocator`, which walked a single iterator of
//! `MemoryArea`s and bumped a forward-only cursor. This version instead
//! owns one carved-out region (found by [`find_bootstrap_region`]) and bumps
//! either up from its base or down from its limit depending on
//! `BootPlatform`, matching the two real-world boot paths this allocator
//! has to support: BIOS/UEFI firmware tends to place early structures low
//! and wants headroom kept above them (top-down), while hypervisor-supplied
//! maps are usually clean enough to bump forward (bottom-up).

use crate::config::PAGE_SIZE;
use crate::init_mutex::InitMutex;
use crate::physmem::boot_data::BootData;
use crate::physmem::firmware_map::FirmwareMap;
use crate::types::PhysicalAddress;

/// Which way the bootstrap heap consumes its region. Modeled as a runtime
/// parameter rather than a `cfg` so both policies stay reachable from the
/// same test binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootPlatform {
    /// Bump down from the top of the region.
    Bios,
    /// Bump up from the bottom of the region.
    Hypervisor,
}

fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}

struct BumpHeap {
    base: u64,
    limit: u64,
    cursor: u64,
    top_down: bool,
}

impl BumpHeap {
    fn new(base: u64, limit: u64, platform: BootPlatform) -> Self {
        let top_down = platform == BootPlatform::Bios;
        Self {
            base,
            limit,
            cursor: if top_down { limit } else { base },
            top_down,
        }
    }

    fn alloc(&mut self, size: usize) -> Option<PhysicalAddress> {
        let size = align_up(size as u64, PAGE_SIZE as u64);
        if self.top_down {
            let candidate = self.cursor.checked_sub(size)?;
            if candidate < self.base {
                return None;
            }
            self.cursor = candidate;
            Some(PhysicalAddress::new(candidate))
        } else {
            let candidate = self.cursor;
            let end = candidate.checked_add(size)?;
            if end > self.limit {
                return None;
            }
            self.cursor = end;
            Some(PhysicalAddress::new(candidate))
        }
    }
}

static HEAP: InitMutex<BumpHeap> = InitMutex::new();

/// Finds the largest available, boot-data-free sub-range of
/// `[biosmem_end, mem_upper_limit)`. That range becomes the bootstrap heap.
pub fn find_bootstrap_region(
    map: &FirmwareMap,
    boot_data: &BootData,
    biosmem_end: u64,
    mem_upper_limit: u64,
) -> Option<(u64, u64)> {
    let mut best: Option<(u64, u64)> = None;
    let mut consider = |base: u64, limit: u64, best: &mut Option<(u64, u64)>| {
        if limit <= base {
            return;
        }
        let better = match best {
            Some((b, l)) => (limit - base) > (*l - *b),
            None => true,
        };
        if better {
            *best = Some((base, limit));
        }
    };

    for (avail_base, avail_limit) in map.available_ranges() {
        let base = avail_base.max(biosmem_end);
        let limit = avail_limit.min(mem_upper_limit);
        if limit <= base {
            continue;
        }
        let mut cursor = base;
        loop {
            match boot_data.find_first_at_or_after(cursor, limit) {
                Some(artifact) => {
                    let gap_limit = artifact.base.clamp(cursor, limit);
                    consider(cursor, gap_limit, &mut best);
                    cursor = artifact.limit.max(cursor);
                    if cursor >= limit {
                        break;
                    }
                }
                None => {
                    consider(cursor, limit, &mut best);
                    break;
                }
            }
        }
    }
    best
}

/// Installs the bootstrap heap over `[base, limit)`. Called once, before any
/// other component in this crate allocates memory.
pub fn init(base: u64, limit: u64, platform: BootPlatform) {
    HEAP.init(BumpHeap::new(base, limit, platform));
}

/// Bumps out `size` bytes, rounded up to `PAGE_SIZE`. Returns `None` once
/// the heap's region is exhausted; callers decide how to fail.
pub fn alloc_phys(size: usize) -> Option<PhysicalAddress> {
    HEAP.lock().alloc(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physmem::firmware_map::{MemoryType, RawEntry};

    fn map(entries: &[RawEntry]) -> FirmwareMap {
        FirmwareMap::from_entries(entries).unwrap()
    }

    #[test_case]
    fn top_down_bumps_downward_and_stops_at_base() {
        let mut heap = BumpHeap::new(0x1000, 0x4000, BootPlatform::Bios);
        let a = heap.alloc(0x1000).unwrap();
        assert_eq!(a.as_u64(), 0x3000);
        let b = heap.alloc(0x1000).unwrap();
        assert_eq!(b.as_u64(), 0x2000);
        let c = heap.alloc(0x1000).unwrap();
        assert_eq!(c.as_u64(), 0x1000);
        assert!(heap.alloc(0x1000).is_none());
    }

    #[test_case]
    fn bottom_up_bumps_upward_and_stops_at_limit() {
        let mut heap = BumpHeap::new(0x1000, 0x4000, BootPlatform::Hypervisor);
        let a = heap.alloc(0x1000).unwrap();
        assert_eq!(a.as_u64(), 0x1000);
        let b = heap.alloc(0x1000).unwrap();
        assert_eq!(b.as_u64(), 0x2000);
        let c = heap.alloc(0x1000).unwrap();
        assert_eq!(c.as_u64(), 0x3000);
        assert!(heap.alloc(0x1000).is_none());
    }

    #[test_case]
    fn alloc_rounds_up_to_page_size() {
        let mut heap = BumpHeap::new(0, 0x10000, BootPlatform::Hypervisor);
        let a = heap.alloc(1).unwrap();
        assert_eq!(a.as_u64(), 0);
        let b = heap.alloc(1).unwrap();
        assert_eq!(b.as_u64(), PAGE_SIZE as u64);
    }

    #[test_case]
    fn finds_largest_gap_skipping_boot_data() {
        let m = map(&[RawEntry {
            base: 0,
            length: 0x10_0000,
            mem_type: MemoryType::Available,
        }]);
        let mut bd = BootData::new();
        // A kernel image sitting right in the middle splits the available
        // range into a small gap and a large one; the large one should win.
        bd.add(0x1000, 0x1000).unwrap();
        bd.add(0x8_0000, 0x1000).unwrap();
        let (base, limit) = find_bootstrap_region(&m, &bd, 0, 0x10_0000).unwrap();
        assert_eq!(base, 0x8_1000);
        assert_eq!(limit, 0x10_0000);
    }

    #[test_case]
    fn region_respects_biosmem_end_and_upper_limit() {
        let m = map(&[RawEntry {
            base: 0,
            length: 0x10_0000,
            mem_type: MemoryType::Available,
        }]);
        let bd = BootData::new();
        let (base, limit) = find_bootstrap_region(&m, &bd, 0x1000, 0x8000).unwrap();
        assert_eq!(base, 0x1000);
        assert_eq!(limit, 0x8000);
    }
}
