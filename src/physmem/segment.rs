//! Segment planner and buddy core (`spec.md` §4.D and §4.F).
//!
//! The planner carves the normalized firmware map into the four
//! addressability classes `spec.md` §3 names — DMA, DMA32, DIRECTMAP,
//! HIGHMEM, in increasing index / decreasing restriction order — aliasing
//! or eliding classes an empty firmware map leaves with no backing pages.
//! It generalizes the teacher's own three-way split
//! (`physmem/frame_database.rs`'s `LOW_REGION`/`NORMAL_REGION`/`HIGH_REGION`)
//! from three fixed ranges to four spec-defined ones.
//!
//! Each resulting [`Segment`] owns its own buddy core: one free list per
//! order, `0..MAX_ORDER`, of pages whose size is a power of two. Splitting
//! happens on demand at alloc time; merging walks the buddy-address chain
//! at free time. Both operate only on the descriptors stolen for this
//! segment by `physmem::descriptor`, never on a heap.

use crate::config::{self, MAX_ORDER, UNLISTED};
use crate::physmem::descriptor::{DescriptorAdapter, PageDescriptor, PageType};
use crate::physmem::percpu_cache::PerCpuCache;
use crate::types::PhysicalAddress;
use intrusive_collections::LinkedList;
use spin::Mutex;

/// Addressability class, also the segment's index. Ascending index means
/// decreasing restriction: a DIRECTMAP page satisfies a DMA32 request, but
/// not the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Selector {
    Dma = 0,
    Dma32 = 1,
    DirectMap = 2,
    HighMem = 3,
}

pub const SEGMENT_NAMES: [&str; config::NUM_SEGMENT_CLASSES] =
    ["DMA", "DMA32", "DIRECTMAP", "HIGHMEM"];

/// Canonical upper bounds (exclusive) used to carve the normalized map,
/// before aliasing/elision: DMA is the low 16 MiB, DMA32 the low 4 GiB,
/// DIRECTMAP everything the direct map covers, HIGHMEM whatever remains.
pub struct SegmentBounds {
    pub dma_limit: u64,
    pub dma32_limit: u64,
    pub directmap_limit: u64,
}

impl Default for SegmentBounds {
    fn default() -> Self {
        Self {
            dma_limit: 16 * 1024 * 1024,
            dma32_limit: 4u64 * 1024 * 1024 * 1024,
            directmap_limit: u64::MAX,
        }
    }
}

struct FreeListState {
    free_lists: [LinkedList<DescriptorAdapter>; MAX_ORDER],
    nr_free_pages: usize,
}

/// One addressability class's worth of managed memory: a contiguous
/// `[start, end)` physical range, the descriptor slice for its pages, a
/// buddy free-list set, and one order-0 cache per logical CPU.
pub struct Segment {
    pub index: u8,
    pub name: &'static str,
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
    descriptors: &'static [PageDescriptor],
    state: Mutex<FreeListState>,
    caches: [PerCpuCache; config::MAX_CPUS],
}

unsafe impl Sync for Segment {}

// `Segment` holds a `&'static [PageDescriptor]` (`PageDescriptor` is `!Sync`
// via its `LinkedListLink` cell, making the reference `!Send`) and a
// `Mutex<FreeListState>` of intrusive lists, neither of which is auto-`Send`.
// Both are only ever touched with the segment's own lock held (`state`) or
// through `descriptor_for`'s read-only arithmetic, so handing a `Segment` to
// another CPU — which is exactly what publishing it through a process-wide
// `Once` does — is sound under the same lock discipline that already makes
// `Sync` sound above.
unsafe impl Send for Segment {}

impl Segment {
    pub fn new(
        index: u8,
        name: &'static str,
        start: PhysicalAddress,
        end: PhysicalAddress,
        descriptors: &'static [PageDescriptor],
    ) -> Self {
        let page_count = descriptors.len();
        let capacity = (page_count + config::CACHE_DIVISOR - 1) / config::CACHE_DIVISOR;
        let capacity = capacity.clamp(config::CACHE_MIN_CAPACITY, config::CACHE_MAX_CAPACITY);

        const EMPTY: PerCpuCache = PerCpuCache::empty();
        let caches = [EMPTY; config::MAX_CPUS];
        for c in caches.iter() {
            c.configure(capacity);
        }

        Self {
            index,
            name,
            start,
            end,
            descriptors,
            state: Mutex::new(FreeListState {
                free_lists: [const { LinkedList::new(DescriptorAdapter::NEW) }; MAX_ORDER],
                nr_free_pages: 0,
            }),
            caches,
        }
    }

    pub fn page_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn nr_free_pages(&self) -> usize {
        self.state.lock().nr_free_pages
    }

    pub fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.start.as_u64() && pa.as_u64() < self.end.as_u64()
    }

    /// Looks up the descriptor for `pa`, or `None` if it falls outside this
    /// segment.
    pub fn descriptor_for(&self, pa: PhysicalAddress) -> Option<&'static PageDescriptor> {
        if !self.contains(pa) {
            return None;
        }
        let idx = ((pa.as_u64() - self.start.as_u64()) / config::PAGE_SIZE as u64) as usize;
        Some(&self.descriptors[idx])
    }

    fn frame_index(&self, d: &'static PageDescriptor) -> usize {
        let base = self.descriptors.as_ptr() as usize;
        let p = d as *const PageDescriptor as usize;
        (p - base) / core::mem::size_of::<PageDescriptor>()
    }

    /// Brings a freshly-built segment's entire range online as one maximal
    /// run of free blocks, largest order first. Called once per segment
    /// during `physmem::bootstrap::free_usable`.
    pub fn manage_all(&self) {
        let mut index = 0usize;
        let total = self.descriptors.len();
        let mut state = self.state.lock();
        while index < total {
            let mut order = MAX_ORDER - 1;
            while order > 0 && (index % (1 << order) != 0 || index + (1 << order) > total) {
                order -= 1;
            }
            unsafe { self.descriptors[index].set_order(order as u8) };
            unsafe { self.descriptors[index].set_page_type(PageType::Free) };
            state.free_lists[order].push_front(&self.descriptors[index]);
            state.nr_free_pages += 1 << order;
            index += 1 << order;
        }
    }

    /// Order-`order` allocation straight from the buddy core, bypassing any
    /// per-CPU cache. `spec.md` §4.F: split on demand, LIFO free lists.
    pub fn buddy_alloc(&self, order: usize) -> Option<&'static PageDescriptor> {
        let mut state = self.state.lock();
        let mut j = order;
        while j < MAX_ORDER && state.free_lists[j].is_empty() {
            j += 1;
        }
        if j >= MAX_ORDER {
            return None;
        }
        let head = state.free_lists[j].pop_front().unwrap();
        let mut block_index = self.frame_index(head);
        while j > order {
            j -= 1;
            let upper_index = block_index + (1 << j);
            let upper = &self.descriptors[upper_index];
            unsafe { upper.set_order(j as u8) };
            state.free_lists[j].push_front(upper);
        }
        // Leave the page type as `Free` here — the caller (`facade::alloc`)
        // tags the whole block with its own type on the way out. Untagged,
        // a page sitting in a per-CPU cache after this same path (order 0)
        // would otherwise misreport `Kernel` to `lookup` while still idle.
        unsafe {
            head.set_order(UNLISTED);
        }
        state.nr_free_pages -= 1 << order;
        Some(head)
    }

    /// Frees an order-`order` block whose head is `d`, merging with its
    /// buddy at every order where the buddy is itself a free head of the
    /// same order.
    pub fn buddy_free(&self, d: &'static PageDescriptor, order: usize) {
        let freed_pages = 1usize << order;
        let mut index = self.frame_index(d);
        let mut order = order;
        let mut state = self.state.lock();
        while order < MAX_ORDER - 1 {
            let buddy_index = index ^ (1usize << order);
            if buddy_index >= self.descriptors.len() {
                break;
            }
            let buddy = &self.descriptors[buddy_index];
            if buddy.order() != order as u8 {
                break;
            }
            let mut cursor = unsafe { state.free_lists[order].cursor_mut_from_ptr(buddy) };
            cursor.remove();
            unsafe { buddy.set_order(UNLISTED) };
            index &= !((1usize << (order + 1)) - 1);
            order += 1;
        }
        let head = &self.descriptors[index];
        unsafe {
            head.set_order(order as u8);
            head.set_page_type(PageType::Free);
        }
        state.free_lists[order].push_front(head);
        state.nr_free_pages += freed_pages;
    }

    pub fn cache(&self, cpu: usize) -> &PerCpuCache {
        &self.caches[cpu]
    }
}

/// Carves `map`'s available ranges into up to four segments per `bounds`,
/// eliding a class entirely when it would be empty and aliasing the
/// request down to the next-most-restrictive populated class (handled by
/// the facade's selector walk, not here — this just decides which indices
/// exist).
pub fn plan_ranges(
    map: &crate::physmem::firmware_map::FirmwareMap,
    bounds: &SegmentBounds,
) -> [Option<(PhysicalAddress, PhysicalAddress)>; config::NUM_SEGMENT_CLASSES] {
    let class_limits = [
        bounds.dma_limit,
        bounds.dma32_limit,
        bounds.directmap_limit,
        u64::MAX,
    ];
    let mut out: [Option<(PhysicalAddress, PhysicalAddress)>; config::NUM_SEGMENT_CLASSES] =
        [None; config::NUM_SEGMENT_CLASSES];

    for (avail_base, avail_limit) in map.available_ranges() {
        let mut lo = avail_base;
        for (idx, &class_limit) in class_limits.iter().enumerate() {
            if lo >= avail_limit {
                break;
            }
            let hi = avail_limit.min(class_limit);
            if hi > lo {
                let entry = out[idx].get_or_insert((PhysicalAddress::new(lo), PhysicalAddress::new(hi)));
                entry.0 = PhysicalAddress::new(entry.0.as_u64().min(lo));
                entry.1 = PhysicalAddress::new(entry.1.as_u64().max(hi));
            }
            lo = hi;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physmem::firmware_map::{FirmwareMap, MemoryType, RawEntry};

    /// Boot-time unit tests have no live bump heap to back
    /// `descriptor::create_table` with, so they build a small fixed-size
    /// table directly from the crate-private constructor instead.
    mod fixture {
        use crate::physmem::descriptor::PageDescriptor;
        use crate::types::PhysicalAddress;

        const CAPACITY: usize = 64;

        static mut BACKING: [PageDescriptor; CAPACITY] =
            [const { PageDescriptor::new(unsafe { PhysicalAddress::new_unsafe(0) }, 0) }; CAPACITY];

        /// # Safety
        /// Not safe to call concurrently with another live `&'static`
        /// slice from a previous call; the serial test runner never does.
        pub fn table(count: usize) -> &'static [PageDescriptor] {
            assert!(count <= CAPACITY);
            unsafe {
                for i in 0..count {
                    BACKING[i] = PageDescriptor::new(PhysicalAddress::new((i as u64) * 4096), 0);
                }
                &BACKING[..count]
            }
        }
    }

    #[test_case]
    fn manage_all_covers_every_page_exactly_once() {
        let table = fixture::table(24);
        let seg = Segment::new(
            0,
            "TEST",
            PhysicalAddress::new(0),
            PhysicalAddress::new(24 * 4096),
            table,
        );
        seg.manage_all();
        assert_eq!(seg.nr_free_pages(), 24);
    }

    #[test_case]
    fn alloc_then_free_restores_full_merge() {
        let table = fixture::table(8);
        let seg = Segment::new(
            0,
            "TEST",
            PhysicalAddress::new(0),
            PhysicalAddress::new(8 * 4096),
            table,
        );
        seg.manage_all();
        let before = seg.nr_free_pages();
        let d0 = seg.buddy_alloc(0).unwrap();
        let d1 = seg.buddy_alloc(0).unwrap();
        assert_eq!(seg.nr_free_pages(), before - 2);
        seg.buddy_free(d0, 0);
        seg.buddy_free(d1, 0);
        assert_eq!(seg.nr_free_pages(), before);
    }

    #[test_case]
    fn plan_ranges_elides_empty_classes() {
        let input = [RawEntry {
            base: 0,
            length: 0x10_0000,
            mem_type: MemoryType::Available,
        }];
        let map = FirmwareMap::from_entries(&input).unwrap();
        let bounds = SegmentBounds {
            dma_limit: 0,
            dma32_limit: 0,
            directmap_limit: 0x10_0000,
        };
        let planned = plan_ranges(&map, &bounds);
        assert!(planned[Selector::Dma as usize].is_none());
        assert!(planned[Selector::Dma32 as usize].is_none());
        assert!(planned[Selector::DirectMap as usize].is_some());
        assert!(planned[Selector::HighMem as usize].is_none());
    }
}
