//! Allocator façade (`spec.md` §4.H).
//!
//! The single surface every other subsystem in the kernel is meant to call.
//! Generalizes the segment-fallback chains already hand-written in the
//! teacher's `physmem/mod.rs` (`allocate_kernel_frame`/`allocate_user_frame`,
//! each a two- or three-step "try this segment, then that one") into one
//! `selector`-indexed walk down to segment 0.
//!
//! Segment storage uses `spin::Once` rather than this crate's own
//! `InitMutex`: `InitMutex::lock()` reacquires a spinlock on every access,
//! which would serialize every allocator call on every CPU behind one
//! global lock — exactly the contention §5's per-segment, per-CPU locking
//! is meant to avoid. `Once::get()` after initialization is a single atomic
//! load with no lock held, leaving segment- and cache-level locking as the
//! only contention points.

use crate::config::{self, PAGE_SIZE};
use crate::physmem::descriptor::{PageDescriptor, PageType};
use crate::physmem::segment::{Segment, Selector, SEGMENT_NAMES};
use crate::platform::{self, PinGuard};
use crate::types::PhysicalAddress;
use spin::Once;

static SEGMENTS: Once<[Option<Segment>; config::NUM_SEGMENT_CLASSES]> = Once::new();

pub(crate) fn publish(segments: [Option<Segment>; config::NUM_SEGMENT_CLASSES]) {
    SEGMENTS.call_once(|| segments);
}

/// Whether `bootstrap`/`setup` has published segments yet.
pub fn ready() -> bool {
    SEGMENTS.get().is_some()
}

fn segments() -> &'static [Option<Segment>; config::NUM_SEGMENT_CLASSES] {
    SEGMENTS
        .get()
        .expect("physmem::facade used before bootstrap() published segments")
}

/// A single allocated block: its physical address and the descriptor
/// backing it. `order` is carried separately by the caller, matching
/// `spec.md` §4.H ("the caller must remember the order it allocated with").
#[derive(Clone, Copy)]
pub struct AllocatedFrame {
    pub phys_addr: PhysicalAddress,
    descriptor: &'static PageDescriptor,
}

/// Resolves `selector` to a starting segment index per `spec.md` §4.D's
/// aliasing rule: saturate down to the highest loaded segment at or below
/// `selector`, or — if none is loaded that low — alias up to the lowest
/// loaded segment above it. `None` only when no segment is loaded at all.
fn resolve_start(selector: usize) -> Option<usize> {
    let segs = segments();
    (0..=selector)
        .rev()
        .find(|&idx| segs[idx].is_some())
        .or_else(|| (selector + 1..segs.len()).find(|&idx| segs[idx].is_some()))
}

/// Allocates a `2^order`-page block from `selector`'s segment (resolved per
/// [`resolve_start`]), falling back to each more-restrictive loaded segment
/// in turn if the resolved one is exhausted. Every descriptor in the block
/// is tagged `page_type`, not just the head, so `lookup` reports the right
/// type for any address the caller later hands back in. On exhaustion of
/// every segment, a `Pmap` request panics — `spec.md` §4.H: the pmap layer
/// has nowhere else to turn for page-table pages.
pub fn alloc(order: usize, selector: Selector, page_type: PageType) -> Option<AllocatedFrame> {
    let guard = PinGuard::new();
    let cpu = guard.cpu();
    if let Some(mut idx) = resolve_start(selector as usize) {
        loop {
            if let Some(seg) = &segments()[idx] {
                let found = if order == 0 {
                    seg.cache(cpu).alloc0(seg)
                } else {
                    seg.buddy_alloc(order)
                };
                if let Some(d) = found {
                    tag_block(seg, d, order, page_type);
                    return Some(AllocatedFrame {
                        phys_addr: d.phys_addr(),
                        descriptor: d,
                    });
                }
            }
            if idx == 0 {
                break;
            }
            idx -= 1;
        }
    }
    if page_type == PageType::Pmap {
        platform::kernel_panic("physmem::alloc: page table allocation exhausted every segment");
    }
    None
}

/// Returns a block previously obtained from `alloc` with the same `order`.
/// Re-tags the whole block `Free` before handing it to the cache/buddy core,
/// so any address inside it reports `Free` even before the buddy core has
/// re-coalesced it into a single free head.
pub fn free(frame: AllocatedFrame, order: usize) {
    let guard = PinGuard::new();
    let cpu = guard.cpu();
    let seg = segment_for(frame.descriptor.seg_index());
    tag_block(seg, frame.descriptor, order, PageType::Free);
    if order == 0 {
        seg.cache(cpu).free0(seg, frame.descriptor);
    } else {
        seg.buddy_free(frame.descriptor, order);
    }
}

fn tag_block(seg: &Segment, head: &'static PageDescriptor, order: usize, page_type: PageType) {
    let page_size = PAGE_SIZE as u64;
    let base = head.phys_addr().as_u64();
    for i in 0..(1usize << order) {
        let pa = PhysicalAddress::new(base + i as u64 * page_size);
        if let Some(d) = seg.descriptor_for(pa) {
            unsafe { d.set_page_type(page_type) };
        }
    }
}

fn segment_for(index: u8) -> &'static Segment {
    segments()[index as usize]
        .as_ref()
        .expect("operating on a segment index with no loaded segment")
}

/// Finds the descriptor backing `pa`, scanning the handful of loaded
/// segments linearly (at most `NUM_SEGMENT_CLASSES`, per `spec.md` §4.H).
pub fn lookup(pa: PhysicalAddress) -> Option<&'static PageDescriptor> {
    segments()
        .iter()
        .flatten()
        .find_map(|seg| seg.descriptor_for(pa))
}

/// `manage(descriptor)`: the one-way `Reserved` → `Free` transition
/// `free_usable` performs once per bootstrap-discovered page, handing it to
/// its segment's buddy core. A no-op for any page not currently `Reserved`
/// (already-free or still-boot-data pages are left untouched).
pub fn manage(pa: PhysicalAddress) {
    if let Some(d) = lookup(pa) {
        if d.page_type() == PageType::Reserved {
            let seg = segment_for(d.seg_index());
            unsafe { d.set_page_type(PageType::Free) };
            seg.buddy_free(d, 0);
        }
    }
}

/// Overwrites the page type of a whole `2^order` block starting at `pa`
/// without touching free-list membership. For out-of-scope consumers
/// reclassifying pages they already hold the allocation for (e.g. the pmap
/// layer retiring a `Table` page back to `Kernel` use).
pub fn set_type(pa: PhysicalAddress, order: usize, page_type: PageType) {
    if let Some(d) = lookup(pa) {
        let seg = segment_for(d.seg_index());
        tag_block(seg, d, order, page_type);
    }
}

pub fn seg_name(selector: Selector) -> &'static str {
    SEGMENT_NAMES[selector as usize]
}

/// `(selector, page_count, nr_free_pages)` for each loaded segment.
pub fn info_all() -> impl Iterator<Item = (Selector, usize, usize)> {
    const SELECTORS: [Selector; config::NUM_SEGMENT_CLASSES] = [
        Selector::Dma,
        Selector::Dma32,
        Selector::DirectMap,
        Selector::HighMem,
    ];
    SELECTORS
        .iter()
        .copied()
        .zip(segments().iter())
        .filter_map(|(sel, seg)| seg.as_ref().map(|s| (sel, s.page_count(), s.nr_free_pages())))
}

/// Total bytes managed, excluding `HIGHMEM`: the firmware map this crate
/// was ported from under-counts high memory in its own size accounting and
/// `spec.md`'s design notes call that out as a quirk to preserve, not fix.
pub fn mem_size() -> u64 {
    sum_excluding_highmem(|seg| seg.page_count())
}

/// Total free bytes, excluding `HIGHMEM` for the same reason as `mem_size`.
pub fn mem_free() -> u64 {
    sum_excluding_highmem(|seg| seg.nr_free_pages())
}

fn sum_excluding_highmem(f: impl Fn(&Segment) -> usize) -> u64 {
    segments()
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != Selector::HighMem as usize)
        .filter_map(|(_, seg)| seg.as_ref())
        .map(|seg| f(seg) as u64 * PAGE_SIZE as u64)
        .sum()
}

/// Size in bytes of the `DIRECTMAP` segment, if loaded. Informs the
/// (out-of-scope) pmap layer how large a region to map.
pub fn directmap_size() -> u64 {
    segments()[Selector::DirectMap as usize]
        .as_ref()
        .map(|seg| seg.page_count() as u64 * PAGE_SIZE as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // `SEGMENTS` is a single process-wide `Once`, so only one test in this
    // binary may call `publish`. Everything this module needs to check
    // about `alloc`/`free`/`manage`/`lookup` lives in this one test.
    mod fixture {
        use crate::physmem::descriptor::PageDescriptor;
        use crate::types::PhysicalAddress;

        const CAPACITY: usize = 16;

        static mut BACKING: [PageDescriptor; CAPACITY] =
            [const { PageDescriptor::new(unsafe { PhysicalAddress::new_unsafe(0) }, 0) }; CAPACITY];

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

    // Only DIRECTMAP (index 2) is loaded, mirroring `spec.md` §8 scenario
    // S5 (a machine with no separate DMA/DMA32 pools). Exercises the
    // selector-aliasing walk alongside tag/free/manage, since `SEGMENTS`
    // is a single process-wide `Once` and only one test in this binary may
    // call `publish`.
    #[test_case]
    fn alloc_aliases_up_and_tags_whole_block_free_restores_free() {
        let table = fixture::table(8);
        let seg = Segment::new(
            2,
            "TEST",
            PhysicalAddress::new(0),
            PhysicalAddress::new(8 * PAGE_SIZE as u64),
            table,
        );
        seg.manage_all();

        let mut segments: [Option<Segment>; config::NUM_SEGMENT_CLASSES] = [None, None, None, None];
        segments[2] = Some(seg);
        publish(segments);

        // S5: a DMA32 request with only DIRECTMAP loaded must alias up to it.
        let frame =
            alloc(2, Selector::Dma32, PageType::Kernel).expect("aliases up to DIRECTMAP");
        for i in 0..4u64 {
            let pa = PhysicalAddress::new(frame.phys_addr.as_u64() + i * PAGE_SIZE as u64);
            assert_eq!(lookup(pa).unwrap().page_type(), PageType::Kernel);
        }

        free(frame, 2);
        for i in 0..4u64 {
            let pa = PhysicalAddress::new(frame.phys_addr.as_u64() + i * PAGE_SIZE as u64);
            assert_eq!(lookup(pa).unwrap().page_type(), PageType::Free);
        }

        // `manage` only acts on `Reserved` pages; a page already `Free`
        // (like the block just returned) is left alone, not double-freed
        // into the buddy lists.
        let before = mem_free();
        manage(frame.phys_addr);
        assert_eq!(mem_free(), before);
    }
}
