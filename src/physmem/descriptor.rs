//! Page descriptor table (`spec.md` §4.E).
//!
//! One [`PageDescriptor`] per managed physical page, stolen through
//! [`crate::platform::pmap_steal_memory`] as a single contiguous table
//! before the allocator the table serves exists. Descriptors are linked
//! into the buddy core's per-order free lists intrusively
//! (`intrusive_collections::LinkedList`), the same pattern
//! `scheduler/task.rs` uses for its ready lists, so that building or
//! walking a free list never needs a heap.

use core::cell::UnsafeCell;

use crate::config::UNLISTED;
use crate::types::PhysicalAddress;
use intrusive_collections::{intrusive_adapter, LinkedListLink};

/// What a page is currently doing. `Free` pages are reachable from a
/// segment's free lists; every other state means "not free," regardless of
/// which subsystem owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Free,
    Reserved,
    Table,
    Pmap,
    Kernel,
}

/// Metadata for one physical page. Lives inside the descriptor table, never
/// moves, and is only ever mutated while the owning segment's free-list
/// lock is held (see [`crate::physmem::segment`]).
pub struct PageDescriptor {
    link: LinkedListLink,
    phys_addr: PhysicalAddress,
    seg_index: u8,
    /// `UNLISTED` unless this descriptor is the head of a free block, in
    /// which case it is that block's order.
    order: UnsafeCell<u8>,
    page_type: UnsafeCell<PageType>,
    /// Opaque caller-defined tag; `manage`/`set_type` leave this at 0.
    private: UnsafeCell<usize>,
}

// SAFETY: mutation through the `UnsafeCell` fields only ever happens while
// the owning segment's free-list lock is held (see the `unsafe fn set_*`
// methods below), so concurrent access is externally synchronized.
unsafe impl Sync for PageDescriptor {}

intrusive_adapter!(pub DescriptorAdapter = &'static PageDescriptor: PageDescriptor { link: LinkedListLink });

impl PageDescriptor {
    pub(crate) const fn new(phys_addr: PhysicalAddress, seg_index: u8) -> Self {
        Self {
            link: LinkedListLink::new(),
            phys_addr,
            seg_index,
            order: UnsafeCell::new(UNLISTED),
            page_type: UnsafeCell::new(PageType::Reserved),
            private: UnsafeCell::new(0),
        }
    }

    pub fn phys_addr(&self) -> PhysicalAddress {
        self.phys_addr
    }

    pub fn seg_index(&self) -> u8 {
        self.seg_index
    }

    pub fn order(&self) -> u8 {
        unsafe { *self.order.get() }
    }

    pub fn page_type(&self) -> PageType {
        unsafe { *self.page_type.get() }
    }

    pub fn private(&self) -> usize {
        unsafe { *self.private.get() }
    }

    /// # Safety
    /// Callers must hold the owning segment's free-list lock; the
    /// descriptor table is reached through shared `'static` references so
    /// mutation always goes through this `UnsafeCell`, matching the
    /// teacher's own `AllocatorLock` `DerefMut` in `src/allocator/mod.rs`.
    pub(crate) unsafe fn set_private(&self, value: usize) {
        *self.private.get() = value;
    }

    pub(crate) unsafe fn set_order(&self, order: u8) {
        *self.order.get() = order;
    }

    pub(crate) unsafe fn set_page_type(&self, page_type: PageType) {
        *self.page_type.get() = page_type;
    }
}

/// One contiguous segment's worth of descriptors and where it starts inside
/// the full table returned by `create_table`.
pub struct SegmentSpec {
    pub index: u8,
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

/// Allocates and initializes the full descriptor table spanning every
/// segment in `specs`, laid out as each segment's descriptors back to back
/// in `specs` order. Returns the table and, per segment index, the
/// `(offset, count)` of that segment's slice within it.
pub fn create_table(
    specs: &[SegmentSpec],
) -> (&'static mut [PageDescriptor], [(usize, usize); crate::config::NUM_SEGMENT_CLASSES]) {
    let page_size = crate::config::PAGE_SIZE as u64;
    let total_pages: usize = specs
        .iter()
        .map(|s| ((s.end.as_u64() - s.start.as_u64()) / page_size) as usize)
        .sum();

    let bytes = total_pages * core::mem::size_of::<PageDescriptor>();
    let va = crate::platform::pmap_steal_memory(bytes);
    let base_ptr = va.as_mut_ptr::<PageDescriptor>();

    let mut offsets = [(0usize, 0usize); crate::config::NUM_SEGMENT_CLASSES];
    let mut cursor = 0usize;
    for spec in specs {
        let count = ((spec.end.as_u64() - spec.start.as_u64()) / page_size) as usize;
        for i in 0..count {
            let phys = PhysicalAddress::new(spec.start.as_u64() + (i as u64) * page_size);
            unsafe {
                base_ptr.add(cursor + i).write(PageDescriptor::new(phys, spec.index));
            }
        }
        offsets[spec.index as usize] = (cursor, count);
        cursor += count;
    }

    let table = unsafe { core::slice::from_raw_parts_mut(base_ptr, total_pages) };
    mark_table_pages(table, specs, &offsets, va, bytes);
    (table, offsets)
}

/// The table's own backing pages are themselves managed pages; mark them
/// `Table` so they are never handed out as free memory.
fn mark_table_pages(
    table: &mut [PageDescriptor],
    specs: &[SegmentSpec],
    offsets: &[(usize, usize); crate::config::NUM_SEGMENT_CLASSES],
    va: crate::types::VirtualAddress,
    bytes: usize,
) {
    let page_size = crate::config::PAGE_SIZE as u64;
    let start_pa = crate::platform::pmap_extract(va);
    let pages = (bytes as u64 + page_size - 1) / page_size;
    for i in 0..pages {
        let pa = PhysicalAddress::new(start_pa.as_u64() + i * page_size);
        if let Some(spec) = specs
            .iter()
            .find(|s| pa.as_u64() >= s.start.as_u64() && pa.as_u64() < s.end.as_u64())
        {
            let (base, _count) = offsets[spec.index as usize];
            let local = ((pa.as_u64() - spec.start.as_u64()) / page_size) as usize;
            *table[base + local].page_type.get_mut() = PageType::Table;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn fresh_descriptor_is_unlisted_and_reserved() {
        let d = PageDescriptor::new(PhysicalAddress::new(0x1000), 0);
        assert_eq!(d.order(), UNLISTED);
        assert_eq!(d.page_type(), PageType::Reserved);
        assert_eq!(d.seg_index(), 0);
    }

    #[test_case]
    fn mutation_through_shared_reference_is_visible() {
        let d = PageDescriptor::new(PhysicalAddress::new(0x2000), 1);
        unsafe {
            d.set_order(3);
            d.set_page_type(PageType::Free);
        }
        assert_eq!(d.order(), 3);
        assert_eq!(d.page_type(), PageType::Free);
    }
}
