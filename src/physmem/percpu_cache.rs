//! Per-CPU order-0 cache (`spec.md` §4.G).
//!
//! One cache per logical CPU, held inside its segment and indexed directly
//! by `cpu_number()` — a plain `[PerCpuCache; MAX_CPUS]` rather than the
//! teacher's `per_cpu!` macro (see `DESIGN.md`, Component G). Lock order is
//! always this cache's lock first, the segment's free-list lock second;
//! `fill`/`drain` acquire the segment lock while already holding the cache
//! lock, never the other way around.

use crate::physmem::descriptor::{DescriptorAdapter, PageDescriptor};
use crate::physmem::segment::Segment;
use intrusive_collections::LinkedList;
use spin::Mutex;

struct CacheState {
    capacity: usize,
    list: LinkedList<DescriptorAdapter>,
    count: usize,
}

pub struct PerCpuCache {
    state: Mutex<CacheState>,
}

impl PerCpuCache {
    /// An unconfigured cache with zero capacity. `Segment::new` builds an
    /// array of these (the same `[const_expr; N]` pattern
    /// `intrusive_collections::LinkedList::new` already relies on
    /// elsewhere in this crate) and configures each one afterward, since
    /// the real capacity depends on a runtime-computed segment size.
    pub const fn empty() -> Self {
        Self {
            state: Mutex::new(CacheState {
                capacity: 0,
                list: LinkedList::new(DescriptorAdapter::NEW),
                count: 0,
            }),
        }
    }

    pub fn configure(&self, capacity: usize) {
        self.state.lock().capacity = capacity;
    }

    fn transfer_size(capacity: usize) -> usize {
        (capacity + 1) / 2
    }

    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    /// Order-0 allocation through this cache. Refills to full capacity from
    /// `segment`'s buddy core on an empty cache; propagates "no memory" only
    /// when the refill itself moves zero pages.
    pub fn alloc0(&self, segment: &Segment) -> Option<&'static PageDescriptor> {
        let mut state = self.state.lock();
        if state.count == 0 {
            let moved = Self::fill_locked(&mut state, segment);
            if moved == 0 {
                return None;
            }
        }
        let d = state.list.pop_front().unwrap();
        state.count -= 1;
        Some(d)
    }

    /// Order-0 free through this cache. Drains exactly `transfer_size`
    /// pages back to `segment`'s buddy core when the cache is already at
    /// capacity, to make room.
    pub fn free0(&self, segment: &Segment, d: &'static PageDescriptor) {
        let mut state = self.state.lock();
        if state.count == state.capacity {
            Self::drain_locked(&mut state, segment);
        }
        state.list.push_front(d);
        state.count += 1;
    }

    fn fill_locked(state: &mut CacheState, segment: &Segment) -> usize {
        let mut moved = 0;
        while state.count < state.capacity {
            match segment.buddy_alloc(0) {
                Some(d) => {
                    state.list.push_front(d);
                    state.count += 1;
                    moved += 1;
                }
                None => break,
            }
        }
        moved
    }

    fn drain_locked(state: &mut CacheState, segment: &Segment) {
        let n = Self::transfer_size(state.capacity);
        for _ in 0..n {
            match state.list.pop_front() {
                Some(d) => {
                    state.count -= 1;
                    segment.buddy_free(d, 0);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhysicalAddress;

    const CAPACITY: usize = 64;
    static mut BACKING: [PageDescriptor; CAPACITY] =
        [const { PageDescriptor::new(unsafe { PhysicalAddress::new_unsafe(0) }, 0) }; CAPACITY];

    fn fixture(count: usize) -> &'static [PageDescriptor] {
        assert!(count <= CAPACITY);
        unsafe {
            for i in 0..count {
                BACKING[i] = PageDescriptor::new(PhysicalAddress::new((i as u64) * 4096), 0);
            }
            &BACKING[..count]
        }
    }

    #[test_case]
    fn cache_saturation_matches_scenario_arithmetic() {
        // cache size 4, transfer 2, 10 order-0 allocs then 10 frees on one
        // cache against a segment sized to exactly 10 free pages.
        let table = fixture(10);
        let seg = Segment::new(0, "TEST", PhysicalAddress::new(0), PhysicalAddress::new(10 * 4096), table);
        seg.manage_all();
        let cache = PerCpuCache::empty();
        cache.configure(4);

        let mut handles = alloc_stack::Stack::new();
        for _ in 0..10 {
            let d = cache.alloc0(&seg).expect("segment sized exactly for 10 allocs");
            handles.push(d);
        }
        assert!(cache.alloc0(&seg).is_none());

        while let Some(d) = handles.pop() {
            cache.free0(&seg, d);
        }
        assert_eq!(seg.nr_free_pages() + cache.len(), 10);
    }

    mod alloc_stack {
        use crate::physmem::descriptor::PageDescriptor;

        /// A fixed-capacity LIFO stack of descriptor handles, standing in
        /// for `alloc::vec::Vec` in a crate that carries no heap.
        pub struct Stack {
            items: [Option<&'static PageDescriptor>; 16],
            len: usize,
        }

        impl Stack {
            pub fn new() -> Self {
                Self {
                    items: [None; 16],
                    len: 0,
                }
            }

            pub fn push(&mut self, d: &'static PageDescriptor) {
                self.items[self.len] = Some(d);
                self.len += 1;
            }

            pub fn pop(&mut self) -> Option<&'static PageDescriptor> {
                if self.len == 0 {
                    return None;
                }
                self.len -= 1;
                self.items[self.len].take()
            }
        }
    }
}
