//! Stand-ins for the "consumed interfaces" of `spec.md` §6: the pieces the
//! physical page allocator relies on from the (out-of-scope) pmap and local
//! APIC layers.
//!
//! The teacher crate's bootloader is configured with
//! `physical-memory-offset = 0xffff808000000000` (see the workspace
//! `Cargo.toml`'s `[package.metadata.bootloader]` table) and its
//! `acpi::HandlerImpl::map_physical_region` already treats every physical
//! address as reachable by adding that one offset — "we only support
//! identity mapped memory". `pmap_steal_memory`/`pmap_extract` below apply
//! the same trick, which means a real pmap layer is not needed to exercise
//! this crate: `pmap_steal_memory` is implemented directly on top of this
//! crate's own bootstrap bump heap (component C).

use crate::config;
use crate::physmem::bump;
use crate::types::{PhysicalAddress, VirtualAddress};
use x86_64::instructions::interrupts;

/// Virtual base of the direct physical memory map, matching the
/// bootloader's `physical-memory-offset` metadata.
pub const PHYSICAL_MEMORY_OFFSET: u64 = 0xffff_8080_0000_0000;

/// Translates a physical address to its direct-mapped virtual address.
pub fn phys_to_virt(pa: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(pa.as_u64() + PHYSICAL_MEMORY_OFFSET)
}

/// One-shot allocation of a virtually mapped, zero-initialized range,
/// sized in bytes. Used exactly once per boot, by component E, to obtain
/// storage for the page descriptor table before the page allocator (which
/// the descriptor table is *for*) exists.
///
/// Backed by the bootstrap bump heap (component C): "stealing memory" here
/// is a physical allocation plus the direct-map offset, not a page-table
/// walk, since every physical page managed by this crate is reachable that
/// way from boot.
pub fn pmap_steal_memory(size: usize) -> VirtualAddress {
    let pa = bump::alloc_phys(size)
        .unwrap_or_else(|| kernel_panic("pmap_steal_memory: bootstrap heap exhausted"));
    let va = phys_to_virt(pa);
    unsafe {
        core::ptr::write_bytes(va.as_mut_ptr::<u8>(), 0, size);
    }
    va
}

/// Reverse of `pmap_steal_memory`: recovers the physical address backing a
/// virtual address inside the direct map.
pub fn pmap_extract(va: VirtualAddress) -> PhysicalAddress {
    PhysicalAddress::new(va.as_u64() - PHYSICAL_MEMORY_OFFSET)
}

/// Returns the index of the currently executing logical CPU.
///
/// Reads the initial APIC ID from `cpuid` leaf 1 rather than depending on
/// the (out-of-scope) local APIC MMIO driver; clamped to fit the fixed-size
/// per-CPU cache array (`config::MAX_CPUS`).
#[cfg(target_arch = "x86_64")]
pub fn cpu_number() -> usize {
    let cpuid = unsafe { core::arch::x86_64::__cpuid(1) };
    (((cpuid.ebx >> 24) & 0xff) as usize).min(config::MAX_CPUS - 1)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn cpu_number() -> usize {
    0
}

/// Terminates the kernel with a fixed, logged message. Used for the
/// boot-phase and PMAP-exhaustion failures `spec.md` §7 classifies as
/// unrecoverable.
#[cold]
pub fn kernel_panic(msg: &'static str) -> ! {
    log::error!("{}", msg);
    panic!("{}", msg)
}

/// RAII guard pinning the current task to the current CPU for the
/// duration of the order-0 fast path (`spec.md` §5). On `x86_64`, without a
/// preemptive scheduler's own affinity mask to flip, the guard instead
/// disables interrupts, which is sufficient to prevent the executing
/// context from being preempted and migrated mid-access; the previous
/// interrupt flag is restored on every exit path, including early returns,
/// via `Drop`.
pub struct PinGuard {
    was_enabled: bool,
}

impl PinGuard {
    pub fn new() -> Self {
        let was_enabled = interrupts::are_enabled();
        if was_enabled {
            interrupts::disable();
        }
        Self { was_enabled }
    }

    pub fn cpu(&self) -> usize {
        cpu_number()
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            interrupts::enable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn direct_map_round_trips() {
        let pa = PhysicalAddress::new(0x1234_5000);
        let va = phys_to_virt(pa);
        assert_eq!(pmap_extract(va), pa);
    }

    #[test_case]
    fn cpu_number_is_in_range() {
        assert!(cpu_number() < config::MAX_CPUS);
    }
}
