//! Logical-to-physical CPU mapping
//!
//! The external scheduler numbers logical CPUs in two contiguous half-ranges,
//! one per hyperthread slot: on a node with `N` physical cores, logical CPU
//! `id` and its sibling `id + N` share physical core `id mod N`. Nothing here
//! discovers topology from hardware; every caller goes through
//! [`physical_core_of`] so the convention lives in exactly one place.

use std::collections::BTreeMap;

/// Hyperthreads per physical core assumed when only a logical count is known
pub const DEFAULT_THREADS_PER_CORE: u32 = 2;

/// Physical core hosting `logical_id`, or `None` when the core count is zero
pub fn physical_core_of(logical_id: u32, physical_core_count: u32) -> Option<u32> {
    if physical_core_count == 0 {
        return None;
    }
    Some(logical_id % physical_core_count)
}

/// Count how many of the given logical CPUs land on each physical core.
///
/// Returns `None` when `physical_core_count` is zero. Inputs are only read;
/// the histogram is built locally.
pub fn core_histogram(cpu_ids: &[u32], physical_core_count: u32) -> Option<BTreeMap<u32, u32>> {
    let mut histogram = BTreeMap::new();
    for &id in cpu_ids {
        let core = physical_core_of(id, physical_core_count)?;
        *histogram.entry(core).or_insert(0) += 1;
    }
    Some(histogram)
}

/// Derive the physical core count from a node's logical CPU capacity
pub fn physical_cores_from_logical(logical_cpus: u32, threads_per_core: u32) -> u32 {
    if logical_cpus == 0 {
        return 0;
    }
    (logical_cpus / threads_per_core.max(1)).max(1)
}
