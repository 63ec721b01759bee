//! Index Allocation
//!
//! Non-zero id allocation for the renderer's bindless-style tables
//! (materials, objects, textures). Id 0 is reserved for "unallocated";
//! exhaustion returns 0 rather than failing the caller.

use std::sync::Arc;

use parking_lot::Mutex;

/// Capacity-bound id allocator: ids start at 1, freed ids are recycled
/// LIFO, and allocation past capacity yields 0.
pub struct IndexAllocator {
    name: &'static str,
    state: Mutex<AllocatorState>,
}

struct AllocatorState {
    capacity: u32,
    /// Next never-used id (monotonic high-water mark).
    next: u32,
    free: Vec<u32>,
}

impl IndexAllocator {
    #[must_use]
    pub fn new(name: &'static str, capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(AllocatorState {
                capacity,
                next: 1,
                free: Vec::new(),
            }),
        })
    }

    /// Allocate an id. Returns 0 (and logs) when the id space is
    /// exhausted.
    #[must_use]
    pub fn allocate(&self) -> u32 {
        let mut state = self.state.lock();
        if let Some(id) = state.free.pop() {
            return id;
        }
        if state.next > state.capacity {
            log::error!(
                "{} id allocator exhausted (capacity {})",
                self.name,
                state.capacity
            );
            return 0;
        }
        let id = state.next;
        state.next += 1;
        id
    }

    /// Release an id for reuse. Releasing 0 is a no-op; double releases
    /// are detected and ignored.
    pub fn release(&self, id: u32) {
        if id == 0 {
            return;
        }
        let mut state = self.state.lock();
        if id >= state.next || state.free.contains(&id) {
            log::warn!("{} id allocator: release of inactive id {}", self.name, id);
            return;
        }
        state.free.push(id);
    }

    /// Ids currently handed out.
    #[must_use]
    pub fn live_count(&self) -> u32 {
        let state = self.state.lock();
        (state.next - 1) - state.free.len() as u32
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.state.lock().capacity
    }
}

/// RAII id handle: releases its id back to the allocator on drop.
///
/// An exhausted allocation holds id 0 and releases nothing.
pub struct AllocatedId {
    id: u32,
    allocator: Arc<IndexAllocator>,
}

impl AllocatedId {
    #[must_use]
    pub fn acquire(allocator: &Arc<IndexAllocator>) -> Self {
        Self {
            id: allocator.allocate(),
            allocator: allocator.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether the allocation actually got an id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl Drop for AllocatedId {
    fn drop(&mut self) {
        self.allocator.release(self.id);
    }
}

impl std::fmt::Debug for AllocatedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AllocatedId").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_distinct() {
        let allocator = IndexAllocator::new("test", 64);
        let ids: Vec<u32> = (0..64).map(|_| allocator.allocate()).collect();
        assert!(ids.iter().all(|&id| id != 0));
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn exhaustion_returns_zero_then_recycles() {
        let allocator = IndexAllocator::new("test", 2);
        let a = allocator.allocate();
        let b = allocator.allocate();
        assert_eq!(allocator.allocate(), 0);
        allocator.release(a);
        let c = allocator.allocate();
        assert_eq!(c, a);
        allocator.release(b);
        allocator.release(c);
    }

    #[test]
    fn double_release_is_ignored() {
        let allocator = IndexAllocator::new("test", 4);
        let a = allocator.allocate();
        allocator.release(a);
        allocator.release(a);
        let b = allocator.allocate();
        let c = allocator.allocate();
        assert_ne!(b, c);
    }
}
