//! VM-owned heap and mark-and-sweep collector.
//!
//! Every `ALLOC` and `NEWARR` claims one slot; `FREE` vacates it; the
//! collector vacates every slot not reachable from the roots the engine
//! feeds it. The slot vector is the safe analog of the original
//! allocation list: one entry per live allocation, swept in place.

use tracing::debug;

use crate::consts::DEFAULT_GC_THRESHOLD;
use crate::value::{HeapRef, Value};

/// A single tracked allocation.
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// Raw bytes from `ALLOC`.
    Bytes(Box<[u8]>),
    /// Value array from `NEWARR`; elements default to `Int(0)`.
    Array(Vec<Value>),
}

/// Slot arena owning every allocation a VM ever makes.
///
/// Slot indices are never recycled, so stale handles read as vacant
/// rather than aliasing newer allocations.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    live: usize,
    allocs_since_gc: usize,
    gc_enabled: bool,
    gc_threshold: usize,
}

impl Heap {
    /// An empty heap with auto-GC disabled.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            allocs_since_gc: 0,
            gc_enabled: false,
            gc_threshold: DEFAULT_GC_THRESHOLD,
        }
    }

    /// Claim a slot for `size` zeroed bytes.
    pub fn alloc_bytes(&mut self, size: usize) -> HeapRef {
        self.insert(HeapObject::Bytes(vec![0u8; size].into_boxed_slice()))
    }

    /// Claim a slot for an array of `len` zero values.
    pub fn alloc_array(&mut self, len: usize) -> HeapRef {
        self.insert(HeapObject::Array(vec![Value::default(); len]))
    }

    fn insert(&mut self, object: HeapObject) -> HeapRef {
        let index = self.slots.len() as u32;
        self.slots.push(Some(object));
        self.live += 1;
        self.allocs_since_gc += 1;
        HeapRef(index)
    }

    /// Whether the handle still refers to a live allocation.
    pub fn contains(&self, r: HeapRef) -> bool {
        self.slots.get(r.index()).is_some_and(Option::is_some)
    }

    /// Shared view of an array slot.
    pub fn array(&self, r: HeapRef) -> Option<&Vec<Value>> {
        match self.slots.get(r.index())? {
            Some(HeapObject::Array(elems)) => Some(elems),
            _ => None,
        }
    }

    /// Mutable view of an array slot.
    pub fn array_mut(&mut self, r: HeapRef) -> Option<&mut Vec<Value>> {
        match self.slots.get_mut(r.index())? {
            Some(HeapObject::Array(elems)) => Some(elems),
            _ => None,
        }
    }

    /// Release one allocation. Vacant slots are left untouched, mirroring
    /// the original's unlink-if-found walk.
    pub fn free(&mut self, r: HeapRef) {
        if let Some(slot) = self.slots.get_mut(r.index()) {
            if slot.take().is_some() {
                self.live -= 1;
            }
        }
    }

    /// Live allocation count.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Enable or disable automatic collection after allocations.
    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.gc_enabled = enabled;
    }

    /// Allocations between automatic collections; non-positive input
    /// restores the default.
    pub fn set_gc_threshold(&mut self, threshold: usize) {
        self.gc_threshold = if threshold > 0 {
            threshold
        } else {
            DEFAULT_GC_THRESHOLD
        };
    }

    /// Whether the auto-GC counter has reached the threshold.
    pub fn due_for_collection(&self) -> bool {
        self.gc_enabled && self.allocs_since_gc >= self.gc_threshold
    }

    /// Mark from `roots` and sweep everything unreached. Returns the number
    /// of allocations freed.
    ///
    /// The visited bitmap makes cyclic arrays terminate: a slot enters the
    /// worklist at most once.
    pub fn collect<'a>(&mut self, roots: impl Iterator<Item = &'a Value>) -> usize {
        if self.live == 0 {
            self.allocs_since_gc = 0;
            return 0;
        }

        let mut marked = vec![false; self.slots.len()];
        let mut worklist: Vec<HeapRef> = Vec::new();

        for value in roots {
            if let Some(r) = value.heap_ref() {
                if self.contains(r) && !marked[r.index()] {
                    marked[r.index()] = true;
                    worklist.push(r);
                }
            }
        }

        while let Some(r) = worklist.pop() {
            if let Some(elems) = self.array(r) {
                for value in elems {
                    if let Some(child) = value.heap_ref() {
                        if self.contains(child) && !marked[child.index()] {
                            marked[child.index()] = true;
                            worklist.push(child);
                        }
                    }
                }
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                freed += 1;
            }
        }
        self.live -= freed;
        self.allocs_since_gc = 0;

        debug!(freed, live = self.live, "mark-and-sweep collection");
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_allocations_are_swept() {
        let mut heap = Heap::new();
        let kept = heap.alloc_array(2);
        let dropped = heap.alloc_bytes(16);

        let root = Value::Array(kept);
        let freed = heap.collect([&root].into_iter());

        assert_eq!(freed, 1);
        assert!(heap.contains(kept));
        assert!(!heap.contains(dropped));
    }

    #[test]
    fn nested_arrays_are_retained() {
        let mut heap = Heap::new();
        let inner = heap.alloc_bytes(8);
        let outer = heap.alloc_array(1);
        heap.array_mut(outer).unwrap()[0] = Value::Ref(inner);

        let root = Value::Array(outer);
        assert_eq!(heap.collect([&root].into_iter()), 0);
        assert!(heap.contains(inner));
    }

    #[test]
    fn cyclic_arrays_terminate() {
        let mut heap = Heap::new();
        let a = heap.alloc_array(1);
        let b = heap.alloc_array(1);
        heap.array_mut(a).unwrap()[0] = Value::Array(b);
        heap.array_mut(b).unwrap()[0] = Value::Array(a);

        let root = Value::Array(a);
        assert_eq!(heap.collect([&root].into_iter()), 0);

        // Unrooted, the cycle is reclaimed whole.
        assert_eq!(heap.collect(std::iter::empty()), 2);
        assert_eq!(heap.live(), 0);
    }

    #[test]
    fn freed_slots_are_not_recycled() {
        let mut heap = Heap::new();
        let first = heap.alloc_bytes(1);
        heap.free(first);
        let second = heap.alloc_bytes(1);

        assert_ne!(first, second);
        assert!(!heap.contains(first));
    }

    #[test]
    fn gc_threshold_gates_auto_collection() {
        let mut heap = Heap::new();
        heap.set_gc_enabled(true);
        heap.set_gc_threshold(2);

        heap.alloc_bytes(1);
        assert!(!heap.due_for_collection());
        heap.alloc_bytes(1);
        assert!(heap.due_for_collection());

        heap.collect(std::iter::empty());
        assert!(!heap.due_for_collection());
    }
}
