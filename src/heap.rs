//! Minimum-remaining-values selection.
//!
//! A binary min-heap over cell indices keyed by domain size. Every cell's
//! position in the heap array is tracked, so a domain shrinking (or growing
//! back after a restore) re-sorts that one cell in O(log n).

use rand::Rng;

/// Ordering key: domain size first, then a random tie-break drawn once per
/// attempt, then the cell index so the order is total.
type HeapKey = (usize, u32, usize);

#[derive(Clone, Debug)]
pub struct CellHeap {
    /// Heap array of cell indices.
    heap: Vec<usize>,
    /// `positions[cell]` is the cell's slot in `heap`, if it is queued.
    positions: Vec<Option<usize>>,
    /// Current domain size per cell.
    sizes: Vec<usize>,
    tie_breaks: Vec<u32>,
}

impl CellHeap {
    /// An empty heap for `cell_count` cells with random tie-breaks.
    pub fn new<R: Rng + ?Sized>(cell_count: usize, rng: &mut R) -> Self {
        Self {
            heap: Vec::with_capacity(cell_count),
            positions: vec![None; cell_count],
            sizes: vec![0; cell_count],
            tie_breaks: (0..cell_count).map(|_| rng.random()).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn contains(&self, cell: usize) -> bool {
        self.positions[cell].is_some()
    }

    /// Queues `cell` with the given domain size. Updates the key if it is
    /// already queued.
    pub fn insert(&mut self, cell: usize, size: usize) {
        if self.contains(cell) {
            self.update_key(cell, size);
            return;
        }
        self.sizes[cell] = size;
        self.heap.push(cell);
        let slot = self.heap.len() - 1;
        self.positions[cell] = Some(slot);
        self.sift_up(slot);
    }

    /// Re-sorts `cell` after its domain size changed. No-op for cells that
    /// are not queued.
    pub fn update_key(&mut self, cell: usize, size: usize) {
        let Some(slot) = self.positions[cell] else {
            return;
        };
        let previous = self.sizes[cell];
        self.sizes[cell] = size;
        if size < previous {
            self.sift_up(slot);
        } else if size > previous {
            self.sift_down(slot);
        }
    }

    /// The most constrained queued cell.
    #[inline]
    pub fn peek_min(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    pub fn pop_min(&mut self) -> Option<usize> {
        let cell = self.peek_min()?;
        self.remove(cell);
        Some(cell)
    }

    /// Drops `cell` from the queue if present.
    pub fn remove(&mut self, cell: usize) {
        let Some(slot) = self.positions[cell].take() else {
            return;
        };
        let last = self.heap.len() - 1;
        if slot != last {
            self.heap.swap(slot, last);
            self.positions[self.heap[slot]] = Some(slot);
        }
        self.heap.pop();
        if slot < self.heap.len() {
            // the moved cell may belong above or below its new slot
            self.sift_up(slot);
            let moved = self.heap[slot];
            if let Some(current) = self.positions[moved] {
                self.sift_down(current);
            }
        }
    }

    #[inline(always)]
    fn key(&self, cell: usize) -> HeapKey {
        (self.sizes[cell], self.tie_breaks[cell], cell)
    }

    #[inline(always)]
    fn less(&self, a: usize, b: usize) -> bool {
        self.key(self.heap[a]) < self.key(self.heap[b])
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions[self.heap[a]] = Some(a);
        self.positions[self.heap[b]] = Some(b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if !self.less(slot, parent) {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }
}
