//! The grid and its tail-region state allocator.

use crate::types::Shape;
use crate::value_set::ValueSet;

/// The sole mutable state threaded through propagation: `cells` holds one
/// mask per cell, `tail` holds every handler's persistent scratch state
/// (the Or handler's live-disjunct bitset, for instance — see
/// `handlers::or`). Handlers may only mutate their own reserved tail slice
/// plus the cells they declare.
#[derive(Clone)]
pub struct Grid<VS: ValueSet> {
    pub cells: Vec<VS>,
    pub tail: Vec<u32>,
}

impl<VS: ValueSet> Grid<VS> {
    pub fn new(shape: &Shape, allocator: &StateAllocator) -> Grid<VS> {
        Grid {
            cells: vec![VS::full(shape.num_values as u8); shape.num_cells],
            tail: allocator.initial_values().to_vec(),
        }
    }

    /// Resets every cell to "all values possible" and the tail region to its
    /// allocation-time initial values, as when a search driver restarts a
    /// branch from the top (out of scope here, but the core still owns
    /// the reset so handler tail state is never left stale between runs).
    pub fn reset(&mut self, shape: &Shape, allocator: &StateAllocator) {
        self.cells.fill(VS::full(shape.num_values as u8));
        self.tail.copy_from_slice(allocator.initial_values());
    }
}

/// Hands out stable offsets into a grid's tail region, one per handler that
/// needs persistent scratch state across calls. Offsets are requested once,
/// at `Handler::initialize` time, and are valid for the handler's lifetime.
#[derive(Default)]
pub struct StateAllocator {
    initial: Vec<u32>,
}

impl StateAllocator {
    pub fn new() -> StateAllocator {
        StateAllocator { initial: Vec::new() }
    }

    /// Reserves `initial_values.len()` tail slots, seeded with
    /// `initial_values`, and returns the offset of the first slot.
    pub fn allocate(&mut self, initial_values: &[u32]) -> usize {
        let offset = self.initial.len();
        self.initial.extend_from_slice(initial_values);
        offset
    }

    pub fn len(&self) -> usize {
        self.initial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }

    pub fn initial_values(&self) -> &[u32] {
        &self.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_set::Mask16;

    #[test]
    fn allocate_returns_increasing_offsets() {
        let mut alloc = StateAllocator::new();
        let a = alloc.allocate(&[0, 0]);
        let b = alloc.allocate(&[1, 2, 3]);
        assert_eq!(a, 0);
        assert_eq!(b, 2);
        assert_eq!(alloc.initial_values(), &[0, 0, 1, 2, 3]);
    }

    #[test]
    fn grid_starts_with_every_cell_full() {
        let shape = Shape::new(3);
        let mut alloc = StateAllocator::new();
        alloc.allocate(&[7]);
        let grid: Grid<Mask16> = Grid::new(&shape, &alloc);

        assert_eq!(grid.cells.len(), shape.num_cells);
        assert!(grid.cells.iter().all(|c| c.count() == 9));
        assert_eq!(grid.tail, vec![7]);
    }
}
