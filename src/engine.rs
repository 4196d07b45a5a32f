//! `propagate_to_fixpoint`: drains the handler accumulator to a fixed
//! point. Deliberately a standalone function rather than a method on a
//! search-and-backtrack engine: this crate owns no grid stack, cell
//! ordering, or guessing — a search driver calls this between guesses and
//! owns everything else itself.

use tracing::{debug, trace};

use crate::accumulator::HandlerAccumulator;
use crate::error::PropagationResult;
use crate::handler::HandlerSet;
use crate::state::Grid;
use crate::types::Shape;
use crate::value_set::ValueSet;

/// Drains `acc` by repeatedly popping a handler index, running it, and
/// clearing its in-queue bit before moving on. Stops early on the first
/// contradiction, discarding the rest of the worklist — there is no point
/// waking handlers for a grid the caller is about to abandon.
pub fn propagate_to_fixpoint<VS: ValueSet>(
    grid: &mut Grid<VS>,
    shape: &Shape,
    handlers: &mut HandlerSet<VS>,
    acc: &mut HandlerAccumulator,
) -> PropagationResult {
    while let Some(index) = acc.pop() {
        acc.hold(index);
        trace!(handler = index, "running handler");

        let result = handlers.get_all_mut()[index].enforce_consistency(grid, shape, acc);
        if let Err(contradiction) = result {
            debug!(handler = index, "handler reported contradiction");
            acc.clear();
            return Err(contradiction);
        }

        acc.clear_hold();
    }
    Ok(())
}

/// Seeds `acc` with every cell, for the first propagation pass over a fresh
/// grid.
pub fn seed_all_cells(shape: &Shape, acc: &mut HandlerAccumulator) {
    for cell in 0..shape.num_cells {
        acc.add_for_cell(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::Accumulator;
    use crate::handler::Handler;
    use crate::handlers::given::Given;
    use crate::handlers::house::House;
    use crate::state::StateAllocator;
    use crate::value_set::Mask16;

    fn build_handlers(shape: &Shape) -> HandlerSet<Mask16> {
        let mut set: HandlerSet<Mask16> = HandlerSet::new(shape.num_cells);
        for house in shape.houses() {
            set.add(Handler::House(House::new(house)));
        }
        set
    }

    #[test]
    fn draining_a_fully_determined_house_forces_every_cell() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        // Fix the first 8 cells of the top row to 1..8; the house handler
        // should force the ninth to 9.
        for (i, v) in (1u8..=8).enumerate() {
            grid.cells[i] = Mask16::from_value(v);
        }

        let mut handlers = build_handlers(&shape);
        let cell_to_ordinary = handlers.get_ordinary_handler_map().to_vec();
        let cell_to_singleton = handlers.get_singleton_handler_map().to_vec();
        let mut acc = HandlerAccumulator::new(
            shape.num_cells,
            handlers.len(),
            cell_to_ordinary,
            cell_to_singleton,
        );
        seed_all_cells(&shape, &mut acc);

        propagate_to_fixpoint(&mut grid, &shape, &mut handlers, &mut acc).unwrap();
        assert_eq!(grid.cells[8].value(), Some(9));
    }

    #[test]
    fn a_contradiction_drains_the_rest_of_the_worklist() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(1);
        grid.cells[1] = Mask16::from_value(1); // same house, same value: unsat

        let mut handlers: HandlerSet<Mask16> = HandlerSet::new(shape.num_cells);
        handlers.add(Handler::House(House::new((0..9).collect())));
        handlers.add(Handler::Given(Given::new(0, 1, 9).unwrap()));

        let cell_to_ordinary = handlers.get_ordinary_handler_map().to_vec();
        let cell_to_singleton = handlers.get_singleton_handler_map().to_vec();
        let mut acc = HandlerAccumulator::new(
            shape.num_cells,
            handlers.len(),
            cell_to_ordinary,
            cell_to_singleton,
        );
        seed_all_cells(&shape, &mut acc);

        let result = propagate_to_fixpoint(&mut grid, &shape, &mut handlers, &mut acc);
        assert!(result.is_err());
        assert!(acc.pop().is_none());
    }
}
