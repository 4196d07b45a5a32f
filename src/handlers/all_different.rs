//! `AllDifferent`: a set of cells that must all take distinct values.
//!
//! Two modes, selected at construction time. `ExclusionCells` is the
//! default: it registers no watched cells at all and relies entirely on
//! the engine wiring up a [`crate::handlers::unique_value_exclusion::UniqueValueExclusion`]
//! singleton per cell from its published `exclusion_cells()`. `Enforcer` is
//! for the one place that wiring isn't available — nested inside an
//! [`crate::handlers::or::Or`] disjunct, where the engine never sees the
//! cells outside the disjunction — so it does its own (weaker, naked-single
//! only) propagation inline.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, HandlerError, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllDifferentMode {
    ExclusionCells,
    Enforcer,
}

pub struct AllDifferent<VS> {
    cells: Vec<CellIndex>,
    mode: AllDifferentMode,
    _marker: std::marker::PhantomData<VS>,
}

impl<VS> AllDifferent<VS> {
    pub fn new(
        cells: Vec<CellIndex>,
        mode: AllDifferentMode,
        num_values: u32,
    ) -> Result<AllDifferent<VS>, HandlerError> {
        if cells.len() as u32 > num_values {
            return Err(HandlerError::TooManyCellsForHouse {
                given: cells.len(),
                num_values,
            });
        }
        Ok(AllDifferent {
            cells,
            mode,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for AllDifferent<VS> {
    fn initialize(
        &mut self,
        _grid: &mut Grid<VS>,
        _exclusions: &CellExclusions,
        _shape: &Shape,
        _allocator: &mut StateAllocator,
    ) -> bool {
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        _shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        if self.mode == AllDifferentMode::ExclusionCells {
            // Pruning happens through the per-cell UniqueValueExclusion
            // singletons the engine wires up from `exclusion_cells()`; this
            // handler never itself watches a cell in this mode.
            return Ok(());
        }

        for (i, &fixed_cell) in self.cells.iter().enumerate() {
            let Some(value) = grid.cells[fixed_cell].value() else {
                continue;
            };
            let mask = VS::from_value(value);

            for (j, &other) in self.cells.iter().enumerate() {
                if i == j {
                    continue;
                }
                let before = grid.cells[other];
                if before.intersection(&mask).is_empty() {
                    continue;
                }
                let after = before & !mask;
                if after.is_empty() {
                    return Err(Contradiction);
                }
                grid.cells[other] = after;
                acc.add_for_cell(other);
            }
        }

        Ok(())
    }

    fn exclusion_cells(&self) -> &[CellIndex] {
        match self.mode {
            AllDifferentMode::ExclusionCells => &self.cells,
            AllDifferentMode::Enforcer => &[],
        }
    }

    fn watched_cells(&self) -> &[CellIndex] {
        match self.mode {
            AllDifferentMode::ExclusionCells => &[],
            AllDifferentMode::Enforcer => &self.cells,
        }
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("AllDifferent({:?}, {:?})", self.mode, cells)
    }

    fn debug_name(&self) -> &'static str {
        "AllDifferent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn rejects_more_cells_than_values() {
        let cells: Vec<CellIndex> = (0..10).collect();
        let result: Result<AllDifferent<Mask16>, _> =
            AllDifferent::new(cells, AllDifferentMode::Enforcer, 9);
        assert!(result.is_err());
    }

    #[test]
    fn enforcer_clears_fixed_value_from_siblings() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(3);

        let mut handler: AllDifferent<Mask16> =
            AllDifferent::new(vec![0, 1, 2], AllDifferentMode::Enforcer, 9).unwrap();
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_ok());
        assert!(grid.cells[1].intersection(&Mask16::from_value(3)).is_empty());
        assert!(grid.cells[2].intersection(&Mask16::from_value(3)).is_empty());
    }

    #[test]
    fn exclusion_cells_mode_publishes_cells_but_watches_none() {
        let handler: AllDifferent<Mask16> =
            AllDifferent::new(vec![0, 1, 2], AllDifferentMode::ExclusionCells, 9).unwrap();
        assert_eq!(HandlerLogic::<Mask16>::watched_cells(&handler).len(), 0);
        assert_eq!(HandlerLogic::<Mask16>::exclusion_cells(&handler), &[0, 1, 2]);
    }
}
