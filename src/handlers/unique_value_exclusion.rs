//! `UniqueValueExclusion`: the singleton handler behind `AllDifferent`'s
//! `EXCLUSION_CELLS` mode. Exactly one instance exists per
//! target cell.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

pub struct UniqueValueExclusion {
    watched: [CellIndex; 1],
    exclusions: Vec<CellIndex>,
}

impl UniqueValueExclusion {
    pub fn new(cell: CellIndex) -> UniqueValueExclusion {
        UniqueValueExclusion {
            watched: [cell],
            exclusions: Vec::new(),
        }
    }

    fn cell(&self) -> CellIndex {
        self.watched[0]
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for UniqueValueExclusion {
    fn initialize(
        &mut self,
        _grid: &mut Grid<VS>,
        exclusions: &CellExclusions,
        _shape: &Shape,
        _allocator: &mut StateAllocator,
    ) -> bool {
        self.exclusions = exclusions.get_array(self.cell()).to_vec();
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        _shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        let Some(value) = grid.cells[self.cell()].value() else {
            return Ok(());
        };
        let mask = VS::from_value(value);

        for &other in &self.exclusions {
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
        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.watched
    }

    fn id(&self) -> String {
        format!("UniqueValueExclusion({})", self.cell())
    }

    fn debug_name(&self) -> &'static str {
        "UniqueValueExclusion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::state::Grid;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn clears_fixed_value_from_exclusion_cells() {
        let shape = Shape::new(3);
        let exclusions = CellExclusions::from_houses(shape.num_cells, &shape.houses());
        let mut handler = UniqueValueExclusion::new(0);
        let mut allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        HandlerLogic::<Mask16>::initialize(&mut handler, &mut grid, &exclusions, &shape, &mut allocator);

        grid.cells[0] = Mask16::from_value(1);
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_ok());
        assert!(grid.cells[8].intersection(&Mask16::from_value(1)).is_empty());
    }
}
