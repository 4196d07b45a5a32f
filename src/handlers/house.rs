//! `House`: a set of `num_values` cells that must contain each value exactly
//! once.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::{CandidateFinder, HandlerLogic};
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

pub struct House {
    cells: Vec<CellIndex>,
}

impl House {
    pub fn new(cells: Vec<CellIndex>) -> House {
        House { cells }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for House {
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
        shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        let mut all = VS::empty();
        let mut at_least_two = VS::empty();
        let mut fixed = VS::empty();

        for &c in &self.cells {
            let v = grid.cells[c];
            at_least_two |= all.intersection(&v);
            all |= v;
            if v.value().is_some() {
                fixed |= v;
            }
        }

        if all != VS::full(shape.num_values as u8) {
            return Err(Contradiction);
        }
        if fixed == all {
            return Ok(());
        }

        let hidden_singles = all & !at_least_two & !fixed;
        if hidden_singles.is_empty() {
            return Ok(());
        }

        for &c in &self.cells {
            let v = grid.cells[c];
            if v.value().is_some() {
                continue;
            }
            let matched = v.intersection(&hidden_singles);
            if matched.is_empty() {
                continue;
            }
            if matched.has_multiple() {
                // This cell would have to take two different hidden
                // singles at once.
                return Err(Contradiction);
            }
            grid.cells[c] = matched;
            acc.add_for_cell(c);
        }

        Ok(())
    }

    fn exclusion_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn candidate_finders(&self, grid: &Grid<VS>, _shape: &Shape) -> Vec<CandidateFinder> {
        self.cells
            .iter()
            .map(|&cell| CandidateFinder {
                cell,
                num_candidates: grid.cells[cell].count(),
            })
            .collect()
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("House({cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "House"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn hidden_single_is_forced() {
        let shape = Shape::new(3);
        let cells: Vec<CellIndex> = (0..9).collect();
        let mut house = House::new(cells.clone());
        let mut grid_cells = vec![Mask16::full(9); 9];
        // Every cell but the first already excludes value 1.
        for c in &mut grid_cells[1..] {
            *c &= !Mask16::from_value(1);
        }
        let mut grid = crate::state::Grid {
            cells: grid_cells,
            tail: Vec::new(),
        };
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut house, &mut grid, &shape, &mut acc);
        assert!(result.is_ok());
        assert_eq!(grid.cells[0].value(), Some(1));
    }

    #[test]
    fn fails_when_a_value_is_unreachable_by_any_cell() {
        let shape = Shape::new(3);
        let cells: Vec<CellIndex> = (0..9).collect();
        let mut house = House::new(cells);
        let mut grid_cells = vec![Mask16::full(9); 9];
        for c in grid_cells.iter_mut() {
            *c &= !Mask16::from_value(1);
        }
        let mut grid = crate::state::Grid {
            cells: grid_cells,
            tail: Vec::new(),
        };
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut house, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }
}
