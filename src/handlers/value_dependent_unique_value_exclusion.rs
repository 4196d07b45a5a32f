//! `ValueDependentUniqueValueExclusion` and its `House` variant:
//! generalizes [`crate::handlers::unique_value_exclusion::UniqueValueExclusion`]
//! so the set of excluded cells depends on *which* value the source cell
//! takes, not just that it is fixed.

use std::collections::HashMap;

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

/// Singleton per source cell: `table[v]` is the list of cells that may no
/// longer hold `v` once the source cell is fixed to `v` (e.g. "if this cell
/// is 5, these specific other cells may not be 5").
pub struct ValueDependentUniqueValueExclusion {
    watched: [CellIndex; 1],
    table: Vec<Vec<CellIndex>>,
}

impl ValueDependentUniqueValueExclusion {
    /// `table[v0]` (zero-indexed value) lists the cells to exclude `v0 + 1`
    /// from once `cell` is fixed to that value.
    pub fn new(cell: CellIndex, table: Vec<Vec<CellIndex>>) -> ValueDependentUniqueValueExclusion {
        ValueDependentUniqueValueExclusion {
            watched: [cell],
            table,
        }
    }

    fn cell(&self) -> CellIndex {
        self.watched[0]
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for ValueDependentUniqueValueExclusion {
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
        let Some(value) = grid.cells[self.cell()].value() else {
            return Ok(());
        };
        let mask = VS::from_value(value);
        let Some(exclude_from) = self.table.get((value - 1) as usize) else {
            return Ok(());
        };

        for &other in exclude_from {
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
        format!("ValueDependentUniqueValueExclusion({})", self.cell())
    }

    fn debug_name(&self) -> &'static str {
        "ValueDependentUniqueValueExclusion"
    }
}

/// The house variant: in addition to acting as a plain unique-value
/// exclusion source, it watches every cell of a house and, when a value is
/// only still possible in exactly two of the house's cells (a "pointing
/// pair"), consults a pair-keyed table of extra cells that value must then
/// be excluded from.
pub struct HouseValueDependentUniqueValueExclusion {
    house_cells: Vec<CellIndex>,
    /// Keyed by the sorted pair of house cells that can still hold a value;
    /// the associated cells must then lose that value.
    pair_exclusions: HashMap<(CellIndex, CellIndex), Vec<CellIndex>>,
}

impl HouseValueDependentUniqueValueExclusion {
    pub fn new(
        house_cells: Vec<CellIndex>,
        pair_exclusions: HashMap<(CellIndex, CellIndex), Vec<CellIndex>>,
    ) -> HouseValueDependentUniqueValueExclusion {
        HouseValueDependentUniqueValueExclusion {
            house_cells,
            pair_exclusions,
        }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for HouseValueDependentUniqueValueExclusion {
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
        for value in 1..=(shape.num_values as u8) {
            let mask = VS::from_value(value);
            let mut holders: Vec<CellIndex> = Vec::new();
            for &cell in &self.house_cells {
                if !grid.cells[cell].intersection(&mask).is_empty() {
                    holders.push(cell);
                    if holders.len() > 2 {
                        break;
                    }
                }
            }
            if holders.len() != 2 {
                continue;
            }
            let key = (holders[0].min(holders[1]), holders[0].max(holders[1]));
            let Some(extra) = self.pair_exclusions.get(&key) else {
                continue;
            };

            for &other in extra {
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

    fn watched_cells(&self) -> &[CellIndex] {
        &self.house_cells
    }

    fn id(&self) -> String {
        let mut cells = self.house_cells.clone();
        cells.sort_unstable();
        format!("HouseValueDependentUniqueValueExclusion({cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "HouseValueDependentUniqueValueExclusion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn excludes_only_the_table_entry_for_the_fixed_value() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(5);

        let mut table = vec![Vec::new(); 9];
        table[4] = vec![10, 20]; // value 5 (index 4) excludes cells 10, 20
        let mut handler = ValueDependentUniqueValueExclusion::new(0, table);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert!(grid.cells[10].intersection(&Mask16::from_value(5)).is_empty());
        assert!(grid.cells[20].intersection(&Mask16::from_value(5)).is_empty());
        assert!(!grid.cells[30].intersection(&Mask16::from_value(5)).is_empty());
    }

    #[test]
    fn house_variant_prunes_via_pointing_pair() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        let house: Vec<CellIndex> = (0..9).collect();

        // Restrict value 7 in the house to cells 0 and 1 only.
        for &c in &house[2..] {
            grid.cells[c] &= !Mask16::from_value(7);
        }

        let mut pair_exclusions = HashMap::new();
        pair_exclusions.insert((0usize, 1usize), vec![50usize]);
        let mut handler = HouseValueDependentUniqueValueExclusion::new(house, pair_exclusions);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert!(grid.cells[50].intersection(&Mask16::from_value(7)).is_empty());
    }
}
