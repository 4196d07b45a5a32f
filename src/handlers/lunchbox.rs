//! `Lunchbox` / Sandwich: the values strictly between the two sentinels (`1`
//! and `num_values`) on a line must sum to a target.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::tables;
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

pub struct Lunchbox {
    cells: Vec<CellIndex>,
    target: u32,
}

impl Lunchbox {
    pub fn new(cells: Vec<CellIndex>, target: u32) -> Lunchbox {
        Lunchbox { cells, target }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for Lunchbox {
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
        let num_values = shape.num_values as u8;
        let tables = tables::get_tables(num_values);
        let n = self.cells.len();
        let masks: Vec<VS> = self.cells.iter().map(|&c| grid.cells[c]).collect();

        let low_sentinel = VS::from_value(1);
        let high_sentinel = VS::from_value(num_values);
        let sentinel_mask = low_sentinel.union(&high_sentinel);

        let sentinel_capable: Vec<usize> = (0..n)
            .filter(|&i| !masks[i].intersection(&sentinel_mask).is_empty())
            .collect();
        if sentinel_capable.len() < 2 {
            return Err(Contradiction);
        }

        let interior_domain = tables.sandwich_interior_domain();
        let mut touched = vec![false; n];
        let mut valid = vec![VS::empty(); n];

        let mark = |idx: usize, mask: VS, touched: &mut [bool], valid: &mut [VS]| {
            touched[idx] = true;
            valid[idx] |= mask;
        };

        for &i in &sentinel_capable {
            if masks[i].intersection(&low_sentinel).is_empty() {
                continue;
            }
            for &j in &sentinel_capable {
                if i == j || masks[j].intersection(&high_sentinel).is_empty() {
                    continue;
                }
                let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                let d = hi - lo - 1;

                if d == 0 {
                    if self.target != 0 {
                        continue;
                    }
                } else {
                    let interior: Vec<usize> = (lo + 1..hi).collect();
                    let interior_union: u32 = interior.iter().fold(0u32, |acc, &p| acc | masks[p].to_bits());
                    let combos = tables.combinations_within(d, self.target, interior_union & interior_domain);
                    if combos.is_empty() {
                        continue;
                    }
                    let combo_union = combos.iter().fold(0u32, |acc, &m| acc | m);
                    for &p in &interior {
                        mark(p, VS::from_bits(combo_union), &mut touched, &mut valid);
                    }
                }

                mark(i, low_sentinel, &mut touched, &mut valid);
                mark(j, high_sentinel, &mut touched, &mut valid);
            }
        }

        for (idx, &cell) in self.cells.iter().enumerate() {
            if !touched[idx] {
                continue;
            }
            let before = grid.cells[cell];
            let after = before.intersection(&valid[idx]);
            if after.is_empty() {
                return Err(Contradiction);
            }
            if after != before {
                grid.cells[cell] = after;
                acc.add_for_cell(cell);
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        format!("Lunchbox({}, {:?})", self.target, self.cells)
    }

    fn debug_name(&self) -> &'static str {
        "Lunchbox"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn forces_sentinels_into_place_when_only_two_cells_can_host_them() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        // Only cells 0 and 3 can hold 1 or 9; interior candidates {2,3,4}
        // on cells 1, 2 must sum to 5, i.e. {2,3}.
        for c in [0usize, 3] {
            grid.cells[c] &= Mask16::from_iter([1, 9]);
        }
        for c in [1usize, 2] {
            grid.cells[c] &= Mask16::from_iter([2, 3, 4, 5, 6, 7, 8]);
        }
        for c in 4..9 {
            grid.cells[c] &= !Mask16::from_iter([1, 9]);
        }

        let mut handler = Lunchbox::new(vec![0, 1, 2, 3], 5);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[1], Mask16::from_iter([2, 3]));
        assert_eq!(grid.cells[2], Mask16::from_iter([2, 3]));
    }

    #[test]
    fn fails_when_fewer_than_two_cells_can_host_a_sentinel() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        for c in grid.cells.iter_mut() {
            *c &= !Mask16::from_iter([1, 9]);
        }

        let mut handler = Lunchbox::new(vec![0, 1, 2, 3], 5);
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }
}
