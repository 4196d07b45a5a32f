//! `LocalEntropy` and `LocalMod3`: squished-triad propagators.
//!
//! `{1..num_values}` is partitioned into three labelled triads (thirds by
//! value for entropy, residue mod 3 for mod-3); each cell's mask is
//! "squished" down to a 3-bit set of which triads it can still reach, and
//! that 3-bit domain is run through the same one-pass all/at_least_two/fixed
//! sweep [`crate::handlers::house::House`] uses, then unsquished back onto
//! the real cells by intersecting with each triad's raw-value union.
//!
//! The House sweep's "every value must be covered, a value confined to one
//! cell is forced there" reasoning is only exact when the group has exactly
//! one cell per label — true here only when the group is the canonical
//! three-cell triple (one low/mid/high, or one of each residue class). For
//! larger groups the hidden-triad forcing still runs (sound: it only ever
//! narrows a cell to triads it could already reach) but the final
//! "no other cell may also claim this triad" exclusion is skipped, since
//! with more than three cells that claim needn't be exclusive.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

fn raw_triad_masks<VS: ValueSet>(num_values: u8, triad_of: impl Fn(u8) -> u8) -> [VS; 3] {
    let mut masks = [VS::empty(), VS::empty(), VS::empty()];
    for v in 1..=num_values {
        masks[triad_of(v) as usize] |= VS::from_value(v);
    }
    masks
}

fn squish<VS: ValueSet>(mask: VS, raw: &[VS; 3]) -> u8 {
    let mut bits = 0u8;
    for (t, raw_mask) in raw.iter().enumerate() {
        if !mask.intersection(raw_mask).is_empty() {
            bits |= 1 << t;
        }
    }
    bits
}

fn enforce<VS: ValueSet>(
    cells: &[CellIndex],
    grid: &mut Grid<VS>,
    shape: &Shape,
    acc: &mut dyn Accumulator,
    triad_of: impl Fn(u8) -> u8,
) -> PropagationResult {
    let num_values = shape.num_values as u8;
    let raw = raw_triad_masks::<VS>(num_values, triad_of);

    let squished: Vec<u8> = cells.iter().map(|&c| squish(grid.cells[c], &raw)).collect();

    let mut all = 0u8;
    let mut at_least_two = 0u8;
    let mut fixed = 0u8;
    for &s in &squished {
        at_least_two |= all & s;
        all |= s;
        if s.count_ones() == 1 {
            fixed |= s;
        }
    }

    if all != 0b111 {
        return Err(Contradiction);
    }

    let hidden_singles = all & !at_least_two & !fixed;
    if hidden_singles != 0 {
        for (&cell, &s) in cells.iter().zip(&squished) {
            let matched = s & hidden_singles;
            if matched == 0 {
                continue;
            }
            if matched.count_ones() > 1 {
                return Err(Contradiction);
            }
            let triad = matched.trailing_zeros() as usize;
            let before = grid.cells[cell];
            let after = before.intersection(&raw[triad]);
            if after.is_empty() {
                return Err(Contradiction);
            }
            if after != before {
                grid.cells[cell] = after;
                acc.add_for_cell(cell);
            }
        }
    }

    // Exactness only holds for the canonical three-cell triple: with one
    // cell per label, a triad claimed by a fixed cell can never also belong
    // to another.
    if cells.len() == 3 {
        for (&cell, &s) in cells.iter().zip(&squished) {
            if s.count_ones() != 1 {
                continue;
            }
            for (&other_cell, &other_s) in cells.iter().zip(&squished) {
                if other_cell == cell || other_s & s == 0 {
                    continue;
                }
                let triad = s.trailing_zeros() as usize;
                let before = grid.cells[other_cell];
                let after = before & !raw[triad];
                if after.is_empty() {
                    return Err(Contradiction);
                }
                if after != before {
                    grid.cells[other_cell] = after;
                    acc.add_for_cell(other_cell);
                }
            }
        }
    }

    Ok(())
}

fn entropy_triad_of(v: u8, num_values: u8) -> u8 {
    let third = (num_values as u32 + 2) / 3;
    (((v as u32 - 1) / third.max(1)) as u8).min(2)
}

pub struct LocalEntropy {
    cells: Vec<CellIndex>,
}

impl LocalEntropy {
    pub fn new(cells: Vec<CellIndex>) -> LocalEntropy {
        LocalEntropy { cells }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for LocalEntropy {
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
        enforce(&self.cells, grid, shape, acc, |v| entropy_triad_of(v, num_values))
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("LocalEntropy({cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "LocalEntropy"
    }
}

pub struct LocalMod3 {
    cells: Vec<CellIndex>,
}

impl LocalMod3 {
    pub fn new(cells: Vec<CellIndex>) -> LocalMod3 {
        LocalMod3 { cells }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for LocalMod3 {
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
        enforce(&self.cells, grid, shape, acc, |v| (v - 1) % 3)
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("LocalMod3({cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "LocalMod3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn two_triads_pinned_forces_the_third_cell_into_the_last_triad() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] = Mask16::from_value(2); // low triad (1-3)
        grid.cells[1] = Mask16::from_value(5); // mid triad (4-6)
        // cell 2 is left full; it must end up in the high triad (7-9).

        let mut handler = LocalEntropy::new(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[2], Mask16::from_iter(7..=9));
    }

    #[test]
    fn mod3_residues_behave_the_same_way() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] = Mask16::from_value(1); // residue 0: {1,4,7}
        grid.cells[1] = Mask16::from_value(2); // residue 1: {2,5,8}
        // cell 2 must land in residue 2: {3,6,9}.

        let mut handler = LocalMod3::new(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[2], Mask16::from_iter([3, 6, 9]));
    }

    #[test]
    fn a_triad_unreachable_by_any_cell_is_a_contradiction() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        for c in 0..3 {
            grid.cells[c] &= !Mask16::from_iter(7..=9);
        }

        let mut handler = LocalEntropy::new(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }
}
