//! `Skyscraper` and `HiddenSkyscraper`: visibility-count line constraints.
//!
//! Cells hold building heights; `num_visible` counts cells whose height
//! exceeds every cell before it (including itself, for the first cell).
//! Propagated with a forward/backward DP over `(position, visible-so-far)`
//! states, each state carrying the set of possible running-max heights.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

/// A bitmask over running-max heights `0..=num_values` (bit `m` set), where
/// `0` is the sentinel "no building placed yet". Plain `u32`, not a
/// `ValueSet`, because it needs a slot for height `0` that a value mask
/// doesn't have.
type MaxHeightSet = u32;

fn bit(m: u8) -> MaxHeightSet {
    1u32 << m
}

fn below(h: u8) -> MaxHeightSet {
    if h == 0 {
        0
    } else {
        (1u32 << h) - 1
    }
}

pub struct Skyscraper {
    cells: Vec<CellIndex>,
    num_visible: u32,
}

impl Skyscraper {
    pub fn new(cells: Vec<CellIndex>, num_visible: u32) -> Skyscraper {
        Skyscraper { cells, num_visible }
    }

    /// `forward[i][j]`: running-max heights reachable after placing the
    /// first `i` cells with exactly `j` of them visible.
    fn forward_dp(masks: &[impl ValueSet], num_values: u8, num_visible: usize) -> Vec<Vec<MaxHeightSet>> {
        let n = masks.len();
        let mut forward = vec![vec![0 as MaxHeightSet; num_visible + 1]; n + 1];
        forward[0][0] = bit(0);

        for i in 0..n {
            for j in 0..=num_visible {
                let mut states = forward[i][j];
                while states != 0 {
                    let m = states.trailing_zeros() as u8;
                    states &= states - 1;
                    for h in 1..=num_values {
                        if masks[i].intersection(&impl_value(h)).is_empty() {
                            continue;
                        }
                        if h > m {
                            if j + 1 <= num_visible {
                                forward[i + 1][j + 1] |= bit(h);
                            }
                        } else {
                            forward[i + 1][j] |= bit(m);
                        }
                    }
                }
            }
        }
        forward
    }

    /// `backward[i][k]`: the set of incoming running-max heights `m` from
    /// which the suffix starting at cell `i` can still produce exactly `k`
    /// more visible buildings.
    fn backward_dp(masks: &[impl ValueSet], num_values: u8, num_visible: usize) -> Vec<Vec<MaxHeightSet>> {
        let n = masks.len();
        let all_m = bit(num_values) | (bit(num_values) - 1); // every m in 0..=num_values
        let mut backward = vec![vec![0 as MaxHeightSet; num_visible + 1]; n + 1];
        backward[n][0] = all_m;

        for i in (0..n).rev() {
            for k in 0..=num_visible {
                let mut result: MaxHeightSet = 0;
                for h in 1..=num_values {
                    if masks[i].intersection(&impl_value(h)).is_empty() {
                        continue;
                    }
                    if k >= 1 && backward[i + 1][k - 1] & bit(h) != 0 {
                        result |= below(h);
                    }
                    let unchanged = backward[i + 1][k];
                    if unchanged != 0 {
                        // valid for every incoming m with h <= m.
                        result |= unchanged & !below(h);
                    }
                }
                backward[i][k] = result;
            }
        }
        backward
    }
}

fn impl_value<VS: ValueSet>(h: u8) -> VS {
    VS::from_value(h)
}

impl<VS: ValueSet> HandlerLogic<VS> for Skyscraper {
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
        let num_visible = self.num_visible as usize;
        let n = self.cells.len();
        let masks: Vec<VS> = self.cells.iter().map(|&c| grid.cells[c]).collect();

        let forward = Self::forward_dp(&masks, num_values, num_visible);
        let backward = Self::backward_dp(&masks, num_values, num_visible);

        if forward[n][num_visible] == 0 {
            return Err(Contradiction);
        }

        let mut allowed: Vec<VS> = vec![VS::empty(); n];
        for i in 0..n {
            for j in 0..=num_visible {
                let mut states = forward[i][j];
                while states != 0 {
                    let m = states.trailing_zeros() as u8;
                    states &= states - 1;
                    for h in 1..=num_values {
                        if masks[i].intersection(&VS::from_value(h)).is_empty() {
                            continue;
                        }
                        if h > m {
                            if j + 1 <= num_visible
                                && backward[i + 1][num_visible - (j + 1)] & bit(h) != 0
                            {
                                allowed[i] |= VS::from_value(h);
                            }
                        } else if backward[i + 1][num_visible - j] & bit(m) != 0 {
                            allowed[i] |= VS::from_value(h);
                        }
                    }
                }
            }
        }

        for (i, &cell) in self.cells.iter().enumerate() {
            let before = grid.cells[cell];
            let after = before.intersection(&allowed[i]);
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
        format!("Skyscraper({}, {:?})", self.num_visible, self.cells)
    }

    fn debug_name(&self) -> &'static str {
        "Skyscraper"
    }
}

/// The first cell taking value `target` is the first *non-visible*
/// occurrence of it: some earlier cell must already exceed `target`. Unlike
/// the plain count in [`Skyscraper`], the visible count itself stays
/// unconstrained; this only rules out placing `target` where nothing
/// earlier could possibly dominate it.
pub struct HiddenSkyscraper {
    cells: Vec<CellIndex>,
    target: u8,
}

impl HiddenSkyscraper {
    pub fn new(cells: Vec<CellIndex>, target: u8) -> HiddenSkyscraper {
        HiddenSkyscraper { cells, target }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for HiddenSkyscraper {
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
        let target_mask = VS::from_value(self.target);
        let above_target = VS::full(num_values) & !VS::full(self.target);

        // Tracks whether any *earlier* cell can still hold a value above
        // `target`; a cell can only host `target` once that's true.
        let mut seen_above = false;

        for &cell in &self.cells {
            let mask = grid.cells[cell];

            if !seen_above && !mask.intersection(&target_mask).is_empty() {
                let after = mask & !target_mask;
                if after.is_empty() {
                    return Err(Contradiction);
                }
                if after != mask {
                    grid.cells[cell] = after;
                    acc.add_for_cell(cell);
                }
            }

            if !grid.cells[cell].intersection(&above_target).is_empty() {
                seen_above = true;
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        format!("HiddenSkyscraper({}, {:?})", self.target, self.cells)
    }

    fn debug_name(&self) -> &'static str {
        "HiddenSkyscraper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn four_cells_fully_visible_forces_the_identity_permutation() {
        let shape = Shape::new(2); // 4 values
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        let mut handler = Skyscraper::new(vec![0, 1, 2, 3], 4);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[0].value(), Some(1));
        assert_eq!(grid.cells[1].value(), Some(2));
        assert_eq!(grid.cells[2].value(), Some(3));
        assert_eq!(grid.cells[3].value(), Some(4));
    }

    #[test]
    fn single_visible_forces_the_max_value_first() {
        let shape = Shape::new(2);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        let mut handler = Skyscraper::new(vec![0, 1, 2, 3], 1);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[0].value(), Some(4));
    }
}
