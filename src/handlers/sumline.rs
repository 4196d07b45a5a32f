//! `SumLine`: a loop or open line whose running sum must stay a multiple of
//! a modulus `S <= 30`.
//!
//! Each cell boundary carries a bitmask of the partial sums mod `S` that are
//! still reachable there, packed into a `u32` (so `S` is capped well below
//! the word width). A forward pass anchors boundary `0` and rotates it
//! through every cell's mask; a backward pass anchors the final boundary
//! (residue `0`, since the total must be an exact multiple of `S`) and
//! rotates it back the other way. A value survives at a cell only if some
//! forward-reachable residue, shifted by that value, lands on a
//! backward-reachable residue at the next boundary. A loop has no fixed
//! start, so its anchor is instead closed by iterating until the first and
//! last boundary agree.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, HandlerError, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

const MAX_MODULUS: u32 = 30;

pub struct SumLine {
    cells: Vec<CellIndex>,
    modulus: u32,
    is_loop: bool,
}

impl SumLine {
    pub fn new(cells: Vec<CellIndex>, modulus: u32, is_loop: bool) -> Result<SumLine, HandlerError> {
        if modulus > MAX_MODULUS {
            return Err(HandlerError::SumLineModulusTooLarge {
                modulus,
                max: MAX_MODULUS,
            });
        }
        Ok(SumLine {
            cells,
            modulus,
            is_loop,
        })
    }

    #[inline]
    fn full_residues(&self) -> u32 {
        if self.modulus == 32 {
            u32::MAX
        } else {
            (1u32 << self.modulus) - 1
        }
    }

    /// Rotates `mask` up by `v` positions mod `modulus` ("the partial sum so
    /// far, plus `v`").
    fn shift_up(&self, mask: u32, v: u32) -> u32 {
        let v = v % self.modulus;
        if v == 0 {
            return mask;
        }
        ((mask << v) | (mask >> (self.modulus - v))) & self.full_residues()
    }

    /// Rotates `mask` down by `v` positions mod `modulus`: the inverse of
    /// [`Self::shift_up`], used by the backward pass ("what residue, plus
    /// `v`, would land in `mask`").
    fn shift_down(&self, mask: u32, v: u32) -> u32 {
        self.shift_up(mask, self.modulus - (v % self.modulus))
    }

    fn forward<VS: ValueSet>(&self, masks: &[VS], start: u32) -> Vec<u32> {
        let n = masks.len();
        let mut states = vec![0u32; n + 1];
        states[0] = start;
        for i in 0..n {
            let mut next = 0u32;
            let mut probe = masks[i];
            while let Some(bit) = probe.pop() {
                let v = bit.value0() as u32 + 1;
                next |= self.shift_up(states[i], v);
            }
            states[i + 1] = next;
        }
        states
    }

    fn backward<VS: ValueSet>(&self, masks: &[VS], end: u32) -> Vec<u32> {
        let n = masks.len();
        let mut states = vec![0u32; n + 1];
        states[n] = end;
        for i in (0..n).rev() {
            let mut prev = 0u32;
            let mut probe = masks[i];
            while let Some(bit) = probe.pop() {
                let v = bit.value0() as u32 + 1;
                prev |= self.shift_down(states[i + 1], v);
            }
            states[i] = prev;
        }
        states
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for SumLine {
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
        let n = self.cells.len();
        let masks: Vec<VS> = self.cells.iter().map(|&c| grid.cells[c]).collect();

        // A loop has no privileged start: anchor both ends at "every
        // residue possible" and close the loop by repeatedly intersecting
        // boundary 0 with boundary n until they agree (each round shrinks
        // the anchor or reaches a fixed point, so this always terminates).
        let (mut fwd_anchor, bwd_anchor) = if self.is_loop {
            (self.full_residues(), self.full_residues())
        } else {
            (1u32, 1u32) // residue 0 at both ends: the total must be an exact multiple of the modulus.
        };

        let mut forward = self.forward(&masks, fwd_anchor);
        if self.is_loop {
            for _ in 0..=n {
                let closed = forward[0] & forward[n];
                if closed == 0 {
                    return Err(Contradiction);
                }
                if closed == fwd_anchor {
                    break;
                }
                fwd_anchor = closed;
                forward = self.forward(&masks, fwd_anchor);
            }
        }
        let backward = self.backward(&masks, if self.is_loop { forward[0] } else { bwd_anchor });

        let mut combined = vec![0u32; n + 1];
        for i in 0..=n {
            combined[i] = forward[i] & backward[i];
            if combined[i] == 0 {
                return Err(Contradiction);
            }
        }

        for i in 0..n {
            let mut allowed = VS::empty();
            let mut probe = masks[i];
            while let Some(bit) = probe.pop() {
                let v = bit.value0() as u32 + 1;
                if self.shift_up(combined[i], v) & combined[i + 1] != 0 {
                    allowed |= bit;
                }
            }
            let after = masks[i].intersection(&allowed);
            if after.is_empty() {
                return Err(Contradiction);
            }
            if after != masks[i] {
                grid.cells[self.cells[i]] = after;
                acc.add_for_cell(self.cells[i]);
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        format!("SumLine({}, {}, {:?})", self.modulus, self.is_loop, self.cells)
    }

    fn debug_name(&self) -> &'static str {
        "SumLine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn rejects_modulus_above_the_cap() {
        assert!(SumLine::new(vec![0, 1], 31, false).is_err());
    }

    #[test]
    fn open_line_of_two_cells_summing_to_a_multiple_of_three() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(2);
        // With modulus 3 and the first cell fixed at 2, the total must be a
        // multiple of 3: the second cell can only be 1, 4, or 7.
        let mut handler = SumLine::new(vec![0, 1], 3, false).unwrap();
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[1], Mask16::from_iter([1, 4, 7]));
    }

    #[test]
    fn impossible_total_is_a_contradiction() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(1);
        grid.cells[1] = Mask16::from_value(1);
        // Fixed total is 2; no multiple of 30 is reachable with two 9-value cells.
        let mut handler = SumLine::new(vec![0, 1], 30, false).unwrap();
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }

    #[test]
    fn three_cell_loop_forces_a_consistent_residue() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(1);
        grid.cells[1] = Mask16::from_value(1);
        grid.cells[2] &= Mask16::from_iter([1, 2, 3, 4, 5]);

        // Loop of 3 cells, modulus 3: total must be a multiple of 3. With
        // the first two cells fixed at 1, the third must be 1 or 4.
        let mut handler = SumLine::new(vec![0, 1, 2], 3, true).unwrap();
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[2], Mask16::from_iter([1, 4]));
    }
}
