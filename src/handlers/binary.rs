//! `BinaryConstraint`: a pair of cells bound by an arbitrary predicate.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, HandlerError, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

/// `P(a, b)`: whether cell `a`'s value and cell `b`'s value are jointly
/// legal. Not assumed symmetric unless the constructor is told so (and
/// validates it).
pub type Predicate = fn(u8, u8) -> bool;

pub struct Binary<VS> {
    cells: [CellIndex; 2],
    predicate: Predicate,
    transitive: bool,
    support_for_a: Vec<VS>,
    support_for_b: Vec<VS>,
    pair_exclusions: Vec<CellIndex>,
}

impl<VS: ValueSet> Binary<VS> {
    /// `transitive` marks predicates where the required-value inference
    /// below never fires (e.g. plain inequality does, an
    /// ordering relation does not) — passing `true` just skips work that
    /// would find nothing.
    pub fn new(
        cell_a: CellIndex,
        cell_b: CellIndex,
        predicate: Predicate,
        symmetric: bool,
        transitive: bool,
        num_values: u32,
    ) -> Result<Binary<VS>, HandlerError> {
        if symmetric {
            for a in 1..=num_values as u8 {
                for b in 1..=num_values as u8 {
                    if predicate(a, b) != predicate(b, a) {
                        return Err(HandlerError::PredicateNotSymmetric);
                    }
                }
            }
        }

        let support_for_a = Self::build_support(predicate, num_values, true);
        let support_for_b = Self::build_support(predicate, num_values, false);

        Ok(Binary {
            cells: [cell_a, cell_b],
            predicate,
            transitive,
            support_for_a,
            support_for_b,
            pair_exclusions: Vec::new(),
        })
    }

    /// `support_for_a[v0]` is the mask of `a` values compatible with `b ==
    /// v0 + 1` (and symmetrically for `support_for_b`).
    fn build_support(predicate: Predicate, num_values: u32, for_a: bool) -> Vec<VS> {
        (0..num_values as u8)
            .map(|v0| {
                let fixed = v0 + 1;
                let mut mask = VS::empty();
                for candidate in 1..=(num_values as u8) {
                    let ok = if for_a {
                        predicate(candidate, fixed)
                    } else {
                        predicate(fixed, candidate)
                    };
                    if ok {
                        mask.add_set(&VS::from_value(candidate));
                    }
                }
                mask
            })
            .collect()
    }

    fn support_union(table: &[VS], mut mask: VS) -> VS {
        let mut out = VS::empty();
        while let Some(bit) = mask.pop() {
            let v0 = bit.value0() as usize;
            if let Some(supports) = table.get(v0) {
                out |= *supports;
            }
        }
        out
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for Binary<VS> {
    fn initialize(
        &mut self,
        _grid: &mut Grid<VS>,
        exclusions: &CellExclusions,
        _shape: &Shape,
        _allocator: &mut StateAllocator,
    ) -> bool {
        self.pair_exclusions = exclusions.get_pair_exclusions(self.cells[0], self.cells[1]);
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        _shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        let [ca, cb] = self.cells;
        let a = grid.cells[ca];
        let b = grid.cells[cb];

        let new_a = a.intersection(&Self::support_union(&self.support_for_a, b));
        if new_a.is_empty() {
            return Err(Contradiction);
        }
        if new_a != a {
            grid.cells[ca] = new_a;
            acc.add_for_cell(ca);
        }

        let new_b = b.intersection(&Self::support_union(&self.support_for_b, new_a));
        if new_b.is_empty() {
            return Err(Contradiction);
        }
        if new_b != b {
            grid.cells[cb] = new_b;
            acc.add_for_cell(cb);
        }

        if !self.transitive && !self.pair_exclusions.is_empty() {
            let mut probe = new_a.intersection(&new_b);
            let mut required = VS::empty();
            while let Some(v_mask) = probe.pop() {
                let v0 = v_mask.value0() as usize;
                let b_without_v = new_b & !v_mask;
                let a_without_v = new_a & !v_mask;
                let a_support_without_bv = Self::support_union(&self.support_for_a, b_without_v);
                let b_support_without_av = Self::support_union(&self.support_for_b, a_without_v);
                let _ = v0;
                if a_support_without_bv.intersection(&v_mask).is_empty()
                    && b_support_without_av.intersection(&v_mask).is_empty()
                {
                    required |= v_mask;
                }
            }

            let mut probe_required = required;
            while let Some(v_mask) = probe_required.pop() {
                for &other in &self.pair_exclusions {
                    let before = grid.cells[other];
                    if before.intersection(&v_mask).is_empty() {
                        continue;
                    }
                    let after = before & !v_mask;
                    if after.is_empty() {
                        return Err(Contradiction);
                    }
                    grid.cells[other] = after;
                    acc.add_for_cell(other);
                }
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let [a, b] = self.cells;
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        format!("Binary({lo}, {hi}, {:#x})", self.predicate as usize)
    }

    fn debug_name(&self) -> &'static str {
        "Binary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    fn not_equal(a: u8, b: u8) -> bool {
        a != b
    }

    #[test]
    fn not_equal_prunes_a_fixed_value_from_the_other_cell() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[0] = Mask16::from_value(1);

        let mut handler: Binary<Mask16> = Binary::new(0, 1, not_equal, true, false, 9).unwrap();
        let exclusions = CellExclusions::from_houses(shape.num_cells, &shape.houses());
        HandlerLogic::<Mask16>::initialize(&mut handler, &mut grid, &exclusions, &shape, &mut StateAllocator::new());

        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[0].value(), Some(1));
        assert!(grid.cells[1].intersection(&Mask16::from_value(1)).is_empty());
    }

    #[test]
    fn rejects_a_non_symmetric_predicate_declared_symmetric() {
        fn less_than(a: u8, b: u8) -> bool {
            a < b
        }
        let result: Result<Binary<Mask16>, _> = Binary::new(0, 1, less_than, true, false, 9);
        assert!(result.is_err());
    }
}
