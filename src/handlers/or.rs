//! `Or`: a disjunction of handlers, exactly one of which must hold. The
//! trickiest piece of bookkeeping in the handler library: every call
//! has to evaluate each still-live disjunct against its own private copy of
//! the grid (since a disjunct's pruning is only real once the others have
//! been ruled out), union the survivors back together, and remember once
//! only one disjunct is left so later calls stop paying for the others.
//!
//! A search driver that copies and resets grids across backtracking
//! branches would want this live-disjunct state kept in the grid's tail
//! region so it gets snapshotted along with everything else. Search is out
//! of this crate's scope, so there is never more than one grid in flight
//! per `Or` instance; keeping the FINAL flag and live-disjunct bitset as
//! ordinary fields on `Or` itself is behaviorally identical here and
//! sidesteps needing `StateAllocator` slots reserved before the grid that
//! will read them exists.

use crate::accumulator::{Accumulator, DummyAccumulator};
use crate::error::{Contradiction, HandlerError, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::{Handler, HandlerLogic};
use crate::handlers::all_different::{AllDifferent, AllDifferentMode};
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

/// One disjunct, plus (if its nested handler published exclusion cells) the
/// all-different enforcer wrapping them: exclusion cells coming out of a
/// nested handler are wrapped in an all-different enforcer so they
/// propagate without requiring the engine to observe them outside the Or.
type Disjunct<VS> = Vec<Handler<VS>>;

pub struct Or<VS: ValueSet> {
    disjuncts: Vec<Disjunct<VS>>,
    live: Vec<bool>,
    /// Cells each live disjunct's `initialize` narrowed, captured as
    /// `(cell, mask-after-init)` pairs so they can be re-applied to a fresh
    /// scratch grid (or, once finalized, to the real grid) every call.
    init_diffs: Vec<Vec<(CellIndex, VS)>>,
    watched: Vec<CellIndex>,
    final_index: Option<usize>,
}

impl<VS: ValueSet> Or<VS> {
    pub fn new(raw_disjuncts: Vec<Handler<VS>>, num_values: u32) -> Result<Or<VS>, HandlerError> {
        if raw_disjuncts.is_empty() {
            return Err(HandlerError::EmptyDisjunction);
        }

        let mut disjuncts = Vec::with_capacity(raw_disjuncts.len());
        for handler in raw_disjuncts {
            let mut group = vec![handler];
            let exclusion_cells = group[0].exclusion_cells().to_vec();
            if !exclusion_cells.is_empty() {
                let enforcer = AllDifferent::new(exclusion_cells, AllDifferentMode::Enforcer, num_values)?;
                group.push(Handler::AllDifferent(enforcer));
            }
            disjuncts.push(group);
        }

        let n = disjuncts.len();
        Ok(Or {
            disjuncts,
            live: vec![true; n],
            init_diffs: vec![Vec::new(); n],
            watched: Vec::new(),
            final_index: None,
        })
    }

    fn live_count(&self) -> usize {
        self.live.iter().filter(|&&l| l).count()
    }

    /// Reconciles `live` going from more than one to exactly one: caches the
    /// survivor's index so every later call skips straight to the
    /// single-disjunct fast path.
    fn maybe_finalize(&mut self) {
        if self.final_index.is_none() && self.live_count() == 1 {
            self.final_index = self.live.iter().position(|&l| l);
        }
    }

    fn run_group(
        group: &mut Disjunct<VS>,
        grid: &mut Grid<VS>,
        shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        for handler in group.iter_mut() {
            handler.enforce_consistency(grid, shape, acc)?;
        }
        Ok(())
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for Or<VS> {
    fn initialize(
        &mut self,
        grid: &mut Grid<VS>,
        exclusions: &CellExclusions,
        shape: &Shape,
        allocator: &mut StateAllocator,
    ) -> bool {
        let mut watched = Vec::new();

        for (i, group) in self.disjuncts.iter_mut().enumerate() {
            let mut scratch = grid.clone();
            let mut ok = true;
            for handler in group.iter_mut() {
                if !handler.initialize(&mut scratch, exclusions, shape, allocator) {
                    ok = false;
                    break;
                }
            }

            if !ok {
                self.live[i] = false;
                continue;
            }

            let mut diffs = Vec::new();
            for cell in 0..shape.num_cells {
                if scratch.cells[cell] != grid.cells[cell] {
                    diffs.push((cell, scratch.cells[cell]));
                }
            }
            self.init_diffs[i] = diffs;

            for handler in group.iter() {
                watched.extend_from_slice(handler.watched_cells());
            }
            watched.extend(self.init_diffs[i].iter().map(|&(cell, _)| cell));
        }

        watched.sort_unstable();
        watched.dedup();
        self.watched = watched;

        if self.live_count() == 0 {
            return false;
        }
        self.maybe_finalize();
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        if let Some(i) = self.final_index {
            for &(cell, mask) in &self.init_diffs[i] {
                let before = grid.cells[cell];
                let after = before.intersection(&mask);
                if after.is_empty() {
                    return Err(Contradiction);
                }
                if after != before {
                    grid.cells[cell] = after;
                    acc.add_for_cell(cell);
                }
            }
            return Self::run_group(&mut self.disjuncts[i], grid, shape, acc);
        }

        let mut result: Vec<VS> = vec![VS::empty(); self.watched.len()];

        for i in 0..self.disjuncts.len() {
            if !self.live[i] {
                continue;
            }

            let mut scratch = grid.clone();
            let mut survives = true;
            for &(cell, mask) in &self.init_diffs[i] {
                let after = scratch.cells[cell].intersection(&mask);
                if after.is_empty() {
                    survives = false;
                    break;
                }
                scratch.cells[cell] = after;
            }

            if survives {
                let mut dummy = DummyAccumulator;
                survives = Self::run_group(&mut self.disjuncts[i], &mut scratch, shape, &mut dummy).is_ok();
            }

            if !survives {
                self.live[i] = false;
                continue;
            }

            for (slot, &cell) in self.watched.iter().enumerate() {
                result[slot] |= scratch.cells[cell];
            }
            grid.tail.copy_from_slice(&scratch.tail);
        }

        if self.live_count() == 0 {
            return Err(Contradiction);
        }
        self.maybe_finalize();

        for (slot, &cell) in self.watched.iter().enumerate() {
            let before = grid.cells[cell];
            let after = before.intersection(&result[slot]);
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
        &self.watched
    }

    fn id(&self) -> String {
        let parts: Vec<String> = self
            .disjuncts
            .iter()
            .map(|group| group.iter().map(|h| h.id()).collect::<Vec<_>>().join("&"))
            .collect();
        format!("Or({})", parts.join("|"))
    }

    fn debug_name(&self) -> &'static str {
        "Or"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::given::Given;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    fn fresh(shape: &Shape) -> (Grid<Mask16>, CellExclusions, StateAllocator) {
        let allocator = StateAllocator::new();
        let grid = Grid::new(shape, &allocator);
        let exclusions = CellExclusions::from_houses(shape.num_cells, &shape.houses());
        (grid, exclusions, StateAllocator::new())
    }

    #[test]
    fn constructing_with_no_disjuncts_is_rejected() {
        let result: Result<Or<Mask16>, _> = Or::new(Vec::new(), 9);
        assert!(result.is_err());
    }

    #[test]
    fn a_disjunct_failing_initialization_is_dropped_and_the_other_wins() {
        let shape = Shape::new(3);
        let (mut grid, exclusions, mut allocator) = fresh(&shape);
        grid.cells[0] &= Mask16::from_value(5); // rules out Given(0, 7)

        let raw = vec![
            Handler::Given(Given::new(0, 7, 9).unwrap()),
            Handler::Given(Given::new(0, 5, 9).unwrap()),
        ];
        let mut handler: Or<Mask16> = Or::new(raw, 9).unwrap();
        let ok = HandlerLogic::<Mask16>::initialize(&mut handler, &mut grid, &exclusions, &shape, &mut allocator);
        assert!(ok);

        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();
        assert_eq!(grid.cells[0].value(), Some(5));
    }

    #[test]
    fn both_disjuncts_failing_is_a_contradiction() {
        let shape = Shape::new(3);
        let (mut grid, _exclusions, _allocator) = fresh(&shape);
        grid.cells[0] &= Mask16::from_value(3);

        let raw = vec![
            Handler::Given(Given::new(0, 7, 9).unwrap()),
            Handler::Given(Given::new(0, 5, 9).unwrap()),
        ];
        let mut handler: Or<Mask16> = Or::new(raw, 9).unwrap();
        let exclusions = CellExclusions::from_houses(shape.num_cells, &shape.houses());
        let mut allocator = StateAllocator::new();
        let ok = HandlerLogic::<Mask16>::initialize(&mut handler, &mut grid, &exclusions, &shape, &mut allocator);
        assert!(!ok);
    }

    #[test]
    fn a_surviving_disjunct_unions_values_rather_than_committing_early() {
        let shape = Shape::new(3);
        let (mut grid, exclusions, mut allocator) = fresh(&shape);

        let raw = vec![
            Handler::Given(Given::new(0, 5, 9).unwrap()),
            Handler::Given(Given::new(0, 7, 9).unwrap()),
        ];
        let mut handler: Or<Mask16> = Or::new(raw, 9).unwrap();
        let ok = HandlerLogic::<Mask16>::initialize(&mut handler, &mut grid, &exclusions, &shape, &mut allocator);
        assert!(ok);

        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();
        assert_eq!(grid.cells[0], Mask16::from_iter([5, 7]));
    }
}
