//! `Given`: seeds a single cell with its clued value.
//!
//! Every concrete solver built on this handler library needs one to apply
//! a puzzle's givens before propagation starts. Expressed as a first-class
//! handler, rather than folded into grid construction, so the catalog is
//! self-contained.

use crate::accumulator::Accumulator;
use crate::error::{HandlerError, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::{CandidateFinder, HandlerLogic};
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, CellValue, Shape};
use crate::value_set::ValueSet;

pub struct Given {
    cell: Option<CellIndex>,
    value: CellValue,
}

impl Given {
    /// `value` must be a 1-indexed symbol in `1..=num_values`.
    pub fn new(cell: CellIndex, value: CellValue, num_values: u8) -> Result<Given, HandlerError> {
        if value < 1 || value > num_values {
            return Err(HandlerError::ValueOutOfRange {
                value,
                num_values: num_values as u32,
            });
        }
        Ok(Given {
            cell: Some(cell),
            value,
        })
    }

    /// A handler that does nothing, used by [`crate::handler::HandlerSet::delete`]
    /// to vacate a slot without disturbing indices.
    pub fn noop() -> Given {
        Given {
            cell: None,
            value: 1,
        }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for Given {
    fn initialize(
        &mut self,
        grid: &mut Grid<VS>,
        _exclusions: &CellExclusions,
        _shape: &Shape,
        _allocator: &mut StateAllocator,
    ) -> bool {
        let Some(cell) = self.cell else { return true };
        grid.cells[cell] &= VS::from_value(self.value);
        !grid.cells[cell].is_empty()
    }

    fn enforce_consistency(
        &mut self,
        _grid: &mut Grid<VS>,
        _shape: &Shape,
        _acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        Ok(())
    }

    fn candidate_finders(&self, _grid: &Grid<VS>, _shape: &Shape) -> Vec<CandidateFinder> {
        Vec::new()
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &[]
    }

    fn id(&self) -> String {
        match self.cell {
            Some(cell) => format!("Given({cell}, {})", self.value),
            None => "Given(noop)".to_string(),
        }
    }

    fn debug_name(&self) -> &'static str {
        "Given"
    }
}
