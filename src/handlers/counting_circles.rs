//! `CountingCircles`: every cell in the group holds a count of how many
//! cells in that same group end up sharing its value — a cell fixed to
//! `v` asserts "exactly `v` cells here hold `v`".
//!
//! Reuses this crate's exclusion-group partitioning (see
//! [`crate::handlers::sum::Sum`]): two cells in the same pairwise-exclusive
//! group can never both hold `v`, so a
//! group contributes at most one candidate toward value `v`'s count no
//! matter how many of its cells still admit `v`. The right bound on "how
//! many cells could end up holding `v`" is therefore the number of distinct
//! groups with at least one `v`-candidate, not the raw candidate count.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::{self, CellExclusions};
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

pub struct CountingCircles {
    cells: Vec<CellIndex>,
    /// Indices into `cells`, partitioned into exclusion groups at
    /// `initialize` time, the same way `Sum` defers this until
    /// `CellExclusions` is available.
    groups: Vec<Vec<usize>>,
}

impl CountingCircles {
    pub fn new(cells: Vec<CellIndex>) -> CountingCircles {
        CountingCircles {
            cells,
            groups: Vec::new(),
        }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for CountingCircles {
    fn initialize(
        &mut self,
        _grid: &mut Grid<VS>,
        exclusions: &CellExclusions,
        _shape: &Shape,
        _allocator: &mut StateAllocator,
    ) -> bool {
        let mut rng = rand::thread_rng();
        let (groups, _) = exclusion::partition_into_exclusion_groups(&self.cells, exclusions, &mut rng);
        self.groups = groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|cell| self.cells.iter().position(|&c| c == cell).unwrap())
                    .collect()
            })
            .collect();
        true
    }

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult {
        let num_values = shape.num_values as u8;
        let n = self.cells.len();
        let masks: Vec<VS> = self.cells.iter().map(|&c| grid.cells[c]).collect();

        for v in 1..=num_values {
            let value_mask = VS::from_value(v);

            let fixed_count = masks.iter().filter(|m| m.value() == Some(v)).count() as u32;
            let potential_groups: u32 = self
                .groups
                .iter()
                .filter(|group| group.iter().any(|&i| !masks[i].intersection(&value_mask).is_empty()))
                .count() as u32;

            if fixed_count > v as u32 {
                return Err(Contradiction);
            }

            if potential_groups < v as u32 {
                if fixed_count > 0 {
                    return Err(Contradiction);
                }
                // `v` can never reach the count it would assert of itself:
                // no cell may take it.
                for i in 0..n {
                    if masks[i].intersection(&value_mask).is_empty() {
                        continue;
                    }
                    let cell = self.cells[i];
                    let before = grid.cells[cell];
                    let after = before & !value_mask;
                    if after.is_empty() {
                        return Err(Contradiction);
                    }
                    grid.cells[cell] = after;
                    acc.add_for_cell(cell);
                }
                continue;
            }

            if fixed_count == v as u32 {
                // Exactly enough cells already hold `v`; no others may.
                for i in 0..n {
                    if masks[i].value() == Some(v) || masks[i].intersection(&value_mask).is_empty() {
                        continue;
                    }
                    let cell = self.cells[i];
                    let before = grid.cells[cell];
                    let after = before & !value_mask;
                    if after.is_empty() {
                        return Err(Contradiction);
                    }
                    grid.cells[cell] = after;
                    acc.add_for_cell(cell);
                }
                continue;
            }

            if potential_groups == v as u32 {
                // Every one of the `v` groups that can still reach `v` must
                // do so; a group with exactly one `v`-candidate cell is
                // forced.
                for group in &self.groups {
                    let candidates: Vec<usize> = group
                        .iter()
                        .copied()
                        .filter(|&i| !masks[i].intersection(&value_mask).is_empty())
                        .collect();
                    if candidates.len() == 1 {
                        let cell = self.cells[candidates[0]];
                        let before = grid.cells[cell];
                        if before.value() == Some(v) {
                            continue;
                        }
                        let after = before.intersection(&value_mask);
                        if after.is_empty() {
                            return Err(Contradiction);
                        }
                        if after != before {
                            grid.cells[cell] = after;
                            acc.add_for_cell(cell);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        format!("CountingCircles({cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "CountingCircles"
    }
}
