//! `FullRank`: a clue asserting that one row/column, read as a number, sits
//! at a given rank when every row/column is sorted lexicographically.
//!
//! Expressed with this crate's usual "compare, then tighten the first
//! position that still matters" idiom (the same
//! shape `Binary`'s `build_support`/`support_union` already uses for
//! pairwise reasoning). Lexicographic ties beyond the first ambiguous
//! position are left unresolved rather than searched exhaustively — a
//! future handler sweep would need to re-enter `compare` after each
//! partial commit to chase a tie all the way down, which is more search
//! than a propagator should do on every call.

use std::collections::HashSet;

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Less,
    Greater,
    Unknown,
}

fn le_mask<VS: ValueSet>(v: u8, num_values: u8) -> VS {
    VS::full(num_values) & VS::from_bits((1u32 << v) - 1)
}

fn ge_mask<VS: ValueSet>(v: u8, num_values: u8) -> VS {
    if v <= 1 {
        VS::full(num_values)
    } else {
        VS::full(num_values) & !le_mask(v - 1, num_values)
    }
}

fn compare<VS: ValueSet>(a: &[VS], b: &[VS]) -> Cmp {
    for i in 0..a.len().min(b.len()) {
        if let (Some(av), Some(bv)) = (a[i].value(), b[i].value()) {
            if av < bv {
                return Cmp::Less;
            }
            if av > bv {
                return Cmp::Greater;
            }
            continue;
        }
        let a_max = a[i].max().value().unwrap();
        let a_min = a[i].min().value().unwrap();
        let b_max = b[i].max().value().unwrap();
        let b_min = b[i].min().value().unwrap();
        if a_max < b_min {
            return Cmp::Less;
        }
        if a_min > b_max {
            return Cmp::Greater;
        }
        return Cmp::Unknown;
    }
    Cmp::Unknown
}

/// Tightens `a` and `b` at the first position that still admits both
/// orderings, so that `a < b` lexicographically. A no-op once `compare`
/// already says `Less`; a contradiction if it already says `Greater`.
fn force_less<VS: ValueSet>(a: &mut [VS], b: &mut [VS], num_values: u8) -> Result<(), Contradiction> {
    for i in 0..a.len().min(b.len()) {
        if let (Some(av), Some(bv)) = (a[i].value(), b[i].value()) {
            if av < bv {
                return Ok(());
            }
            if av > bv {
                return Err(Contradiction);
            }
            continue;
        }
        let a_max = a[i].max().value().unwrap();
        let a_min = a[i].min().value().unwrap();
        let b_max = b[i].max().value().unwrap();
        let b_min = b[i].min().value().unwrap();
        if a_max < b_min {
            return Ok(());
        }
        if a_min > b_max {
            return Err(Contradiction);
        }

        let new_a = a[i] & le_mask(b_max, num_values);
        let new_b = b[i] & ge_mask(a_min, num_values);
        if new_a.is_empty() || new_b.is_empty() {
            return Err(Contradiction);
        }
        a[i] = new_a;
        b[i] = new_b;
        return Ok(());
    }
    Ok(())
}

pub struct FullRank {
    entries: Vec<Vec<CellIndex>>,
    /// `(entry index, 1-indexed rank among all entries)`.
    clues: Vec<(usize, usize)>,
    strict: bool,
    watched: Vec<CellIndex>,
}

impl FullRank {
    pub fn new(entries: Vec<Vec<CellIndex>>, clues: Vec<(usize, usize)>, strict: bool) -> FullRank {
        let mut watched: Vec<CellIndex> = entries.iter().flatten().copied().collect();
        watched.sort_unstable();
        watched.dedup();
        FullRank {
            entries,
            clues,
            strict,
            watched,
        }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for FullRank {
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
        let n = self.entries.len();
        let mut masks: Vec<Vec<VS>> = self
            .entries
            .iter()
            .map(|entry| entry.iter().map(|&c| grid.cells[c]).collect())
            .collect();

        for &(i, ri) in &self.clues {
            for &(j, rj) in &self.clues {
                if ri < rj {
                    let (left, right) = if i < j {
                        let (l, r) = masks.split_at_mut(j);
                        (&mut l[i], &mut r[0])
                    } else {
                        let (l, r) = masks.split_at_mut(i);
                        (&mut r[0], &mut l[j])
                    };
                    force_less(left, right, num_values)?;
                }
            }
        }

        for &(i, r) in &self.clues {
            let required_below = r - 1;
            let required_above = n - r;

            let mut forced_below = 0usize;
            let mut forced_above = 0usize;
            let mut ambiguous = Vec::new();
            for j in 0..n {
                if j == i {
                    continue;
                }
                match compare(&masks[j], &masks[i]) {
                    Cmp::Less => forced_below += 1,
                    Cmp::Greater => forced_above += 1,
                    Cmp::Unknown => ambiguous.push(j),
                }
            }

            if forced_below > required_below || forced_above > required_above {
                return Err(Contradiction);
            }
            let need_below = required_below - forced_below;
            let need_above = required_above - forced_above;
            if ambiguous.len() < need_below || ambiguous.len() < need_above {
                return Err(Contradiction);
            }

            if need_below + need_above == ambiguous.len() {
                if need_above == 0 {
                    for &j in &ambiguous {
                        let (left, right) = if j < i {
                            let (l, r) = masks.split_at_mut(i);
                            (&mut l[j], &mut r[0])
                        } else {
                            let (l, r) = masks.split_at_mut(j);
                            (&mut r[0], &mut l[i])
                        };
                        force_less(left, right, num_values)?;
                    }
                } else if need_below == 0 {
                    for &j in &ambiguous {
                        let (left, right) = if i < j {
                            let (l, r) = masks.split_at_mut(j);
                            (&mut l[i], &mut r[0])
                        } else {
                            let (l, r) = masks.split_at_mut(i);
                            (&mut r[0], &mut l[j])
                        };
                        force_less(left, right, num_values)?;
                    }
                }
            }
        }

        if self.strict {
            let mut seen = HashSet::new();
            for entry in &masks {
                if let Some(values) = entry.iter().map(|m| m.value()).collect::<Option<Vec<_>>>() {
                    if !seen.insert(values) {
                        return Err(Contradiction);
                    }
                }
            }
        }

        for (entry, cells) in masks.iter().zip(&self.entries) {
            for (&mask, &cell) in entry.iter().zip(cells) {
                let before = grid.cells[cell];
                if mask.is_empty() {
                    return Err(Contradiction);
                }
                if mask != before {
                    grid.cells[cell] = mask;
                    acc.add_for_cell(cell);
                }
            }
        }

        Ok(())
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.watched
    }

    fn id(&self) -> String {
        format!("FullRank({:?}, {:?})", self.clues, self.watched)
    }

    fn debug_name(&self) -> &'static str {
        "FullRank"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn rank_one_forces_the_smallest_first_cell_against_a_fixed_rival() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        // Entry 0 is clued rank 1 (smallest of the two); entry 1's first
        // cell is already fixed at 5, so entry 0's first cell can be at
        // most 5, and cannot itself be forced to exactly 5 yet.
        grid.cells[3] = Mask16::from_value(5);

        let entries = vec![vec![0usize, 1, 2], vec![3usize, 4, 5]];
        let mut handler = FullRank::new(entries, vec![(0, 1), (1, 2)], false);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert!(grid.cells[0].intersection(&Mask16::from_iter(6..=9)).is_empty());
    }

    #[test]
    fn a_clue_contradicted_by_a_fixed_rival_fails() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] = Mask16::from_value(9);
        grid.cells[3] = Mask16::from_value(1);

        let entries = vec![vec![0usize, 1, 2], vec![3usize, 4, 5]];
        // Entry 0 clued rank 1 (smallest) but its first cell is fixed
        // above entry 1's: immediate contradiction.
        let mut handler = FullRank::new(entries, vec![(0, 1), (1, 2)], false);
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }
}
