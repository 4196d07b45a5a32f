//! `Between` and `Lockout`: ends-dominate-middle line constraints.
//! Both wrap a [`crate::handlers::binary::Binary`] over the two end
//! cells and then mask the middle cells by a function of the ends' current
//! union.

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::{self, CellExclusions};
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::tables;
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

/// `min_diff` end predicate: the two ends must be at least `min_diff`
/// apart. Built per-instance from the largest middle exclusion group
/// (`min |ends diff| = group_size + 1`).
fn make_min_diff_predicate(min_diff: u8) -> crate::handlers::binary::Predicate {
    // `Predicate` is a bare `fn`, not a closure, so `min_diff` has to be
    // folded into a small family of monomorphic functions rather than
    // captured. Group sizes are bounded by `num_values`, so a
    // match over the handful of values that actually occur is enough.
    match min_diff {
        0 | 1 => |a: u8, b: u8| a != b,
        2 => |a: u8, b: u8| a.abs_diff(b) >= 2,
        3 => |a: u8, b: u8| a.abs_diff(b) >= 3,
        4 => |a: u8, b: u8| a.abs_diff(b) >= 4,
        5 => |a: u8, b: u8| a.abs_diff(b) >= 5,
        6 => |a: u8, b: u8| a.abs_diff(b) >= 6,
        7 => |a: u8, b: u8| a.abs_diff(b) >= 7,
        _ => |a: u8, b: u8| a.abs_diff(b) >= 8,
    }
}

enum Kind {
    Between,
    Lockout,
}

pub struct BetweenLockout<VS> {
    ends: [CellIndex; 2],
    middles: Vec<CellIndex>,
    watched_cells: Vec<CellIndex>,
    binary: crate::handlers::binary::Binary<VS>,
    kind: Kind,
}

impl<VS: ValueSet> BetweenLockout<VS> {
    fn new(
        ends: [CellIndex; 2],
        middles: Vec<CellIndex>,
        exclusions: &CellExclusions,
        num_values: u32,
        kind: Kind,
    ) -> BetweenLockout<VS> {
        let mut rng = rand::thread_rng();
        let (groups, _) = exclusion::partition_into_exclusion_groups(&middles, exclusions, &mut rng);
        let largest = groups.iter().map(Vec::len).max().unwrap_or(0) as u8;
        let min_diff = largest + 1;
        let predicate = make_min_diff_predicate(min_diff);
        let binary = crate::handlers::binary::Binary::new(ends[0], ends[1], predicate, true, true, num_values)
            .expect("the min-diff predicate is always symmetric");
        let mut watched_cells = ends.to_vec();
        watched_cells.extend_from_slice(&middles);
        BetweenLockout {
            ends,
            middles,
            watched_cells,
            binary,
            kind,
        }
    }

    fn watched(&self) -> Vec<CellIndex> {
        self.watched_cells.clone()
    }

    fn ends_span(&self, grid: &Grid<VS>, num_values: u8) -> u32 {
        let union = grid.cells[self.ends[0]].union(&grid.cells[self.ends[1]]);
        let tables = tables::get_tables(num_values);
        match self.kind {
            Kind::Between => tables.value_range_exclusive(union.to_bits()),
            Kind::Lockout => {
                // Complement of the inclusive range spanned by the ends:
                // a middle may be anything outside [min(union), max(union)].
                let mask = VS::from_bits(union.to_bits());
                let lowest = mask.min();
                let highest = mask.max();
                let lo0 = lowest.value0();
                let hi0 = highest.value0();
                if hi0 < lo0 {
                    return tables.all_values;
                }
                let inclusive = if hi0 >= 31 {
                    u32::MAX
                } else {
                    ((1u64 << (hi0 + 1)) - (1u64 << lo0)) as u32
                };
                tables.all_values & !inclusive
            }
        }
    }
}

pub struct Between<VS>(BetweenLockout<VS>);
pub struct Lockout<VS>(BetweenLockout<VS>);

impl<VS: ValueSet> Between<VS> {
    pub fn new(
        ends: [CellIndex; 2],
        middles: Vec<CellIndex>,
        exclusions: &CellExclusions,
        num_values: u32,
    ) -> Between<VS> {
        Between(BetweenLockout::new(ends, middles, exclusions, num_values, Kind::Between))
    }
}

impl<VS: ValueSet> Lockout<VS> {
    pub fn new(
        ends: [CellIndex; 2],
        middles: Vec<CellIndex>,
        exclusions: &CellExclusions,
        num_values: u32,
    ) -> Lockout<VS> {
        Lockout(BetweenLockout::new(ends, middles, exclusions, num_values, Kind::Lockout))
    }
}

macro_rules! impl_between_lockout {
    ($ty:ident, $name:literal) => {
        impl<VS: ValueSet> HandlerLogic<VS> for $ty<VS> {
            fn initialize(
                &mut self,
                grid: &mut Grid<VS>,
                exclusions: &CellExclusions,
                shape: &Shape,
                allocator: &mut StateAllocator,
            ) -> bool {
                HandlerLogic::<VS>::initialize(&mut self.0.binary, grid, exclusions, shape, allocator)
            }

            fn enforce_consistency(
                &mut self,
                grid: &mut Grid<VS>,
                shape: &Shape,
                acc: &mut dyn Accumulator,
            ) -> PropagationResult {
                HandlerLogic::<VS>::enforce_consistency(&mut self.0.binary, grid, shape, acc)?;

                let num_values = shape.num_values as u8;
                let allowed = VS::from_bits(self.0.ends_span(grid, num_values));

                let mut fixed_closed_range: Option<(u32, u32)> = None;
                for &m in &self.0.middles {
                    let before = grid.cells[m];
                    let after = before.intersection(&allowed);
                    if after.is_empty() {
                        return Err(Contradiction);
                    }
                    if after != before {
                        grid.cells[m] = after;
                        acc.add_for_cell(m);
                    }
                    if let Some(v) = after.value() {
                        let lo = fixed_closed_range.map_or(v as u32, |(lo, _)| lo.min(v as u32));
                        let hi = fixed_closed_range.map_or(v as u32, |(_, hi)| hi.max(v as u32));
                        fixed_closed_range = Some((lo, hi));
                    }
                }

                if let Some((lo, hi)) = fixed_closed_range {
                    let mut closed = 0u32;
                    for v in lo..=hi {
                        closed |= 1u32 << (v - 1);
                    }
                    for &end in &self.0.ends {
                        let before = grid.cells[end];
                        let after = before & !VS::from_bits(closed);
                        if after.is_empty() {
                            return Err(Contradiction);
                        }
                        if after != before {
                            grid.cells[end] = after;
                            acc.add_for_cell(end);
                        }
                    }
                }

                Ok(())
            }

            fn exclusion_cells(&self) -> &[CellIndex] {
                &[]
            }

            fn watched_cells(&self) -> &[CellIndex] {
                &self.0.watched_cells
            }

            fn id(&self) -> String {
                let mut cells = self.0.watched();
                cells.sort_unstable();
                format!("{}({cells:?})", $name)
            }

            fn debug_name(&self) -> &'static str {
                $name
            }
        }
    };
}

impl_between_lockout!(Between, "Between");
impl_between_lockout!(Lockout, "Lockout");
