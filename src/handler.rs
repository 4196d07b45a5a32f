//! The handler contract and the handler set, reified as a closed tagged
//! union rather than `dyn` dispatch: the hot loop is `accumulator.pop();
//! handlers[i].enforce_consistency(...)`, and a sum type with an inline
//! dispatch enum keeps that call monomorphic and branch-predictable.

use std::collections::HashMap;

use crate::accumulator::Accumulator;
use crate::error::PropagationResult;
use crate::exclusion::CellExclusions;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

use crate::handlers::all_different::AllDifferent;
use crate::handlers::between_lockout::{Between, Lockout};
use crate::handlers::binary::Binary;
use crate::handlers::binary_pairwise::BinaryPairwise;
use crate::handlers::counting_circles::CountingCircles;
use crate::handlers::full_rank::FullRank;
use crate::handlers::given::Given;
use crate::handlers::house::House;
use crate::handlers::local_entropy::{LocalEntropy, LocalMod3};
use crate::handlers::lunchbox::Lunchbox;
use crate::handlers::or::Or;
use crate::handlers::skyscraper::{HiddenSkyscraper, Skyscraper};
use crate::handlers::sum::Sum;
use crate::handlers::sumline::SumLine;
use crate::handlers::unique_value_exclusion::UniqueValueExclusion;
use crate::handlers::value_dependent_unique_value_exclusion::{
    HouseValueDependentUniqueValueExclusion, ValueDependentUniqueValueExclusion,
};

/// Something the (out-of-scope) search driver can use to pick a branching
/// cell. The core only needs to publish these, not interpret them, so this
/// is a thin, inert record rather than a trait — heuristic weighting and
/// comparison live entirely in the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFinder {
    pub cell: CellIndex,
    pub num_candidates: u32,
}

/// Per-variant behavior. Implemented by every concrete handler struct;
/// [`Handler`] dispatches to it through a `match`, never through `dyn`.
pub trait HandlerLogic<VS: ValueSet> {
    fn initialize(
        &mut self,
        grid: &mut Grid<VS>,
        exclusions: &CellExclusions,
        shape: &Shape,
        allocator: &mut StateAllocator,
    ) -> bool;

    fn post_initialize(&mut self, _grid: &Grid<VS>, _shape: &Shape) {}

    fn enforce_consistency(
        &mut self,
        grid: &mut Grid<VS>,
        shape: &Shape,
        acc: &mut dyn Accumulator,
    ) -> PropagationResult;

    fn exclusion_cells(&self) -> &[CellIndex] {
        &[]
    }

    fn priority(&self) -> i32 {
        0
    }

    fn candidate_finders(&self, _grid: &Grid<VS>, _shape: &Shape) -> Vec<CandidateFinder> {
        Vec::new()
    }

    fn watched_cells(&self) -> &[CellIndex];

    fn id(&self) -> String;

    fn debug_name(&self) -> &'static str;
}

macro_rules! handler_enum {
    ($($variant:ident ( $ty:ty )),+ $(,)?) => {
        /// The closed set of constraint propagators this crate ships.
        pub enum Handler<VS: ValueSet> {
            $($variant($ty)),+
        }

        impl<VS: ValueSet> Handler<VS> {
            pub fn initialize(
                &mut self,
                grid: &mut Grid<VS>,
                exclusions: &CellExclusions,
                shape: &Shape,
                allocator: &mut StateAllocator,
            ) -> bool {
                match self {
                    $(Handler::$variant(h) => h.initialize(grid, exclusions, shape, allocator)),+
                }
            }

            pub fn post_initialize(&mut self, grid: &Grid<VS>, shape: &Shape) {
                match self {
                    $(Handler::$variant(h) => h.post_initialize(grid, shape)),+
                }
            }

            pub fn enforce_consistency(
                &mut self,
                grid: &mut Grid<VS>,
                shape: &Shape,
                acc: &mut dyn Accumulator,
            ) -> PropagationResult {
                match self {
                    $(Handler::$variant(h) => h.enforce_consistency(grid, shape, acc)),+
                }
            }

            pub fn exclusion_cells(&self) -> &[CellIndex] {
                match self {
                    $(Handler::$variant(h) => h.exclusion_cells()),+
                }
            }

            pub fn priority(&self) -> i32 {
                match self {
                    $(Handler::$variant(h) => h.priority()),+
                }
            }

            pub fn candidate_finders(&self, grid: &Grid<VS>, shape: &Shape) -> Vec<CandidateFinder> {
                match self {
                    $(Handler::$variant(h) => h.candidate_finders(grid, shape)),+
                }
            }

            pub fn watched_cells(&self) -> &[CellIndex] {
                match self {
                    $(Handler::$variant(h) => h.watched_cells()),+
                }
            }

            pub fn id(&self) -> String {
                match self {
                    $(Handler::$variant(h) => h.id()),+
                }
            }

            pub fn debug_name(&self) -> &'static str {
                match self {
                    $(Handler::$variant(h) => h.debug_name()),+
                }
            }
        }
    };
}

handler_enum! {
    House(House),
    AllDifferent(AllDifferent<VS>),
    UniqueValueExclusion(UniqueValueExclusion),
    ValueDependentUniqueValueExclusion(ValueDependentUniqueValueExclusion),
    HouseValueDependentUniqueValueExclusion(HouseValueDependentUniqueValueExclusion),
    Sum(Sum<VS>),
    Binary(Binary<VS>),
    BinaryPairwise(BinaryPairwise<VS>),
    Lunchbox(Lunchbox),
    Skyscraper(Skyscraper),
    HiddenSkyscraper(HiddenSkyscraper),
    SumLine(SumLine),
    Between(Between<VS>),
    Lockout(Lockout<VS>),
    LocalEntropy(LocalEntropy),
    LocalMod3(LocalMod3),
    CountingCircles(CountingCircles),
    Or(Or<VS>),
    FullRank(FullRank),
    Given(Given),
}

/// Where a handler got registered: essential handlers are required for
/// correctness, auxiliary ones are optional pruning the engine may drop,
/// singleton ones own exactly one cell each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Essential,
    Auxiliary,
    Singleton,
}

/// Owns every handler instance plus the per-cell maps the accumulator needs
/// to wire up wake-ups.
pub struct HandlerSet<VS: ValueSet> {
    handlers: Vec<Handler<VS>>,
    registration: Vec<Registration>,
    id_index: HashMap<String, usize>,
    ordinary_by_cell: Vec<Vec<usize>>,
    aux_by_cell: Vec<Vec<usize>>,
    singleton_by_cell: Vec<Vec<usize>>,
}

impl<VS: ValueSet> HandlerSet<VS> {
    pub fn new(num_cells: usize) -> HandlerSet<VS> {
        HandlerSet {
            handlers: Vec::new(),
            registration: Vec::new(),
            id_index: HashMap::new(),
            ordinary_by_cell: vec![Vec::new(); num_cells],
            aux_by_cell: vec![Vec::new(); num_cells],
            singleton_by_cell: vec![Vec::new(); num_cells],
        }
    }

    fn insert(&mut self, handler: Handler<VS>, registration: Registration) -> usize {
        let id = handler.id();
        if let Some(&existing) = self.id_index.get(&id) {
            // Adding an equal handler promotes `essential` monotonically.
            if registration == Registration::Essential {
                self.registration[existing] = Registration::Essential;
            }
            return existing;
        }

        let index = self.handlers.len();
        let watched = handler.watched_cells().to_vec();
        self.handlers.push(handler);
        self.registration.push(registration);
        self.id_index.insert(id, index);

        match registration {
            Registration::Essential => {
                for cell in watched {
                    self.ordinary_by_cell[cell].push(index);
                }
            }
            Registration::Auxiliary => {
                for cell in watched {
                    self.aux_by_cell[cell].push(index);
                }
            }
            Registration::Singleton => {
                for cell in watched {
                    self.singleton_by_cell[cell].push(index);
                }
            }
        }
        index
    }

    pub fn add(&mut self, handler: Handler<VS>) -> usize {
        self.insert(handler, Registration::Essential)
    }

    pub fn add_non_essential(&mut self, handler: Handler<VS>) -> usize {
        self.insert(handler, Registration::Auxiliary)
    }

    pub fn add_aux(&mut self, handler: Handler<VS>) -> usize {
        self.insert(handler, Registration::Auxiliary)
    }

    pub fn add_singleton(&mut self, handler: Handler<VS>) -> usize {
        self.insert(handler, Registration::Singleton)
    }

    /// Replaces the handler at `index` in place, preserving every map entry
    /// that pointed at it.
    pub fn replace(&mut self, index: usize, handler: Handler<VS>) {
        self.id_index.remove(&self.handlers[index].id());
        self.id_index.insert(handler.id(), index);
        self.handlers[index] = handler;
    }

    /// Replaces the handler at `index` with a no-op `Given` that does
    /// nothing at every call, without disturbing its index or cell-map
    /// entries.
    pub fn delete(&mut self, index: usize) {
        self.id_index.remove(&self.handlers[index].id());
        self.handlers[index] = Handler::Given(Given::noop());
    }

    pub fn get_all(&self) -> &[Handler<VS>] {
        &self.handlers
    }

    pub fn get_all_mut(&mut self) -> &mut [Handler<VS>] {
        &mut self.handlers
    }

    pub fn get_ordinary_handler_map(&self) -> &[Vec<usize>] {
        &self.ordinary_by_cell
    }

    pub fn get_aux_handler_map(&self) -> &[Vec<usize>] {
        &self.aux_by_cell
    }

    pub fn get_singleton_handler_map(&self) -> &[Vec<usize>] {
        &self.singleton_by_cell
    }

    /// Indices of every handler watching a cell `handler` also watches
    /// (used by the engine to decide who else to consult when adding a
    /// handler after initialization).
    pub fn get_intersecting_indexes(&self, handler: &Handler<VS>) -> Vec<usize> {
        let mut out: Vec<usize> = handler
            .watched_cells()
            .iter()
            .flat_map(|&cell| self.ordinary_by_cell[cell].iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_set::Mask16;

    #[test]
    fn adding_the_same_handler_twice_dedups_by_id() {
        let mut set: HandlerSet<Mask16> = HandlerSet::new(4);
        let a = set.add(Handler::Given(Given::new(0, 1, 9).unwrap()));
        let b = set.add_non_essential(Handler::Given(Given::new(0, 1, 9).unwrap()));
        assert_eq!(a, b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_ids_get_distinct_slots() {
        let mut set: HandlerSet<Mask16> = HandlerSet::new(4);
        set.add(Handler::Given(Given::new(0, 1, 9).unwrap()));
        set.add(Handler::Given(Given::new(1, 2, 9).unwrap()));
        assert_eq!(set.len(), 2);
    }
}
