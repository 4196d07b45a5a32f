//! Error handling.
//!
//! Two distinct error shapes, keeping apart: a puzzle-time contradiction
//! (common, cheap, expected) and a programmer-time structural misuse
//! (rare, reported once, never on the propagation hot path).

use crate::types::CellIndex;

/// A handler found the grid inconsistent. Carries no payload: backtracking
/// callers match on it and never print it, so there is nothing worth
/// allocating for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Contradiction;

/// Every `enforce_consistency` call returns this.
pub type PropagationResult = Result<(), Contradiction>;

/// A handler was asked to do something that can never be satisfied, caught
/// at construction time rather than during propagation. These are
/// programmer errors in the (out-of-scope) DSL/optimizer that built the
/// handler set, not puzzle contradictions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("cage names {given} cells but the lookup tables cap combinations at {max}")]
    CageTooLarge { given: usize, max: usize },

    #[error("house/all-different constraint names {given} cells for only {num_values} values")]
    TooManyCellsForHouse { given: usize, num_values: u32 },

    #[error("value {value} is out of range for a {num_values}-value grid")]
    ValueOutOfRange { value: u8, num_values: u32 },

    #[error("binary constraint predicate is not symmetric but was declared symmetric")]
    PredicateNotSymmetric,

    #[error("duplicate singleton handler registered for cell {cell}")]
    DuplicateSingleton { cell: CellIndex },

    #[error("disjunction has no live disjuncts after initialization")]
    EmptyDisjunction,

    #[error("sum-line modulus {modulus} exceeds the supported maximum of {max}")]
    SumLineModulusTooLarge { modulus: u32, max: u32 },
}
