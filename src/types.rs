//! Shape and index types shared across the crate.
//!
//! Small, `Copy` value types with no behavior beyond what the grid and
//! handlers need to agree on cell addressing.

/// Index of a cell within the linear grid array (`0..shape.num_cells`).
pub type CellIndex = usize;

/// A value symbol, `1..=num_values`. Bit `(value - 1)` of a [`crate::value_set::Mask16`]
/// corresponds to this value.
pub type ValueType = u8;

/// Alias kept distinct from [`ValueType`] at call sites that mean "the value
/// assigned to a cell" rather than "a value under consideration".
pub type CellValue = ValueType;

/// Fixes the grid geometry: how many values, how many cells, and how rows /
/// columns / boxes partition those cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Shape {
    pub box_size: u32,
    pub num_values: u32,
    pub num_cells: usize,
    pub side_len: u32,
}

impl Shape {
    /// `dim` is the box size; a standard Sudoku is `Shape::new(3)` (9 values,
    /// 81 cells). `dim * dim` must not exceed 16, the value-count cap this
    /// crate is built for; this is enforced by callers that build a [`crate::value_set::Mask16`]
    /// (`Mask16::full` panics above 16 bits).
    pub fn new(dim: u32) -> Shape {
        let num_values = dim * dim;
        Shape {
            box_size: dim,
            num_values,
            num_cells: (num_values * num_values) as usize,
            side_len: num_values,
        }
    }

    #[inline]
    pub fn make_cell_index(&self, row: u32, col: u32) -> CellIndex {
        ((row * self.side_len) + col) as CellIndex
    }

    #[inline]
    pub fn row_col(&self, cell: CellIndex) -> (u32, u32) {
        let cell = cell as u32;
        (cell / self.side_len, cell % self.side_len)
    }

    /// The standard row/column/box houses for this shape. Handlers and tests
    /// build on top of these; the crate does not otherwise know what a
    /// "constraint" is (that's the DSL/optimizer's job, out of scope here).
    pub fn houses(&self) -> Vec<Vec<CellIndex>> {
        let side_len = self.side_len;
        let box_size = self.box_size;
        let mut houses = Vec::with_capacity(side_len as usize * 3);

        for r in 0..side_len {
            houses.push((0..side_len).map(|c| self.make_cell_index(r, c)).collect());
        }
        for c in 0..side_len {
            houses.push((0..side_len).map(|r| self.make_cell_index(r, c)).collect());
        }
        for b in 0..side_len {
            let cells = (0..side_len)
                .map(|i| {
                    let r = (b % box_size) * box_size + (i / box_size);
                    let c = (b / box_size) * box_size + (i % box_size);
                    self.make_cell_index(r, c)
                })
                .collect();
            houses.push(cells);
        }

        houses
    }
}

/// A cell index together with the value it was clued to hold. Consumed by
/// the (out-of-scope) DSL when it builds a handler set; the core only needs
/// it to express the supplemented [`crate::handlers::given::Given`] handler.
pub type FixedValues = Vec<(CellIndex, CellValue)>;
