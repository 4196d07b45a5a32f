use criterion::{criterion_group, criterion_main, Criterion};

use sudoku_variant_core::accumulator::DummyAccumulator;
use sudoku_variant_core::handler::HandlerLogic;
use sudoku_variant_core::handlers::all_different::{AllDifferent, AllDifferentMode};
use sudoku_variant_core::state::{Grid, StateAllocator};
use sudoku_variant_core::types::{CellIndex, Shape};
use sudoku_variant_core::value_set::{Mask16, ValueSet};

fn criterion_benchmark(c: &mut Criterion) {
    const NUM_VALUES: u32 = 16;
    let shape = Shape::new(4); // box_size 4 => 16x16
    let allocator = StateAllocator::new();
    let cells: Vec<CellIndex> = (0..NUM_VALUES as usize).collect();

    c.bench_function("enforce_all_different full", |b| {
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        let mut enforcer: AllDifferent<Mask16> =
            AllDifferent::new(cells.clone(), AllDifferentMode::Enforcer, NUM_VALUES).unwrap();
        b.iter(|| {
            let mut acc = DummyAccumulator;
            let _ = enforcer.enforce_consistency(&mut grid, &shape, &mut acc);
        });
    });

    c.bench_function("enforce_all_different solved", |b| {
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        for (i, &cell) in cells.iter().enumerate() {
            grid.cells[cell] = Mask16::from_value((i + 1) as u8);
        }
        let mut enforcer: AllDifferent<Mask16> =
            AllDifferent::new(cells.clone(), AllDifferentMode::Enforcer, NUM_VALUES).unwrap();
        b.iter(|| {
            let mut acc = DummyAccumulator;
            let _ = enforcer.enforce_consistency(&mut grid, &shape, &mut acc);
        });
    });

    c.bench_function("enforce_all_different partial", |b| {
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);
        grid.cells[cells[0]] = Mask16::from_value(1);
        grid.cells[cells[1]] = Mask16::from_iter([1, 2]);
        grid.cells[cells[2]] = Mask16::from_iter([1, 2, 3]);
        let mut enforcer: AllDifferent<Mask16> =
            AllDifferent::new(cells.clone(), AllDifferentMode::Enforcer, NUM_VALUES).unwrap();
        b.iter(|| {
            let mut acc = DummyAccumulator;
            let _ = enforcer.enforce_consistency(&mut grid, &shape, &mut acc);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
