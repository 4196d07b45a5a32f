//! `BinaryPairwise`: a k-ary constraint enforced as all O(k^2) pairs, swept
//! in O(k) via prefix/suffix accumulators.

use std::cmp;

use crate::accumulator::Accumulator;
use crate::error::{Contradiction, PropagationResult};
use crate::exclusion::CellExclusions;
use crate::handler::HandlerLogic;
use crate::state::{Grid, StateAllocator};
use crate::types::{CellIndex, Shape};
use crate::value_set::ValueSet;

pub enum PairwiseKind<VS> {
    /// Every pair must satisfy a symmetric predicate; `support[v0]` is the
    /// mask of values compatible with a neighbor fixed to `v0 + 1`.
    Predicate(Vec<VS>),
    /// Every pair must simply differ. Enforced both as the general O(k)
    /// pairwise sweep below and, on top of that, a full Régin
    /// arc-consistency filter over the group (see `all_different_filter`).
    AllDifferent,
}

pub struct BinaryPairwise<VS> {
    cells: Vec<CellIndex>,
    kind: PairwiseKind<VS>,
}

impl<VS: ValueSet> BinaryPairwise<VS> {
    pub fn new_predicate(cells: Vec<CellIndex>, support: Vec<VS>) -> BinaryPairwise<VS> {
        BinaryPairwise {
            cells,
            kind: PairwiseKind::Predicate(support),
        }
    }

    pub fn new_all_different(cells: Vec<CellIndex>) -> BinaryPairwise<VS> {
        BinaryPairwise {
            cells,
            kind: PairwiseKind::AllDifferent,
        }
    }

    /// One O(k) prefix/suffix sweep pass: `support[v0]` maps a neighbor's
    /// value to what it allows here. Returns `None` on contradiction,
    /// `Some(changed)` otherwise.
    fn sweep_once(cells: &mut [VS], support: &dyn Fn(VS) -> VS) -> Option<bool> {
        let n = cells.len();
        let mut changed = false;

        let mut prefix = vec![VS::full(16); n];
        let mut acc = VS::full(16);
        for i in 0..n {
            prefix[i] = acc;
            acc &= support(cells[i]);
        }

        let mut suffix = VS::full(16);
        for i in (0..n).rev() {
            let restricted = cells[i].intersection(&prefix[i]).intersection(&suffix);
            if restricted.is_empty() {
                return None;
            }
            if restricted != cells[i] {
                cells[i] = restricted;
                changed = true;
            }
            suffix &= support(cells[i]);
        }

        Some(changed)
    }

    fn run_predicate_sweep(cells: &mut [VS], support: &dyn Fn(VS) -> VS) -> PropagationResult {
        loop {
            match Self::sweep_once(cells, support) {
                None => return Err(Contradiction),
                Some(false) => return Ok(()),
                Some(true) => continue,
            }
        }
    }

    /// Régin's all-different consistency filter: a value survives in a
    /// cell only if it takes part in some valid assignment of all `k`
    /// cells to `k` distinct values. `cells.len()` may be less than
    /// `num_values`, so the group's domain can have slack (free values no
    /// cell is forced to use); those are folded back into the usual
    /// matching-plus-strongly-connected-components test by padding the
    /// group with one dummy cell per free value, each allowed to take any
    /// domain value, which makes the bipartite graph square again.
    fn all_different_filter(local: &mut [VS], num_values: u8) -> PropagationResult {
        let k = local.len();
        let domain = local
            .iter()
            .copied()
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(VS::empty);
        if (domain.count() as usize) < k {
            return Err(Contradiction);
        }

        let mut padded: Vec<VS> = local.to_vec();
        padded.resize(domain.count() as usize, domain);

        let mut assignees = vec![0usize; num_values as usize];
        if !max_matching(&padded, &mut assignees) {
            return Err(Contradiction);
        }
        remove_scc(&mut padded, &assignees, domain, num_values);

        for i in 0..k {
            let after = local[i] & !padded[i];
            if after.is_empty() {
                return Err(Contradiction);
            }
            local[i] = after;
        }

        Ok(())
    }
}

/// Maximum bipartite matching between cells and values, greedily assigning
/// each cell its lowest free candidate and falling back to an augmenting
/// path search when that candidate is already taken. `assignees[v]` ends up
/// holding the index of the cell matched to value `v` for every `v` in the
/// union of all cells' domains. Returns `false` if no perfect matching of
/// `cell_nodes` exists.
fn max_matching<VS: ValueSet>(cell_nodes: &[VS], assignees: &mut [usize]) -> bool {
    let mut assigned = VS::empty();

    for (i, cell_node) in cell_nodes.iter().enumerate() {
        let values = *cell_node & !assigned;
        if !values.is_empty() {
            let value = values.min();
            assignees[value.value0() as usize] = i;
            assigned |= value;
        } else {
            let matched = update_matching(cell_nodes, i, assignees, assigned);
            if matched.is_empty() {
                return false;
            }
            assigned |= matched;
        }
    }

    true
}

/// Augmenting-path search for `cell`: walks candidate values whose current
/// owner can be bumped to a different value of its own, iteratively rather
/// than recursively. Returns the (singleton) value freed up for `cell`, or
/// `VS::empty()` if no augmenting path exists.
fn update_matching<VS: ValueSet>(
    cell_nodes: &[VS],
    cell: usize,
    assignees: &mut [usize],
    assigned: VS,
) -> VS {
    let mut c_stack = vec![cell];
    let mut v_stack = vec![0u32; cell_nodes.len()];
    let mut seen = VS::empty();

    while let Some(&c) = c_stack.last() {
        let values = cell_nodes[c] & !seen;
        if values.is_empty() {
            c_stack.pop();
            continue;
        }

        let value = values.min();
        let v = value.value0();
        v_stack[c_stack.len() - 1] = v;

        let next_c = assignees[v as usize];
        let next_values = cell_nodes[next_c] & !assigned;
        if !next_values.is_empty() {
            let next_v = next_values.value0();
            assignees[next_v as usize] = next_c;
            while let Some(c) = c_stack.pop() {
                assignees[v_stack[c_stack.len()] as usize] = c;
            }
            return next_values.min();
        }

        seen |= value;
        c_stack.push(next_c);
    }

    VS::empty()
}

/// Removes, from each cell's remaining candidates, every value whose owning
/// cell (under `assignees`) is not reachable from it in the same
/// strongly-connected component of the matching's residual graph — the
/// values an all-different arc-consistency pass rules out. Iterative
/// Tarjan, walking `cell_nodes` both as value masks (a cell's leftover
/// candidates) and, via `assignees`/`assignees_inv`, as an implicit
/// cell-to-cell adjacency.
fn remove_scc<VS: ValueSet>(cell_nodes: &mut [VS], assignees: &[usize], domain: VS, num_values: u8) {
    let mut rec_stack = Vec::new();
    let mut scc_stack = Vec::new();
    let mut ids = vec![0usize; cell_nodes.len()];
    let mut lowlinks = vec![0usize; cell_nodes.len()];
    let mut assignees_inv = vec![VS::empty(); cell_nodes.len()];

    let mut seen = VS::empty();
    let mut inv_seen = VS::empty();
    let mut inv_stack_member = VS::empty();
    let mut index = 0usize;
    let mut prev_rec_stack_top = 0usize;

    let mut probe = domain;
    while let Some(bit) = probe.pop() {
        let assignee = assignees[bit.value0() as usize];
        cell_nodes[assignee] &= !bit;
        assignees_inv[assignee] = bit;
    }

    for i in 0..cell_nodes.len() {
        let cell_node = cell_nodes[i];
        if cell_node.is_empty() || !(seen & VS::from_value0(i as u32)).is_empty() {
            continue;
        }

        rec_stack.push(i);

        while let Some(&u) = rec_stack.last() {
            let u_set = VS::from_value0(u as u32);
            if (seen & u_set).is_empty() {
                ids[u] = index;
                lowlinks[u] = index;
                index += 1;
                seen |= u_set;
                let u_inv = assignees_inv[u];
                inv_stack_member |= u_inv;
                inv_seen |= u_inv;
                scc_stack.push(u);
            } else {
                let n = prev_rec_stack_top;
                lowlinks[u] = cmp::min(lowlinks[u], lowlinks[n]);
            }

            let unseen_adj = cell_nodes[u] & !inv_seen;
            if !unseen_adj.is_empty() {
                let n = assignees[unseen_adj.value0() as usize];
                rec_stack.push(n);
                continue;
            }

            let mut stack_adj = cell_nodes[u] & inv_stack_member;
            while !stack_adj.is_empty() {
                let node = stack_adj.min();
                stack_adj.remove_set(node);
                let n = assignees[node.value0() as usize];
                lowlinks[u] = cmp::min(lowlinks[u], ids[n]);
            }

            if lowlinks[u] == ids[u] {
                let mut mask = VS::full(num_values);
                for scc_index in (0..scc_stack.len()).rev() {
                    let w = scc_stack[scc_index];
                    let inv_mask = !assignees_inv[w];
                    inv_stack_member &= inv_mask;
                    mask &= inv_mask;
                    if w == u {
                        break;
                    }
                }

                let mut w = u;
                loop {
                    cell_nodes[w] &= mask;
                    w = scc_stack.pop().unwrap();
                    if w == u {
                        break;
                    }
                }
            }

            prev_rec_stack_top = *rec_stack.last().unwrap();
            rec_stack.pop();
        }
    }
}

impl<VS: ValueSet> HandlerLogic<VS> for BinaryPairwise<VS> {
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
        let mut local: Vec<VS> = self.cells.iter().map(|&c| grid.cells[c]).collect();

        match &self.kind {
            PairwiseKind::Predicate(support) => {
                let lookup = |v_mask: VS| -> VS {
                    let mut out = VS::empty();
                    let mut probe = v_mask;
                    while let Some(bit) = probe.pop() {
                        out |= support[bit.value0() as usize];
                    }
                    out
                };
                Self::run_predicate_sweep(&mut local, &lookup)?;
            }
            PairwiseKind::AllDifferent => {
                // A neighbor only forbids a value here when it's pinned to
                // that value; a still-open neighbor supports everything.
                let not_equal = |v_mask: VS| -> VS {
                    let mut out = VS::empty();
                    let mut probe = v_mask;
                    while let Some(bit) = probe.pop() {
                        out |= !bit & VS::full(num_values);
                    }
                    out
                };
                Self::run_predicate_sweep(&mut local, &not_equal)?;

                Self::all_different_filter(&mut local, num_values)?;

                // A value now reachable from only one cell must go there.
                let domain = local
                    .iter()
                    .copied()
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or_else(VS::empty);
                let mut at_least_two = VS::empty();
                let mut seen = VS::empty();
                for &v in &local {
                    at_least_two |= seen.intersection(&v);
                    seen |= v;
                }
                let hidden_singles = domain & !at_least_two;
                if !hidden_singles.is_empty() {
                    for v in local.iter_mut() {
                        let matched = v.intersection(&hidden_singles);
                        if matched.is_empty() || v.value().is_some() {
                            continue;
                        }
                        if matched.has_multiple() {
                            return Err(Contradiction);
                        }
                        *v = matched;
                    }
                }
            }
        }

        for (i, &cell) in self.cells.iter().enumerate() {
            if local[i] != grid.cells[cell] {
                grid.cells[cell] = local[i];
                acc.add_for_cell(cell);
            }
        }

        Ok(())
    }

    fn exclusion_cells(&self) -> &[CellIndex] {
        match self.kind {
            PairwiseKind::AllDifferent => &self.cells,
            PairwiseKind::Predicate(_) => &[],
        }
    }

    fn watched_cells(&self) -> &[CellIndex] {
        &self.cells
    }

    fn id(&self) -> String {
        let mut cells = self.cells.clone();
        cells.sort_unstable();
        let kind = match self.kind {
            PairwiseKind::Predicate(_) => "Predicate",
            PairwiseKind::AllDifferent => "AllDifferent",
        };
        format!("BinaryPairwise({kind}, {cells:?})")
    }

    fn debug_name(&self) -> &'static str {
        "BinaryPairwise"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::DummyAccumulator;
    use crate::types::Shape;
    use crate::value_set::Mask16;

    #[test]
    fn all_different_mode_forces_hidden_single_when_domain_matches_cell_count() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        // Three cells, domain restricted to {1,2,3}; cell 1 and 2 already
        // exclude 1, so cell 0 is the hidden single for value 1.
        grid.cells[0] &= Mask16::from_iter([1, 2, 3]);
        grid.cells[1] &= Mask16::from_iter([2, 3]);
        grid.cells[2] &= Mask16::from_iter([2, 3]);

        let mut handler: BinaryPairwise<Mask16> = BinaryPairwise::new_all_different(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[0].value(), Some(1));
    }

    #[test]
    fn all_different_mode_fails_when_domain_too_small() {
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] &= Mask16::from_iter([1, 2]);
        grid.cells[1] &= Mask16::from_iter([1, 2]);
        grid.cells[2] &= Mask16::from_iter([1, 2]);

        let mut handler: BinaryPairwise<Mask16> = BinaryPairwise::new_all_different(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        let result = HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc);
        assert!(result.is_err());
    }

    #[test]
    fn all_different_mode_does_not_spuriously_contradict_a_satisfiable_group() {
        // {1,2},{1,2},{1,2,3}: satisfiable by 1,2,3 in some order. A naive
        // pairwise sweep that treats a multi-value neighbor as forbidding
        // every one of its candidates would wrongly empty a cell here.
        let shape = Shape::new(3);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] &= Mask16::from_iter([1, 2]);
        grid.cells[1] &= Mask16::from_iter([1, 2]);
        grid.cells[2] &= Mask16::from_iter([1, 2, 3]);

        let mut handler: BinaryPairwise<Mask16> = BinaryPairwise::new_all_different(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[2].value(), Some(3));
    }

    #[test]
    fn all_different_mode_prunes_a_naked_pair_out_of_a_larger_domain() {
        // {1,2},{1,2},{1,2,3,4} with k=3: cells 0 and 1 soak up 1 and 2
        // between them in every valid assignment, so cell 2 can only be 3
        // or 4 even though its own domain has slack beyond the group size.
        let shape = Shape::new(4);
        let allocator = StateAllocator::new();
        let mut grid: Grid<Mask16> = Grid::new(&shape, &allocator);

        grid.cells[0] &= Mask16::from_iter([1, 2]);
        grid.cells[1] &= Mask16::from_iter([1, 2]);
        grid.cells[2] &= Mask16::from_iter([1, 2, 3, 4]);

        let mut handler: BinaryPairwise<Mask16> = BinaryPairwise::new_all_different(vec![0, 1, 2]);
        let mut acc = DummyAccumulator;
        HandlerLogic::<Mask16>::enforce_consistency(&mut handler, &mut grid, &shape, &mut acc).unwrap();

        assert_eq!(grid.cells[2], Mask16::from_iter([3, 4]));
    }
}
