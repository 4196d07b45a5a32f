//! Mutual-exclusion index and exclusion-group partitioning.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::CellIndex;

/// For every cell, the set of other cells that must hold a different value
/// (derived once from the declared houses / all-different constraints, then
/// immutable for the rest of solving).
pub struct CellExclusions {
    exclusions: Vec<HashSet<CellIndex>>,
    sorted: Vec<Vec<CellIndex>>,
}

impl CellExclusions {
    /// Builds the index from the shape's houses. A real puzzle also folds in
    /// cage/line all-different declarations from the (out-of-scope) DSL; the
    /// core only needs the finished index, so callers that have additional
    /// mutual-exclusion sources can extend the `HashSet`s before calling
    /// [`CellExclusions::finish`] — see that constructor for the two-phase
    /// API.
    pub fn from_houses(num_cells: usize, houses: &[Vec<CellIndex>]) -> CellExclusions {
        let mut exclusions: Vec<HashSet<CellIndex>> = vec![HashSet::new(); num_cells];
        for house in houses {
            for &c1 in house {
                for &c2 in house {
                    if c1 != c2 {
                        exclusions[c1].insert(c2);
                    }
                }
            }
        }
        Self::finish(exclusions)
    }

    /// Finalizes a set of per-cell mutual-exclusion sets built by the
    /// caller (e.g. the DSL folding in cages and lines on top of the
    /// standard houses) into the sorted, query-ready index the handlers
    /// use.
    pub fn finish(exclusions: Vec<HashSet<CellIndex>>) -> CellExclusions {
        let sorted = exclusions
            .iter()
            .map(|set| {
                let mut v: Vec<CellIndex> = set.iter().copied().collect();
                v.sort_unstable();
                v
            })
            .collect();
        CellExclusions { exclusions, sorted }
    }

    /// All cells mutually exclusive with `cell`, sorted ascending.
    pub fn get_array(&self, cell: CellIndex) -> &[CellIndex] {
        &self.sorted[cell]
    }

    #[inline]
    pub fn is_mutually_exclusive(&self, a: CellIndex, b: CellIndex) -> bool {
        a != b && self.exclusions[a].contains(&b)
    }

    /// Cells mutually exclusive with *both* `cell1` and `cell2`.
    pub fn get_pair_exclusions(&self, cell1: CellIndex, cell2: CellIndex) -> Vec<CellIndex> {
        self.exclusions[cell1]
            .intersection(&self.exclusions[cell2])
            .copied()
            .filter(|&c| c != cell1 && c != cell2)
            .collect::<Vec<_>>()
            .tap_sort()
    }

    /// Cells mutually exclusive with every cell in `cells`.
    pub fn get_list_exclusions(&self, cells: &[CellIndex]) -> Vec<CellIndex> {
        let mut iter = cells.iter();
        let Some(&first) = iter.next() else {
            return Vec::new();
        };
        let mut common: HashSet<CellIndex> = self.exclusions[first].clone();
        for &c in iter {
            common = common.intersection(&self.exclusions[c]).copied().collect();
        }
        for &c in cells {
            common.remove(&c);
        }
        common.into_iter().collect::<Vec<_>>().tap_sort()
    }

    /// Whether every pair of `cells` is mutually exclusive.
    pub fn are_mutually_exclusive(&self, cells: &[CellIndex]) -> bool {
        for (i, &a) in cells.iter().enumerate() {
            for &b in &cells[i + 1..] {
                if !self.is_mutually_exclusive(a, b) {
                    return false;
                }
            }
        }
        true
    }
}

trait TapSort {
    fn tap_sort(self) -> Self;
}

impl TapSort for Vec<CellIndex> {
    fn tap_sort(mut self) -> Self {
        self.sort_unstable();
        self
    }
}

#[derive(Copy, Clone, Debug)]
enum GroupStrategy {
    FirstAvailable,
    MaxIntersection,
}

/// Partitions `cells` into the minimum number of exclusion groups (cliques
/// in the mutual-exclusion graph) it can find — a greedy clique cover, not
/// an exact one, re-run under both strategies above and a handful
/// of random cell orderings, keeping whichever attempt produced the
/// tightest groups (by sum of squared group sizes, which is what the reach
/// of a killer cage's sum range actually depends on).
pub fn partition_into_exclusion_groups(
    cells: &[CellIndex],
    exclusions: &CellExclusions,
    rng: &mut impl Rng,
) -> (Vec<Vec<CellIndex>>, u32) {
    const RETRIES: usize = 4;

    let mut best: Option<(Vec<Vec<CellIndex>>, u32)> = None;
    for strategy in [GroupStrategy::FirstAvailable, GroupStrategy::MaxIntersection] {
        for attempt in 0..=RETRIES {
            let mut ordered = cells.to_vec();
            if attempt > 0 {
                ordered.shuffle(rng);
            }
            let groups = greedy_partition(&ordered, exclusions, strategy);
            let score = sum_of_squares(&groups);
            if best.is_none_or_worse(score) {
                best = Some((groups, score));
            }
        }
    }
    best.expect("at least one partitioning attempt always runs")
}

trait BetterThan {
    fn is_none_or_worse(&self, score: u32) -> bool;
}

impl BetterThan for Option<(Vec<Vec<CellIndex>>, u32)> {
    fn is_none_or_worse(&self, score: u32) -> bool {
        match self {
            None => true,
            Some((_, best_score)) => score < *best_score,
        }
    }
}

fn greedy_partition(
    cells: &[CellIndex],
    exclusions: &CellExclusions,
    strategy: GroupStrategy,
) -> Vec<Vec<CellIndex>> {
    let mut groups: Vec<Vec<CellIndex>> = Vec::new();

    'cell: for &cell in cells {
        let mut best_group: Option<usize> = None;
        let mut best_score = 0usize;

        for (i, group) in groups.iter().enumerate() {
            let fits = group
                .iter()
                .all(|&member| exclusions.is_mutually_exclusive(cell, member));
            if !fits {
                continue;
            }
            match strategy {
                GroupStrategy::FirstAvailable => {
                    groups[i].push(cell);
                    continue 'cell;
                }
                GroupStrategy::MaxIntersection => {
                    if group.len() >= best_score {
                        best_score = group.len();
                        best_group = Some(i);
                    }
                }
            }
        }

        match best_group {
            Some(i) => groups[i].push(cell),
            None => groups.push(vec![cell]),
        }
    }

    groups
}

fn sum_of_squares(groups: &[Vec<CellIndex>]) -> u32 {
    groups.iter().map(|g| (g.len() as u32).pow(2)).sum()
}

/// `(range, min, max)` of sums reachable by a cage split into these
/// exclusion groups over a `num_values`-value alphabet: every cell in a
/// group of size `s` must take a distinct value, so the group alone can
/// contribute anywhere in `[1 + .. + s, (num_values - s + 1) + .. +
/// num_values]`; the cage total's reachable range is the sum of the
/// per-group ranges.
pub fn exclusion_group_sum_info(groups: &[Vec<CellIndex>], num_values: u32) -> (u32, u32, u32) {
    let mut min = 0u32;
    let mut max = 0u32;
    for group in groups {
        let s = group.len() as u32;
        min += s * (s + 1) / 2;
        max += s * (2 * num_values - s + 1) / 2;
    }
    (max - min, min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Shape;

    #[test]
    fn house_exclusions_cover_the_row() {
        let shape = Shape::new(3);
        let houses = shape.houses();
        let exclusions = CellExclusions::from_houses(shape.num_cells, &houses);

        let row0: Vec<CellIndex> = (0..9).collect();
        assert!(exclusions.are_mutually_exclusive(&row0));
        assert!(!exclusions.is_mutually_exclusive(0, 0));
        assert!(exclusions.is_mutually_exclusive(0, 8));
    }

    #[test]
    fn exclusion_groups_partition_a_mixed_cage() {
        let shape = Shape::new(3);
        let houses = shape.houses();
        let exclusions = CellExclusions::from_houses(shape.num_cells, &houses);

        // A cage spanning two different rows with no shared house: all
        // cells are mutually exclusive with same-row cells only.
        let cells = vec![
            shape.make_cell_index(0, 0),
            shape.make_cell_index(0, 1),
            shape.make_cell_index(1, 0),
        ];
        let mut rng = rand::thread_rng();
        let (groups, _) = partition_into_exclusion_groups(&cells, &exclusions, &mut rng);

        // (0,0) and (0,1) share a row (mutually exclusive); (1,0) shares
        // neither a row nor column with (0,1), so the minimal clique cover
        // puts (0,0)+(0,1) together and (1,0) alone, or finds an equally
        // small cover.
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, cells.len());
        for group in &groups {
            assert!(exclusions.are_mutually_exclusive(group));
        }
    }

    #[test]
    fn sum_info_matches_single_cell_group() {
        let groups = vec![vec![0usize]];
        let (range, min, max) = exclusion_group_sum_info(&groups, 9);
        assert_eq!((min, max), (1, 9));
        assert_eq!(range, 8);
    }
}
