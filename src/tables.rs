//! Memoized combinatorial tables.
//!
//! Every table here is a pure function of `num_values` (plus, for the
//! per-query helpers, a small key): compute once per `num_values`, cache
//! forever, share read-only across every handler instance and every worker.
//! Uses the same `lazy_static!` "build once, reuse" shape as the rest of
//! this crate's shared, read-only precomputation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

/// A value mask represented as raw bits (not tied to any particular
/// [`crate::value_set::ValueSet`] impl) — tables are computed once and
/// reused regardless of which concrete mask type a handler is instantiated
/// with, so they trade in `u32` and let callers convert via
/// `ValueSet::{to_bits, from_bits}`.
pub type Bits = u32;

/// Combinatorial tables for a fixed `num_values`.
pub struct Tables {
    pub num_values: u8,
    pub all_values: Bits,
    /// `(count, sum) -> every `count`-element subset of `{1..=num_values}`
    /// summing to `sum`, as a mask`. Built eagerly: with `num_values <= 16`
    /// there are at most 2^16 subsets, so a single exhaustive sweep is both
    /// simpler and cheaper than building this lazily per key.
    combinations: HashMap<(usize, u32), Vec<Bits>>,
}

impl Tables {
    fn build(num_values: u8) -> Tables {
        let all_values: Bits = if num_values == 32 {
            Bits::MAX
        } else {
            (1u32 << num_values) - 1
        };

        let mut combinations: HashMap<(usize, u32), Vec<Bits>> = HashMap::new();
        for mask in 1..=all_values {
            let count = mask.count_ones() as usize;
            let sum = Self::mask_sum(mask);
            combinations.entry((count, sum)).or_default().push(mask);
        }

        Tables {
            num_values,
            all_values,
            combinations,
        }
    }

    #[inline]
    fn mask_sum(mask: Bits) -> u32 {
        let mut m = mask;
        let mut sum = 0u32;
        let mut value = 1u32;
        while m != 0 {
            if m & 1 != 0 {
                sum += value;
            }
            value += 1;
            m >>= 1;
        }
        sum
    }

    /// Every `count`-element subset of `{1..=num_values}` summing to `sum`.
    pub fn combinations(&self, count: usize, sum: u32) -> &[Bits] {
        static EMPTY: &[Bits] = &[];
        self.combinations
            .get(&(count, sum))
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    /// Combinations restricted to a subset of the value domain (e.g. "every
    /// cell must be one of these candidates", or the sandwich sentinel-free
    /// interior domain).
    pub fn combinations_within(&self, count: usize, sum: u32, domain: Bits) -> Vec<Bits> {
        self.combinations(count, sum)
            .iter()
            .copied()
            .filter(|m| m & !domain == 0)
            .collect()
    }

    /// The mask of values strictly between the min and max set bit of
    /// `mask`.
    pub fn value_range_exclusive(&self, mask: Bits) -> Bits {
        if mask == 0 {
            return 0;
        }
        let lowest = mask.trailing_zeros();
        let highest = 31 - mask.leading_zeros();
        if highest <= lowest + 1 {
            return 0;
        }
        let span = ((1u64 << highest) - (1u64 << (lowest + 1))) as Bits;
        span & self.all_values
    }

    /// Distinct unordered pairs `(a, b)`, `a < b`, both in `1..=num_values`,
    /// with `a + b == sum`. Used by `Sum`'s three-cell fast path.
    pub fn pairwise_sums(&self, sum: u32) -> Vec<(u8, u8)> {
        let mut pairs = Vec::new();
        for a in 1..=self.num_values {
            let b_val = sum as i64 - a as i64;
            if b_val <= a as i64 || b_val > self.num_values as i64 {
                continue;
            }
            pairs.push((a, b_val as u8));
        }
        pairs
    }

    /// The "doubles" table: the single value `v` such that `2v == sum`, if
    /// any, used for non-mutually-exclusive cell pairs in `Sum`'s fast path.
    pub fn doubles(&self, sum: u32) -> Option<u8> {
        if sum % 2 != 0 {
            return None;
        }
        let v = (sum / 2) as u8;
        if v >= 1 && v as u32 <= self.num_values as u32 {
            Some(v)
        } else {
            None
        }
    }

    /// The interior domain for a Lunchbox/Sandwich line: every value except
    /// the two sentinels `1` and `num_values`.
    pub fn sandwich_interior_domain(&self) -> Bits {
        self.all_values & !1 & !(1 << (self.num_values - 1))
    }

    /// `[d_min, d_max]`: the range of interior-cell counts `d` for which some
    /// combination of `d` distinct interior values sums to `sum`.
    pub fn sandwich_distance_range(&self, sum: u32) -> Option<(usize, usize)> {
        let domain = self.sandwich_interior_domain();
        let mut min = None;
        let mut max = None;
        for count in 0..=self.num_values as usize {
            if !self.combinations_within(count, sum, domain).is_empty() {
                min.get_or_insert(count);
                max = Some(count);
            }
        }
        min.zip(max)
    }
}

lazy_static! {
    static ref TABLE_CACHE: Mutex<HashMap<u8, Arc<Tables>>> = Mutex::new(HashMap::new());
}

/// Fetch (building and caching on first use) the combinatorial tables for
/// `num_values`. Cheap to call repeatedly: every handler instance for the
/// same grid shares the same `Arc`.
pub fn get_tables(num_values: u8) -> Arc<Tables> {
    let mut cache = TABLE_CACHE.lock().unwrap();
    cache
        .entry(num_values)
        .or_insert_with(|| Arc::new(Tables::build(num_values)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combinations_sum_correctly() {
        let tables = get_tables(9);
        for mask in tables.combinations(3, 17) {
            assert_eq!(Tables::mask_sum(*mask), 17);
            assert_eq!(mask.count_ones(), 3);
        }
        // 8 + 9 is the unique pair summing to 17 among 1..=9.
        assert_eq!(tables.pairwise_sums(17), vec![(8, 9)]);
    }

    #[test]
    fn value_range_exclusive_excludes_endpoints() {
        let tables = get_tables(9);
        // mask = {1, 9}; strictly-between mask should be {2..8}.
        let mask = (1 << 0) | (1 << 8);
        let expected: Bits = tables.all_values & !mask;
        assert_eq!(tables.value_range_exclusive(mask), expected);
    }

    #[test]
    fn doubles_requires_even_sum_in_range() {
        let tables = get_tables(9);
        assert_eq!(tables.doubles(10), Some(5));
        assert_eq!(tables.doubles(21), None); // out of range for 9 values
        assert_eq!(tables.doubles(7), None); // odd
    }

    #[test]
    fn sandwich_distance_range_for_small_target() {
        let tables = get_tables(9);
        // interior domain is {2..=8}; sum 5 can be made with 1 cell ({5})
        // or 2 cells ({2,3}), so d ranges over [1, 2].
        let (min, max) = tables.sandwich_distance_range(5).unwrap();
        assert_eq!(min, 1);
        assert_eq!(max, 2);
    }
}
