// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::common::NumStdDev;
use crate::cpc::bit_matrix;
use crate::cpc::estimator::Estimator;
use crate::cpc::flavor::{Flavor, determine_correct_offset, determine_flavor};
use crate::cpc::pair_table::{MIN_LG_SIZE, PairTable};
use crate::cpc::serialization;
use crate::error::Error;
use crate::hash::{DEFAULT_UPDATE_SEED, MurmurHash3X64128};
use std::hash::Hash;

/// Default log2 of K.
const DEFAULT_LG_K: u8 = 11;
/// Min log2 of K.
pub(crate) const MIN_LG_K: u8 = 4;
/// Max log2 of K.
pub(crate) const MAX_LG_K: u8 = 26;

/// A Compressed Probabilistic Counting sketch.
#[derive(Debug, Clone)]
pub struct CpcSketch {
    // immutable config variables
    lg_k: u8,
    seed: u64,

    // sketch state
    /// The number of coupons collected so far.
    num_coupons: u32,
    /// This is part of a speed optimization: columns below this are known to
    /// already be present everywhere they could possibly matter, so updates
    /// landing below it are dropped without touching the payload at all.
    first_interesting_column: u8,
    /// Physical storage for the sketch data.
    storage: PhysicalStorage,
    /// The current estimator type and associated data.
    estimator: Estimator,
}

impl Default for CpcSketch {
    fn default() -> Self {
        Self::new(DEFAULT_LG_K)
    }
}

impl CpcSketch {
    /// Creates a new `CpcSketch` with the given `lg_k` and default seed.
    pub fn new(lg_k: u8) -> Self {
        Self::with_seed(lg_k, DEFAULT_UPDATE_SEED)
    }

    /// Creates a new `CpcSketch` with the given `lg_k` and `seed`.
    pub fn with_seed(lg_k: u8, seed: u64) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k out of range; got {lg_k}",
        );

        Self {
            lg_k,
            seed,
            num_coupons: 0,
            first_interesting_column: 0,
            storage: PhysicalStorage::Empty,
            estimator: Estimator::new_hip(lg_k),
        }
    }

    /// Return the parameter lg_k.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    /// The seed used to derive this sketch's coupon hashes.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The number of distinct coupons collected so far.
    pub fn num_coupons(&self) -> u32 {
        self.num_coupons
    }

    /// Returns `true` if no coupons have been collected.
    pub fn is_empty(&self) -> bool {
        self.num_coupons == 0
    }

    /// Returns the best estimate of the cardinality of the sketch.
    pub fn estimate(&self) -> f64 {
        let (lg_k, num_coupons) = (self.lg_k, self.num_coupons);
        self.estimator.estimate(lg_k, num_coupons)
    }

    /// Returns the best estimate of the lower bound of the confidence interval given `kappa`.
    pub fn lower_bound(&self, kappa: NumStdDev) -> f64 {
        let (lg_k, num_coupons) = (self.lg_k, self.num_coupons);
        self.estimator.lower_bound(lg_k, num_coupons, kappa)
    }

    /// Returns the best estimate of the upper bound of the confidence interval given `kappa`.
    pub fn upper_bound(&self, kappa: NumStdDev) -> f64 {
        let (lg_k, num_coupons) = (self.lg_k, self.num_coupons);
        self.estimator.upper_bound(lg_k, num_coupons, kappa)
    }

    /// Feeds `item` through the seeded 128-bit hash and inserts the resulting coupon.
    pub fn update<T: Hash>(&mut self, item: T) {
        let mut hasher = MurmurHash3X64128::with_seed(self.seed);
        item.hash(&mut hasher);
        let (hash_high, hash_low) = hasher.finish128();
        let coupon = make_coupon(self.lg_k, hash_high, hash_low);
        self.update_coupon(coupon);
    }

    /// Serializes this sketch to its compressed wire form.
    pub fn serialize(&self) -> Vec<u8> {
        serialization::serialize(self)
    }

    /// Deserializes a sketch previously produced by [`CpcSketch::serialize`],
    /// validating that `seed` matches the seed hash stored in the stream.
    pub fn deserialize(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        serialization::deserialize(bytes, seed)
    }

    /// Re-derives the bit matrix and checks its popcount against `num_coupons`.
    pub fn validate(&self) -> bool {
        let k = 1usize << self.lg_k;
        let matrix = match &self.storage {
            PhysicalStorage::Empty => vec![0u64; k],
            PhysicalStorage::Sparse { table } => {
                bit_matrix::materialize(k, 0, &vec![0u8; 0], table)
            }
            PhysicalStorage::Windowed { table, window, .. } => {
                bit_matrix::materialize(k, self.window_offset(), window, table)
            }
        };
        let popcount: u32 = matrix.iter().map(|w| w.count_ones()).sum();
        popcount == self.num_coupons
    }

    pub(crate) fn flavor(&self) -> Flavor {
        determine_flavor(self.lg_k, self.num_coupons)
    }

    pub(crate) fn is_hip(&self) -> bool {
        self.estimator.is_hip()
    }

    pub(crate) fn kxp(&self) -> f64 {
        self.estimator.kxp().unwrap_or((1u64 << self.lg_k) as f64)
    }

    pub(crate) fn hip_est_accum(&self) -> f64 {
        self.estimator.hip_estimate().unwrap_or(0.0)
    }

    pub(crate) fn first_interesting_column(&self) -> u8 {
        self.first_interesting_column
    }

    pub(crate) fn window_offset(&self) -> u8 {
        match &self.storage {
            PhysicalStorage::Windowed { window_offset, .. } => *window_offset,
            _ => 0,
        }
    }

    pub(crate) fn sliding_window(&self) -> &[u8] {
        match &self.storage {
            PhysicalStorage::Windowed { window, .. } => window,
            _ => &[],
        }
    }

    /// Every coupon currently stored, in no particular order. Used by the
    /// union's accumulator-walk merge path, which replays one sketch's
    /// coupons through another's state.
    ///
    /// For `Windowed` storage this goes through [`bit_matrix::materialize`]
    /// rather than reading the sparse table's entries as set bits directly:
    /// once `window_offset > 0`, a table entry below the offset means a
    /// *surprising zero* (the early zone is implicitly all-ones), so it must
    /// be XORed against that implicit one, not treated as an independent set
    /// bit. Reusing `materialize` keeps this in sync with `update_windowed`/
    /// `modify_offset`'s own inverted-early-zone convention.
    pub(crate) fn coupons(&self) -> Vec<u32> {
        match &self.storage {
            PhysicalStorage::Empty => Vec::new(),
            PhysicalStorage::Sparse { table } => table.unwrapping_get_items(),
            PhysicalStorage::Windowed {
                table,
                window,
                window_offset,
            } => {
                let k = 1usize << self.lg_k;
                let matrix = bit_matrix::materialize(k, *window_offset, window, table);
                let mut out = Vec::new();
                for (row, &word) in matrix.iter().enumerate() {
                    let mut bits = word;
                    while bits != 0 {
                        let bit = bits.trailing_zeros();
                        bits &= bits - 1;
                        out.push(((row as u32) << 6) | bit);
                    }
                }
                out
            }
        }
    }

    /// The sparse surprising-value table, valid for every non-empty flavor
    /// (SPARSE uses it as the sole payload; HYBRID/PINNED/SLIDING pair it
    /// with a sliding window).
    pub(crate) fn surprising_value_table(&self) -> &PairTable {
        match &self.storage {
            PhysicalStorage::Sparse { table } => table,
            PhysicalStorage::Windowed { table, .. } => table,
            PhysicalStorage::Empty => empty_table(),
        }
    }

    /// Inserts a raw coupon directly, bypassing hashing. Shared by `update`
    /// and the union's accumulator-walk merge path, which replays another
    /// sketch's stored coupons through this exact state machine.
    pub(crate) fn update_coupon(&mut self, coupon: u32) {
        let col = (coupon & 63) as u8;
        if col < self.first_interesting_column {
            return;
        }
        if matches!(self.storage, PhysicalStorage::Empty) {
            self.storage = PhysicalStorage::Sparse {
                table: PairTable::new(MIN_LG_SIZE, 6 + self.lg_k),
            };
        }
        match &self.storage {
            PhysicalStorage::Sparse { .. } => self.update_sparse(coupon, col),
            PhysicalStorage::Windowed { .. } => self.update_windowed(coupon, col),
            PhysicalStorage::Empty => unreachable!("lazily initialized above"),
        }
    }

    fn update_sparse(&mut self, coupon: u32, col: u8) {
        let k = 1u64 << self.lg_k;
        let table = match &mut self.storage {
            PhysicalStorage::Sparse { table } => table,
            _ => unreachable!(),
        };
        let novel = table.maybe_insert(coupon);
        if !novel {
            return;
        }
        self.num_coupons += 1;
        self.estimator.advance_hip(self.lg_k, col);
        if 32 * (self.num_coupons as u64) >= 3 * k {
            self.promote_sparse_to_windowed();
        }
    }

    fn promote_sparse_to_windowed(&mut self) {
        let k = 1usize << self.lg_k;
        let old_table = match std::mem::replace(&mut self.storage, PhysicalStorage::Empty) {
            PhysicalStorage::Sparse { table } => table,
            _ => unreachable!(),
        };
        let mut window = vec![0u8; k];
        let mut new_table = PairTable::new(MIN_LG_SIZE, 6 + self.lg_k);
        for item in old_table.unwrapping_get_items() {
            let row = (item >> 6) as usize;
            let col = item & 63;
            if col < 8 {
                window[row] |= 1 << col;
            } else {
                new_table.maybe_insert(item);
            }
        }
        self.storage = PhysicalStorage::Windowed {
            window_offset: 0,
            window,
            table: new_table,
        };
    }

    fn update_windowed(&mut self, coupon: u32, col: u8) {
        let k = 1u64 << self.lg_k;
        let w = self.window_offset();
        let (table, window) = match &mut self.storage {
            PhysicalStorage::Windowed { table, window, .. } => (table, window),
            _ => unreachable!(),
        };

        let novel = if col < w {
            table.maybe_delete(coupon)
        } else if col < w + 8 {
            let row = (coupon >> 6) as usize;
            let bit = 1u8 << (col - w);
            let was_set = window[row] & bit != 0;
            window[row] |= bit;
            !was_set
        } else {
            table.maybe_insert(coupon)
        };

        if !novel {
            return;
        }
        self.num_coupons += 1;
        self.estimator.advance_hip(self.lg_k, col);
        if 8 * (self.num_coupons as u64) >= (27 + 8 * (w as u64)) * k {
            self.modify_offset(w + 1);
        }
    }

    /// Shifts the sliding window one column forward, rematerializing the bit
    /// matrix and redistributing its bits between the new window and the
    /// sparse table. See spec §4.2 "modify-offset".
    fn modify_offset(&mut self, new_w: u8) {
        let k = 1usize << self.lg_k;
        let old_offset = self.window_offset();
        let (table, window) = match &self.storage {
            PhysicalStorage::Windowed { table, window, .. } => (table, window),
            _ => unreachable!(),
        };
        let matrix = bit_matrix::materialize(k, old_offset, window, table);

        if new_w % 8 == 0 {
            let new_kxp = bit_matrix::sum_kxp(&matrix);
            self.estimator.refresh_kxp(new_kxp);
        }

        let mut new_table = PairTable::new(MIN_LG_SIZE, 6 + self.lg_k);
        let mut new_window = vec![0u8; k];
        let mut all_surprises = 0u64;
        let new_w_u32 = new_w as u32;

        for (row, &word) in matrix.iter().enumerate() {
            let byte = ((word >> new_w_u32) & 0xff) as u8;
            new_window[row] = byte;

            let cleared = word & !(0xffu64 << new_w_u32);
            let low_mask = (1u64 << new_w_u32) - 1;
            let flipped = cleared ^ low_mask;
            all_surprises |= flipped;

            let mut residue = flipped;
            while residue != 0 {
                let c = residue.trailing_zeros();
                residue &= residue - 1;
                new_table.maybe_insert(((row as u32) << 6) | c);
            }
        }

        self.first_interesting_column = (all_surprises.trailing_zeros() as u8).min(new_w);
        self.storage = PhysicalStorage::Windowed {
            window_offset: new_w,
            window: new_window,
            table: new_table,
        };
    }

    /// Disables HIP for good: called once a sketch has been touched by a
    /// union operation, per spec's "mergeFlag" semantics.
    pub(crate) fn freeze_to_icon(&mut self) {
        self.estimator.freeze_to_icon();
    }

    /// Builds a sketch directly from decompressed/union-reconstructed parts,
    /// skipping the incremental update path. Used by deserialization and by
    /// the union's bit-matrix reconstruction.
    pub(crate) fn from_parts(
        lg_k: u8,
        seed: u64,
        num_coupons: u32,
        first_interesting_column: u8,
        table: PairTable,
        window: Vec<u8>,
        hip: Option<(f64, f64)>,
    ) -> Self {
        let storage = if num_coupons == 0 {
            PhysicalStorage::Empty
        } else if window.is_empty() {
            PhysicalStorage::Sparse { table }
        } else {
            PhysicalStorage::Windowed {
                window_offset: determine_correct_offset(lg_k, num_coupons),
                window,
                table,
            }
        };
        let estimator = match hip {
            Some((kxp, hip_estimate)) => Estimator::Hip {
                kxp,
                hip_estimate,
                hip_err_accum: 0.0,
            },
            None => Estimator::Icon,
        };
        Self {
            lg_k,
            seed,
            num_coupons,
            first_interesting_column,
            storage,
            estimator,
        }
    }
}

fn empty_table() -> &'static PairTable {
    use std::sync::OnceLock;
    static EMPTY: OnceLock<PairTable> = OnceLock::new();
    EMPTY.get_or_init(|| PairTable::new(MIN_LG_SIZE, 6))
}

/// Packs a coupon from the two 64-bit hash outputs, per spec §4.2.
pub(crate) fn make_coupon(lg_k: u8, hash_high: u64, hash_low: u64) -> u32 {
    let k = 1u64 << lg_k;
    let row = (hash_high % k) as u32;
    let col = (hash_low.leading_zeros() + 1).min(63);
    let coupon = (row << 6) | col;
    if coupon == 0xFFFF_FFFF {
        coupon ^ (1 << 6)
    } else {
        coupon
    }
}

#[derive(Debug, Clone)]
enum PhysicalStorage {
    /// Empty storage state for EMPTY state.
    Empty,
    /// Sparse storage state for SPARSE state.
    Sparse { table: PairTable },
    /// Storage shared by HYBRID/PINNED/SLIDING: a sparse table of surprising
    /// values plus a K-byte sliding window.
    Windowed {
        window_offset: u8,
        window: Vec<u8>,
        table: PairTable,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_coupon_avoids_sentinel() {
        // At the maximum lgK, row occupies all 26 upper bits: a hash landing
        // on row = K-1 and the maximum column packs to the all-ones sentinel
        // unless make_coupon special-cases it.
        let lg_k = MAX_LG_K;
        let k = 1u64 << lg_k;
        let hash_high = k - 1;
        let hash_low = 0u64; // leading_zeros = 64 -> col clamped to 63
        let coupon = make_coupon(lg_k, hash_high, hash_low);
        assert_ne!(coupon, 0xFFFF_FFFF);
    }

    #[test]
    fn test_update_promotes_through_flavors() {
        let mut sketch = CpcSketch::new(4); // K = 16, promotes quickly
        assert_eq!(sketch.flavor(), Flavor::Empty);
        for i in 0..2000u64 {
            sketch.update(i);
        }
        assert_eq!(sketch.flavor(), Flavor::Sliding);
        assert!(sketch.validate());
    }

    #[test]
    fn test_single_update_estimate_is_one() {
        let mut sketch = CpcSketch::new(11);
        sketch.update(1);
        assert_eq!(sketch.estimate(), 1.0);
    }

    #[test]
    fn test_validate_holds_across_many_updates() {
        let mut sketch = CpcSketch::new(8);
        for i in 0..5000u64 {
            sketch.update(i);
            assert!(sketch.validate());
        }
    }
}
