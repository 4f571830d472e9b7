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

//! Merges multiple [`CpcSketch`]es together.
//!
//! Unlike a single sketch, which keeps its coupons in whichever of the
//! sparse-table/sliding-window representations its flavor calls for, a union
//! always keeps the full conceptual K x 64 bit matrix: once two sketches have
//! been folded together there is no single well-defined "window offset" to
//! keep the compact representation anchored to, so the simplification is to
//! drop straight to the matrix and reconstruct a compact sketch from it only
//! when [`CpcUnion::to_sketch`] is called.
//!
//! A sketch's lgK can only shrink as a union accumulates input: the first
//! sketch whose lgK is smaller than the union's forces the union down to that
//! smaller lgK for good (rows are folded by index modulo the new K), matching
//! the reference library's one-way downsampling rule.

use crate::cpc::flavor::determine_correct_offset;
use crate::cpc::pair_table::{PairTable, introspective_insertion_sort};
use crate::cpc::sketch::{CpcSketch, MAX_LG_K, MIN_LG_K};
use crate::error::Error;
use crate::hash::{DEFAULT_UPDATE_SEED, compute_seed_hash};

/// Merges multiple [`CpcSketch`]es together.
#[derive(Debug, Clone)]
pub struct CpcUnion {
    lg_k: u8,
    seed: u64,
    matrix: Vec<u64>,
    num_coupons: u32,
}

impl CpcUnion {
    /// Creates a union whose lgK can never exceed `lg_k`, using the default seed.
    pub fn new(lg_k: u8) -> Self {
        Self::with_seed(lg_k, DEFAULT_UPDATE_SEED)
    }

    /// Creates a union whose lgK can never exceed `lg_k`, using `seed`.
    pub fn with_seed(lg_k: u8, seed: u64) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k out of range; got {lg_k}",
        );
        Self {
            lg_k,
            seed,
            matrix: vec![0u64; 1usize << lg_k],
            num_coupons: 0,
        }
    }

    /// The union's current lgK. Starts at the value passed to `new`/`with_seed`
    /// and can only decrease, as smaller-lgK sketches are folded in.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    /// Folds `sketch`'s coupons into the union.
    ///
    /// Errors if `sketch`'s seed doesn't match this union's seed. A sketch
    /// whose lgK is below the union's forces the union down to that lgK;
    /// a sketch whose lgK is above the union's has its coupons folded down
    /// to the union's lgK as they're merged in.
    pub fn update(&mut self, sketch: &CpcSketch) -> Result<(), Error> {
        let expected = compute_seed_hash(self.seed);
        let actual = compute_seed_hash(sketch.seed());
        if expected != actual {
            return Err(Error::seed_hash_mismatch(expected, actual));
        }
        if sketch.is_empty() {
            return Ok(());
        }

        let target_lg_k = self.lg_k.min(sketch.lg_k());
        if target_lg_k < self.lg_k {
            self.reduce_lg_k(target_lg_k);
        }

        let fold = sketch.lg_k() > target_lg_k;
        for coupon in sketch.coupons() {
            let coupon = if fold {
                fold_coupon(coupon, target_lg_k)
            } else {
                coupon
            };
            self.set_bit(coupon);
        }
        Ok(())
    }

    fn set_bit(&mut self, coupon: u32) {
        let row = (coupon >> 6) as usize;
        let bit = 1u64 << (coupon & 63);
        if self.matrix[row] & bit == 0 {
            self.matrix[row] |= bit;
            self.num_coupons += 1;
        }
    }

    fn reduce_lg_k(&mut self, new_lg_k: u8) {
        let new_k = 1usize << new_lg_k;
        let mut new_matrix = vec![0u64; new_k];
        for (row, &word) in self.matrix.iter().enumerate() {
            new_matrix[row & (new_k - 1)] |= word;
        }
        self.matrix = new_matrix;
        self.lg_k = new_lg_k;
        self.num_coupons = self.matrix.iter().map(|w| w.count_ones()).sum();
    }

    /// Produces the merged result as an owned sketch.
    ///
    /// The result always uses the post-hoc ICON estimator: once coupons from
    /// more than one stream have been combined, the streaming HIP estimator's
    /// update history no longer applies, matching the reference library's
    /// behavior of permanently disabling HIP on any sketch that has been
    /// through a union.
    pub fn to_sketch(&self) -> CpcSketch {
        let num_coupons = self.num_coupons;
        let window_offset = determine_correct_offset(self.lg_k, num_coupons);
        let (table, window) = reconstruct(&self.matrix, window_offset);
        CpcSketch::from_parts(self.lg_k, self.seed, num_coupons, 0, table, window, None)
    }
}

/// Folds a coupon's row modulo the new (smaller) K, keeping its column.
/// Two coupons from different original rows can fold onto the same new row,
/// but never onto the same `(row, col)` pair unless they already shared the
/// coupon's row-independent column, which is exactly the behavior a downsized
/// sketch is supposed to have.
fn fold_coupon(coupon: u32, to_lg_k: u8) -> u32 {
    let new_k = 1u32 << to_lg_k;
    let row = coupon >> 6;
    let col = coupon & 63;
    ((row & (new_k - 1)) << 6) | col
}

/// Inverts [`crate::cpc::bit_matrix::materialize`]: splits a raw bit matrix
/// back into a sparse surprising-value table plus a sliding window anchored
/// at `window_offset`.
fn reconstruct(matrix: &[u64], window_offset: u8) -> (PairTable, Vec<u8>) {
    let k = matrix.len();
    let lg_k = k.trailing_zeros() as u8;
    let mut window = vec![0u8; k];
    let mut pairs = Vec::new();

    let offset = window_offset as u32;
    let low_mask: u64 = if offset > 0 { (1u64 << offset) - 1 } else { 0 };
    let hi_shift = offset + 8;
    let high_mask: u64 = if hi_shift >= 64 { 0 } else { !((1u64 << hi_shift) - 1) };

    for (row, &word) in matrix.iter().enumerate() {
        window[row] = ((word >> offset) & 0xff) as u8;

        let mut early_surprises = low_mask & !word;
        while early_surprises != 0 {
            let c = early_surprises.trailing_zeros();
            early_surprises &= early_surprises - 1;
            pairs.push(((row as u32) << 6) | c);
        }

        let mut late_surprises = word & high_mask;
        while late_surprises != 0 {
            let c = late_surprises.trailing_zeros();
            late_surprises &= late_surprises - 1;
            pairs.push(((row as u32) << 6) | c);
        }
    }

    introspective_insertion_sort(&mut pairs);
    (PairTable::from_pairs(&pairs, 6 + lg_k), window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_of_disjoint_ranges_estimates_sum() {
        let mut sk1 = CpcSketch::new(11);
        let mut sk2 = CpcSketch::new(11);
        for i in 0..5000u64 {
            sk1.update(i);
        }
        for i in 5000..10000u64 {
            sk2.update(i);
        }
        let mut union = CpcUnion::new(11);
        union.update(&sk1).unwrap();
        union.update(&sk2).unwrap();
        let merged = union.to_sketch();
        assert!((merged.estimate() - 10000.0).abs() < 10000.0 * 0.05);
    }

    #[test]
    fn test_union_of_overlapping_sketches_matches_single_sketch() {
        let mut sk_dst = CpcSketch::new(10);
        let mut sk1 = CpcSketch::new(10);
        let mut sk2 = CpcSketch::new(10);
        for i in 0..100_000u64 {
            sk_dst.update(i);
        }
        for i in 0..50_000u64 {
            sk1.update(i);
        }
        for i in 50_000..100_000u64 {
            sk2.update(i);
        }
        let mut union = CpcUnion::new(10);
        union.update(&sk1).unwrap();
        union.update(&sk2).unwrap();
        let merged = union.to_sketch();
        assert!((merged.estimate() - sk_dst.estimate()).abs() / sk_dst.estimate() < 0.05);
    }

    #[test]
    fn test_seed_mismatch_is_rejected() {
        let mut sketch = CpcSketch::with_seed(11, 123);
        sketch.update(1u64);
        let mut union = CpcUnion::with_seed(11, 456);
        assert!(union.update(&sketch).is_err());
    }

    #[test]
    fn test_downsamples_to_smaller_incoming_lg_k() {
        let mut big = CpcSketch::new(12);
        let mut small = CpcSketch::new(8);
        for i in 0..2000u64 {
            big.update(i);
            small.update(i);
        }
        let mut union = CpcUnion::new(12);
        union.update(&big).unwrap();
        union.update(&small).unwrap();
        assert_eq!(union.lg_k(), 8);
    }
}
