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

//! The conceptual K×64 bit matrix: a transient view used during offset shifts
//! and the permanent representation a union holds once it leaves the
//! accumulator state.

use crate::cpc::pair_table::PairTable;
use std::sync::OnceLock;

/// Materializes the bit matrix implied by `(window_offset, window, table)`.
///
/// If `window_offset > 0`, every row starts with its low `window_offset` bits
/// set (the "early zone" of surprising ones), matching the dual
/// representation: a sparse-table entry in that zone means a *zero*, so its
/// absence must default to one.
pub(crate) fn materialize(k: usize, window_offset: u8, window: &[u8], table: &PairTable) -> Vec<u64> {
    let early_mask = if window_offset > 0 {
        (1u64 << window_offset) - 1
    } else {
        0
    };
    let mut matrix = vec![early_mask; k];
    for (row, &byte) in window.iter().enumerate() {
        matrix[row] |= (byte as u64) << window_offset;
    }
    for item in table.unwrapping_get_items() {
        let row = (item >> 6) as usize;
        let col = item & 63;
        matrix[row] ^= 1u64 << col;
    }
    matrix
}

/// Sums `kxpByteLookup[byte]` over every byte of the matrix, byte `j`
/// (0 = lowest) scaled by `2^(-8j)`, accumulated in reverse order (Horner's
/// method) so the scaling division happens incrementally rather than as one
/// large power, preserving precision the same way the running `kxp` double
/// otherwise slowly sheds across many small decrements.
pub(crate) fn sum_kxp(matrix: &[u64]) -> f64 {
    let lookup = kxp_byte_lookup();
    let mut total = 0.0f64;
    for &word in matrix {
        let mut row_sum = 0.0f64;
        for j in (0..8).rev() {
            let byte = ((word >> (8 * j)) & 0xff) as usize;
            row_sum = row_sum / 256.0 + lookup[byte];
        }
        total += row_sum;
    }
    total
}

/// `kxpByteLookup[byte]`: the contribution of one byte's worth of unset bits
/// to `kxp = Σ 2^(-(col+1))` over bits that are *not* set, relative to the
/// byte's own low bit (absolute scaling by `2^(-8j)` is applied by the
/// caller). The `+1` matches `estimator::advance_hip`'s per-coupon decrement
/// of `kxp` by `2^(-(col+1))`, so a fully-unset row sums to `1`, not `2`, and
/// `sum_kxp` of an empty matrix equals `K` as the sketch's initial `kxp` does.
fn kxp_byte_lookup() -> &'static [f64; 256] {
    static TABLE: OnceLock<[f64; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f64; 256];
        for (byte, slot) in table.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for i in 0..8 {
                if byte & (1 << i) == 0 {
                    sum += 2f64.powi(-(i as i32 + 1));
                }
            }
            *slot = sum;
        }
        table
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpc::pair_table::MIN_LG_SIZE;

    #[test]
    fn test_kxp_byte_lookup_zero_byte_is_full_sum() {
        let lookup = kxp_byte_lookup();
        let expected: f64 = (0..8).map(|i| 2f64.powi(-(i as i32 + 1))).sum();
        assert!((lookup[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_kxp_byte_lookup_all_set_is_zero() {
        let lookup = kxp_byte_lookup();
        assert_eq!(lookup[0xff], 0.0);
    }

    #[test]
    fn test_materialize_matches_naive_popcount() {
        let k = 8usize;
        let mut table = PairTable::new(MIN_LG_SIZE, 6 + 3);
        table.maybe_insert((2u32 << 6) | 10);
        table.maybe_insert((5u32 << 6) | 20);
        let window = vec![0u8; k];
        let matrix = materialize(k, 0, &window, &table);
        let total_bits: u32 = matrix.iter().map(|w| w.count_ones()).sum();
        assert_eq!(total_bits, 2);
    }

    #[test]
    fn test_sum_kxp_empty_matrix_is_full_k() {
        let k = 16usize;
        let matrix = vec![0u64; k];
        let total = sum_kxp(&matrix);
        // every bit unset: each row contributes the full sum(2^-(i+1), i=0..63) = 1-2^-64 (~1.0)
        assert!((total - k as f64).abs() < 1e-6);
    }
}
