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

/// The physical-storage regime a sketch is in, a pure function of `(lgK, numCoupons)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Empty,
    Sparse,
    Hybrid,
    Pinned,
    Sliding,
}

/// Determines the flavor for a given `lgK` and coupon count.
pub(crate) fn determine_flavor(lg_k: u8, num_coupons: u32) -> Flavor {
    let k = 1u64 << lg_k;
    let c = num_coupons as u64;
    if c == 0 {
        Flavor::Empty
    } else if 32 * c < 3 * k {
        Flavor::Sparse
    } else if 2 * c < k {
        Flavor::Hybrid
    } else if 8 * c < 27 * k {
        Flavor::Pinned
    } else {
        Flavor::Sliding
    }
}

/// Determines the window offset that `(lgK, numCoupons)` implies.
///
/// The offset is monotonically non-decreasing as coupons accumulate.
pub(crate) fn determine_correct_offset(lg_k: u8, num_coupons: u32) -> u8 {
    let k = 1i64 << lg_k;
    let c = num_coupons as i64;
    let offset = (8 * c - 19 * k) >> (lg_k as i64 + 3);
    offset.max(0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_flavor() {
        assert_eq!(determine_flavor(11, 0), Flavor::Empty);
    }

    #[test]
    fn test_flavor_progression() {
        let lg_k = 11;
        assert_eq!(determine_flavor(lg_k, 1), Flavor::Sparse);
        assert_eq!(determine_flavor(lg_k, 1 << lg_k), Flavor::Sliding);
    }

    #[test]
    fn test_offset_is_monotonic() {
        let lg_k = 12;
        let mut prev = 0;
        for c in (0..(1u32 << (lg_k + 2))).step_by(97) {
            let offset = determine_correct_offset(lg_k, c);
            assert!(offset >= prev);
            prev = offset;
        }
    }
}
