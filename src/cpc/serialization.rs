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

//! Wire framing: a little-endian preamble of 4-byte words followed by the
//! compressed table/window payload from [`crate::cpc::compression`].
//!
//! Layout, word by word:
//!
//! ```text
//! word 0: preambleInts | serialVersion | familyId | lgK
//! word 1: firstInterestingColumn | flags | seedHash (u16 LE)
//! word 2 (if numCoupons > 0): numCoupons
//! words 3-6 (if HAS_HIP): hipEstAccum (f64), kxp (f64)
//! word (if HAS_TABLE): tableDataLength, in words
//! word (if HAS_TABLE && HAS_WINDOW): numSvValues (table entry count)
//! word (if HAS_WINDOW): windowLength, in words
//! -- payload --
//! tableDataLength words of compressed table data
//! windowLength words of compressed window data
//! ```

use crate::codec::{SketchBytes, SketchSlice};
use crate::common::NumStdDev;
use crate::cpc::compression::CompressedState;
use crate::cpc::estimator::Estimator;
use crate::cpc::flavor::{Flavor, determine_correct_offset, determine_flavor};
use crate::cpc::sketch::CpcSketch;
use crate::error::Error;
use crate::hash::compute_seed_hash;

pub(super) const SERIAL_VERSION: u8 = 1;
pub(super) const FLAG_COMPRESSED: u8 = 1 << 1;
pub(super) const FLAG_HAS_HIP: u8 = 1 << 2;
pub(super) const FLAG_HAS_TABLE: u8 = 1 << 3;
pub(super) const FLAG_HAS_WINDOW: u8 = 1 << 4;

pub(super) fn make_preamble_ints(
    num_coupons: u32,
    has_hip: bool,
    has_table: bool,
    has_window: bool,
) -> u8 {
    let mut preamble_ints = 2;
    if num_coupons > 0 {
        preamble_ints += 1; // number of coupons
        if has_hip {
            preamble_ints += 4; // HIP
        }
        if has_table {
            preamble_ints += 1; // table data length
            // number of values (if there is no window it is the same as number of coupons)
            if has_window {
                preamble_ints += 1;
            }
        }
        if has_window {
            preamble_ints += 1; // window length
        }
    }
    preamble_ints
}

/// Scalar fields parsed out of a wire preamble, shared by [`CpcWrapper`] and
/// full sketch deserialization.
struct Header {
    lg_k: u8,
    first_interesting_column: u8,
    flags: u8,
    seed_hash: u16,
    num_coupons: u32,
    hip: Option<(f64, f64)>,
    state: CompressedState,
}

fn parse_header(bytes: &[u8]) -> Result<Header, Error> {
    let mut slice = SketchSlice::new(bytes);
    let preamble_ints = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("preambleInts", e))?;
    let serial_version = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("serialVersion", e))?;
    let family_id = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("familyId", e))?;
    let lg_k = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("lgK", e))?;

    if serial_version != SERIAL_VERSION {
        return Err(Error::unsupported_serial_version(
            SERIAL_VERSION,
            serial_version,
        ));
    }
    crate::codec::family::Family::CPC.validate_id(family_id)?;

    let first_interesting_column = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("firstInterestingColumn", e))?;
    let flags = slice
        .read_u8()
        .map_err(|e| Error::insufficient_data_of("flags", e))?;
    let seed_hash = slice
        .read_u16_le()
        .map_err(|e| Error::insufficient_data_of("seedHash", e))?;

    if flags & FLAG_COMPRESSED == 0 {
        return Err(Error::deserial(
            "only compressed sketches are supported".to_string(),
        ));
    }

    let has_hip = flags & FLAG_HAS_HIP != 0;
    let has_table = flags & FLAG_HAS_TABLE != 0;
    let has_window = flags & FLAG_HAS_WINDOW != 0;

    let num_coupons = if has_hip || has_table || has_window {
        slice
            .read_u32_le()
            .map_err(|e| Error::insufficient_data_of("numCoupons", e))?
    } else {
        0
    };

    let hip = if has_hip {
        let hip_est_accum = slice
            .read_f64_le()
            .map_err(|e| Error::insufficient_data_of("hipEstAccum", e))?;
        let kxp = slice
            .read_f64_le()
            .map_err(|e| Error::insufficient_data_of("kxp", e))?;
        Some((kxp, hip_est_accum))
    } else {
        None
    };

    let table_data_len = if has_table {
        slice
            .read_u32_le()
            .map_err(|e| Error::insufficient_data_of("tableDataLength", e))?
    } else {
        0
    };
    let table_num_entries = if has_table {
        if has_window {
            slice
                .read_u32_le()
                .map_err(|e| Error::insufficient_data_of("numSvValues", e))?
        } else {
            num_coupons
        }
    } else {
        0
    };
    let window_len = if has_window {
        slice
            .read_u32_le()
            .map_err(|e| Error::insufficient_data_of("windowLength", e))?
    } else {
        0
    };

    let expected_preamble_ints = make_preamble_ints(num_coupons, has_hip, has_table, has_window);
    if preamble_ints != expected_preamble_ints {
        return Err(Error::invalid_preamble_longs(
            expected_preamble_ints,
            preamble_ints,
        ));
    }

    let mut table_data = vec![0u32; table_data_len as usize];
    for word in table_data.iter_mut() {
        *word = slice
            .read_u32_le()
            .map_err(|e| Error::insufficient_data_of("tableData", e))?;
    }
    let mut window_data = vec![0u32; window_len as usize];
    for word in window_data.iter_mut() {
        *word = slice
            .read_u32_le()
            .map_err(|e| Error::insufficient_data_of("windowData", e))?;
    }

    Ok(Header {
        lg_k,
        first_interesting_column,
        flags,
        seed_hash,
        num_coupons,
        hip,
        state: CompressedState {
            table_data,
            table_num_entries,
            window_data,
        },
    })
}

pub(crate) fn serialize(sketch: &CpcSketch) -> Vec<u8> {
    let flavor = sketch.flavor();
    let has_table = !matches!(flavor, Flavor::Empty);
    let has_window = matches!(flavor, Flavor::Hybrid | Flavor::Pinned | Flavor::Sliding);
    let has_hip = sketch.is_hip();
    let num_coupons = sketch.num_coupons();

    let state = CompressedState::compress(sketch);
    let preamble_ints =
        make_preamble_ints(num_coupons, has_hip, has_table, !state.window_data.is_empty());

    let mut flags = FLAG_COMPRESSED;
    if has_hip {
        flags |= FLAG_HAS_HIP;
    }
    if has_table {
        flags |= FLAG_HAS_TABLE;
    }
    if has_window {
        flags |= FLAG_HAS_WINDOW;
    }

    let mut out = SketchBytes::with_capacity(4 * preamble_ints as usize);
    out.write_u8(preamble_ints);
    out.write_u8(SERIAL_VERSION);
    out.write_u8(crate::codec::family::Family::CPC.id);
    out.write_u8(sketch.lg_k());

    out.write_u8(sketch.first_interesting_column());
    out.write_u8(flags);
    out.write_u16_le(compute_seed_hash(sketch.seed()));

    if num_coupons > 0 {
        out.write_u32_le(num_coupons);
    }
    if has_hip {
        out.write_f64_le(sketch.hip_est_accum());
        out.write_f64_le(sketch.kxp());
    }
    if has_table {
        out.write_u32_le(state.table_data.len() as u32);
        if has_window {
            out.write_u32_le(state.table_num_entries);
        }
    }
    if has_window {
        out.write_u32_le(state.window_data.len() as u32);
    }
    for &word in &state.table_data {
        out.write_u32_le(word);
    }
    for &word in &state.window_data {
        out.write_u32_le(word);
    }

    out.into_bytes()
}

pub(crate) fn deserialize(bytes: &[u8], seed: u64) -> Result<CpcSketch, Error> {
    let header = parse_header(bytes)?;
    let expected_hash = compute_seed_hash(seed);
    if header.seed_hash != expected_hash {
        return Err(Error::seed_hash_mismatch(expected_hash, header.seed_hash));
    }

    let window_offset = determine_correct_offset(header.lg_k, header.num_coupons);
    let (table, window) = header
        .state
        .uncompress(header.lg_k, header.num_coupons, window_offset);

    Ok(CpcSketch::from_parts(
        header.lg_k,
        seed,
        header.num_coupons,
        header.first_interesting_column,
        table,
        window,
        header.hip,
    ))
}

/// A read-only, header-driven view over a serialized sketch.
///
/// Cardinality estimates and bounds are computed straight from the scalar
/// preamble fields without decompressing the coupon payload; reaching for the
/// fully materialized coupon state (to update it further, or merge it into a
/// union) upgrades to an owned [`CpcSketch`] on demand via [`CpcWrapper::to_sketch`].
pub struct CpcWrapper<'a> {
    bytes: &'a [u8],
    lg_k: u8,
    num_coupons: u32,
    estimator: Estimator,
}

impl<'a> CpcWrapper<'a> {
    /// Wraps `bytes`, a sketch previously produced by [`CpcSketch::serialize`].
    ///
    /// Does not validate the seed hash: a wrapper only reads scalar fields
    /// that don't depend on knowing the original update seed.
    pub fn new(bytes: &'a [u8]) -> Result<Self, Error> {
        let header = parse_header(bytes)?;
        let estimator = match header.hip {
            Some((kxp, hip_estimate)) => Estimator::Hip {
                kxp,
                hip_estimate,
                hip_err_accum: 0.0,
            },
            None => Estimator::Icon,
        };
        Ok(Self {
            bytes,
            lg_k: header.lg_k,
            num_coupons: header.num_coupons,
            estimator,
        })
    }

    /// The parameter lg_k of the wrapped sketch.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    /// Returns the best estimate of the cardinality of the wrapped sketch.
    pub fn estimate(&self) -> f64 {
        self.estimator.estimate(self.lg_k, self.num_coupons)
    }

    /// Returns the best estimate of the lower bound of the confidence interval given `kappa`.
    pub fn lower_bound(&self, kappa: NumStdDev) -> f64 {
        self.estimator.lower_bound(self.lg_k, self.num_coupons, kappa)
    }

    /// Returns the best estimate of the upper bound of the confidence interval given `kappa`.
    pub fn upper_bound(&self, kappa: NumStdDev) -> f64 {
        self.estimator.upper_bound(self.lg_k, self.num_coupons, kappa)
    }

    /// Fully decompresses into an owned, updatable [`CpcSketch`].
    ///
    /// The wire format only carries a 16-bit seed hash, not the full update
    /// seed, so the owned sketch is reconstructed against the default seed;
    /// callers who serialized under a different seed should use
    /// [`CpcSketch::deserialize`] directly instead.
    pub fn to_sketch(&self) -> Result<CpcSketch, Error> {
        CpcSketch::deserialize(self.bytes, crate::hash::DEFAULT_UPDATE_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_ints_empty() {
        assert_eq!(make_preamble_ints(0, false, false, false), 2);
    }

    #[test]
    fn test_preamble_ints_sparse_with_hip() {
        assert_eq!(make_preamble_ints(5, true, true, false), 2 + 1 + 4 + 1);
    }

    #[test]
    fn test_preamble_ints_windowed_without_hip() {
        assert_eq!(make_preamble_ints(5, false, true, true), 2 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn test_roundtrip_sparse_sketch() {
        let mut sketch = CpcSketch::new(11);
        for i in 0..50u64 {
            sketch.update(i);
        }
        let bytes = sketch.serialize();
        let back = deserialize(&bytes, sketch.seed()).unwrap();
        assert_eq!(back.num_coupons(), sketch.num_coupons());
        assert_eq!(back.estimate(), sketch.estimate());
    }

    #[test]
    fn test_roundtrip_windowed_sketch() {
        let mut sketch = CpcSketch::new(4);
        for i in 0..3000u64 {
            sketch.update(i);
        }
        let bytes = sketch.serialize();
        let back = deserialize(&bytes, sketch.seed()).unwrap();
        assert_eq!(back.num_coupons(), sketch.num_coupons());
        assert_eq!(back.estimate(), sketch.estimate());
    }

    #[test]
    fn test_wrapper_rejects_uncompressed_flag() {
        let mut sketch = CpcSketch::new(11);
        sketch.update(1u64);
        let mut bytes = sketch.serialize();
        bytes[5] &= (-3i8) as u8;
        let err = CpcWrapper::new(&bytes).unwrap_err();
        assert!(err.message().contains("only compressed sketches are supported"));
    }

    #[test]
    fn test_deserialize_rejects_wrong_seed() {
        let mut sketch = CpcSketch::new(11);
        sketch.update(1u64);
        let bytes = sketch.serialize();
        assert!(deserialize(&bytes, sketch.seed() + 1).is_err());
    }
}
