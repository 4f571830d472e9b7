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

//! Thin wrapper around the external 128-bit hash used to derive coupons and seed hashes.

use std::hash::Hasher;

/// Default update seed, matching the reference library's `DEFAULT_SEED`.
pub(crate) const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Returns the two 64-bit words of the 128-bit hash of `bytes` under `seed`.
pub(crate) fn hash128(bytes: &[u8], seed: u64) -> (u64, u64) {
    mur3::murmurhash3_x64_128(bytes, seed)
}

/// A `std::hash::Hasher` adaptor over the 128-bit hash, so sketch `update<T:
/// Hash>` can drive it the same way every other family in this crate derives
/// its coupon/slot hashes: `value.hash(&mut hasher)` then [`finish128`].
///
/// `Hasher` only exposes a 64-bit `finish()`; the bytes fed to `write` are
/// buffered and hashed in one shot on demand, since the underlying hash isn't
/// incremental.
#[derive(Debug, Clone)]
pub(crate) struct MurmurHash3X64128 {
    seed: u64,
    buf: Vec<u8>,
}

impl MurmurHash3X64128 {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            buf: Vec::new(),
        }
    }

    /// The full 128-bit hash of everything written so far.
    pub fn finish128(&self) -> (u64, u64) {
        hash128(&self.buf, self.seed)
    }
}

impl Hasher for MurmurHash3X64128 {
    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        self.finish128().0
    }
}

/// Derives the 16-bit seed hash stored in a wire preamble and checked on
/// deserialization/union to catch seed mismatches early.
pub(crate) fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _h2) = hash128(&seed.to_le_bytes(), 0);
    (h1 & 0xffff) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash128() {
        let key = "The quick brown fox jumps over the lazy dog";
        let (h1, h2) = hash128(key.as_bytes(), 0);
        assert_eq!(h1, 0xe34bbc7bbc071b6c);
        assert_eq!(h2, 0x7a433ca9c49a9347);
    }

    #[test]
    fn test_compute_seed_hash_is_stable() {
        let hash = compute_seed_hash(DEFAULT_UPDATE_SEED);
        assert_eq!(hash, compute_seed_hash(DEFAULT_UPDATE_SEED));
        assert_ne!(hash, compute_seed_hash(DEFAULT_UPDATE_SEED + 1));
    }
}
