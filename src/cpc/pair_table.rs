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

//! A highly specialized open-addressed hash set used for sparse coupon storage.
//!
//! Entries are packed `(row, col)` coupons (`row << 6 | col`) stored directly as
//! the table's keys; `0xffff_ffff` is reserved as the "empty slot" marker, which
//! is why coupon construction disambiguates any hash collision landing on that
//! exact value (see `make_coupon`). Load factor is kept in `(1/4, 3/4]` by
//! doubling/halving `lgSize`, and deletion uses backward-shift rehashing so no
//! tombstones are needed.
//!
//! Collision resolution here is plain linear probing rather than the
//! double-hashed stride some descriptions of this table use: backward-shift
//! deletion (no tombstones) is only correctness-preserving when a cleared slot
//! can't strand an item whose own probe chain passes through it on a
//! completely different stride, which is exactly what a shared linear stride
//! guarantees and a double-hashed one does not.

const EMPTY: u32 = u32::MAX;

pub(crate) const MIN_LG_SIZE: u8 = 2;

#[derive(Debug, Clone)]
pub(crate) struct PairTable {
    lg_size: u8,
    valid_bits: u8,
    num_items: u32,
    slots: Vec<u32>,
}

impl PairTable {
    pub fn new(lg_size: u8, valid_bits: u8) -> Self {
        debug_assert!(lg_size >= MIN_LG_SIZE);
        Self {
            lg_size,
            valid_bits,
            num_items: 0,
            slots: vec![EMPTY; 1usize << lg_size],
        }
    }

    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    pub fn lg_size(&self) -> u8 {
        self.lg_size
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn start_index(&self, item: u32) -> usize {
        let shift = self.valid_bits.saturating_sub(self.lg_size);
        ((item >> shift) as usize) & self.mask()
    }

    /// Inserts `item`, returns `true` if it was newly inserted (`false` if already present).
    pub fn maybe_insert(&mut self, item: u32) -> bool {
        debug_assert_ne!(item, EMPTY, "rowCol collided with the empty-slot sentinel");
        if !self.raw_insert(item) {
            return false;
        }
        self.num_items += 1;
        if self.num_items as usize * 4 > self.slots.len() * 3 {
            self.resize(self.lg_size + 1);
        }
        true
    }

    fn raw_insert(&mut self, item: u32) -> bool {
        let mask = self.mask();
        let mut idx = self.start_index(item);
        loop {
            match self.slots[idx] {
                EMPTY => {
                    self.slots[idx] = item;
                    return true;
                }
                cur if cur == item => return false,
                _ => idx = (idx + 1) & mask,
            }
        }
    }

    /// Removes `item` if present, returns `true` if it was removed.
    pub fn maybe_delete(&mut self, item: u32) -> bool {
        let mask = self.mask();
        let mut idx = self.start_index(item);
        loop {
            match self.slots[idx] {
                EMPTY => return false,
                cur if cur == item => break,
                _ => idx = (idx + 1) & mask,
            }
        }

        self.slots[idx] = EMPTY;
        self.num_items -= 1;
        self.backward_shift_rehash(idx);

        if self.lg_size > MIN_LG_SIZE && (self.num_items as usize) * 4 < self.slots.len() {
            self.resize(self.lg_size - 1);
        }
        true
    }

    /// Closes the hole left at `hole` by shifting back any entries whose probe
    /// sequence still needs it, per Knuth's Algorithm 6.4R.
    fn backward_shift_rehash(&mut self, mut hole: usize) {
        let mask = self.mask();
        let mut probe = (hole + 1) & mask;
        loop {
            let candidate = self.slots[probe];
            if candidate == EMPTY {
                break;
            }
            let home = self.start_index(candidate);
            let still_needs_probe = if probe >= hole {
                home > hole && home <= probe
            } else {
                home > hole || home <= probe
            };
            if !still_needs_probe {
                self.slots[hole] = candidate;
                self.slots[probe] = EMPTY;
                hole = probe;
            }
            probe = (probe + 1) & mask;
        }
    }

    fn resize(&mut self, new_lg_size: u8) {
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; 1usize << new_lg_size]);
        self.lg_size = new_lg_size;
        for item in old.into_iter().filter(|&x| x != EMPTY) {
            self.raw_insert(item);
        }
    }

    /// Returns every stored coupon, in no particular order (callers that need
    /// row/col order sort the result themselves).
    pub fn unwrapping_get_items(&self) -> Vec<u32> {
        self.slots
            .iter()
            .copied()
            .filter(|&x| x != EMPTY)
            .collect()
    }

    /// Returns every stored coupon, visited in a golden-ratio-stride order
    /// over the physical slot array rather than array order, so that walking
    /// this table to insert into another one doesn't reproduce the
    /// "snowplow" in-order pattern that degrades the destination table's own
    /// probe distribution.
    pub fn snowplow_order_items(&self) -> Vec<u32> {
        let n = self.slots.len();
        let mut out = Vec::with_capacity(self.num_items as usize);
        if n <= 1 {
            out.extend(self.slots.iter().copied().filter(|&x| x != EMPTY));
            return out;
        }
        const PHI: f64 = 0.618_033_988_749_895;
        let mask = n - 1;
        let mut stride = (PHI * n as f64) as usize | 1;
        stride &= mask;
        if stride == 0 {
            stride = 1;
        }
        let mut idx = 0usize;
        for _ in 0..n {
            let item = self.slots[idx];
            if item != EMPTY {
                out.push(item);
            }
            idx = (idx + stride) & mask;
        }
        out
    }

    /// Empties the table without shrinking its backing storage.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = EMPTY);
        self.num_items = 0;
    }

    /// Builds a fresh table sized to hold `pairs` at the target load factor and
    /// inserts them directly, skipping the incremental resize checks
    /// `maybe_insert` performs (the caller guarantees `pairs` are distinct).
    pub fn from_pairs(pairs: &[u32], valid_bits: u8) -> Self {
        let mut lg_size = MIN_LG_SIZE;
        while (pairs.len() as u64) * 4 > 3 * (1u64 << lg_size) {
            lg_size += 1;
        }
        let mut table = Self::new(lg_size, valid_bits);
        for &item in pairs {
            table.raw_insert(item);
        }
        table.num_items = pairs.len() as u32;
        table
    }
}

/// Sorts coupons ascending by packed `row << 6 | col`, which groups by row then column.
pub(crate) fn introspective_insertion_sort(items: &mut [u32]) {
    items.sort_unstable();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dedups() {
        let mut table = PairTable::new(MIN_LG_SIZE, 10);
        assert!(table.maybe_insert(5));
        assert!(!table.maybe_insert(5));
        assert_eq!(table.num_items(), 1);
    }

    #[test]
    fn test_insert_then_delete_roundtrip() {
        let mut table = PairTable::new(MIN_LG_SIZE, 12);
        let items: Vec<u32> = (0..200).map(|i| i * 7 + 1).collect();
        for &item in &items {
            table.maybe_insert(item);
        }
        assert_eq!(table.num_items() as usize, items.len());

        let mut stored = table.unwrapping_get_items();
        let mut expected = items.clone();
        introspective_insertion_sort(&mut stored);
        introspective_insertion_sort(&mut expected);
        assert_eq!(stored, expected);

        for &item in &items[..100] {
            assert!(table.maybe_delete(item));
        }
        assert_eq!(table.num_items() as usize, items.len() - 100);
        for &item in &items[100..] {
            assert!(table.unwrapping_get_items().contains(&item));
        }
    }

    #[test]
    fn test_snowplow_order_visits_every_item_once() {
        let mut table = PairTable::new(5, 20);
        let items: Vec<u32> = (0..50u32).map(|i| i * 3 + 1).collect();
        for &item in &items {
            table.maybe_insert(item);
        }
        let mut visited = table.snowplow_order_items();
        let mut expected = items;
        introspective_insertion_sort(&mut visited);
        introspective_insertion_sort(&mut expected);
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_resize_preserves_membership() {
        let mut table = PairTable::new(MIN_LG_SIZE, 16);
        for i in 0..5000u32 {
            table.maybe_insert(i * 3 + 1);
        }
        assert_eq!(table.num_items(), 5000);
        let stored = table.unwrapping_get_items();
        for i in 0..5000u32 {
            assert!(stored.contains(&(i * 3 + 1)));
        }
    }
}
