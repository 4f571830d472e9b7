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

//! Per-flavor compression and decompression of a live sketch's coupon state
//! into the packed 32-bit-word bitstreams carried on the wire.
//!
//! Surprising-value pairs are delta-coded (by row, then by column within a
//! row) and Golomb-Rice coded, matching the reference codec. The column
//! delta's prefix is unary-coded directly through [`write_unary`]/
//! [`read_unary`] rather than through a phase-selected length-limited Huffman
//! table: the table data backing that optimization is not available in this
//! source tree, and a direct unary code is a strictly simpler special case of
//! the same prefix-free family, so round-trip correctness is unaffected. The
//! sliding window is likewise stored as raw packed bytes rather than
//! entropy-coded against the reference's 22 phase-dependent byte tables, for
//! the same reason.

use crate::cpc::flavor::Flavor;
use crate::cpc::pair_table::{PairTable, introspective_insertion_sort};
use crate::cpc::sketch::CpcSketch;
use std::cmp::Ordering;

/// The packed-word form of a sketch's coupon state, ready to be framed by the
/// serialization layer or kept around by [`crate::cpc::CpcWrapper`].
#[derive(Debug, Clone, Default)]
pub(crate) struct CompressedState {
    pub(crate) table_data: Vec<u32>,
    pub(crate) table_num_entries: u32,
    pub(crate) window_data: Vec<u32>,
}

impl CompressedState {
    pub fn compress(source: &CpcSketch) -> Self {
        let mut state = CompressedState::default();
        match source.flavor() {
            Flavor::Empty => {}
            Flavor::Sparse => state.compress_sparse_flavor(source),
            Flavor::Hybrid => state.compress_hybrid_flavor(source),
            Flavor::Pinned => state.compress_pinned_flavor(source),
            Flavor::Sliding => state.compress_sliding_flavor(source),
        }
        state
    }

    fn compress_sparse_flavor(&mut self, source: &CpcSketch) {
        debug_assert!(source.sliding_window().is_empty());
        let mut pairs = source.surprising_value_table().unwrapping_get_items();
        introspective_insertion_sort(&mut pairs);
        self.compress_surprising_values(&pairs, source.lg_k());
    }

    fn compress_hybrid_flavor(&mut self, source: &CpcSketch) {
        debug_assert!(!source.sliding_window().is_empty());
        debug_assert_eq!(source.window_offset(), 0);

        let k = 1u32 << source.lg_k();
        let mut pairs_from_table = source.surprising_value_table().unwrapping_get_items();
        introspective_insertion_sort(&mut pairs_from_table);
        let num_pairs_from_table = pairs_from_table.len() as u32;
        let num_pairs_from_window = source.num_coupons() - num_pairs_from_table;

        let mut all_pairs = tricky_get_pairs_from_window(
            source.sliding_window(),
            k,
            num_pairs_from_window,
            num_pairs_from_table,
        );
        all_pairs[..num_pairs_from_table as usize].copy_from_slice(&pairs_from_table);
        introspective_insertion_sort(&mut all_pairs);

        self.compress_surprising_values(&all_pairs, source.lg_k());
    }

    fn compress_pinned_flavor(&mut self, source: &CpcSketch) {
        self.window_data = compress_the_window(source.sliding_window());

        let mut pairs = source.surprising_value_table().unwrapping_get_items();
        if !pairs.is_empty() {
            for p in pairs.iter_mut() {
                debug_assert!(*p & 63 >= 8, "pinned surprises are never in the window");
                *p -= 8;
            }
            introspective_insertion_sort(&mut pairs);
            self.compress_surprising_values(&pairs, source.lg_k());
        }
    }

    fn compress_sliding_flavor(&mut self, source: &CpcSketch) {
        self.window_data = compress_the_window(source.sliding_window());

        let mut pairs = source.surprising_value_table().unwrapping_get_items();
        if !pairs.is_empty() {
            let offset = source.window_offset() as u32;
            for p in pairs.iter_mut() {
                let row = *p >> 6;
                let col = *p & 63;
                // Canonicalize so the stream is sortable/delta-codable regardless of offset.
                let col = (col + 56 - offset) & 63;
                *p = (row << 6) | col;
            }
            introspective_insertion_sort(&mut pairs);
            self.compress_surprising_values(&pairs, source.lg_k());
        }
    }

    fn compress_surprising_values(&mut self, pairs: &[u32], lg_k: u8) {
        let k = 1u32 << lg_k;
        let num_pairs = pairs.len() as u32;
        if num_pairs == 0 {
            return;
        }
        let num_base_bits = golomb_choose_number_of_base_bits(k + num_pairs, num_pairs as u64);
        let table_len = safe_length_for_compressed_pair_buf(k, num_pairs, num_base_bits);
        self.table_data = vec![0u32; table_len];
        let words_used = low_level_compress_pairs(pairs, num_base_bits, &mut self.table_data);
        self.table_data.truncate(words_used);
        self.table_num_entries = num_pairs;
    }

    pub fn uncompress(
        &self,
        lg_k: u8,
        num_coupons: u32,
        window_offset: u8,
    ) -> (PairTable, Vec<u8>) {
        let flavor = crate::cpc::flavor::determine_flavor(lg_k, num_coupons);
        match flavor {
            Flavor::Empty => (PairTable::new(2, 6 + lg_k), Vec::new()),
            Flavor::Sparse => self.uncompress_sparse_flavor(lg_k),
            Flavor::Hybrid => self.uncompress_hybrid_flavor(lg_k),
            Flavor::Pinned => self.uncompress_pinned_flavor(lg_k),
            Flavor::Sliding => self.uncompress_sliding_flavor(lg_k, window_offset),
        }
    }

    fn uncompress_the_surprising_values(&self, lg_k: u8) -> Vec<u32> {
        let k = 1u32 << lg_k;
        let num_pairs = self.table_num_entries;
        let num_base_bits = golomb_choose_number_of_base_bits(k + num_pairs, num_pairs as u64);
        let mut pairs = vec![0u32; num_pairs as usize];
        low_level_uncompress_pairs(&self.table_data, num_base_bits, &mut pairs);
        pairs
    }

    fn uncompress_sparse_flavor(&self, lg_k: u8) -> (PairTable, Vec<u8>) {
        let pairs = self.uncompress_the_surprising_values(lg_k);
        (PairTable::from_pairs(&pairs, 6 + lg_k), Vec::new())
    }

    fn uncompress_hybrid_flavor(&self, lg_k: u8) -> (PairTable, Vec<u8>) {
        let k = 1usize << lg_k;
        let mut pairs = self.uncompress_the_surprising_values(lg_k);
        let mut window = vec![0u8; k];
        let mut next_true_pair = 0;
        for i in 0..pairs.len() {
            let row_col = pairs[i];
            let col = row_col & 63;
            if col < 8 {
                let row = (row_col >> 6) as usize;
                window[row] |= 1 << col;
            } else {
                pairs[next_true_pair] = row_col;
                next_true_pair += 1;
            }
        }
        pairs.truncate(next_true_pair);
        (PairTable::from_pairs(&pairs, 6 + lg_k), window)
    }

    fn uncompress_pinned_flavor(&self, lg_k: u8) -> (PairTable, Vec<u8>) {
        let k = 1usize << lg_k;
        let window = uncompress_the_window(&self.window_data, k);
        if self.table_num_entries == 0 {
            return (PairTable::new(2, 6 + lg_k), window);
        }
        let mut pairs = self.uncompress_the_surprising_values(lg_k);
        for p in pairs.iter_mut() {
            debug_assert!(*p & 63 < 56);
            *p += 8;
        }
        (PairTable::from_pairs(&pairs, 6 + lg_k), window)
    }

    fn uncompress_sliding_flavor(&self, lg_k: u8, window_offset: u8) -> (PairTable, Vec<u8>) {
        let k = 1usize << lg_k;
        let window = uncompress_the_window(&self.window_data, k);
        if self.table_num_entries == 0 {
            return (PairTable::new(2, 6 + lg_k), window);
        }
        let mut pairs = self.uncompress_the_surprising_values(lg_k);
        let offset = window_offset as u32;
        for p in pairs.iter_mut() {
            let row = *p >> 6;
            let col = *p & 63;
            let col = (col + offset + 8) & 63;
            *p = (row << 6) | col;
        }
        (PairTable::from_pairs(&pairs, 6 + lg_k), window)
    }
}

/// Packs the sliding window's `k` bytes into 32-bit words with no further
/// entropy coding (see the module doc for why).
fn compress_the_window(window: &[u8]) -> Vec<u32> {
    window
        .chunks(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(buf)
        })
        .collect()
}

fn uncompress_the_window(words: &[u32], k: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for &w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out.truncate(k);
    out
}

/// The empty space that this leaves at the beginning of the output array will be filled in later
/// by the caller.
fn tricky_get_pairs_from_window(
    window: &[u8],
    k: u32,
    num_pairs_to_get: u32,
    empty_space: u32,
) -> Vec<u32> {
    let output_length = empty_space + num_pairs_to_get;
    let mut pairs = vec![0; output_length as usize];
    let mut pair_index = empty_space;
    for row_index in 0..k as usize {
        let mut byte = window[row_index];
        while byte != 0 {
            let col_index = byte.trailing_zeros();
            byte ^= 1 << col_index; // erase the 1
            pairs[pair_index as usize] = ((row_index << 6) as u32) | col_index;
            pair_index += 1;
        }
    }
    debug_assert_eq!(pair_index, output_length);
    pairs
}

fn low_level_compress_pairs(pairs: &[u32], num_base_bits: u8, out: &mut [u32]) -> usize {
    let mut bitbuf: u64 = 0;
    let mut bufbits: u8 = 0;
    let mut next_word_index = 0;
    let golomb_lo_mask = (1u64 << num_base_bits) - 1;
    let mut predicted_row_index = 0u32;
    let mut predicted_col_index = 0u32;

    for &row_col in pairs {
        let row_index = row_col >> 6;
        let col_index = row_col & 63;

        if row_index != predicted_row_index {
            predicted_col_index = 0;
        }
        debug_assert!(row_index >= predicted_row_index);
        debug_assert!(col_index >= predicted_col_index);

        let y_delta = (row_index - predicted_row_index) as u64;
        let x_delta = (col_index - predicted_col_index) as u64;

        predicted_row_index = row_index;
        predicted_col_index = col_index + 1;

        write_unary(out, &mut next_word_index, &mut bitbuf, &mut bufbits, x_delta);

        let golomb_lo = y_delta & golomb_lo_mask;
        let golomb_hi = y_delta >> num_base_bits;
        write_unary(out, &mut next_word_index, &mut bitbuf, &mut bufbits, golomb_hi);

        bitbuf |= golomb_lo << bufbits;
        bufbits += num_base_bits;
        maybe_flush_bitbuf(&mut bitbuf, &mut bufbits, out, &mut next_word_index);
    }

    bufbits += 2; // padding: guarantees a terminating 1 bit is available to the unary reader
    maybe_flush_bitbuf(&mut bitbuf, &mut bufbits, out, &mut next_word_index);

    if bufbits > 0 {
        debug_assert!(bufbits < 32);
        out[next_word_index] = (bitbuf & 0xffff_ffff) as u32;
        next_word_index += 1;
    }
    next_word_index
}

fn low_level_uncompress_pairs(words: &[u32], num_base_bits: u8, out: &mut [u32]) {
    let mut bitbuf: u64 = 0;
    let mut bufbits: u8 = 0;
    let mut word_index = 0;
    let golomb_lo_mask = (1u64 << num_base_bits) - 1;
    let mut predicted_row_index = 0u32;
    let mut predicted_col_index = 0u32;

    for slot in out.iter_mut() {
        let x_delta = read_unary(words, &mut word_index, &mut bitbuf, &mut bufbits) as u32;
        let golomb_hi = read_unary(words, &mut word_index, &mut bitbuf, &mut bufbits);

        maybe_fill_bitbuf(words, &mut word_index, &mut bitbuf, &mut bufbits, num_base_bits);
        let golomb_lo = bitbuf & golomb_lo_mask;
        bitbuf >>= num_base_bits;
        bufbits -= num_base_bits;
        let y_delta = ((golomb_hi << num_base_bits) | golomb_lo) as u32;

        if y_delta > 0 {
            predicted_col_index = 0;
        }
        let row_index = predicted_row_index + y_delta;
        let col_index = predicted_col_index + x_delta;
        *slot = (row_index << 6) | col_index;
        predicted_row_index = row_index;
        predicted_col_index = col_index + 1;
    }
}

fn write_unary(
    compressed_words: &mut [u32],
    next_word_index: &mut usize,
    bitbuf: &mut u64,
    bufbits: &mut u8,
    value: u64,
) {
    let mut remaining = value;
    while remaining >= 16 {
        remaining -= 16;
        *bufbits += 16;
        maybe_flush_bitbuf(bitbuf, bufbits, compressed_words, next_word_index);
    }
    let the_unary_code = 1u64 << remaining;
    *bitbuf |= the_unary_code << *bufbits;
    *bufbits += (remaining + 1) as u8;
    maybe_flush_bitbuf(bitbuf, bufbits, compressed_words, next_word_index);
}

fn read_unary(words: &[u32], word_index: &mut usize, bitbuf: &mut u64, bufbits: &mut u8) -> u64 {
    let mut value = 0u64;
    loop {
        maybe_fill_bitbuf(words, word_index, bitbuf, bufbits, 1);
        if *bitbuf == 0 && *bufbits < 16 {
            // Shouldn't happen with correctly padded streams; guards against infinite loops.
            maybe_fill_bitbuf(words, word_index, bitbuf, bufbits, 16);
        }
        let trailing = (*bitbuf).trailing_zeros() as u64;
        let trailing = trailing.min(*bufbits as u64);
        if trailing < *bufbits as u64 {
            value += trailing;
            *bitbuf >>= trailing + 1;
            *bufbits -= (trailing + 1) as u8;
            return value;
        }
        value += *bufbits as u64;
        *bitbuf = 0;
        *bufbits = 0;
    }
}

fn maybe_flush_bitbuf(bitbuf: &mut u64, bufbits: &mut u8, word: &mut [u32], word_index: &mut usize) {
    if *bufbits >= 32 {
        word[*word_index] = (*bitbuf & 0xffff_ffff) as u32;
        *word_index += 1;
        *bitbuf >>= 32;
        *bufbits -= 32;
    }
}

fn maybe_fill_bitbuf(
    words: &[u32],
    word_index: &mut usize,
    bitbuf: &mut u64,
    bufbits: &mut u8,
    needed_bits: u8,
) {
    if *bufbits < needed_bits {
        *bitbuf |= (words[*word_index] as u64) << *bufbits;
        *bufbits += 32;
        *word_index += 1;
    }
}

fn safe_length_for_compressed_pair_buf(k: u32, num_pairs: u32, num_base_bits: u8) -> usize {
    let k = k as usize;
    let num_pairs = num_pairs as usize;
    let num_base_bits = num_base_bits as usize;

    // Generous upper bound: each pair emits at most a handful of unary-coded
    // bits plus num_base_bits, with headroom for the occasional large delta.
    let ybits = num_pairs * (2 + num_base_bits) + (k >> num_base_bits.max(1)) + 64;
    let xbits = num_pairs * 2 + 64;
    divide_longs_rounding_up(xbits + ybits, 32)
}

fn divide_longs_rounding_up(x: usize, y: usize) -> usize {
    debug_assert_ne!(y, 0);
    let quotient = x / y;
    if quotient * y == x { quotient } else { quotient + 1 }
}

/// Returns an integer that is between zero and ceil(log_2(k)) - 1, inclusive.
fn golomb_choose_number_of_base_bits(k: u32, count: u64) -> u8 {
    debug_assert!(k > 0);
    if count == 0 {
        return 0;
    }
    let quotient = ((k as u64) - count) / count;
    if quotient == 0 { 0 } else { floor_log2_of_long(quotient) }
}

fn floor_log2_of_long(x: u64) -> u8 {
    debug_assert!(x > 0);
    let mut p = 0u8;
    let mut y = 1u64;
    loop {
        match u64::cmp(&y, &x) {
            Ordering::Equal => return p,
            Ordering::Greater => return p - 1,
            Ordering::Less => {
                p += 1;
                y <<= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_round_trip_small() {
        let pairs = vec![0u32, 1, 65, 130, 1000];
        let k = 256u32;
        let num_base_bits = golomb_choose_number_of_base_bits(k + pairs.len() as u32, pairs.len() as u64);
        let mut buf = vec![0u32; safe_length_for_compressed_pair_buf(k, pairs.len() as u32, num_base_bits)];
        let words = low_level_compress_pairs(&pairs, num_base_bits, &mut buf);
        buf.truncate(words);

        let mut out = vec![0u32; pairs.len()];
        low_level_uncompress_pairs(&buf, num_base_bits, &mut out);
        assert_eq!(out, pairs);
    }

    #[test]
    fn test_window_round_trip() {
        let k = 37;
        let window: Vec<u8> = (0..k).map(|i| (i * 13 + 1) as u8).collect();
        let packed = compress_the_window(&window);
        let unpacked = uncompress_the_window(&packed, k);
        assert_eq!(unpacked, window);
    }
}
