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
//! Bloom runtime filter payload.
//!
//! Responsibilities:
//! - Fixed-size bit array with k hash positions per value, sized at
//!   creation from the expected insertion count and target false-positive
//!   rate; insertion never reallocates.
//! - Merge is bitwise OR and requires identical geometry.
//!
//! Key exported interfaces:
//! - Types: `BloomFilter`.
//!
//! False positives are permitted, false negatives are not; probing a value
//! that was inserted always reports maybe.

use std::hash::Hasher;

use twox_hash::XxHash64;

use super::values::FilterKey;

const HASH_SEED_1: u64 = 0x8f51_2af8_7a65_39aa;
const HASH_SEED_2: u64 = 0x1d40_91b0_97c5_5d1b;

#[derive(Clone, Debug)]
pub struct BloomFilter {
    num_bits: u32,
    num_hashes: u8,
    words: Vec<u64>,
    contains_null: bool,
}

fn xxh64(data: &[u8], seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(data);
    hasher.finish()
}

/// Bits for `n` expected entries at false-positive rate `p`, before
/// clamping: `-n ln p / (ln 2)^2`.
fn optimal_num_bits(n: u64, p: f64) -> u64 {
    let n = n.max(1) as f64;
    let p = p.clamp(1e-6, 0.5);
    (-(n * p.ln()) / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil() as u64
}

/// Hash-function count for a bits-per-entry ratio: `m/n ln 2`.
fn optimal_num_hashes(num_bits: u64, n: u64) -> u8 {
    let ratio = num_bits as f64 / n.max(1) as f64;
    (ratio * std::f64::consts::LN_2).round().clamp(1.0, 8.0) as u8
}

impl BloomFilter {
    /// Size the filter for `expected_entries` at `fpp`, clamped into
    /// `[min_bits, max_bits]` and rounded up to a whole number of words.
    pub fn with_expected_entries(
        expected_entries: u64,
        fpp: f64,
        min_bits: u32,
        max_bits: u32,
    ) -> Self {
        let raw_bits = optimal_num_bits(expected_entries, fpp)
            .clamp(min_bits.max(64) as u64, max_bits.max(64) as u64);
        let num_words = raw_bits.div_ceil(64) as usize;
        let num_bits = (num_words * 64) as u32;
        let num_hashes = optimal_num_hashes(num_bits as u64, expected_entries);
        Self {
            num_bits,
            num_hashes,
            words: vec![0u64; num_words],
            contains_null: false,
        }
    }

    pub fn from_parts(
        num_bits: u32,
        num_hashes: u8,
        words: Vec<u64>,
        contains_null: bool,
    ) -> Result<Self, String> {
        if num_bits == 0 || num_bits as usize != words.len() * 64 {
            return Err("bloom filter geometry mismatch".to_string());
        }
        if num_hashes == 0 {
            return Err("bloom filter needs at least one hash function".to_string());
        }
        Ok(Self {
            num_bits,
            num_hashes,
            words,
            contains_null,
        })
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn memory_bytes(&self) -> usize {
        self.words.len() * 8
    }

    pub fn contains_null(&self) -> bool {
        self.contains_null
    }

    pub fn set_contains_null(&mut self, contains_null: bool) {
        self.contains_null |= contains_null;
    }

    fn bit_positions(&self, key: &FilterKey) -> (u64, u64) {
        key.with_encoded(|bytes| {
            let h1 = xxh64(bytes, HASH_SEED_1);
            // Force h2 odd so the double-hash probe sequence spans the array.
            let h2 = xxh64(bytes, HASH_SEED_2) | 1;
            (h1, h2)
        })
    }

    fn set_bit(&mut self, bit: u64) {
        let word = (bit / 64) as usize;
        self.words[word] |= 1u64 << (bit % 64);
    }

    fn test_bit(&self, bit: u64) -> bool {
        let word = (bit / 64) as usize;
        (self.words[word] >> (bit % 64)) & 1 == 1
    }

    pub fn insert(&mut self, key: &FilterKey) {
        let (h1, h2) = self.bit_positions(key);
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits as u64;
            self.set_bit(bit);
        }
    }

    pub fn insert_null(&mut self) {
        self.contains_null = true;
    }

    pub fn probe(&self, key: Option<&FilterKey>) -> bool {
        let Some(key) = key else {
            return self.contains_null;
        };
        let (h1, h2) = self.bit_positions(key);
        for i in 0..self.num_hashes as u64 {
            let bit = h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits as u64;
            if !self.test_bit(bit) {
                return false;
            }
        }
        true
    }

    pub fn merge_from(&mut self, other: &BloomFilter) -> Result<(), String> {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return Err("bloom filter merge size mismatch".to_string());
        }
        self.contains_null |= other.contains_null;
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
        Ok(())
    }
}
