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
//! Bitmap runtime filter payload.
//!
//! Responsibilities:
//! - Run-length-compressed set of 64-bit integers with an in/not-in
//!   polarity flag; integer columns only.
//! - Merge unions the underlying sets; polarity must agree.
//!
//! Key exported interfaces:
//! - Types: `BitmapFilter`.

use roaring::RoaringTreemap;

use super::values::FilterKey;

/// Signed-to-unsigned key mapping is the bijective bit cast; ordering is
/// irrelevant for membership.
fn bitmap_key(value: i64) -> u64 {
    value as u64
}

#[derive(Clone, Debug)]
pub struct BitmapFilter {
    not_in: bool,
    set: RoaringTreemap,
    contains_null: bool,
}

impl BitmapFilter {
    pub fn new(not_in: bool) -> Self {
        Self {
            not_in,
            set: RoaringTreemap::new(),
            contains_null: false,
        }
    }

    pub fn from_set(not_in: bool, set: RoaringTreemap, contains_null: bool) -> Self {
        Self {
            not_in,
            set,
            contains_null,
        }
    }

    pub fn not_in(&self) -> bool {
        self.not_in
    }

    pub fn len(&self) -> u64 {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains_null(&self) -> bool {
        self.contains_null
    }

    pub fn set_contains_null(&mut self, contains_null: bool) {
        self.contains_null |= contains_null;
    }

    pub fn insert(&mut self, key: &FilterKey) -> Result<(), String> {
        self.set.insert(bitmap_key(key.as_i64()?));
        Ok(())
    }

    pub fn insert_null(&mut self) {
        self.contains_null = true;
    }

    pub fn probe(&self, key: Option<&FilterKey>) -> Result<bool, String> {
        let Some(key) = key else {
            return Ok(self.contains_null);
        };
        let contained = self.set.contains(bitmap_key(key.as_i64()?));
        Ok(contained != self.not_in)
    }

    pub fn merge_from(&mut self, other: &BitmapFilter) -> Result<(), String> {
        if self.not_in != other.not_in {
            return Err("bitmap filter polarity mismatch".to_string());
        }
        self.contains_null |= other.contains_null;
        self.set |= &other.set;
        Ok(())
    }

    pub fn serialize_set(&self) -> Result<Vec<u8>, String> {
        let mut buf = Vec::with_capacity(self.set.serialized_size() as usize);
        self.set
            .serialize_into(&mut buf)
            .map_err(|e| format!("bitmap filter serialize failed: {e}"))?;
        Ok(buf)
    }

    pub fn deserialize_set(not_in: bool, contains_null: bool, bytes: &[u8]) -> Result<Self, String> {
        let set = RoaringTreemap::deserialize_from(bytes)
            .map_err(|e| format!("bitmap filter deserialize failed: {e}"))?;
        Ok(Self {
            not_in,
            set,
            contains_null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::BitmapFilter;
    use crate::exec::runtime_filter::values::FilterKey;

    #[test]
    fn polarity_flips_membership() {
        let mut f = BitmapFilter::new(false);
        f.insert(&FilterKey::I64(42)).unwrap();
        f.insert(&FilterKey::I64(-1)).unwrap();
        assert!(f.probe(Some(&FilterKey::I64(42))).unwrap());
        assert!(f.probe(Some(&FilterKey::I64(-1))).unwrap());
        assert!(!f.probe(Some(&FilterKey::I64(43))).unwrap());

        let mut not_f = BitmapFilter::new(true);
        not_f.insert(&FilterKey::I64(42)).unwrap();
        assert!(!not_f.probe(Some(&FilterKey::I64(42))).unwrap());
        assert!(not_f.probe(Some(&FilterKey::I64(43))).unwrap());
    }

    #[test]
    fn merge_requires_matching_polarity() {
        let mut a = BitmapFilter::new(false);
        let b = BitmapFilter::new(true);
        assert!(a.merge_from(&b).is_err());
        let mut c = BitmapFilter::new(false);
        c.insert(&FilterKey::I64(7)).unwrap();
        a.merge_from(&c).unwrap();
        assert!(a.probe(Some(&FilterKey::I64(7))).unwrap());
    }
}
