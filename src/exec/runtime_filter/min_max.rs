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
//! Min-max runtime filter payload.
//!
//! Responsibilities:
//! - Tracks a closed interval over canonical values; probes with
//!   `lo <= v <= hi`, where either endpoint may be absent (unbounded).
//! - Merge takes the interval hull.
//!
//! Key exported interfaces:
//! - Types: `MinMaxFilter`.

use std::cmp::Ordering;

use super::values::FilterKey;

#[derive(Clone, Debug, Default)]
pub struct MinMaxFilter {
    min: Option<FilterKey>,
    max: Option<FilterKey>,
    contains_null: bool,
}

impl MinMaxFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(min: Option<FilterKey>, max: Option<FilterKey>) -> Self {
        Self {
            min,
            max,
            contains_null: false,
        }
    }

    pub fn min(&self) -> Option<&FilterKey> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&FilterKey> {
        self.max.as_ref()
    }

    pub fn contains_null(&self) -> bool {
        self.contains_null
    }

    pub fn set_contains_null(&mut self, contains_null: bool) {
        self.contains_null |= contains_null;
    }

    /// No value was ever inserted and no bound set.
    pub fn is_unset(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn insert(&mut self, key: &FilterKey) -> Result<(), String> {
        match &self.min {
            Some(cur) if key.cmp_same_class(cur)? != Ordering::Less => {}
            _ => self.min = Some(key.clone()),
        }
        match &self.max {
            Some(cur) if key.cmp_same_class(cur)? != Ordering::Greater => {}
            _ => self.max = Some(key.clone()),
        }
        Ok(())
    }

    pub fn insert_null(&mut self) {
        self.contains_null = true;
    }

    pub fn probe(&self, key: Option<&FilterKey>) -> Result<bool, String> {
        let Some(key) = key else {
            return Ok(self.contains_null);
        };
        if let Some(min) = &self.min {
            if key.cmp_same_class(min)? == Ordering::Less {
                return Ok(false);
            }
        }
        if let Some(max) = &self.max {
            if key.cmp_same_class(max)? == Ordering::Greater {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Interval hull. An absent endpoint on either side stays absent
    /// (unbounded wins).
    pub fn merge_from(&mut self, other: &MinMaxFilter) -> Result<(), String> {
        self.contains_null |= other.contains_null;
        // An unset side contributes no rows, so the other side's hull stands.
        if other.is_unset() {
            return Ok(());
        }
        if self.is_unset() {
            self.min = other.min.clone();
            self.max = other.max.clone();
            return Ok(());
        }
        self.min = match (self.min.take(), other.min.clone()) {
            (Some(a), Some(b)) => Some(if a.cmp_same_class(&b)? == Ordering::Greater { b } else { a }),
            _ => None,
        };
        self.max = match (self.max.take(), other.max.clone()) {
            (Some(a), Some(b)) => Some(if a.cmp_same_class(&b)? == Ordering::Less { b } else { a }),
            _ => None,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MinMaxFilter;
    use crate::exec::runtime_filter::values::FilterKey;

    #[test]
    fn bounds_shrink_and_merge_to_hull() {
        let mut a = MinMaxFilter::new();
        for v in [5i64, 1, 100] {
            a.insert(&FilterKey::I64(v)).unwrap();
        }
        let mut b = MinMaxFilter::new();
        for v in [50i64, 200] {
            b.insert(&FilterKey::I64(v)).unwrap();
        }
        a.merge_from(&b).unwrap();
        assert!(a.probe(Some(&FilterKey::I64(150))).unwrap());
        assert!(!a.probe(Some(&FilterKey::I64(250))).unwrap());
        assert!(!a.probe(Some(&FilterKey::I64(0))).unwrap());
    }

    #[test]
    fn open_endpoint_is_unbounded() {
        let f = MinMaxFilter::with_bounds(Some(FilterKey::I64(10)), None);
        assert!(f.probe(Some(&FilterKey::I64(i64::MAX))).unwrap());
        assert!(!f.probe(Some(&FilterKey::I64(9))).unwrap());
    }

    #[test]
    fn string_bounds_compare_on_raw_bytes() {
        let mut f = MinMaxFilter::new();
        f.insert(&FilterKey::Bytes(b"apple".to_vec())).unwrap();
        f.insert(&FilterKey::Bytes(b"pear".to_vec())).unwrap();
        assert!(f.probe(Some(&FilterKey::Bytes(b"banana".to_vec()))).unwrap());
        assert!(!f.probe(Some(&FilterKey::Bytes(b"zebra".to_vec()))).unwrap());
    }
}
