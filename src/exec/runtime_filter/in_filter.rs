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
//! Exact-value in-set runtime filter payload.
//!
//! Responsibilities:
//! - Stores up to K distinct canonical values with insertion order retained
//!   for serialization.
//! - Probes via exact set membership; tracks whether the build side
//!   contained null.
//!
//! Key exported interfaces:
//! - Types: `InFilter`.

use hashbrown::HashSet;

use super::values::FilterKey;

#[derive(Clone, Debug, Default)]
pub struct InFilter {
    /// Distinct values in first-insertion order; mirrors `set`.
    ordered: Vec<FilterKey>,
    set: HashSet<FilterKey>,
    contains_null: bool,
}

impl InFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains_null(&self) -> bool {
        self.contains_null
    }

    pub fn set_contains_null(&mut self, contains_null: bool) {
        self.contains_null |= contains_null;
    }

    /// Add one value; returns whether it was newly inserted.
    pub fn insert(&mut self, key: FilterKey) -> bool {
        if self.set.insert(key.clone()) {
            self.ordered.push(key);
            true
        } else {
            false
        }
    }

    pub fn insert_null(&mut self) {
        self.contains_null = true;
    }

    pub fn contains(&self, key: &FilterKey) -> bool {
        self.set.contains(key)
    }

    /// `true` means the probe value may join; null probes only match when
    /// the build side contained null (null-aware joins).
    pub fn probe(&self, key: Option<&FilterKey>) -> bool {
        match key {
            Some(key) => self.set.contains(key),
            None => self.contains_null,
        }
    }

    /// Set union; the merged order is self's order followed by other's
    /// unseen values, which keeps merge idempotent.
    pub fn merge_from(&mut self, other: &InFilter) {
        self.contains_null |= other.contains_null;
        for key in &other.ordered {
            self.insert(key.clone());
        }
    }

    pub fn values(&self) -> &[FilterKey] {
        &self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::InFilter;
    use crate::exec::runtime_filter::values::FilterKey;

    #[test]
    fn insertion_order_survives_duplicates_and_merge() {
        let mut a = InFilter::new();
        a.insert(FilterKey::I64(3));
        a.insert(FilterKey::I64(1));
        a.insert(FilterKey::I64(3));
        let mut b = InFilter::new();
        b.insert(FilterKey::I64(1));
        b.insert(FilterKey::I64(2));
        a.merge_from(&b);
        let order: Vec<i64> = a.values().iter().map(|k| k.as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn null_probe_honors_null_flag() {
        let mut f = InFilter::new();
        f.insert(FilterKey::I64(5));
        assert!(!f.probe(None));
        f.insert_null();
        assert!(f.probe(None));
        assert!(f.probe(Some(&FilterKey::I64(5))));
        assert!(!f.probe(Some(&FilterKey::I64(6))));
    }
}
