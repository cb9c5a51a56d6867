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
//! Polymorphic runtime-filter container.
//!
//! Responsibilities:
//! - Holds one filter payload (in-set, min-max, bloom, bitmap) together
//!   with its column binding and policy flags (always-true, ignored,
//!   null-skip, in-or-bloom degrade threshold).
//! - Implements the shared insert/merge/probe operation set across
//!   payloads, including the one-way in-or-bloom promotion.
//!
//! Key exported interfaces:
//! - Types: `FilterKind`, `FilterWrapper`, `WrapperParams`, `BloomParams`,
//!   `BloomBudget`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::array::ArrayRef;

use crate::common::config;

use super::ColumnBinding;
use super::bitmap::BitmapFilter;
use super::bloom::BloomFilter;
use super::in_filter::InFilter;
use super::min_max::MinMaxFilter;
use super::values::{ColumnView, FilterKey};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterKind {
    In,
    MinMax,
    Bloom,
    InOrBloom,
    Bitmap,
}

impl FilterKind {
    pub fn wire_tag(self) -> u8 {
        match self {
            FilterKind::In => 0,
            FilterKind::MinMax => 1,
            FilterKind::Bloom => 2,
            FilterKind::InOrBloom => 3,
            FilterKind::Bitmap => 4,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self, String> {
        Ok(match tag {
            0 => FilterKind::In,
            1 => FilterKind::MinMax,
            2 => FilterKind::Bloom,
            3 => FilterKind::InOrBloom,
            4 => FilterKind::Bitmap,
            other => return Err(format!("unknown filter kind tag: {other}")),
        })
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FilterKind::In => "in",
            FilterKind::MinMax => "minmax",
            FilterKind::Bloom => "bloom",
            FilterKind::InOrBloom => "in_or_bloom",
            FilterKind::Bitmap => "bitmap",
        };
        f.write_str(name)
    }
}

/// Per-query cap on bloom buffer bytes. Reservations are permanent for the
/// query's lifetime; filters that cannot reserve degrade to ignored.
#[derive(Debug)]
pub struct BloomBudget {
    cap_bytes: usize,
    used_bytes: AtomicUsize,
}

impl BloomBudget {
    pub fn new(cap_bytes: usize) -> Self {
        Self {
            cap_bytes,
            used_bytes: AtomicUsize::new(0),
        }
    }

    pub fn from_config() -> Self {
        Self::new(config::bloom_memory_cap_bytes())
    }

    pub fn try_reserve(&self, bytes: usize) -> bool {
        let mut current = self.used_bytes.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(bytes) else {
                return false;
            };
            if next > self.cap_bytes {
                return false;
            }
            match self.used_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes.load(Ordering::Acquire)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BloomParams {
    pub expected_entries: u64,
    pub fpp: f64,
    pub min_bits: u32,
    pub max_bits: u32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            expected_entries: config::bloom_filter_expected_entries(),
            fpp: config::bloom_filter_fpp(),
            min_bits: config::bloom_filter_min_bits(),
            max_bits: config::bloom_filter_max_bits(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WrapperParams {
    /// Cardinality cap K for in-set payloads before bloom degrade.
    pub max_in_count: usize,
    pub bloom: BloomParams,
    pub bitmap_not_in: bool,
    /// `false` is the hash-join default: nulls are skipped on insert and
    /// rejected on probe.
    pub null_aware: bool,
}

impl Default for WrapperParams {
    fn default() -> Self {
        Self {
            max_in_count: config::runtime_filter_max_in_count(),
            bloom: BloomParams::default(),
            bitmap_not_in: false,
            null_aware: false,
        }
    }
}

#[derive(Clone, Debug)]
pub enum FilterPayload {
    In(InFilter),
    MinMax(MinMaxFilter),
    Bloom(BloomFilter),
    Bitmap(BitmapFilter),
}

#[derive(Clone, Debug)]
pub struct FilterWrapper {
    kind: FilterKind,
    column: ColumnBinding,
    params: WrapperParams,
    payload: FilterPayload,
    always_true: bool,
    ignored: bool,
    ignored_reason: Option<String>,
    row_count: u64,
    budget: Option<Arc<BloomBudget>>,
}

impl FilterWrapper {
    pub fn new(
        kind: FilterKind,
        column: ColumnBinding,
        params: WrapperParams,
        budget: Option<Arc<BloomBudget>>,
    ) -> Result<Self, String> {
        if params.max_in_count == 0 {
            return Err("filter in-set capacity must be positive".to_string());
        }
        if kind == FilterKind::Bitmap && !column.kind.is_integer() {
            return Err(format!(
                "bitmap filter requires an integer column, got {}",
                column.kind
            ));
        }
        let mut wrapper = Self {
            kind,
            column,
            params,
            payload: FilterPayload::In(InFilter::new()),
            always_true: false,
            ignored: false,
            ignored_reason: None,
            row_count: 0,
            budget,
        };
        wrapper.payload = match kind {
            FilterKind::In | FilterKind::InOrBloom => FilterPayload::In(InFilter::new()),
            FilterKind::MinMax => FilterPayload::MinMax(MinMaxFilter::new()),
            FilterKind::Bloom => match wrapper.alloc_bloom(wrapper.params.bloom.expected_entries) {
                Some(bloom) => FilterPayload::Bloom(bloom),
                None => {
                    wrapper.set_ignored("bloom allocation denied by memory budget");
                    FilterPayload::In(InFilter::new())
                }
            },
            FilterKind::Bitmap => {
                FilterPayload::Bitmap(BitmapFilter::new(wrapper.params.bitmap_not_in))
            }
        };
        Ok(wrapper)
    }

    pub fn from_decoded(
        kind: FilterKind,
        column: ColumnBinding,
        params: WrapperParams,
        payload: FilterPayload,
        always_true: bool,
        ignored: bool,
        row_count: u64,
    ) -> Self {
        Self {
            kind,
            column,
            params,
            payload,
            always_true,
            ignored,
            ignored_reason: None,
            row_count,
            budget: None,
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn column(&self) -> &ColumnBinding {
        &self.column
    }

    pub fn params(&self) -> &WrapperParams {
        &self.params
    }

    pub fn payload(&self) -> &FilterPayload {
        &self.payload
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn always_true(&self) -> bool {
        self.always_true
    }

    /// Sticky; an always-true filter never rejects a row again.
    pub fn set_always_true(&mut self) {
        self.always_true = true;
    }

    pub fn ignored(&self) -> bool {
        self.ignored
    }

    /// Sticky. The reason is best-effort diagnostics; first writer wins.
    pub fn set_ignored(&mut self, reason: &str) {
        self.ignored = true;
        if self.ignored_reason.is_none() {
            self.ignored_reason = Some(reason.to_string());
        }
    }

    pub fn ignored_reason(&self) -> Option<&str> {
        self.ignored_reason.as_deref()
    }

    /// Whether any probe can still reject rows.
    pub fn is_disabled(&self) -> bool {
        self.always_true || self.ignored
    }

    /// Build completed without a single row.
    pub fn is_empty_build(&self) -> bool {
        self.row_count == 0
    }

    pub fn contains_null(&self) -> bool {
        match &self.payload {
            FilterPayload::In(f) => f.contains_null(),
            FilterPayload::MinMax(f) => f.contains_null(),
            FilterPayload::Bloom(f) => f.contains_null(),
            FilterPayload::Bitmap(f) => f.contains_null(),
        }
    }

    fn alloc_bloom(&self, expected_entries: u64) -> Option<BloomFilter> {
        let bloom = BloomFilter::with_expected_entries(
            expected_entries,
            self.params.bloom.fpp,
            self.params.bloom.min_bits,
            self.params.bloom.max_bits,
        );
        if let Some(budget) = &self.budget {
            if !budget.try_reserve(bloom.memory_bytes()) {
                return None;
            }
        }
        Some(bloom)
    }

    /// One-way promotion of a set payload to bloom, loading every retained
    /// value. No-op once promoted. In-or-bloom keeps its kind; an explicit
    /// scan-side call on a plain in filter rebinds the kind to bloom so the
    /// wrapper stays encodable.
    pub fn change_to_bloom(&mut self) -> Result<(), String> {
        let FilterPayload::In(in_filter) = &self.payload else {
            return Ok(());
        };
        let expected = self
            .params
            .bloom
            .expected_entries
            .max(in_filter.len() as u64 + 1);
        let Some(mut bloom) = self.alloc_bloom(expected) else {
            self.set_ignored("bloom allocation denied by memory budget");
            return Ok(());
        };
        for key in in_filter.values() {
            bloom.insert(key);
        }
        bloom.set_contains_null(in_filter.contains_null());
        self.payload = FilterPayload::Bloom(bloom);
        if self.kind == FilterKind::In {
            self.kind = FilterKind::Bloom;
        }
        Ok(())
    }

    /// In-set payloads past the cardinality cap: in-or-bloom promotes, a
    /// plain in filter cannot change representation and stops pruning.
    fn handle_in_set_over_cap(&mut self) -> Result<(), String> {
        if self.kind == FilterKind::InOrBloom {
            self.change_to_bloom()
        } else {
            self.set_ignored("in-set cardinality exceeded capacity");
            Ok(())
        }
    }

    /// Insert one canonical value (`None` for null).
    pub fn insert_key(&mut self, key: Option<FilterKey>) -> Result<(), String> {
        if self.ignored {
            return Ok(());
        }
        self.row_count += 1;
        let Some(key) = key else {
            if self.params.null_aware {
                match &mut self.payload {
                    FilterPayload::In(f) => f.insert_null(),
                    FilterPayload::MinMax(f) => f.insert_null(),
                    FilterPayload::Bloom(f) => f.insert_null(),
                    FilterPayload::Bitmap(f) => f.insert_null(),
                }
            }
            return Ok(());
        };
        let max_in_count = self.params.max_in_count;
        let over_cap = match &mut self.payload {
            FilterPayload::In(f) => {
                f.insert(key);
                f.len() > max_in_count
            }
            FilterPayload::MinMax(f) => {
                f.insert(&key)?;
                false
            }
            FilterPayload::Bloom(f) => {
                f.insert(&key);
                false
            }
            FilterPayload::Bitmap(f) => {
                f.insert(&key)?;
                false
            }
        };
        if over_cap {
            self.handle_in_set_over_cap()?;
        }
        Ok(())
    }

    /// Vectorized insert; equivalent to `insert_key` per selected row in any
    /// order. `rows` of `None` inserts the whole column.
    pub fn insert_batch(&mut self, column: &ArrayRef, rows: Option<&[usize]>) -> Result<(), String> {
        if self.ignored {
            return Ok(());
        }
        let view = ColumnView::try_new(column, &self.column)?;
        match rows {
            Some(rows) => {
                for &row in rows {
                    if row >= view.len() {
                        return Err(format!(
                            "filter insert row {} out of bounds (len={})",
                            row,
                            view.len()
                        ));
                    }
                    let key = view.key_at(row)?;
                    self.insert_key(key)?;
                }
            }
            None => {
                for row in 0..view.len() {
                    let key = view.key_at(row)?;
                    self.insert_key(key)?;
                }
            }
        }
        Ok(())
    }

    /// `true` = maybe, `false` = definitely-no.
    pub fn probe_key(&self, key: Option<&FilterKey>) -> Result<bool, String> {
        if self.is_disabled() {
            return Ok(true);
        }
        if self.row_count == 0 {
            // An empty build matches nothing: the probe side short-circuits.
            return Ok(false);
        }
        if key.is_none() && !self.params.null_aware {
            // Null-skip filters reject null probes outright.
            return Ok(false);
        }
        match &self.payload {
            FilterPayload::In(f) => Ok(f.probe(key)),
            FilterPayload::MinMax(f) => f.probe(key),
            FilterPayload::Bloom(f) => Ok(f.probe(key)),
            FilterPayload::Bitmap(f) => f.probe(key),
        }
    }

    /// Merge another partial build of the same filter id.
    ///
    /// Commutative and idempotent up to probe equivalence. An in-or-bloom
    /// union past K promotes to bloom; a plain in-set union past K stops
    /// pruning instead.
    pub fn merge_from(&mut self, other: &FilterWrapper) -> Result<(), String> {
        if self.kind != other.kind || self.column.kind != other.column.kind {
            return Err("runtime filter merge metadata mismatch".to_string());
        }
        self.row_count = self.row_count.saturating_add(other.row_count);
        if other.always_true {
            self.always_true = true;
        }
        if other.ignored {
            self.set_ignored(other.ignored_reason().unwrap_or("peer producer ignored"));
        }
        let max_in_count = self.params.max_in_count;
        let mut promote_then_merge_bloom = false;
        let mut over_cap = false;
        match (&mut self.payload, &other.payload) {
            (FilterPayload::In(lhs), FilterPayload::In(rhs)) => {
                lhs.merge_from(rhs);
                over_cap = lhs.len() > max_in_count;
            }
            (FilterPayload::MinMax(lhs), FilterPayload::MinMax(rhs)) => lhs.merge_from(rhs)?,
            (FilterPayload::Bloom(lhs), FilterPayload::Bloom(rhs)) => lhs.merge_from(rhs)?,
            (FilterPayload::Bitmap(lhs), FilterPayload::Bitmap(rhs)) => lhs.merge_from(rhs)?,
            (FilterPayload::In(_), FilterPayload::Bloom(_)) => {
                // In-or-bloom peers may already have promoted.
                promote_then_merge_bloom = true;
            }
            (FilterPayload::Bloom(lhs), FilterPayload::In(rhs)) => {
                for key in rhs.values() {
                    lhs.insert(key);
                }
                lhs.set_contains_null(rhs.contains_null());
            }
            _ => return Err("runtime filter merge payload mismatch".to_string()),
        }
        if over_cap {
            self.handle_in_set_over_cap()?;
        }
        if promote_then_merge_bloom {
            self.change_to_bloom()?;
            if let (FilterPayload::Bloom(lhs), FilterPayload::Bloom(rhs)) =
                (&mut self.payload, &other.payload)
            {
                lhs.merge_from(rhs)?;
            }
        }
        Ok(())
    }
}
