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
//! Per-column value-range sink for predicate pushdown.
//!
//! Responsibilities:
//! - Accumulates fixed-value sets, low/high bounds, a not-equal set, and a
//!   contains-null bit for one column; every operation only narrows.
//! - Reports emptiness so the scan can short-circuit to EOF.
//!
//! Key exported interfaces:
//! - Types: `ColumnValueRange`, `RangeState`.

use std::cmp::Ordering;

use hashbrown::HashSet;

use crate::common::ids::SlotId;
use crate::exec::expr::CompareOp;
use crate::exec::runtime_filter::ColumnBinding;
use crate::exec::runtime_filter::values::FilterKey;

#[derive(Clone, Debug)]
pub enum RangeState {
    /// No value constraint yet.
    All,
    /// Exact candidate set (from equality / IN predicates).
    Fixed(HashSet<FilterKey>),
    /// Interval bounds; the bool is endpoint inclusivity. `ne` holds values
    /// excluded by `!=`, never narrowing the interval itself.
    Bounded {
        low: Option<(FilterKey, bool)>,
        high: Option<(FilterKey, bool)>,
        ne: HashSet<FilterKey>,
    },
    /// Provably empty; the scan returns EOF.
    Empty,
}

#[derive(Clone, Debug)]
pub struct ColumnValueRange {
    slot: SlotId,
    binding: ColumnBinding,
    nullable: bool,
    state: RangeState,
    /// `None` unconstrained, `Some(true)` nulls required/allowed,
    /// `Some(false)` nulls rejected.
    contain_null: Option<bool>,
    from_runtime_filter: bool,
}

impl ColumnValueRange {
    pub fn new(slot: SlotId, binding: ColumnBinding, nullable: bool) -> Self {
        Self {
            slot,
            binding,
            nullable,
            state: RangeState::All,
            contain_null: None,
            from_runtime_filter: false,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn binding(&self) -> &ColumnBinding {
        &self.binding
    }

    pub fn state(&self) -> &RangeState {
        &self.state
    }

    pub fn contain_null(&self) -> Option<bool> {
        self.contain_null
    }

    pub fn mark_runtime_filter_predicate(&mut self, from_runtime_filter: bool) {
        self.from_runtime_filter |= from_runtime_filter;
    }

    pub fn is_runtime_filter_predicate(&self) -> bool {
        self.from_runtime_filter
    }

    pub fn is_fixed_value_range(&self) -> bool {
        matches!(self.state, RangeState::Fixed(_))
    }

    pub fn fixed_value_count(&self) -> usize {
        match &self.state {
            RangeState::Fixed(values) => values.len(),
            _ => 0,
        }
    }

    /// The range admits no row at all: no value passes and nulls are not
    /// required to pass.
    pub fn is_empty_value_range(&self) -> bool {
        let no_values = match &self.state {
            RangeState::Empty => true,
            RangeState::Fixed(values) => values.is_empty(),
            _ => false,
        };
        no_values && self.contain_null != Some(true)
    }

    /// Intersect with an exact candidate set (`c = lit`, `c IN (...)`).
    pub fn intersect_fixed_values(
        &mut self,
        values: impl IntoIterator<Item = FilterKey>,
    ) -> Result<(), String> {
        // A value comparison is never true for null.
        self.contain_null = Some(false);
        match &mut self.state {
            RangeState::All => {
                self.state = RangeState::Fixed(values.into_iter().collect());
            }
            RangeState::Fixed(current) => {
                let incoming: HashSet<FilterKey> = values.into_iter().collect();
                current.retain(|v| incoming.contains(v));
            }
            RangeState::Bounded { low, high, ne } => {
                let mut kept = HashSet::new();
                for value in values {
                    if bound_accepts(low.as_ref(), high.as_ref(), ne, &value)? {
                        kept.insert(value);
                    }
                }
                self.state = RangeState::Fixed(kept);
            }
            RangeState::Empty => {}
        }
        Ok(())
    }

    /// Remove one value (`c NOT IN (...)`/`c != lit` over a fixed set).
    pub fn remove_fixed_value(&mut self, value: &FilterKey) -> Result<(), String> {
        match &mut self.state {
            RangeState::Fixed(values) => {
                values.remove(value);
                Ok(())
            }
            _ => Err("remove_fixed_value requires a fixed value range".to_string()),
        }
    }

    /// Record `c != lit`. Never narrows the interval, only the ne-set.
    pub fn add_not_equal(&mut self, value: FilterKey) -> Result<(), String> {
        self.contain_null = Some(false);
        match &mut self.state {
            RangeState::Fixed(values) => {
                values.remove(&value);
            }
            RangeState::Bounded { ne, .. } => {
                ne.insert(value);
            }
            RangeState::All => {
                self.state = RangeState::Bounded {
                    low: None,
                    high: None,
                    ne: HashSet::from_iter([value]),
                };
            }
            RangeState::Empty => {}
        }
        Ok(())
    }

    /// Tighten with `c <op> lit` for an ordering operator.
    pub fn add_bound(&mut self, op: CompareOp, value: FilterKey) -> Result<(), String> {
        let (is_low, inclusive) = match op {
            CompareOp::Gt => (true, false),
            CompareOp::Ge => (true, true),
            CompareOp::Lt => (false, false),
            CompareOp::Le => (false, true),
            other => {
                return Err(format!("add_bound does not accept operator {:?}", other));
            }
        };
        self.contain_null = Some(false);
        match &mut self.state {
            RangeState::All => {
                let bound = Some((value, inclusive));
                self.state = if is_low {
                    RangeState::Bounded {
                        low: bound,
                        high: None,
                        ne: HashSet::new(),
                    }
                } else {
                    RangeState::Bounded {
                        low: None,
                        high: bound,
                        ne: HashSet::new(),
                    }
                };
            }
            RangeState::Fixed(values) => {
                let mut kept = HashSet::new();
                for v in values.drain() {
                    let ord = v.cmp_same_class(&value)?;
                    if apply_bound(ord, is_low, inclusive) {
                        kept.insert(v);
                    }
                }
                *values = kept;
            }
            RangeState::Bounded { low, high, .. } => {
                let slot = if is_low { low } else { high };
                let replace = match slot {
                    Some((current, current_inclusive)) => {
                        let ord = value.cmp_same_class(current)?;
                        match (is_low, ord) {
                            (true, Ordering::Greater) | (false, Ordering::Less) => true,
                            (_, Ordering::Equal) => *current_inclusive && !inclusive,
                            _ => false,
                        }
                    }
                    None => true,
                };
                if replace {
                    *slot = Some((value, inclusive));
                }
            }
            RangeState::Empty => {}
        }
        self.check_bound_consistency()?;
        Ok(())
    }

    /// `c IS NULL`: only nulls survive.
    pub fn intersect_is_null(&mut self) {
        if self.contain_null == Some(false) {
            // Contradicts an earlier value constraint or IS NOT NULL.
            self.state = RangeState::Empty;
            return;
        }
        self.contain_null = Some(true);
        self.state = RangeState::Empty;
    }

    /// `c IS NOT NULL`: nulls are rejected, values unconstrained.
    pub fn intersect_is_not_null(&mut self) {
        if self.contain_null == Some(true) && matches!(self.state, RangeState::Empty) {
            // Contradicts a previous IS NULL.
            self.contain_null = Some(false);
            return;
        }
        self.contain_null = Some(false);
    }

    fn check_bound_consistency(&mut self) -> Result<(), String> {
        if let RangeState::Bounded {
            low: Some((low, low_inc)),
            high: Some((high, high_inc)),
            ..
        } = &self.state
        {
            let ord = low.cmp_same_class(high)?;
            let empty = match ord {
                Ordering::Greater => true,
                Ordering::Equal => !(*low_inc && *high_inc),
                Ordering::Less => false,
            };
            if empty {
                self.state = RangeState::Empty;
            }
        }
        Ok(())
    }

    /// Advisory evaluation used for compound (OR-derived) ranges and tests.
    pub fn matches_key(&self, key: Option<&FilterKey>) -> Result<bool, String> {
        let Some(key) = key else {
            return Ok(match self.contain_null {
                Some(allowed) => allowed,
                None => matches!(self.state, RangeState::All) && self.nullable,
            });
        };
        match &self.state {
            RangeState::All => Ok(true),
            RangeState::Fixed(values) => Ok(values.contains(key)),
            RangeState::Bounded { low, high, ne } => bound_accepts(low.as_ref(), high.as_ref(), ne, key),
            RangeState::Empty => Ok(false),
        }
    }
}

fn apply_bound(ord: Ordering, is_low: bool, inclusive: bool) -> bool {
    match (is_low, ord) {
        (true, Ordering::Greater) | (false, Ordering::Less) => true,
        (_, Ordering::Equal) => inclusive,
        _ => false,
    }
}

fn bound_accepts(
    low: Option<&(FilterKey, bool)>,
    high: Option<&(FilterKey, bool)>,
    ne: &HashSet<FilterKey>,
    key: &FilterKey,
) -> Result<bool, String> {
    if ne.contains(key) {
        return Ok(false);
    }
    if let Some((bound, inclusive)) = low {
        if !apply_bound(key.cmp_same_class(bound)?, true, *inclusive) {
            return Ok(false);
        }
    }
    if let Some((bound, inclusive)) = high {
        if !apply_bound(key.cmp_same_class(bound)?, false, *inclusive) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::ColumnValueRange;
    use crate::common::ids::SlotId;
    use crate::common::types::PrimitiveKind;
    use crate::exec::expr::CompareOp;
    use crate::exec::runtime_filter::ColumnBinding;
    use crate::exec::runtime_filter::values::FilterKey;

    fn int_range() -> ColumnValueRange {
        ColumnValueRange::new(
            SlotId::new(1),
            ColumnBinding::new(PrimitiveKind::Int32),
            true,
        )
    }

    #[test]
    fn bounds_tighten_and_collapse_to_empty() {
        let mut r = int_range();
        r.add_bound(CompareOp::Ge, FilterKey::I64(10)).unwrap();
        r.add_bound(CompareOp::Lt, FilterKey::I64(20)).unwrap();
        assert!(r.matches_key(Some(&FilterKey::I64(10))).unwrap());
        assert!(r.matches_key(Some(&FilterKey::I64(19))).unwrap());
        assert!(!r.matches_key(Some(&FilterKey::I64(20))).unwrap());
        r.add_bound(CompareOp::Gt, FilterKey::I64(25)).unwrap();
        assert!(r.is_empty_value_range());
    }

    #[test]
    fn fixed_set_intersects_with_bounds() {
        let mut r = int_range();
        r.intersect_fixed_values([FilterKey::I64(1), FilterKey::I64(5), FilterKey::I64(9)])
            .unwrap();
        r.add_bound(CompareOp::Le, FilterKey::I64(5)).unwrap();
        assert!(r.matches_key(Some(&FilterKey::I64(1))).unwrap());
        assert!(r.matches_key(Some(&FilterKey::I64(5))).unwrap());
        assert!(!r.matches_key(Some(&FilterKey::I64(9))).unwrap());
        assert_eq!(r.fixed_value_count(), 2);
    }

    #[test]
    fn not_equal_never_narrows_interval() {
        let mut r = int_range();
        r.add_bound(CompareOp::Ge, FilterKey::I64(0)).unwrap();
        r.add_not_equal(FilterKey::I64(3)).unwrap();
        assert!(!r.matches_key(Some(&FilterKey::I64(3))).unwrap());
        assert!(r.matches_key(Some(&FilterKey::I64(4))).unwrap());
        assert!(r.matches_key(Some(&FilterKey::I64(1_000_000))).unwrap());
    }

    #[test]
    fn null_bits_behave_like_constraints() {
        let mut r = int_range();
        assert!(r.matches_key(None).unwrap());
        r.intersect_is_not_null();
        assert!(!r.matches_key(None).unwrap());

        let mut only_null = int_range();
        only_null.intersect_is_null();
        assert!(only_null.matches_key(None).unwrap());
        assert!(!only_null.matches_key(Some(&FilterKey::I64(1))).unwrap());
        assert!(!only_null.is_empty_value_range());
    }

    #[test]
    fn equality_on_disjoint_sets_is_empty() {
        let mut r = int_range();
        r.intersect_fixed_values([FilterKey::I64(1)]).unwrap();
        r.intersect_fixed_values([FilterKey::I64(2)]).unwrap();
        assert!(r.is_empty_value_range());
    }
}
