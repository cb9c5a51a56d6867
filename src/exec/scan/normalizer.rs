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
//! Conjunct-tree normalization into per-column pushdown sinks.
//!
//! Responsibilities:
//! - Single post-order walk over the scan's boolean conjunct tree that
//!   folds recognizable leaf shapes into per-column value ranges, in-set /
//!   bloom / bitmap sinks, and function pushdowns.
//! - Produces the residual conjunct tree whose evaluation, conjoined with
//!   the sinks, equals the original tree.
//!
//! Key exported interfaces:
//! - Types: `PredicateNormalizer`, `ScanPushdown`, `SlotDesc`,
//!   `PushdownFunction`.
//!
//! OR subtrees are never pushed as hard constraints; they contribute
//! advisory compound ranges and always stay residual. Lossy literal
//! conversions and narrowing casts force predicates back into the residual
//! tree.

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::config;
use crate::common::ids::SlotId;
use crate::exec::expr::{ColumnRef, CompareOp, LiteralNode, PredExpr};
use crate::exec::runtime_filter::values::KeyConvert;
use crate::exec::runtime_filter::{
    ColumnBinding, FilterKind, FilterWrapper, WrapperParams,
};
use crate::quartzite_logging::debug;

use super::value_range::ColumnValueRange;

/// Functions the storage layer can evaluate against column data.
const APPROVED_PUSHDOWN_FUNCTIONS: &[&str] = &["like", "starts_with", "ends_with"];

/// One output column of the scan.
#[derive(Clone, Debug)]
pub struct SlotDesc {
    pub slot: SlotId,
    pub name: String,
    pub binding: ColumnBinding,
    pub nullable: bool,
    /// Only key columns accept bloom/bitmap/function sinks and leaf removal.
    pub is_key: bool,
}

#[derive(Clone, Debug)]
pub struct PushdownFunction {
    pub slot: SlotId,
    pub name: String,
    pub args: Vec<LiteralNode>,
    pub negated: bool,
}

/// Everything the normalizer pushed out of the conjunct tree.
#[derive(Clone, Debug, Default)]
pub struct ScanPushdown {
    pub value_ranges: HashMap<SlotId, ColumnValueRange>,
    /// Advisory ranges from OR subtrees; never hard constraints.
    pub compound_ranges: Vec<ColumnValueRange>,
    pub in_filters: Vec<(SlotId, Arc<FilterWrapper>)>,
    pub bloom_filters: Vec<(SlotId, Arc<FilterWrapper>)>,
    pub bitmap_filters: Vec<(SlotId, Arc<FilterWrapper>)>,
    pub pushdown_functions: Vec<PushdownFunction>,
    /// A conjunct folded to constant false; the scan reports EOF.
    pub eos: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum PushDownType {
    /// Fully absorbed by a sink; the leaf may leave the tree.
    Acceptable,
    /// Sink recorded but the leaf must stay (approximate or storage-optional).
    PartialAcceptable,
    Unacceptable,
}

pub struct PredicateNormalizer {
    slots: HashMap<SlotId, SlotDesc>,
    pushdown: ScanPushdown,
    max_conditions_per_column: usize,
    enable_function_pushdown: bool,
    /// Set while folding predicates materialized from runtime filters.
    marking_runtime_filter: bool,
}

impl PredicateNormalizer {
    pub fn new(slots: &[SlotDesc], enable_function_pushdown: bool) -> Self {
        let mut pushdown = ScanPushdown::default();
        for slot in slots {
            pushdown.value_ranges.insert(
                slot.slot,
                ColumnValueRange::new(slot.slot, slot.binding.clone(), slot.nullable),
            );
        }
        Self {
            slots: slots.iter().map(|s| (s.slot, s.clone())).collect(),
            pushdown,
            max_conditions_per_column: config::max_pushdown_conditions_per_column(),
            enable_function_pushdown,
            marking_runtime_filter: false,
        }
    }

    pub fn pushdown(&self) -> &ScanPushdown {
        &self.pushdown
    }

    pub fn into_pushdown(self) -> ScanPushdown {
        self.pushdown
    }

    pub fn set_marking_runtime_filter(&mut self, marking: bool) {
        self.marking_runtime_filter = marking;
    }

    /// Normalize the whole conjunct tree; returns the residual tree.
    pub fn normalize_conjuncts(&mut self, root: Option<PredExpr>) -> Option<PredExpr> {
        let residual = root.and_then(|expr| self.normalize_predicate(expr));
        for range in self.pushdown.value_ranges.values() {
            if range.is_empty_value_range() {
                self.pushdown.eos = true;
            }
        }
        if self.pushdown.eos {
            debug!("scan conjuncts folded to constant false, short-circuiting to EOF");
        }
        residual
    }

    fn normalize_predicate(&mut self, expr: PredExpr) -> Option<PredExpr> {
        match expr {
            PredExpr::ConstBool(true) => None,
            PredExpr::ConstBool(false) => {
                self.pushdown.eos = true;
                None
            }
            PredExpr::And(lhs, rhs) => {
                let left = self.normalize_predicate(*lhs);
                let right = self.normalize_predicate(*rhs);
                match (left, right) {
                    (Some(l), Some(r)) => Some(PredExpr::and(l, r)),
                    (Some(child), None) | (None, Some(child)) => Some(child),
                    (None, None) => None,
                }
            }
            PredExpr::Or(lhs, rhs) => {
                let expr = PredExpr::Or(lhs, rhs);
                self.collect_compound_ranges(&expr);
                Some(expr)
            }
            PredExpr::Not(inner) => self.normalize_not(*inner),
            leaf => self.normalize_leaf(leaf),
        }
    }

    /// Fold NOT into an invertible leaf; arbitrary NOT over compounds stays
    /// residual untouched.
    fn normalize_not(&mut self, inner: PredExpr) -> Option<PredExpr> {
        match inner {
            PredExpr::Compare {
                column,
                op,
                literal,
            } => match op.invert() {
                Some(inverted) => self.normalize_leaf(PredExpr::Compare {
                    column,
                    op: inverted,
                    literal,
                }),
                None => Some(PredExpr::not(PredExpr::Compare {
                    column,
                    op,
                    literal,
                })),
            },
            PredExpr::InList {
                column,
                values,
                not_in,
            } => self.normalize_leaf(PredExpr::InList {
                column,
                values,
                not_in: !not_in,
            }),
            PredExpr::IsNull { column, negated } => self.normalize_leaf(PredExpr::IsNull {
                column,
                negated: !negated,
            }),
            PredExpr::FunctionCall {
                column,
                name,
                args,
                negated,
            } => self.normalize_leaf(PredExpr::FunctionCall {
                column,
                name,
                args,
                negated: !negated,
            }),
            other => Some(PredExpr::not(other)),
        }
    }

    fn slot_desc(&self, column: &ColumnRef) -> Option<&SlotDesc> {
        self.slots.get(&column.slot)
    }

    /// Casts wrapping the column block pushdown unless they widen
    /// losslessly; a datetime column viewed as date can truncate and is
    /// always refused.
    fn cast_blocks_pushdown(&self, column: &ColumnRef) -> bool {
        match column.cast_to {
            Some(target) => !column.kind.lossless_cast_to(target),
            None => false,
        }
    }

    fn normalize_leaf(&mut self, leaf: PredExpr) -> Option<PredExpr> {
        let Some(column) = leaf.leaf_column().cloned() else {
            return Some(leaf);
        };
        let Some(desc) = self.slot_desc(&column).cloned() else {
            return Some(leaf);
        };
        if self.cast_blocks_pushdown(&column) {
            return Some(leaf);
        }
        let marking = self.marking_runtime_filter;
        let pdt = match self.fold_leaf(&leaf, &desc) {
            Ok(pdt) => pdt,
            Err(e) => {
                // Data-quality degradation: the predicate stays residual.
                debug!("predicate pushdown skipped on slot {}: {}", desc.slot, e);
                PushDownType::Unacceptable
            }
        };
        if marking {
            if let Some(range) = self.pushdown.value_ranges.get_mut(&desc.slot) {
                range.mark_runtime_filter_predicate(true);
            }
        }
        if pdt == PushDownType::Acceptable && desc.is_key {
            None
        } else {
            Some(leaf)
        }
    }

    fn fold_leaf(&mut self, leaf: &PredExpr, desc: &SlotDesc) -> Result<PushDownType, String> {
        match leaf {
            PredExpr::Compare {
                column,
                op,
                literal,
            } => self.fold_compare(column, *op, literal, desc),
            PredExpr::InList {
                column,
                values,
                not_in,
            } => self.fold_in_list(column, values, *not_in, desc),
            PredExpr::IsNull { column: _, negated } => {
                let range = self.range_mut(desc.slot)?;
                if *negated {
                    range.intersect_is_not_null();
                } else {
                    range.intersect_is_null();
                }
                Ok(PushDownType::Acceptable)
            }
            PredExpr::BloomProbe { filter, .. } => {
                if !desc.is_key {
                    return Ok(PushDownType::Unacceptable);
                }
                self.pushdown
                    .bloom_filters
                    .push((desc.slot, Arc::clone(filter)));
                // The probe stays residual: the sink is advisory for
                // storage, and bloom results are approximate either way.
                Ok(PushDownType::PartialAcceptable)
            }
            PredExpr::BitmapProbe { filter, .. } => {
                if !desc.is_key {
                    return Ok(PushDownType::Unacceptable);
                }
                self.pushdown
                    .bitmap_filters
                    .push((desc.slot, Arc::clone(filter)));
                Ok(PushDownType::Acceptable)
            }
            PredExpr::InProbe { filter, .. } => {
                self.pushdown
                    .in_filters
                    .push((desc.slot, Arc::clone(filter)));
                Ok(PushDownType::PartialAcceptable)
            }
            PredExpr::FunctionCall {
                column: _,
                name,
                args,
                negated,
            } => {
                if !self.enable_function_pushdown
                    || !desc.is_key
                    || !APPROVED_PUSHDOWN_FUNCTIONS.contains(&name.as_str())
                {
                    return Ok(PushDownType::Unacceptable);
                }
                self.pushdown.pushdown_functions.push(PushdownFunction {
                    slot: desc.slot,
                    name: name.clone(),
                    args: args.clone(),
                    negated: *negated,
                });
                Ok(PushDownType::Acceptable)
            }
            _ => Ok(PushDownType::Unacceptable),
        }
    }

    fn fold_compare(
        &mut self,
        _column: &ColumnRef,
        op: CompareOp,
        literal: &LiteralNode,
        desc: &SlotDesc,
    ) -> Result<PushDownType, String> {
        let converted = literal.to_filter_key(&desc.binding)?;
        let key = match converted {
            KeyConvert::Exact(key) => key,
            KeyConvert::Null => {
                if op == CompareOp::NullSafeEq {
                    self.range_mut(desc.slot)?.intersect_is_null();
                    return Ok(PushDownType::Acceptable);
                }
                // `c <op> NULL` is never true; leave it for the evaluator.
                return Ok(PushDownType::Unacceptable);
            }
            KeyConvert::Inexact => return Ok(PushDownType::Unacceptable),
        };
        let range = self.range_mut(desc.slot)?;
        match op {
            CompareOp::Eq | CompareOp::NullSafeEq => {
                range.intersect_fixed_values([key])?;
            }
            CompareOp::Ne => {
                if range.is_fixed_value_range() {
                    range.remove_fixed_value(&key)?;
                } else {
                    range.add_not_equal(key)?;
                }
            }
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                range.add_bound(op, key)?;
            }
        }
        Ok(PushDownType::Acceptable)
    }

    fn fold_in_list(
        &mut self,
        _column: &ColumnRef,
        values: &[LiteralNode],
        not_in: bool,
        desc: &SlotDesc,
    ) -> Result<PushDownType, String> {
        let cap = self.max_conditions_per_column;
        let mut keys = Vec::with_capacity(values.len());
        let mut null_in_list = false;
        for value in values {
            match value.to_filter_key(&desc.binding)? {
                KeyConvert::Exact(key) => keys.push(key),
                KeyConvert::Null => null_in_list = true,
                // A partial set would change the predicate's meaning.
                KeyConvert::Inexact => return Ok(PushDownType::Unacceptable),
            }
        }
        if not_in {
            if null_in_list {
                // `c NOT IN (..., null)` admits no row.
                self.pushdown.eos = true;
                return Ok(PushDownType::Acceptable);
            }
            let range = self.range_mut(desc.slot)?;
            if range.is_fixed_value_range() {
                for key in &keys {
                    range.remove_fixed_value(key)?;
                }
                return Ok(PushDownType::Acceptable);
            }
            if keys.len() > cap {
                return Ok(PushDownType::Unacceptable);
            }
            for key in keys {
                range.add_not_equal(key)?;
            }
            return Ok(PushDownType::Acceptable);
        }
        // Plain IN; nulls in the list match nothing and are dropped.
        if keys.len() > cap {
            // Too wide for a fixed-value range: route the exact set to the
            // in-set sink and keep the predicate in the residual tree.
            let params = WrapperParams {
                max_in_count: keys.len(),
                ..WrapperParams::default()
            };
            let mut wrapper =
                FilterWrapper::new(FilterKind::In, desc.binding.clone(), params, None)?;
            for key in keys {
                wrapper.insert_key(Some(key))?;
            }
            self.pushdown.in_filters.push((desc.slot, Arc::new(wrapper)));
            return Ok(PushDownType::PartialAcceptable);
        }
        let range = self.range_mut(desc.slot)?;
        range.intersect_fixed_values(keys)?;
        Ok(PushDownType::Acceptable)
    }

    fn range_mut(&mut self, slot: SlotId) -> Result<&mut ColumnValueRange, String> {
        self.pushdown
            .value_ranges
            .get_mut(&slot)
            .ok_or_else(|| format!("no value range registered for slot {slot}"))
    }

    /// Collect advisory ranges from an OR subtree: each single-column leaf
    /// child narrows a copy of that column's current range. The engine may
    /// evaluate these against column statistics but must not treat them as
    /// hard constraints.
    fn collect_compound_ranges(&mut self, expr: &PredExpr) {
        match expr {
            PredExpr::Or(lhs, rhs) => {
                self.collect_compound_ranges(lhs);
                self.collect_compound_ranges(rhs);
            }
            PredExpr::Compare {
                column,
                op,
                literal,
            } => {
                if self.cast_blocks_pushdown(column) {
                    return;
                }
                let Some(desc) = self.slot_desc(column).cloned() else {
                    return;
                };
                let Some(range) = self.pushdown.value_ranges.get(&desc.slot) else {
                    return;
                };
                let mut advisory = range.clone();
                advisory.mark_runtime_filter_predicate(self.marking_runtime_filter);
                let ok = match literal.to_filter_key(&desc.binding) {
                    Ok(KeyConvert::Exact(key)) => match op {
                        CompareOp::Eq | CompareOp::NullSafeEq => {
                            advisory.intersect_fixed_values([key]).is_ok()
                        }
                        CompareOp::Ne => advisory.add_not_equal(key).is_ok(),
                        _ => advisory.add_bound(*op, key).is_ok(),
                    },
                    _ => false,
                };
                if ok {
                    self.pushdown.compound_ranges.push(advisory);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PredicateNormalizer, SlotDesc};
    use crate::common::ids::SlotId;
    use crate::common::types::PrimitiveKind;
    use crate::exec::expr::{ColumnRef, CompareOp, LiteralValue, PredExpr, create_literal_node};
    use crate::exec::runtime_filter::ColumnBinding;
    use crate::exec::runtime_filter::values::FilterKey;

    fn slots() -> Vec<SlotDesc> {
        vec![
            SlotDesc {
                slot: SlotId::new(1),
                name: "k".to_string(),
                binding: ColumnBinding::new(PrimitiveKind::Int32),
                nullable: true,
                is_key: true,
            },
            SlotDesc {
                slot: SlotId::new(2),
                name: "v".to_string(),
                binding: ColumnBinding::new(PrimitiveKind::String),
                nullable: true,
                is_key: false,
            },
        ]
    }

    fn int_col() -> ColumnRef {
        ColumnRef::new(SlotId::new(1), PrimitiveKind::Int32)
    }

    fn int_lit(v: i64) -> crate::exec::expr::LiteralNode {
        create_literal_node(PrimitiveKind::Int32, &LiteralValue::Int64(v), 0, 0).unwrap()
    }

    fn compare(op: CompareOp, v: i64) -> PredExpr {
        PredExpr::Compare {
            column: int_col(),
            op,
            literal: int_lit(v),
        }
    }

    #[test]
    fn key_column_range_predicates_are_absorbed() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let tree = PredExpr::and(compare(CompareOp::Ge, 10), compare(CompareOp::Lt, 20));
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_none());
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        assert!(range.matches_key(Some(&FilterKey::I64(15))).unwrap());
        assert!(!range.matches_key(Some(&FilterKey::I64(25))).unwrap());
    }

    #[test]
    fn disjoint_equalities_short_circuit_to_eof() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let tree = PredExpr::and(compare(CompareOp::Eq, 1), compare(CompareOp::Eq, 2));
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_none());
        assert!(n.pushdown().eos);
    }

    #[test]
    fn or_subtree_stays_residual_with_advisory_ranges() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let tree = PredExpr::or(compare(CompareOp::Eq, 1), compare(CompareOp::Eq, 2));
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(matches!(residual, Some(PredExpr::Or(_, _))));
        assert_eq!(n.pushdown().compound_ranges.len(), 2);
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        // The hard range must stay unconstrained.
        assert!(range.matches_key(Some(&FilterKey::I64(77))).unwrap());
    }

    #[test]
    fn not_folds_into_leaf_operators() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let tree = PredExpr::not(compare(CompareOp::Lt, 10));
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_none());
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        assert!(range.matches_key(Some(&FilterKey::I64(10))).unwrap());
        assert!(!range.matches_key(Some(&FilterKey::I64(9))).unwrap());
    }

    #[test]
    fn narrowing_cast_refuses_pushdown() {
        let mut n = PredicateNormalizer::new(
            &[SlotDesc {
                slot: SlotId::new(1),
                name: "ts".to_string(),
                binding: ColumnBinding::new(PrimitiveKind::DateTimeV2),
                nullable: true,
                is_key: true,
            }],
            false,
        );
        let column = ColumnRef::new(SlotId::new(1), PrimitiveKind::DateTimeV2)
            .cast(PrimitiveKind::DateV2);
        let literal =
            create_literal_node(PrimitiveKind::DateV2, &LiteralValue::Date32(100), 0, 0).unwrap();
        let tree = PredExpr::Compare {
            column,
            op: CompareOp::Eq,
            literal,
        };
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_some());
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        assert!(range.matches_key(Some(&FilterKey::I64(1))).unwrap());
    }

    #[test]
    fn oversized_in_list_routes_to_in_set_sink() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let values: Vec<_> = (0..1_100).map(int_lit).collect();
        let tree = PredExpr::InList {
            column: int_col(),
            values,
            not_in: false,
        };
        let residual = n.normalize_conjuncts(Some(tree));
        // The predicate stays in the residual tree next to the sink entry.
        assert!(matches!(residual, Some(PredExpr::InList { .. })));
        assert_eq!(n.pushdown().in_filters.len(), 1);
        let (slot, filter) = &n.pushdown().in_filters[0];
        assert_eq!(*slot, SlotId::new(1));
        assert!(filter.probe_key(Some(&FilterKey::I64(17))).unwrap());
        assert!(!filter.probe_key(Some(&FilterKey::I64(5_000))).unwrap());
        // The hard value range is untouched by the oversized set.
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        assert!(range.matches_key(Some(&FilterKey::I64(5_000))).unwrap());
    }

    #[test]
    fn not_in_pushes_into_ne_set() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let tree = PredExpr::InList {
            column: int_col(),
            values: vec![int_lit(1), int_lit(3)],
            not_in: true,
        };
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_none());
        let range = &n.pushdown().value_ranges[&SlotId::new(1)];
        assert!(!range.matches_key(Some(&FilterKey::I64(1))).unwrap());
        assert!(!range.matches_key(Some(&FilterKey::I64(3))).unwrap());
        assert!(range.matches_key(Some(&FilterKey::I64(2))).unwrap());
    }

    #[test]
    fn not_in_containing_null_is_constant_false() {
        let mut n = PredicateNormalizer::new(&slots(), false);
        let null_lit =
            create_literal_node(PrimitiveKind::Int32, &LiteralValue::Null, 0, 0).unwrap();
        let tree = PredExpr::InList {
            column: int_col(),
            values: vec![int_lit(1), null_lit],
            not_in: true,
        };
        let residual = n.normalize_conjuncts(Some(tree));
        assert!(residual.is_none());
        assert!(n.pushdown().eos);
    }
}
