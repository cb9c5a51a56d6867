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
//! Residual conjunct-tree evaluation over chunks.
//!
//! Three-valued logic: a comparison against null is unknown, AND/OR follow
//! Kleene semantics, and only rows evaluating to true survive. Filter probe
//! nodes are two-valued by construction (maybe / definitely-no).

use std::cmp::Ordering;

use crate::exec::chunk::Chunk;
use crate::exec::runtime_filter::values::{ColumnView, FilterKey, KeyConvert, cast_key};
use crate::exec::runtime_filter::{ColumnBinding, FilterWrapper};

use super::{ColumnRef, CompareOp, LiteralNode, PredExpr};

fn column_binding(column: &ColumnRef) -> ColumnBinding {
    ColumnBinding {
        kind: column.kind,
        precision: column.precision,
        scale: column.scale,
    }
}

fn compare_binding(column: &ColumnRef) -> ColumnBinding {
    ColumnBinding {
        kind: column.compare_kind(),
        precision: column.precision,
        scale: column.scale,
    }
}

fn column_keys(column: &ColumnRef, chunk: &Chunk) -> Result<Vec<Option<FilterKey>>, String> {
    let array = chunk.column_by_slot_id(column.slot)?;
    let view = ColumnView::try_new(&array, &column_binding(column))?;
    let mut keys = Vec::with_capacity(view.len());
    for row in 0..view.len() {
        let key = match view.key_at(row)? {
            Some(key) => Some(cast_key(key, column.kind, column.compare_kind())?),
            None => None,
        };
        keys.push(key);
    }
    Ok(keys)
}

fn literal_key(column: &ColumnRef, literal: &LiteralNode) -> Result<Option<FilterKey>, String> {
    match literal.to_filter_key(&compare_binding(column))? {
        KeyConvert::Exact(key) => Ok(Some(key)),
        KeyConvert::Null => Ok(None),
        KeyConvert::Inexact => Err(format!(
            "literal {:?} not comparable against column kind {}",
            literal.repr,
            column.compare_kind()
        )),
    }
}

fn apply_op(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq | CompareOp::NullSafeEq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

/// Evaluate the tree to one tri-state truth value per row.
pub fn eval_predicate(expr: &PredExpr, chunk: &Chunk) -> Result<Vec<Option<bool>>, String> {
    let len = chunk.len();
    let out = match expr {
        PredExpr::ConstBool(b) => vec![Some(*b); len],
        PredExpr::Compare {
            column,
            op,
            literal,
        } => {
            let keys = column_keys(column, chunk)?;
            match literal_key(column, literal)? {
                Some(lit) => keys
                    .iter()
                    .map(|key| match key {
                        Some(key) => key.cmp_same_class(&lit).map(|ord| Some(apply_op(*op, ord))),
                        None => {
                            if *op == CompareOp::NullSafeEq {
                                Ok(Some(false))
                            } else {
                                Ok(None)
                            }
                        }
                    })
                    .collect::<Result<Vec<_>, String>>()?,
                // Comparing against a null literal is unknown everywhere,
                // except null-safe equality which matches null rows.
                None => keys
                    .iter()
                    .map(|key| {
                        if *op == CompareOp::NullSafeEq {
                            Some(key.is_none())
                        } else {
                            None
                        }
                    })
                    .collect(),
            }
        }
        PredExpr::InList {
            column,
            values,
            not_in,
        } => {
            let keys = column_keys(column, chunk)?;
            let mut set = Vec::with_capacity(values.len());
            let mut null_in_list = false;
            for value in values {
                match value.to_filter_key(&compare_binding(column))? {
                    KeyConvert::Exact(key) => set.push(key),
                    KeyConvert::Null => null_in_list = true,
                    KeyConvert::Inexact => {
                        return Err("in-list literal not comparable against column".to_string());
                    }
                }
            }
            keys.iter()
                .map(|key| match key {
                    Some(key) => {
                        let contained = set.contains(key);
                        if contained {
                            Some(!*not_in)
                        } else if null_in_list {
                            // `v IN (..., null)` is unknown when not found;
                            // `v NOT IN (..., null)` is never true.
                            None
                        } else {
                            Some(*not_in)
                        }
                    }
                    None => None,
                })
                .collect()
        }
        PredExpr::IsNull { column, negated } => {
            let keys = column_keys(column, chunk)?;
            keys.iter()
                .map(|key| Some(key.is_none() != *negated))
                .collect()
        }
        PredExpr::BloomProbe { column, filter }
        | PredExpr::BitmapProbe { column, filter }
        | PredExpr::InProbe { column, filter } => probe_rows(column, filter, chunk)?,
        PredExpr::FunctionCall { name, .. } => {
            return Err(format!(
                "function predicate '{}' requires the engine expression evaluator",
                name
            ));
        }
        PredExpr::And(lhs, rhs) => {
            let l = eval_predicate(lhs, chunk)?;
            let r = eval_predicate(rhs, chunk)?;
            l.into_iter()
                .zip(r)
                .map(|(a, b)| match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                })
                .collect()
        }
        PredExpr::Or(lhs, rhs) => {
            let l = eval_predicate(lhs, chunk)?;
            let r = eval_predicate(rhs, chunk)?;
            l.into_iter()
                .zip(r)
                .map(|(a, b)| match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                })
                .collect()
        }
        PredExpr::Not(inner) => eval_predicate(inner, chunk)?
            .into_iter()
            .map(|v| v.map(|b| !b))
            .collect(),
    };
    Ok(out)
}

fn probe_rows(
    column: &ColumnRef,
    filter: &FilterWrapper,
    chunk: &Chunk,
) -> Result<Vec<Option<bool>>, String> {
    let array = chunk.column_by_slot_id(column.slot)?;
    let view = ColumnView::try_new(&array, filter.column())?;
    let mut out = Vec::with_capacity(view.len());
    for row in 0..view.len() {
        let key = view.key_at(row)?;
        out.push(Some(filter.probe_key(key.as_ref())?));
    }
    Ok(out)
}

/// Rows that survive the conjunct tree (true only).
pub fn eval_keep_mask(expr: &PredExpr, chunk: &Chunk) -> Result<Vec<bool>, String> {
    Ok(eval_predicate(expr, chunk)?
        .into_iter()
        .map(|v| v == Some(true))
        .collect())
}
