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
//! Boolean predicate trees consumed by the scan-side normalizer.
//!
//! Responsibilities:
//! - Defines the conjunct tree shapes the normalizer recognizes (leaf
//!   comparisons, IN lists, null tests, filter probes, compounds).
//! - Provides literal values and literal-node construction for predicate
//!   materialization.
//!
//! Key exported interfaces:
//! - Types: `PredExpr`, `ColumnRef`, `CompareOp`, `LiteralValue`.
//!
//! The full engine expression evaluator lives outside this subsystem; the
//! evaluation here covers exactly the node set a residual conjunct tree can
//! contain after normalization.

mod eval;
pub mod literal;

use std::sync::Arc;

use crate::common::ids::SlotId;
use crate::common::types::PrimitiveKind;
use crate::exec::runtime_filter::FilterWrapper;

pub use eval::{eval_keep_mask, eval_predicate};
pub use literal::{LiteralNode, LiteralRepr, create_literal_node};

/// Literal constant as produced by the planner or extracted from a build row.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    LargeInt(i128),
    Float32(f32),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since the Unix epoch.
    Date32(i32),
    /// Microseconds since the Unix epoch.
    DateTime(i64),
    /// Microseconds since midnight.
    Time(i64),
    Decimal128 {
        value: i128,
        precision: u8,
        scale: i8,
    },
}

impl LiteralValue {
    pub fn is_null(&self) -> bool {
        matches!(self, LiteralValue::Null)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    /// Null-safe equality (`<=>`); matches null against a null literal.
    NullSafeEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Logical negation used when folding NOT over a leaf comparison.
    pub fn invert(self) -> Option<CompareOp> {
        match self {
            CompareOp::Eq => Some(CompareOp::Ne),
            CompareOp::Ne => Some(CompareOp::Eq),
            CompareOp::Lt => Some(CompareOp::Ge),
            CompareOp::Le => Some(CompareOp::Gt),
            CompareOp::Gt => Some(CompareOp::Le),
            CompareOp::Ge => Some(CompareOp::Lt),
            // NOT over null-safe equality is not a plain comparison.
            CompareOp::NullSafeEq => None,
        }
    }
}

/// Column reference inside a leaf predicate.
///
/// `cast_to` models a widening cast wrapping the column (`cast(c as T)`):
/// the comparison then happens in kind `T`. Narrowing casts never reach this
/// tree; the normalizer refuses them during shape recognition.
#[derive(Clone, Debug)]
pub struct ColumnRef {
    pub slot: SlotId,
    pub kind: PrimitiveKind,
    pub precision: u8,
    pub scale: i8,
    pub nullable: bool,
    pub cast_to: Option<PrimitiveKind>,
}

impl ColumnRef {
    pub fn new(slot: SlotId, kind: PrimitiveKind) -> Self {
        Self {
            slot,
            kind,
            precision: 0,
            scale: 0,
            nullable: true,
            cast_to: None,
        }
    }

    pub fn with_decimal(slot: SlotId, kind: PrimitiveKind, precision: u8, scale: i8) -> Self {
        Self {
            slot,
            kind,
            precision,
            scale,
            nullable: true,
            cast_to: None,
        }
    }

    pub fn cast(mut self, target: PrimitiveKind) -> Self {
        self.cast_to = Some(target);
        self
    }

    /// Kind the comparison is evaluated in.
    pub fn compare_kind(&self) -> PrimitiveKind {
        self.cast_to.unwrap_or(self.kind)
    }
}

/// Boolean conjunct tree. The root always evaluates to boolean; AND/OR are
/// binary as the planner lowers variadic compounds to chains.
#[derive(Clone, Debug)]
pub enum PredExpr {
    ConstBool(bool),
    Compare {
        column: ColumnRef,
        op: CompareOp,
        literal: LiteralNode,
    },
    InList {
        column: ColumnRef,
        values: Vec<LiteralNode>,
        not_in: bool,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    /// Membership probe against a runtime bloom payload.
    BloomProbe {
        column: ColumnRef,
        filter: Arc<FilterWrapper>,
    },
    /// Membership probe against a runtime bitmap payload.
    BitmapProbe {
        column: ColumnRef,
        filter: Arc<FilterWrapper>,
    },
    /// Exact-set probe against a runtime in-filter too large for fixed-value
    /// pushdown.
    InProbe {
        column: ColumnRef,
        filter: Arc<FilterWrapper>,
    },
    /// Call of an approved pushdown function on a single column.
    FunctionCall {
        column: ColumnRef,
        name: String,
        args: Vec<LiteralNode>,
        negated: bool,
    },
    And(Box<PredExpr>, Box<PredExpr>),
    Or(Box<PredExpr>, Box<PredExpr>),
    Not(Box<PredExpr>),
}

impl PredExpr {
    pub fn and(lhs: PredExpr, rhs: PredExpr) -> PredExpr {
        PredExpr::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: PredExpr, rhs: PredExpr) -> PredExpr {
        PredExpr::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn not(inner: PredExpr) -> PredExpr {
        PredExpr::Not(Box::new(inner))
    }

    /// AND a list of predicates onto an optional existing tree.
    pub fn conjoin(base: Option<PredExpr>, extra: impl IntoIterator<Item = PredExpr>) -> Option<PredExpr> {
        let mut acc = base;
        for pred in extra {
            acc = Some(match acc {
                Some(prev) => PredExpr::and(prev, pred),
                None => pred,
            });
        }
        acc
    }

    /// Column the leaf acts on, when this is a single-column leaf.
    pub fn leaf_column(&self) -> Option<&ColumnRef> {
        match self {
            PredExpr::Compare { column, .. }
            | PredExpr::InList { column, .. }
            | PredExpr::IsNull { column, .. }
            | PredExpr::BloomProbe { column, .. }
            | PredExpr::BitmapProbe { column, .. }
            | PredExpr::InProbe { column, .. }
            | PredExpr::FunctionCall { column, .. } => Some(column),
            _ => None,
        }
    }
}
