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
//! Literal predicate-node construction.
//!
//! Responsibilities:
//! - Builds typed literal nodes for every supported primitive kind so the
//!   expression evaluator can consume materialized filter predicates.
//! - Decimals and largeints carry a string encoding to avoid double
//!   rounding; strings carry their raw bytes; dates carry canonical text.
//!
//! Key exported interfaces:
//! - Types: `LiteralNode`, `LiteralRepr`.
//! - Functions: `create_literal_node`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::common::types::PrimitiveKind;
use crate::error::FilterError;
use crate::exec::runtime_filter::{ColumnBinding, values};

use super::LiteralValue;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const EPOCH_DAY_FROM_CE: i32 = 719_163;

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralRepr {
    Null,
    Bool(bool),
    Int(i64),
    /// Decimal text; 128-bit integers do not survive every wire encoding.
    LargeInt(String),
    Float(f64),
    /// Rendered at the node's scale to avoid double rounding.
    Decimal(String),
    /// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS.ffffff`, or `HH:MM:SS.ffffff`.
    DateText(String),
    /// Raw string bytes, compared lexicographically.
    Bytes(Vec<u8>),
}

/// A typed literal predicate node.
#[derive(Clone, Debug, PartialEq)]
pub struct LiteralNode {
    pub kind: PrimitiveKind,
    pub precision: u8,
    pub scale: i8,
    pub repr: LiteralRepr,
}

/// Build the literal node for `value` in the space of `kind`.
///
/// `precision`/`scale` apply to decimal kinds only. Unsupported kinds and
/// kind/value mismatches fail; the caller keeps such predicates in the
/// residual tree.
pub fn create_literal_node(
    kind: PrimitiveKind,
    value: &LiteralValue,
    precision: u8,
    scale: i8,
) -> Result<LiteralNode, FilterError> {
    let repr = match (kind, value) {
        (_, LiteralValue::Null) => LiteralRepr::Null,
        (PrimitiveKind::Bool, LiteralValue::Bool(v)) => LiteralRepr::Bool(*v),
        (PrimitiveKind::Int8, LiteralValue::Int8(v)) => LiteralRepr::Int(*v as i64),
        (PrimitiveKind::Int16, LiteralValue::Int16(v)) => LiteralRepr::Int(*v as i64),
        (PrimitiveKind::Int32, LiteralValue::Int32(v)) => LiteralRepr::Int(*v as i64),
        (PrimitiveKind::Int64, LiteralValue::Int64(v)) => LiteralRepr::Int(*v),
        (PrimitiveKind::Int8, LiteralValue::Int64(v)) => int_repr(*v, i8::MIN as i64, i8::MAX as i64)?,
        (PrimitiveKind::Int16, LiteralValue::Int64(v)) => {
            int_repr(*v, i16::MIN as i64, i16::MAX as i64)?
        }
        (PrimitiveKind::Int32, LiteralValue::Int64(v)) => {
            int_repr(*v, i32::MIN as i64, i32::MAX as i64)?
        }
        (PrimitiveKind::Int128, LiteralValue::LargeInt(v)) => LiteralRepr::LargeInt(v.to_string()),
        (PrimitiveKind::Int128, LiteralValue::Int64(v)) => LiteralRepr::LargeInt(v.to_string()),
        (PrimitiveKind::Float, LiteralValue::Float32(v)) => LiteralRepr::Float(*v as f64),
        (PrimitiveKind::Float, LiteralValue::Float64(v)) => LiteralRepr::Float(*v),
        (PrimitiveKind::Double, LiteralValue::Float64(v)) => LiteralRepr::Float(*v),
        (PrimitiveKind::Double, LiteralValue::Float32(v)) => LiteralRepr::Float(*v as f64),
        (k, LiteralValue::Decimal128 { value, scale: s, .. }) if k.is_decimal() => {
            LiteralRepr::Decimal(render_decimal(*value, *s))
        }
        (k, LiteralValue::Int64(v)) if k.is_decimal() => LiteralRepr::Decimal(v.to_string()),
        (k, LiteralValue::Date32(days)) if k.is_date_kind() => {
            LiteralRepr::DateText(render_date(*days).map_err(FilterError::DataQuality)?)
        }
        (k, LiteralValue::Date32(days)) if k.is_datetime_kind() => LiteralRepr::DateText(
            render_datetime(*days as i64 * values::MICROS_PER_DAY)
                .map_err(FilterError::DataQuality)?,
        ),
        (k, LiteralValue::DateTime(micros)) if k.is_datetime_kind() => {
            LiteralRepr::DateText(render_datetime(*micros).map_err(FilterError::DataQuality)?)
        }
        (PrimitiveKind::Time, LiteralValue::Time(micros)) => {
            LiteralRepr::DateText(render_time(*micros))
        }
        (k, LiteralValue::Utf8(v)) if k.is_string() => LiteralRepr::Bytes(v.as_bytes().to_vec()),
        (k, LiteralValue::Binary(v)) if k.is_string() => LiteralRepr::Bytes(v.clone()),
        (PrimitiveKind::Hll, _) => {
            return Err(FilterError::invalid_config(
                "invalid argument: hll literals are not supported",
            ));
        }
        (kind, value) => {
            return Err(FilterError::DataQuality(format!(
                "literal {:?} cannot be represented as {}",
                value, kind
            )));
        }
    };
    Ok(LiteralNode {
        kind,
        precision,
        scale,
        repr,
    })
}

fn int_repr(value: i64, min: i64, max: i64) -> Result<LiteralRepr, FilterError> {
    if value < min || value > max {
        return Err(FilterError::DataQuality(format!(
            "integer literal {} out of range [{}, {}]",
            value, min, max
        )));
    }
    Ok(LiteralRepr::Int(value))
}

impl LiteralNode {
    /// Recover the literal value this node encodes.
    pub fn to_literal_value(&self) -> Result<LiteralValue, String> {
        let value = match (&self.repr, self.kind) {
            (LiteralRepr::Null, _) => LiteralValue::Null,
            (LiteralRepr::Bool(v), _) => LiteralValue::Bool(*v),
            (LiteralRepr::Int(v), _) => LiteralValue::Int64(*v),
            (LiteralRepr::LargeInt(text), _) => LiteralValue::LargeInt(
                text.parse::<i128>()
                    .map_err(|e| format!("invalid largeint literal '{}': {}", text, e))?,
            ),
            (LiteralRepr::Float(v), _) => LiteralValue::Float64(*v),
            (LiteralRepr::Decimal(text), _) => LiteralValue::Decimal128 {
                value: parse_decimal(text, self.scale)?,
                precision: self.precision,
                scale: self.scale,
            },
            (LiteralRepr::DateText(text), kind) if kind.is_date_kind() => {
                LiteralValue::Date32(parse_date(text)?)
            }
            (LiteralRepr::DateText(text), kind) if kind.is_datetime_kind() => {
                LiteralValue::DateTime(parse_datetime(text)?)
            }
            (LiteralRepr::DateText(text), PrimitiveKind::Time) => {
                LiteralValue::Time(parse_time(text)?)
            }
            (LiteralRepr::DateText(text), kind) => {
                return Err(format!("date literal '{}' bound to kind {}", text, kind));
            }
            (LiteralRepr::Bytes(v), _) => LiteralValue::Binary(v.clone()),
        };
        Ok(value)
    }

    /// Canonical key of this literal in the space of `binding`.
    pub fn to_filter_key(&self, binding: &ColumnBinding) -> Result<values::KeyConvert, String> {
        let value = self.to_literal_value()?;
        values::literal_to_key(&value, binding)
    }
}

fn render_decimal(value: i128, scale: i8) -> String {
    if scale <= 0 {
        return value.to_string();
    }
    let scale = scale as u32;
    let divisor = 10i128.pow(scale);
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    let whole = magnitude / divisor.unsigned_abs();
    let frac = magnitude % divisor.unsigned_abs();
    format!("{sign}{whole}.{frac:0width$}", width = scale as usize)
}

fn parse_decimal(text: &str, scale: i8) -> Result<i128, String> {
    let scale = scale.max(0) as usize;
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, text),
    };
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if frac.len() > scale {
        return Err(format!("decimal literal '{}' exceeds scale {}", text, scale));
    }
    let mut unscaled = whole
        .parse::<i128>()
        .map_err(|e| format!("invalid decimal literal '{}': {}", text, e))?;
    unscaled = unscaled
        .checked_mul(10i128.pow(scale as u32))
        .ok_or_else(|| format!("decimal literal '{}' overflows", text))?;
    if !frac.is_empty() {
        let mut frac_value = frac
            .parse::<i128>()
            .map_err(|e| format!("invalid decimal literal '{}': {}", text, e))?;
        frac_value *= 10i128.pow((scale - frac.len()) as u32);
        unscaled += frac_value;
    }
    Ok(sign * unscaled)
}

fn render_date(days: i32) -> Result<String, String> {
    let date = NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAY_FROM_CE)
        .ok_or_else(|| format!("date literal out of range: {} days", days))?;
    Ok(format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()))
}

fn parse_date(text: &str) -> Result<i32, String> {
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| format!("invalid date literal '{}': {}", text, e))?;
    Ok(date.num_days_from_ce() - EPOCH_DAY_FROM_CE)
}

fn render_datetime(micros: i64) -> Result<String, String> {
    let dt = chrono::DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| format!("datetime literal out of range: {} us", micros))?
        .naive_utc();
    Ok(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

fn parse_datetime(text: &str) -> Result<i64, String> {
    let dt = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| format!("invalid datetime literal '{}': {}", text, e))?;
    Ok(dt.and_utc().timestamp_micros())
}

fn render_time(micros: i64) -> String {
    let total_seconds = micros / 1_000_000;
    let frac = (micros % 1_000_000).unsigned_abs();
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
        frac
    )
}

fn parse_time(text: &str) -> Result<i64, String> {
    let t = chrono::NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .map_err(|e| format!("invalid time literal '{}': {}", text, e))?;
    Ok(t.num_seconds_from_midnight() as i64 * 1_000_000 + (t.nanosecond() / 1_000) as i64)
}

#[cfg(test)]
mod tests {
    use super::{LiteralRepr, create_literal_node, parse_decimal, render_decimal};
    use crate::common::types::PrimitiveKind;
    use crate::exec::expr::LiteralValue;

    #[test]
    fn decimal_literal_roundtrips_through_text() {
        let rendered = render_decimal(-120_034, 3);
        assert_eq!(rendered, "-120.034");
        assert_eq!(parse_decimal(&rendered, 3).unwrap(), -120_034);
    }

    #[test]
    fn date_literal_renders_canonical_text() {
        let node =
            create_literal_node(PrimitiveKind::DateV2, &LiteralValue::Date32(19_723), 0, 0).unwrap();
        assert_eq!(node.repr, LiteralRepr::DateText("2024-01-01".to_string()));
        assert_eq!(node.to_literal_value().unwrap(), LiteralValue::Date32(19_723));
    }

    #[test]
    fn hll_literal_is_rejected() {
        let err = create_literal_node(PrimitiveKind::Hll, &LiteralValue::Int64(1), 0, 0);
        assert!(err.is_err());
    }

    #[test]
    fn mismatched_literal_kind_is_data_quality() {
        let err = create_literal_node(
            PrimitiveKind::Int32,
            &LiteralValue::Utf8("x".to_string()),
            0,
            0,
        );
        assert!(matches!(err, Err(crate::error::FilterError::DataQuality(_))));
    }
}
