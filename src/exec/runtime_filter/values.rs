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
//! Canonical filter values and typed column access.
//!
//! Responsibilities:
//! - Defines the canonical value classes all payloads store and probe
//!   through (i64, i128, f64 bits, raw bytes).
//! - Extracts canonical keys from arrow arrays for vectorized insert/probe.
//! - Converts planner literals into canonical keys with exactness tracking.
//!
//! Key exported interfaces:
//! - Types: `FilterKey`, `ColumnView`, `KeyConvert`.
//!
//! Comparison follows the bound column semantics: raw-byte lexicographic
//! for strings, IEEE-754 for floats with NaN excluded, canonical integer
//! representation for dates and datetimes.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array,
    FixedSizeBinaryArray, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array,
    Int64Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};

use crate::common::largeint;
use crate::common::types::{PrimitiveKind, StorageClass};
use crate::exec::expr::LiteralValue;

use super::ColumnBinding;

pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// One canonical filter value. Bound column kinds map onto exactly one
/// variant (see `StorageClass`); payloads never mix variants.
#[derive(Clone, Debug)]
pub enum FilterKey {
    I64(i64),
    I128(i128),
    F64(f64),
    Bytes(Vec<u8>),
}

impl FilterKey {
    pub fn storage_class(&self) -> StorageClass {
        match self {
            FilterKey::I64(_) => StorageClass::I64,
            FilterKey::I128(_) => StorageClass::I128,
            FilterKey::F64(_) => StorageClass::F64,
            FilterKey::Bytes(_) => StorageClass::Bytes,
        }
    }

    pub fn cmp_same_class(&self, other: &FilterKey) -> Result<Ordering, String> {
        match (self, other) {
            (FilterKey::I64(a), FilterKey::I64(b)) => Ok(a.cmp(b)),
            (FilterKey::I128(a), FilterKey::I128(b)) => Ok(a.cmp(b)),
            (FilterKey::F64(a), FilterKey::F64(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| "filter value float compare failed".to_string()),
            (FilterKey::Bytes(a), FilterKey::Bytes(b)) => Ok(a.as_slice().cmp(b.as_slice())),
            _ => Err("filter value class mismatch".to_string()),
        }
    }

    /// Canonical byte encoding shared by the bloom hash input and the wire
    /// codec value section.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            FilterKey::I64(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FilterKey::I128(v) => buf.extend_from_slice(&v.to_le_bytes()),
            FilterKey::F64(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            FilterKey::Bytes(v) => buf.extend_from_slice(v),
        }
    }

    pub fn decode(class: StorageClass, bytes: &[u8]) -> Result<FilterKey, String> {
        match class {
            StorageClass::I64 => {
                let arr: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| "filter value expects 8 bytes".to_string())?;
                Ok(FilterKey::I64(i64::from_le_bytes(arr)))
            }
            StorageClass::I128 => {
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| "filter value expects 16 bytes".to_string())?;
                Ok(FilterKey::I128(i128::from_le_bytes(arr)))
            }
            StorageClass::F64 => {
                let arr: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| "filter value expects 8 bytes".to_string())?;
                Ok(FilterKey::F64(f64::from_bits(u64::from_le_bytes(arr))))
            }
            StorageClass::Bytes => Ok(FilterKey::Bytes(bytes.to_vec())),
        }
    }

    /// Run `f` over the canonical bytes without allocating for fixed-width
    /// classes.
    pub fn with_encoded<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self {
            FilterKey::I64(v) => f(&v.to_le_bytes()),
            FilterKey::I128(v) => f(&v.to_le_bytes()),
            FilterKey::F64(v) => f(&v.to_bits().to_le_bytes()),
            FilterKey::Bytes(v) => f(v),
        }
    }

    pub fn as_i64(&self) -> Result<i64, String> {
        match self {
            FilterKey::I64(v) => Ok(*v),
            _ => Err("filter value is not an integer".to_string()),
        }
    }
}

impl PartialEq for FilterKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterKey::I64(a), FilterKey::I64(b)) => a == b,
            (FilterKey::I128(a), FilterKey::I128(b)) => a == b,
            (FilterKey::F64(a), FilterKey::F64(b)) => a.to_bits() == b.to_bits(),
            (FilterKey::Bytes(a), FilterKey::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FilterKey {}

impl Hash for FilterKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FilterKey::I64(v) => {
                state.write_u8(0);
                state.write_i64(*v);
            }
            FilterKey::I128(v) => {
                state.write_u8(1);
                state.write_i128(*v);
            }
            FilterKey::F64(v) => {
                state.write_u8(2);
                state.write_u64(v.to_bits());
            }
            FilterKey::Bytes(v) => {
                state.write_u8(3);
                state.write(v);
            }
        }
    }
}

/// Outcome of converting a literal into a column's canonical key space.
#[derive(Clone, Debug)]
pub enum KeyConvert {
    Exact(FilterKey),
    /// Null literal; comparison semantics reject it, null-safe paths keep it.
    Null,
    /// The literal has no exact image in the column kind (overflow, lost
    /// fraction, sub-day datetime on a date column, class mismatch, NaN).
    Inexact,
}

fn pow10_i128(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// Convert a planner literal into the canonical key space of `binding`.
///
/// Only exact conversions succeed; anything lossy reports `Inexact` so the
/// caller can keep the predicate in the residual tree instead of pushing an
/// incorrect constraint.
pub fn literal_to_key(value: &LiteralValue, binding: &ColumnBinding) -> Result<KeyConvert, String> {
    if value.is_null() {
        return Ok(KeyConvert::Null);
    }
    let kind = binding.kind;
    let converted = match (value, kind.storage_class()) {
        (LiteralValue::Bool(v), StorageClass::I64) if kind == PrimitiveKind::Bool => {
            KeyConvert::Exact(FilterKey::I64(*v as i64))
        }
        (LiteralValue::Int8(v), _) => integral_to_key(*v as i128, binding)?,
        (LiteralValue::Int16(v), _) => integral_to_key(*v as i128, binding)?,
        (LiteralValue::Int32(v), _) => integral_to_key(*v as i128, binding)?,
        (LiteralValue::Int64(v), _) => integral_to_key(*v as i128, binding)?,
        (LiteralValue::LargeInt(v), _) => integral_to_key(*v, binding)?,
        (LiteralValue::Float32(v), StorageClass::F64) => float_to_key(*v as f64),
        (LiteralValue::Float64(v), StorageClass::F64) => float_to_key(*v),
        (LiteralValue::Utf8(v), StorageClass::Bytes) => {
            KeyConvert::Exact(FilterKey::Bytes(v.as_bytes().to_vec()))
        }
        (LiteralValue::Binary(v), StorageClass::Bytes) => {
            KeyConvert::Exact(FilterKey::Bytes(v.clone()))
        }
        (LiteralValue::Date32(days), StorageClass::I64) if kind.is_date_kind() => {
            KeyConvert::Exact(FilterKey::I64(*days as i64))
        }
        (LiteralValue::Date32(days), StorageClass::I64) if kind.is_datetime_kind() => {
            // Date literals promote to midnight for mixed-kind joins.
            KeyConvert::Exact(FilterKey::I64(*days as i64 * MICROS_PER_DAY))
        }
        (LiteralValue::DateTime(micros), StorageClass::I64) if kind.is_datetime_kind() => {
            KeyConvert::Exact(FilterKey::I64(*micros))
        }
        (LiteralValue::DateTime(micros), StorageClass::I64) if kind.is_date_kind() => {
            if micros % MICROS_PER_DAY == 0 {
                KeyConvert::Exact(FilterKey::I64(micros / MICROS_PER_DAY))
            } else {
                KeyConvert::Inexact
            }
        }
        (
            LiteralValue::Decimal128 { value, scale, .. },
            StorageClass::I128,
        ) if kind.is_decimal() => decimal_rescale(*value, *scale, binding.scale),
        (LiteralValue::Decimal128 { value, scale, .. }, StorageClass::I64)
            if kind.is_integer() =>
        {
            // Exact only when the fraction is zero and the integer fits.
            match decimal_rescale(*value, *scale, 0) {
                KeyConvert::Exact(FilterKey::I128(whole)) => integral_to_key(whole, binding)?,
                _ => KeyConvert::Inexact,
            }
        }
        _ => KeyConvert::Inexact,
    };
    Ok(converted)
}

fn integral_to_key(value: i128, binding: &ColumnBinding) -> Result<KeyConvert, String> {
    let kind = binding.kind;
    let converted = match kind {
        PrimitiveKind::Int8 => fit_i64(value, i8::MIN as i128, i8::MAX as i128),
        PrimitiveKind::Int16 => fit_i64(value, i16::MIN as i128, i16::MAX as i128),
        PrimitiveKind::Int32 => fit_i64(value, i32::MIN as i128, i32::MAX as i128),
        PrimitiveKind::Int64 => fit_i64(value, i64::MIN as i128, i64::MAX as i128),
        PrimitiveKind::Int128 => KeyConvert::Exact(FilterKey::I128(value)),
        PrimitiveKind::Float | PrimitiveKind::Double => {
            // Integers up to 2^53 convert exactly into a double.
            let as_f64 = value as f64;
            if as_f64 as i128 == value {
                KeyConvert::Exact(FilterKey::F64(as_f64))
            } else {
                KeyConvert::Inexact
            }
        }
        _ if kind.is_decimal() => match pow10_i128(binding.scale.max(0) as u32)
            .and_then(|m| value.checked_mul(m))
        {
            Some(scaled) => KeyConvert::Exact(FilterKey::I128(scaled)),
            None => KeyConvert::Inexact,
        },
        _ => KeyConvert::Inexact,
    };
    Ok(converted)
}

fn fit_i64(value: i128, min: i128, max: i128) -> KeyConvert {
    if value >= min && value <= max {
        KeyConvert::Exact(FilterKey::I64(value as i64))
    } else {
        KeyConvert::Inexact
    }
}

fn float_to_key(value: f64) -> KeyConvert {
    if value.is_nan() {
        // NaN is never inserted and never matched.
        KeyConvert::Inexact
    } else {
        KeyConvert::Exact(FilterKey::F64(value))
    }
}

fn decimal_rescale(value: i128, from_scale: i8, to_scale: i8) -> KeyConvert {
    if from_scale == to_scale {
        return KeyConvert::Exact(FilterKey::I128(value));
    }
    if to_scale > from_scale {
        match pow10_i128((to_scale - from_scale) as u32).and_then(|m| value.checked_mul(m)) {
            Some(scaled) => KeyConvert::Exact(FilterKey::I128(scaled)),
            None => KeyConvert::Inexact,
        }
    } else {
        match pow10_i128((from_scale - to_scale) as u32) {
            Some(div) if value % div == 0 => KeyConvert::Exact(FilterKey::I128(value / div)),
            _ => KeyConvert::Inexact,
        }
    }
}

/// Recover a planner literal from a canonical key (used when materializing
/// filter payloads into literal predicate nodes).
pub fn key_to_literal(key: &FilterKey, binding: &ColumnBinding) -> Result<LiteralValue, String> {
    let kind = binding.kind;
    let literal = match (key, kind.storage_class()) {
        (FilterKey::I64(v), StorageClass::I64) => {
            if kind == PrimitiveKind::Bool {
                LiteralValue::Bool(*v != 0)
            } else if kind.is_date_kind() {
                LiteralValue::Date32(*v as i32)
            } else if kind.is_datetime_kind() {
                LiteralValue::DateTime(*v)
            } else {
                LiteralValue::Int64(*v)
            }
        }
        (FilterKey::I128(v), StorageClass::I128) => {
            if kind.is_decimal() {
                LiteralValue::Decimal128 {
                    value: *v,
                    precision: binding.precision,
                    scale: binding.scale,
                }
            } else {
                LiteralValue::LargeInt(*v)
            }
        }
        (FilterKey::F64(v), StorageClass::F64) => LiteralValue::Float64(*v),
        (FilterKey::Bytes(v), StorageClass::Bytes) => LiteralValue::Binary(v.clone()),
        _ => {
            return Err(format!(
                "filter value class does not match column kind {}",
                kind
            ));
        }
    };
    Ok(literal)
}

/// Widen a canonical key from one kind's space into another (used when a
/// leaf compares `cast(c as T)` against a `T` literal at evaluation time).
pub fn cast_key(key: FilterKey, from: PrimitiveKind, to: PrimitiveKind) -> Result<FilterKey, String> {
    if from == to || from.storage_class() != StorageClass::I64 {
        return Ok(key);
    }
    if from.is_date_kind() && to.is_datetime_kind() {
        let days = key.as_i64()?;
        return Ok(FilterKey::I64(days * MICROS_PER_DAY));
    }
    Ok(key)
}

/// Typed view over one arrow column bound to a primitive kind.
///
/// Decimal arrays are rescaled to the binding scale on access so payload
/// contents are always canonical.
pub enum ColumnView<'a> {
    Bool(&'a BooleanArray),
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
    LargeInt(&'a FixedSizeBinaryArray),
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
    Date32(&'a Date32Array),
    /// Timestamp at any arrow unit, normalized to microseconds.
    Timestamp {
        seconds: Option<&'a TimestampSecondArray>,
        millis: Option<&'a TimestampMillisecondArray>,
        micros: Option<&'a TimestampMicrosecondArray>,
        nanos: Option<&'a TimestampNanosecondArray>,
    },
    Utf8(&'a StringArray),
    Binary(&'a BinaryArray),
    Decimal128 {
        arr: &'a Decimal128Array,
        rescale: i128,
    },
}

impl<'a> ColumnView<'a> {
    pub fn try_new(array: &'a ArrayRef, binding: &ColumnBinding) -> Result<Self, String> {
        let view = match array.data_type() {
            DataType::Boolean => ColumnView::Bool(downcast(array, "Boolean")?),
            DataType::Int8 => ColumnView::Int8(downcast(array, "Int8")?),
            DataType::Int16 => ColumnView::Int16(downcast(array, "Int16")?),
            DataType::Int32 => ColumnView::Int32(downcast(array, "Int32")?),
            DataType::Int64 => ColumnView::Int64(downcast(array, "Int64")?),
            dt @ DataType::FixedSizeBinary(_) if largeint::is_largeint_data_type(dt) => {
                ColumnView::LargeInt(largeint::as_fixed_size_binary_array(array, "filter column")?)
            }
            DataType::Float32 => ColumnView::Float32(downcast(array, "Float32")?),
            DataType::Float64 => ColumnView::Float64(downcast(array, "Float64")?),
            DataType::Date32 => ColumnView::Date32(downcast(array, "Date32")?),
            DataType::Timestamp(unit, _) => match unit {
                TimeUnit::Second => ColumnView::Timestamp {
                    seconds: Some(downcast(array, "TimestampSecond")?),
                    millis: None,
                    micros: None,
                    nanos: None,
                },
                TimeUnit::Millisecond => ColumnView::Timestamp {
                    seconds: None,
                    millis: Some(downcast(array, "TimestampMillisecond")?),
                    micros: None,
                    nanos: None,
                },
                TimeUnit::Microsecond => ColumnView::Timestamp {
                    seconds: None,
                    millis: None,
                    micros: Some(downcast(array, "TimestampMicrosecond")?),
                    nanos: None,
                },
                TimeUnit::Nanosecond => ColumnView::Timestamp {
                    seconds: None,
                    millis: None,
                    micros: None,
                    nanos: Some(downcast(array, "TimestampNanosecond")?),
                },
            },
            DataType::Utf8 => ColumnView::Utf8(downcast(array, "Utf8")?),
            DataType::Binary => ColumnView::Binary(downcast(array, "Binary")?),
            DataType::Decimal128(_, arr_scale) => {
                let arr: &Decimal128Array = downcast(array, "Decimal128")?;
                if *arr_scale > binding.scale {
                    return Err("filter decimal column scale exceeds binding scale".to_string());
                }
                let rescale = pow10_i128((binding.scale - arr_scale) as u32)
                    .ok_or_else(|| "filter decimal rescale overflow".to_string())?;
                ColumnView::Decimal128 { arr, rescale }
            }
            other => {
                return Err(format!("unsupported filter column type: {:?}", other));
            }
        };
        Ok(view)
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnView::Bool(a) => a.len(),
            ColumnView::Int8(a) => a.len(),
            ColumnView::Int16(a) => a.len(),
            ColumnView::Int32(a) => a.len(),
            ColumnView::Int64(a) => a.len(),
            ColumnView::LargeInt(a) => a.len(),
            ColumnView::Float32(a) => a.len(),
            ColumnView::Float64(a) => a.len(),
            ColumnView::Date32(a) => a.len(),
            ColumnView::Timestamp {
                seconds,
                millis,
                micros,
                nanos,
                ..
            } => seconds
                .map(|a| a.len())
                .or(millis.map(|a| a.len()))
                .or(micros.map(|a| a.len()))
                .or(nanos.map(|a| a.len()))
                .unwrap_or(0),
            ColumnView::Utf8(a) => a.len(),
            ColumnView::Binary(a) => a.len(),
            ColumnView::Decimal128 { arr, .. } => arr.len(),
        }
    }

    /// Canonical key at `row`; `None` for null.
    pub fn key_at(&self, row: usize) -> Result<Option<FilterKey>, String> {
        let key = match self {
            ColumnView::Bool(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row) as i64)),
            ColumnView::Int8(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row) as i64)),
            ColumnView::Int16(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row) as i64)),
            ColumnView::Int32(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row) as i64)),
            ColumnView::Int64(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row))),
            ColumnView::LargeInt(a) => match nonnull(a, row) {
                Some(_) => Some(FilterKey::I128(largeint::i128_from_be_bytes(a.value(row))?)),
                None => None,
            },
            ColumnView::Float32(a) => match nonnull(a, row) {
                Some(_) if a.value(row).is_nan() => None,
                Some(_) => Some(FilterKey::F64(a.value(row) as f64)),
                None => None,
            },
            ColumnView::Float64(a) => match nonnull(a, row) {
                Some(_) if a.value(row).is_nan() => None,
                Some(_) => Some(FilterKey::F64(a.value(row))),
                None => None,
            },
            ColumnView::Date32(a) => nonnull(a, row).map(|_| FilterKey::I64(a.value(row) as i64)),
            ColumnView::Timestamp {
                seconds,
                millis,
                micros,
                nanos,
                ..
            } => {
                if let Some(a) = seconds {
                    nonnull(*a, row).map(|_| FilterKey::I64(a.value(row).saturating_mul(1_000_000)))
                } else if let Some(a) = millis {
                    nonnull(*a, row).map(|_| FilterKey::I64(a.value(row).saturating_mul(1_000)))
                } else if let Some(a) = micros {
                    nonnull(*a, row).map(|_| FilterKey::I64(a.value(row)))
                } else if let Some(a) = nanos {
                    nonnull(*a, row).map(|_| FilterKey::I64(a.value(row) / 1_000))
                } else {
                    None
                }
            }
            ColumnView::Utf8(a) => {
                nonnull(a, row).map(|_| FilterKey::Bytes(a.value(row).as_bytes().to_vec()))
            }
            ColumnView::Binary(a) => nonnull(a, row).map(|_| FilterKey::Bytes(a.value(row).to_vec())),
            ColumnView::Decimal128 { arr, rescale } => match nonnull(*arr, row) {
                Some(_) => {
                    let scaled = arr
                        .value(row)
                        .checked_mul(*rescale)
                        .ok_or_else(|| "filter decimal rescale overflow".to_string())?;
                    Some(FilterKey::I128(scaled))
                }
                None => None,
            },
        };
        Ok(key)
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, name: &str) -> Result<&'a T, String> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("filter column type mismatch for {name}"))
}

fn nonnull<A: Array>(array: &A, row: usize) -> Option<()> {
    if array.is_null(row) {
        None
    } else {
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterKey, KeyConvert, literal_to_key};
    use crate::common::types::PrimitiveKind;
    use crate::exec::expr::LiteralValue;
    use crate::exec::runtime_filter::ColumnBinding;

    fn binding(kind: PrimitiveKind) -> ColumnBinding {
        ColumnBinding {
            kind,
            precision: 0,
            scale: 0,
        }
    }

    #[test]
    fn int_literal_narrows_exactly_or_not_at_all() {
        let b = binding(PrimitiveKind::Int8);
        match literal_to_key(&LiteralValue::Int64(7), &b).unwrap() {
            KeyConvert::Exact(FilterKey::I64(7)) => {}
            other => panic!("unexpected conversion: {other:?}"),
        }
        assert!(matches!(
            literal_to_key(&LiteralValue::Int64(1000), &b).unwrap(),
            KeyConvert::Inexact
        ));
    }

    #[test]
    fn datetime_literal_on_date_column_requires_midnight() {
        let b = binding(PrimitiveKind::DateV2);
        let midnight = LiteralValue::DateTime(3 * super::MICROS_PER_DAY);
        match literal_to_key(&midnight, &b).unwrap() {
            KeyConvert::Exact(FilterKey::I64(3)) => {}
            other => panic!("unexpected conversion: {other:?}"),
        }
        let noon = LiteralValue::DateTime(3 * super::MICROS_PER_DAY + 1);
        assert!(matches!(
            literal_to_key(&noon, &b).unwrap(),
            KeyConvert::Inexact
        ));
    }

    #[test]
    fn decimal_rescale_is_exact_only() {
        let b = ColumnBinding {
            kind: PrimitiveKind::Decimal128,
            precision: 18,
            scale: 4,
        };
        let lit = LiteralValue::Decimal128 {
            value: 12_50,
            precision: 9,
            scale: 2,
        };
        match literal_to_key(&lit, &b).unwrap() {
            KeyConvert::Exact(FilterKey::I128(125_000)) => {}
            other => panic!("unexpected conversion: {other:?}"),
        }
        let b2 = ColumnBinding {
            kind: PrimitiveKind::Decimal128,
            precision: 18,
            scale: 1,
        };
        assert!(matches!(
            literal_to_key(&lit, &b2).unwrap(),
            KeyConvert::Inexact
        ));
    }
}
