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
use std::fmt;

use arrow::datatypes::{DataType, TimeUnit};

use crate::common::largeint;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct UniqueId {
    pub hi: i64,
    pub lo: i64,
}

impl UniqueId {
    pub const fn new(hi: i64, lo: i64) -> Self {
        Self { hi, lo }
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hi = self.hi as u64;
        let lo = self.lo as u64;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (hi >> 32) as u32,
            (hi >> 16) as u16,
            hi as u16,
            (lo >> 48) as u16,
            lo & 0x0000_FFFF_FFFF_FFFF
        )
    }
}

/// Canonical value class a primitive kind maps to inside filter payloads.
///
/// Every bound column type stores and probes through exactly one of these
/// classes; the mapping is fixed at filter creation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageClass {
    /// Integral values widened to i64: ints up to 64 bits, bool, dates as
    /// day numbers, datetimes as microseconds.
    I64,
    /// 128-bit integrals: largeint and decimals rescaled to the bound scale.
    I128,
    /// IEEE-754 doubles carried as raw bits; NaN is never stored.
    F64,
    /// Raw byte strings compared lexicographically.
    Bytes,
}

/// Closed set of primitive column types a runtime filter can bind to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Float,
    Double,
    Decimal32,
    Decimal64,
    Decimal128,
    DecimalLegacy,
    Date,
    DateTime,
    DateV2,
    DateTimeV2,
    Time,
    Char,
    Varchar,
    String,
    Hll,
}

impl PrimitiveKind {
    pub fn wire_tag(self) -> u8 {
        match self {
            PrimitiveKind::Bool => 0,
            PrimitiveKind::Int8 => 1,
            PrimitiveKind::Int16 => 2,
            PrimitiveKind::Int32 => 3,
            PrimitiveKind::Int64 => 4,
            PrimitiveKind::Int128 => 5,
            PrimitiveKind::Float => 6,
            PrimitiveKind::Double => 7,
            PrimitiveKind::Decimal32 => 8,
            PrimitiveKind::Decimal64 => 9,
            PrimitiveKind::Decimal128 => 10,
            PrimitiveKind::DecimalLegacy => 11,
            PrimitiveKind::Date => 12,
            PrimitiveKind::DateTime => 13,
            PrimitiveKind::DateV2 => 14,
            PrimitiveKind::DateTimeV2 => 15,
            PrimitiveKind::Time => 16,
            PrimitiveKind::Char => 17,
            PrimitiveKind::Varchar => 18,
            PrimitiveKind::String => 19,
            PrimitiveKind::Hll => 20,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self, String> {
        Ok(match tag {
            0 => PrimitiveKind::Bool,
            1 => PrimitiveKind::Int8,
            2 => PrimitiveKind::Int16,
            3 => PrimitiveKind::Int32,
            4 => PrimitiveKind::Int64,
            5 => PrimitiveKind::Int128,
            6 => PrimitiveKind::Float,
            7 => PrimitiveKind::Double,
            8 => PrimitiveKind::Decimal32,
            9 => PrimitiveKind::Decimal64,
            10 => PrimitiveKind::Decimal128,
            11 => PrimitiveKind::DecimalLegacy,
            12 => PrimitiveKind::Date,
            13 => PrimitiveKind::DateTime,
            14 => PrimitiveKind::DateV2,
            15 => PrimitiveKind::DateTimeV2,
            16 => PrimitiveKind::Time,
            17 => PrimitiveKind::Char,
            18 => PrimitiveKind::Varchar,
            19 => PrimitiveKind::String,
            20 => PrimitiveKind::Hll,
            other => return Err(format!("unknown primitive kind tag: {other}")),
        })
    }

    pub fn storage_class(self) -> StorageClass {
        match self {
            PrimitiveKind::Bool
            | PrimitiveKind::Int8
            | PrimitiveKind::Int16
            | PrimitiveKind::Int32
            | PrimitiveKind::Int64
            | PrimitiveKind::Date
            | PrimitiveKind::DateTime
            | PrimitiveKind::DateV2
            | PrimitiveKind::DateTimeV2 => StorageClass::I64,
            PrimitiveKind::Int128
            | PrimitiveKind::Decimal32
            | PrimitiveKind::Decimal64
            | PrimitiveKind::Decimal128
            | PrimitiveKind::DecimalLegacy => StorageClass::I128,
            PrimitiveKind::Float | PrimitiveKind::Double | PrimitiveKind::Time => StorageClass::F64,
            PrimitiveKind::Char
            | PrimitiveKind::Varchar
            | PrimitiveKind::String
            | PrimitiveKind::Hll => StorageClass::Bytes,
        }
    }

    /// Arrow representation the scan delivers for this kind. Legacy date and
    /// datetime columns are promoted to the v2 encodings on column binding.
    pub fn arrow_type(self, precision: u8, scale: i8) -> Result<DataType, String> {
        Ok(match self {
            PrimitiveKind::Bool => DataType::Boolean,
            PrimitiveKind::Int8 => DataType::Int8,
            PrimitiveKind::Int16 => DataType::Int16,
            PrimitiveKind::Int32 => DataType::Int32,
            PrimitiveKind::Int64 => DataType::Int64,
            PrimitiveKind::Int128 => DataType::FixedSizeBinary(largeint::LARGEINT_BYTE_WIDTH),
            PrimitiveKind::Float => DataType::Float32,
            PrimitiveKind::Double => DataType::Float64,
            PrimitiveKind::Decimal32
            | PrimitiveKind::Decimal64
            | PrimitiveKind::Decimal128
            | PrimitiveKind::DecimalLegacy => DataType::Decimal128(precision, scale),
            PrimitiveKind::Date | PrimitiveKind::DateV2 => DataType::Date32,
            PrimitiveKind::DateTime | PrimitiveKind::DateTimeV2 => {
                DataType::Timestamp(TimeUnit::Microsecond, None)
            }
            PrimitiveKind::Char | PrimitiveKind::Varchar | PrimitiveKind::String => DataType::Utf8,
            PrimitiveKind::Hll => DataType::Binary,
            PrimitiveKind::Time => {
                return Err("time is a literal-only kind and never binds a column".to_string());
            }
        })
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int8 | PrimitiveKind::Int16 | PrimitiveKind::Int32 | PrimitiveKind::Int64
        )
    }

    pub fn is_decimal(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Decimal32
                | PrimitiveKind::Decimal64
                | PrimitiveKind::Decimal128
                | PrimitiveKind::DecimalLegacy
        )
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Char | PrimitiveKind::Varchar | PrimitiveKind::String
        )
    }

    pub fn is_date_kind(self) -> bool {
        matches!(self, PrimitiveKind::Date | PrimitiveKind::DateV2)
    }

    pub fn is_datetime_kind(self) -> bool {
        matches!(self, PrimitiveKind::DateTime | PrimitiveKind::DateTimeV2)
    }

    /// Whether a value of `self` converts to `target` without loss.
    ///
    /// Drives predicate pushdown: a literal whose kind does not losslessly
    /// convert to the column kind forces the predicate back into the
    /// residual conjunct tree. Date-to-datetime promotion is lossless; the
    /// reverse truncates and is refused.
    pub fn lossless_cast_to(self, target: PrimitiveKind) -> bool {
        if self == target {
            return true;
        }
        match (self, target) {
            (PrimitiveKind::Int8, PrimitiveKind::Int16)
            | (PrimitiveKind::Int8, PrimitiveKind::Int32)
            | (PrimitiveKind::Int8, PrimitiveKind::Int64)
            | (PrimitiveKind::Int8, PrimitiveKind::Int128)
            | (PrimitiveKind::Int16, PrimitiveKind::Int32)
            | (PrimitiveKind::Int16, PrimitiveKind::Int64)
            | (PrimitiveKind::Int16, PrimitiveKind::Int128)
            | (PrimitiveKind::Int32, PrimitiveKind::Int64)
            | (PrimitiveKind::Int32, PrimitiveKind::Int128)
            | (PrimitiveKind::Int64, PrimitiveKind::Int128) => true,
            (PrimitiveKind::Float, PrimitiveKind::Double) => true,
            (a, b) if a.is_date_kind() && (b.is_date_kind() || b.is_datetime_kind()) => true,
            (a, b) if a.is_datetime_kind() && b.is_datetime_kind() => true,
            (a, b) if a.is_string() && b.is_string() => true,
            (PrimitiveKind::Decimal32, PrimitiveKind::Decimal64)
            | (PrimitiveKind::Decimal32, PrimitiveKind::Decimal128)
            | (PrimitiveKind::Decimal64, PrimitiveKind::Decimal128) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "int8",
            PrimitiveKind::Int16 => "int16",
            PrimitiveKind::Int32 => "int32",
            PrimitiveKind::Int64 => "int64",
            PrimitiveKind::Int128 => "int128",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Decimal32 => "decimal32",
            PrimitiveKind::Decimal64 => "decimal64",
            PrimitiveKind::Decimal128 => "decimal128",
            PrimitiveKind::DecimalLegacy => "decimalv2",
            PrimitiveKind::Date => "date",
            PrimitiveKind::DateTime => "datetime",
            PrimitiveKind::DateV2 => "datev2",
            PrimitiveKind::DateTimeV2 => "datetimev2",
            PrimitiveKind::Time => "time",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Varchar => "varchar",
            PrimitiveKind::String => "string",
            PrimitiveKind::Hll => "hll",
        };
        f.write_str(name)
    }
}

/// Map an arrow column type to the primitive kind a filter binds with.
pub fn primitive_kind_from_arrow(data_type: &DataType) -> Result<PrimitiveKind, String> {
    let kind = match data_type {
        DataType::Boolean => PrimitiveKind::Bool,
        DataType::Int8 => PrimitiveKind::Int8,
        DataType::Int16 => PrimitiveKind::Int16,
        DataType::Int32 => PrimitiveKind::Int32,
        DataType::Int64 => PrimitiveKind::Int64,
        DataType::FixedSizeBinary(width) if *width == largeint::LARGEINT_BYTE_WIDTH => {
            PrimitiveKind::Int128
        }
        DataType::Float32 => PrimitiveKind::Float,
        DataType::Float64 => PrimitiveKind::Double,
        DataType::Date32 => PrimitiveKind::DateV2,
        DataType::Timestamp(_, _) => PrimitiveKind::DateTimeV2,
        DataType::Utf8 => PrimitiveKind::String,
        DataType::Binary => PrimitiveKind::Hll,
        DataType::Decimal128(_, _) => PrimitiveKind::Decimal128,
        other => {
            return Err(format!("unsupported runtime filter column type: {:?}", other));
        }
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::{PrimitiveKind, UniqueId};

    #[test]
    fn wire_tag_roundtrip_covers_all_kinds() {
        for tag in 0u8..=20 {
            let kind = PrimitiveKind::from_wire_tag(tag).unwrap();
            assert_eq!(kind.wire_tag(), tag);
        }
        assert!(PrimitiveKind::from_wire_tag(21).is_err());
    }

    #[test]
    fn lossless_cast_rejects_datetime_truncation() {
        assert!(PrimitiveKind::Date.lossless_cast_to(PrimitiveKind::DateTimeV2));
        assert!(!PrimitiveKind::DateTimeV2.lossless_cast_to(PrimitiveKind::Date));
        assert!(!PrimitiveKind::Int64.lossless_cast_to(PrimitiveKind::Int32));
    }

    #[test]
    fn unique_id_formats_as_uuid() {
        let id = UniqueId::new(0x0011_2233_4455_6677, 0x0899_aabb_ccdd_eeff_u64 as i64);
        assert_eq!(id.to_string(), "00112233-4455-6677-0899-aabbccddeeff");
    }
}
