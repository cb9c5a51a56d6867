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
//! Runtime-filter wire codec.
//!
//! Responsibilities:
//! - Encodes and decodes filter payloads for merge and publish RPCs with
//!   strict bounds and tag validation.
//! - Round-trips are semantically equivalent (same probe results), not
//!   necessarily byte-identical.
//!
//! Key exported interfaces:
//! - Functions: `encode_filter`, `decode_filter`, `peek_filter_id`,
//!   `peek_filter_kind`.
//!
//! Message layout: filter id (u32 LE), kind tag (u8), column-type tag (u8),
//! flags (u16 LE), then the kind-specific payload. In-or-bloom payloads are
//! prefixed with a one-byte discriminator for the not-yet-promoted and
//! promoted forms.

use crate::common::ids::FilterId;
use crate::common::types::PrimitiveKind;

use super::ColumnBinding;
use super::bitmap::BitmapFilter;
use super::bloom::BloomFilter;
use super::in_filter::InFilter;
use super::min_max::MinMaxFilter;
use super::values::FilterKey;
use super::wrapper::{FilterKind, FilterPayload, FilterWrapper, WrapperParams};

const FLAG_IGNORED: u16 = 1 << 0;
const FLAG_ALWAYS_TRUE: u16 = 1 << 1;
const FLAG_NOT_IN: u16 = 1 << 2;
const FLAG_NULL_CONTAINED: u16 = 1 << 3;
const FLAG_EMPTY_BUILD: u16 = 1 << 4;

const IN_OR_BLOOM_STILL_IN: u8 = 0;
const IN_OR_BLOOM_PROMOTED: u8 = 1;

pub(crate) fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8, String> {
    let Some(&byte) = data.get(*offset) else {
        return Err("runtime filter data truncated".to_string());
    };
    *offset += 1;
    Ok(byte)
}

pub(crate) fn read_u16_le(data: &[u8], offset: &mut usize) -> Result<u16, String> {
    let bytes = read_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32_le(data: &[u8], offset: &mut usize) -> Result<u32, String> {
    let bytes = read_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_u64_le(data: &[u8], offset: &mut usize) -> Result<u64, String> {
    let bytes = read_slice(data, offset, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_slice<'a>(
    data: &'a [u8],
    offset: &mut usize,
    len: usize,
) -> Result<&'a [u8], String> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| "runtime filter data length overflow".to_string())?;
    if data.len() < end {
        return Err("runtime filter data truncated".to_string());
    }
    let slice = &data[*offset..end];
    *offset = end;
    Ok(slice)
}

/// Read the filter id without decoding the payload.
pub fn peek_filter_id(data: &[u8]) -> Result<FilterId, String> {
    let mut offset = 0usize;
    let raw = read_u32_le(data, &mut offset)?;
    Ok(FilterId::new(raw as i32))
}

/// Read the kind tag without decoding the payload.
pub fn peek_filter_kind(data: &[u8]) -> Result<FilterKind, String> {
    let mut offset = 4usize;
    let tag = read_u8(data, &mut offset)?;
    FilterKind::from_wire_tag(tag)
}

pub fn encode_filter(filter_id: FilterId, filter: &FilterWrapper) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(filter_id.as_i32() as u32).to_le_bytes());
    buf.push(filter.kind().wire_tag());
    buf.push(filter.column().kind.wire_tag());

    let mut flags = 0u16;
    if filter.ignored() {
        flags |= FLAG_IGNORED;
    }
    if filter.always_true() {
        flags |= FLAG_ALWAYS_TRUE;
    }
    if filter.params().bitmap_not_in {
        flags |= FLAG_NOT_IN;
    }
    if filter.contains_null() {
        flags |= FLAG_NULL_CONTAINED;
    }
    if filter.is_empty_build() {
        flags |= FLAG_EMPTY_BUILD;
    }
    buf.extend_from_slice(&flags.to_le_bytes());

    match (filter.kind(), filter.payload()) {
        (FilterKind::In, FilterPayload::In(in_filter)) => encode_in_values(in_filter, &mut buf),
        (FilterKind::MinMax, FilterPayload::MinMax(min_max)) => {
            encode_min_max(min_max, &mut buf);
        }
        (FilterKind::Bloom, FilterPayload::Bloom(bloom)) => encode_bloom(bloom, &mut buf),
        (FilterKind::InOrBloom, FilterPayload::In(in_filter)) => {
            buf.push(IN_OR_BLOOM_STILL_IN);
            encode_in_values(in_filter, &mut buf);
        }
        (FilterKind::InOrBloom, FilterPayload::Bloom(bloom)) => {
            buf.push(IN_OR_BLOOM_PROMOTED);
            encode_bloom(bloom, &mut buf);
        }
        (FilterKind::Bitmap, FilterPayload::Bitmap(bitmap)) => {
            let bytes = bitmap.serialize_set()?;
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&bytes);
        }
        (kind, _) => {
            return Err(format!("runtime filter kind {kind} has mismatched payload"));
        }
    }
    Ok(buf)
}

/// Decode a wire payload into a consumer-side wrapper.
///
/// `column` and `params` come from the consumer's registered descriptor;
/// the wire column-type tag must agree with the binding or the payload is
/// rejected as a serialization mismatch.
pub fn decode_filter(
    data: &[u8],
    column: ColumnBinding,
    params: WrapperParams,
) -> Result<(FilterId, FilterWrapper), String> {
    let mut offset = 0usize;
    let filter_id = FilterId::new(read_u32_le(data, &mut offset)? as i32);
    let kind = FilterKind::from_wire_tag(read_u8(data, &mut offset)?)?;
    let column_tag = read_u8(data, &mut offset)?;
    let wire_kind = PrimitiveKind::from_wire_tag(column_tag)?;
    if wire_kind != column.kind {
        return Err(format!(
            "runtime filter column type mismatch: wire={} bound={}",
            wire_kind, column.kind
        ));
    }
    let flags = read_u16_le(data, &mut offset)?;
    let contains_null = flags & FLAG_NULL_CONTAINED != 0;
    let not_in = flags & FLAG_NOT_IN != 0;

    let class = column.kind.storage_class();
    let payload = match kind {
        FilterKind::In => FilterPayload::In(decode_in_values(data, &mut offset, class, contains_null)?),
        FilterKind::MinMax => {
            FilterPayload::MinMax(decode_min_max(data, &mut offset, class, contains_null)?)
        }
        FilterKind::Bloom => FilterPayload::Bloom(decode_bloom(data, &mut offset, contains_null)?),
        FilterKind::InOrBloom => match read_u8(data, &mut offset)? {
            IN_OR_BLOOM_STILL_IN => {
                FilterPayload::In(decode_in_values(data, &mut offset, class, contains_null)?)
            }
            IN_OR_BLOOM_PROMOTED => {
                FilterPayload::Bloom(decode_bloom(data, &mut offset, contains_null)?)
            }
            other => {
                return Err(format!("unknown in-or-bloom discriminator: {other}"));
            }
        },
        FilterKind::Bitmap => {
            let len = read_u32_le(data, &mut offset)? as usize;
            let bytes = read_slice(data, &mut offset, len)?;
            FilterPayload::Bitmap(BitmapFilter::deserialize_set(not_in, contains_null, bytes)?)
        }
    };
    if offset != data.len() {
        return Err(format!(
            "runtime filter data has {} trailing bytes",
            data.len() - offset
        ));
    }

    let row_count = if flags & FLAG_EMPTY_BUILD != 0 {
        0
    } else {
        match &payload {
            FilterPayload::In(f) => (f.len() as u64).max(1),
            FilterPayload::Bitmap(f) => f.len().max(1),
            _ => 1,
        }
    };
    let mut params = params;
    params.bitmap_not_in = not_in;
    let wrapper = FilterWrapper::from_decoded(
        kind,
        column,
        params,
        payload,
        flags & FLAG_ALWAYS_TRUE != 0,
        flags & FLAG_IGNORED != 0,
        row_count,
    );
    Ok((filter_id, wrapper))
}

fn encode_in_values(in_filter: &InFilter, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(in_filter.len() as u32).to_le_bytes());
    for key in in_filter.values() {
        key.with_encoded(|bytes| {
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        });
    }
}

fn decode_in_values(
    data: &[u8],
    offset: &mut usize,
    class: crate::common::types::StorageClass,
    contains_null: bool,
) -> Result<InFilter, String> {
    let count = read_u32_le(data, offset)? as usize;
    let mut in_filter = InFilter::new();
    for _ in 0..count {
        let len = read_u32_le(data, offset)? as usize;
        let bytes = read_slice(data, offset, len)?;
        in_filter.insert(FilterKey::decode(class, bytes)?);
    }
    in_filter.set_contains_null(contains_null);
    Ok(in_filter)
}

fn encode_min_max(min_max: &MinMaxFilter, buf: &mut Vec<u8>) {
    for endpoint in [min_max.min(), min_max.max()] {
        match endpoint {
            Some(key) => {
                buf.push(1);
                key.with_encoded(|bytes| {
                    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    buf.extend_from_slice(bytes);
                });
            }
            None => buf.push(0),
        }
    }
}

fn decode_min_max(
    data: &[u8],
    offset: &mut usize,
    class: crate::common::types::StorageClass,
    contains_null: bool,
) -> Result<MinMaxFilter, String> {
    let mut endpoints = [None, None];
    for slot in endpoints.iter_mut() {
        let present = read_u8(data, offset)?;
        if present == 1 {
            let len = read_u32_le(data, offset)? as usize;
            let bytes = read_slice(data, offset, len)?;
            *slot = Some(FilterKey::decode(class, bytes)?);
        } else if present != 0 {
            return Err(format!("invalid min-max endpoint marker: {present}"));
        }
    }
    let [min, max] = endpoints;
    let mut filter = MinMaxFilter::with_bounds(min, max);
    filter.set_contains_null(contains_null);
    Ok(filter)
}

fn encode_bloom(bloom: &BloomFilter, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&bloom.num_bits().to_le_bytes());
    buf.push(bloom.num_hashes());
    for word in bloom.words() {
        buf.extend_from_slice(&word.to_le_bytes());
    }
}

fn decode_bloom(data: &[u8], offset: &mut usize, contains_null: bool) -> Result<BloomFilter, String> {
    let num_bits = read_u32_le(data, offset)?;
    let num_hashes = read_u8(data, offset)?;
    if num_bits == 0 || num_bits % 64 != 0 {
        return Err(format!("invalid bloom filter bit size: {num_bits}"));
    }
    let num_words = (num_bits / 64) as usize;
    let mut words = Vec::with_capacity(num_words);
    for _ in 0..num_words {
        words.push(read_u64_le(data, offset)?);
    }
    BloomFilter::from_parts(num_bits, num_hashes, words, contains_null)
}

#[cfg(test)]
mod tests {
    use super::{decode_filter, encode_filter, peek_filter_id, peek_filter_kind};
    use crate::common::ids::FilterId;
    use crate::common::types::PrimitiveKind;
    use crate::exec::runtime_filter::values::FilterKey;
    use crate::exec::runtime_filter::wrapper::{FilterKind, FilterWrapper, WrapperParams};
    use crate::exec::runtime_filter::ColumnBinding;

    fn binding(kind: PrimitiveKind) -> ColumnBinding {
        ColumnBinding {
            kind,
            precision: 0,
            scale: 0,
        }
    }

    fn roundtrip(filter: &FilterWrapper, kind: PrimitiveKind) -> FilterWrapper {
        let encoded = encode_filter(FilterId::new(7), filter).unwrap();
        assert_eq!(peek_filter_id(&encoded).unwrap(), FilterId::new(7));
        assert_eq!(peek_filter_kind(&encoded).unwrap(), filter.kind());
        let (id, decoded) =
            decode_filter(&encoded, binding(kind), WrapperParams::default()).unwrap();
        assert_eq!(id, FilterId::new(7));
        decoded
    }

    #[test]
    fn in_filter_roundtrip_preserves_probe_results() {
        let mut filter = FilterWrapper::new(
            FilterKind::In,
            binding(PrimitiveKind::Int64),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        for v in [i64::MIN, -5, 0, 5, i64::MAX] {
            filter.insert_key(Some(FilterKey::I64(v))).unwrap();
        }
        let decoded = roundtrip(&filter, PrimitiveKind::Int64);
        for v in [i64::MIN, -5, 0, 5, i64::MAX, 17] {
            let key = FilterKey::I64(v);
            assert_eq!(
                filter.probe_key(Some(&key)).unwrap(),
                decoded.probe_key(Some(&key)).unwrap()
            );
        }
    }

    #[test]
    fn string_min_max_roundtrip() {
        let mut filter = FilterWrapper::new(
            FilterKind::MinMax,
            binding(PrimitiveKind::String),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        for s in [&b"delta"[..], b"alpha", b"omega"] {
            filter.insert_key(Some(FilterKey::Bytes(s.to_vec()))).unwrap();
        }
        let decoded = roundtrip(&filter, PrimitiveKind::String);
        for probe in [&b"beta"[..], b"aardvark", b"zulu", b"omega"] {
            let key = FilterKey::Bytes(probe.to_vec());
            assert_eq!(
                filter.probe_key(Some(&key)).unwrap(),
                decoded.probe_key(Some(&key)).unwrap()
            );
        }
    }

    #[test]
    fn promoted_in_or_bloom_roundtrips_as_bloom() {
        let params = WrapperParams {
            max_in_count: 2,
            ..WrapperParams::default()
        };
        let mut filter = FilterWrapper::new(
            FilterKind::InOrBloom,
            binding(PrimitiveKind::Int32),
            params,
            None,
        )
        .unwrap();
        for v in 1..=5i64 {
            filter.insert_key(Some(FilterKey::I64(v))).unwrap();
        }
        let decoded = roundtrip(&filter, PrimitiveKind::Int32);
        for v in 1..=5i64 {
            assert!(decoded.probe_key(Some(&FilterKey::I64(v))).unwrap());
        }
    }

    #[test]
    fn bitmap_roundtrip_keeps_polarity() {
        let params = WrapperParams {
            bitmap_not_in: true,
            ..WrapperParams::default()
        };
        let mut filter = FilterWrapper::new(
            FilterKind::Bitmap,
            binding(PrimitiveKind::Int64),
            params,
            None,
        )
        .unwrap();
        filter.insert_key(Some(FilterKey::I64(99))).unwrap();
        let decoded = roundtrip(&filter, PrimitiveKind::Int64);
        assert!(!decoded.probe_key(Some(&FilterKey::I64(99))).unwrap());
        assert!(decoded.probe_key(Some(&FilterKey::I64(100))).unwrap());
    }

    #[test]
    fn column_type_mismatch_is_rejected() {
        let filter = FilterWrapper::new(
            FilterKind::In,
            binding(PrimitiveKind::Int64),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        let encoded = encode_filter(FilterId::new(1), &filter).unwrap();
        let err = decode_filter(&encoded, binding(PrimitiveKind::Int32), WrapperParams::default());
        assert!(err.is_err());
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut filter = FilterWrapper::new(
            FilterKind::In,
            binding(PrimitiveKind::Int64),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        filter.insert_key(Some(FilterKey::I64(1))).unwrap();
        let encoded = encode_filter(FilterId::new(1), &filter).unwrap();
        let err = decode_filter(
            &encoded[..encoded.len() - 1],
            binding(PrimitiveKind::Int64),
            WrapperParams::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn empty_build_flag_survives_roundtrip() {
        let filter = FilterWrapper::new(
            FilterKind::In,
            binding(PrimitiveKind::Int32),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        let decoded = roundtrip(&filter, PrimitiveKind::Int32);
        assert!(decoded.is_empty_build());
        assert!(!decoded.probe_key(Some(&FilterKey::I64(1))).unwrap());
    }
}
