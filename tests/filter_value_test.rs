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
//! Property tests for filter payload semantics: merge algebra, round-trip
//! equivalence, degradation, and the no-false-negative guarantee.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quartzite::common::ids::FilterId;
use quartzite::common::types::PrimitiveKind;
use quartzite::exec::runtime_filter::codec::{decode_filter, encode_filter};
use quartzite::exec::runtime_filter::values::FilterKey;
use quartzite::exec::runtime_filter::{ColumnBinding, FilterKind, FilterWrapper, WrapperParams};

fn binding(kind: PrimitiveKind) -> ColumnBinding {
    ColumnBinding::new(kind)
}

fn new_filter(kind: FilterKind, column_kind: PrimitiveKind, max_in: usize) -> FilterWrapper {
    FilterWrapper::new(
        kind,
        binding(column_kind),
        WrapperParams {
            max_in_count: max_in,
            ..WrapperParams::default()
        },
        None,
    )
    .unwrap()
}

fn random_filter(rng: &mut StdRng, kind: FilterKind, values: &[i64]) -> FilterWrapper {
    let mut filter = new_filter(kind, PrimitiveKind::Int64, 1 + rng.gen_range(0..32));
    for &v in values {
        filter.insert_key(Some(FilterKey::I64(v))).unwrap();
    }
    filter
}

fn probes_equal(a: &FilterWrapper, b: &FilterWrapper, probes: &[i64]) -> bool {
    probes.iter().all(|&v| {
        let key = FilterKey::I64(v);
        a.probe_key(Some(&key)).unwrap() == b.probe_key(Some(&key)).unwrap()
    })
}

#[test]
fn merge_is_commutative_associative_idempotent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let probes: Vec<i64> = (-50..200).collect();
    for kind in [
        FilterKind::In,
        FilterKind::MinMax,
        FilterKind::Bloom,
        FilterKind::InOrBloom,
        FilterKind::Bitmap,
    ] {
        for _ in 0..20 {
            let values_a: Vec<i64> = (0..rng.gen_range(0..20)).map(|_| rng.gen_range(0..100)).collect();
            let values_b: Vec<i64> = (0..rng.gen_range(0..20)).map(|_| rng.gen_range(0..100)).collect();
            let values_c: Vec<i64> = (0..rng.gen_range(0..20)).map(|_| rng.gen_range(0..100)).collect();
            let make = |values: &[i64]| {
                let mut f = new_filter(kind, PrimitiveKind::Int64, 16);
                for &v in values {
                    f.insert_key(Some(FilterKey::I64(v))).unwrap();
                }
                f
            };

            // Commutativity: A+B == B+A.
            let mut ab = make(&values_a);
            ab.merge_from(&make(&values_b)).unwrap();
            let mut ba = make(&values_b);
            ba.merge_from(&make(&values_a)).unwrap();
            assert!(probes_equal(&ab, &ba, &probes), "commutativity failed for {kind}");

            // Associativity: (A+B)+C == A+(B+C).
            let mut left = make(&values_a);
            left.merge_from(&make(&values_b)).unwrap();
            left.merge_from(&make(&values_c)).unwrap();
            let mut bc = make(&values_b);
            bc.merge_from(&make(&values_c)).unwrap();
            let mut right = make(&values_a);
            right.merge_from(&bc).unwrap();
            assert!(probes_equal(&left, &right, &probes), "associativity failed for {kind}");

            // Idempotence: A+A == A.
            let mut aa = make(&values_a);
            aa.merge_from(&make(&values_a)).unwrap();
            assert!(
                probes_equal(&aa, &make(&values_a), &probes),
                "idempotence failed for {kind}"
            );
        }
    }
}

#[test]
fn no_false_negatives_across_kinds() {
    let mut rng = StdRng::seed_from_u64(42);
    for kind in [
        FilterKind::In,
        FilterKind::MinMax,
        FilterKind::Bloom,
        FilterKind::InOrBloom,
        FilterKind::Bitmap,
    ] {
        let values: Vec<i64> = (0..500).map(|_| rng.gen_range(-10_000..10_000)).collect();
        let filter = random_filter(&mut rng, kind, &values);
        for &v in &values {
            assert!(
                filter.probe_key(Some(&FilterKey::I64(v))).unwrap(),
                "false negative in {kind} for {v}"
            );
        }
    }
}

#[test]
fn serialize_roundtrip_preserves_probe_semantics() {
    let mut rng = StdRng::seed_from_u64(7);
    let probes: Vec<i64> = (0..2_000).map(|_| rng.gen_range(-10_000..10_000)).collect();
    for kind in [
        FilterKind::In,
        FilterKind::MinMax,
        FilterKind::Bloom,
        FilterKind::InOrBloom,
        FilterKind::Bitmap,
    ] {
        let values: Vec<i64> = (0..200).map(|_| rng.gen_range(-10_000..10_000)).collect();
        let filter = random_filter(&mut rng, kind, &values);
        let data = encode_filter(FilterId::new(3), &filter).unwrap();
        let (_, decoded) = decode_filter(
            &data,
            binding(PrimitiveKind::Int64),
            WrapperParams::default(),
        )
        .unwrap();
        assert!(
            probes_equal(&filter, &decoded, &probes),
            "roundtrip changed probe semantics for {kind}"
        );
    }
}

#[test]
fn in_or_bloom_keeps_set_until_capacity_then_promotes() {
    let mut filter = new_filter(FilterKind::InOrBloom, PrimitiveKind::Int32, 4);
    for v in [1i64, 2, 3, 4] {
        filter.insert_key(Some(FilterKey::I64(v))).unwrap();
    }
    assert!(matches!(
        filter.payload(),
        quartzite::exec::runtime_filter::FilterPayload::In(_)
    ));
    // Probe stays exact while the set form holds.
    assert!(!filter.probe_key(Some(&FilterKey::I64(9))).unwrap());

    filter.insert_key(Some(FilterKey::I64(5))).unwrap();
    assert!(matches!(
        filter.payload(),
        quartzite::exec::runtime_filter::FilterPayload::Bloom(_)
    ));
    for v in 1..=5i64 {
        assert!(filter.probe_key(Some(&FilterKey::I64(v))).unwrap());
    }
    // Configured false-positive target is 5%; allow slack on a small run.
    let misses = (0..1_000i64)
        .filter(|v| filter.probe_key(Some(&FilterKey::I64(1_000 + v))).unwrap())
        .count();
    assert!(misses < 100, "false positive rate too high: {misses}/1000");
}

#[test]
fn merge_rejects_mismatched_metadata() {
    let mut int_filter = new_filter(FilterKind::In, PrimitiveKind::Int64, 16);
    let string_filter = new_filter(FilterKind::In, PrimitiveKind::String, 16);
    assert!(int_filter.merge_from(&string_filter).is_err());

    let minmax = new_filter(FilterKind::MinMax, PrimitiveKind::Int64, 16);
    assert!(int_filter.merge_from(&minmax).is_err());
}
