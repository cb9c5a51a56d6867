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
//! Shared helpers for runtime-filter integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Schema};

use quartzite::common::ids::{FilterId, SlotId};
use quartzite::common::types::PrimitiveKind;
use quartzite::exec::chunk::{Chunk, field_with_slot_id};
use quartzite::exec::runtime_filter::{ColumnBinding, FilterKind, WrapperParams};
use quartzite::exec::scan::SlotDesc;
use quartzite::runtime::instance::{BuildClass, FilterDesc, QueryOptions, TargetClass};

pub fn int32_chunk(slot: SlotId, values: &[Option<i32>]) -> Chunk {
    let field = field_with_slot_id("k", DataType::Int32, true, slot);
    let array: ArrayRef = Arc::new(Int32Array::from(values.to_vec()));
    let batch = RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![array]).unwrap();
    Chunk::new(batch)
}

pub fn int64_chunk(slot: SlotId, values: &[Option<i64>]) -> Chunk {
    let field = field_with_slot_id("k", DataType::Int64, true, slot);
    let array: ArrayRef = Arc::new(Int64Array::from(values.to_vec()));
    let batch = RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![array]).unwrap();
    Chunk::new(batch)
}

pub fn string_chunk(slot: SlotId, values: &[Option<&str>]) -> Chunk {
    let field = field_with_slot_id("s", DataType::Utf8, true, slot);
    let array: ArrayRef = Arc::new(StringArray::from(values.to_vec()));
    let batch = RecordBatch::try_new(Arc::new(Schema::new(vec![field])), vec![array]).unwrap();
    Chunk::new(batch)
}

pub fn int32_array(values: &[Option<i32>]) -> ArrayRef {
    Arc::new(Int32Array::from(values.to_vec()))
}

pub fn int64_array(values: &[Option<i64>]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn filter_desc(
    filter_id: i32,
    kind: FilterKind,
    column_kind: PrimitiveKind,
    probe_slot: u32,
) -> FilterDesc {
    FilterDesc {
        filter_id: FilterId::new(filter_id),
        kind,
        column: ColumnBinding::new(column_kind),
        probe_slot: SlotId::new(probe_slot),
        build_class: BuildClass::Broadcast,
        target_class: TargetClass::Local,
        params: WrapperParams::default(),
    }
}

pub fn shuffle_desc(
    filter_id: i32,
    kind: FilterKind,
    column_kind: PrimitiveKind,
    probe_slot: u32,
    producer_count: usize,
) -> FilterDesc {
    FilterDesc {
        build_class: BuildClass::Shuffle { producer_count },
        target_class: TargetClass::Both,
        ..filter_desc(filter_id, kind, column_kind, probe_slot)
    }
}

pub fn wait_options(wait_ms: u64) -> QueryOptions {
    QueryOptions {
        wait_ms,
        ..QueryOptions::default()
    }
}

pub fn key_slot(slot: u32, kind: PrimitiveKind) -> SlotDesc {
    SlotDesc {
        slot: SlotId::new(slot),
        name: format!("c{slot}"),
        binding: ColumnBinding::new(kind),
        nullable: true,
        is_key: true,
    }
}

pub fn chunk_values_i32(chunk: &Chunk, slot: SlotId) -> Vec<i32> {
    let array = chunk.column_by_slot_id(slot).unwrap();
    let array = array.as_any().downcast_ref::<Int32Array>().unwrap();
    (0..array.len())
        .filter(|&i| !arrow::array::Array::is_null(array, i))
        .map(|i| array.value(i))
        .collect()
}
