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
//! Chunk-level runtime-filter application.
//!
//! Responsibilities:
//! - Probes a filter wrapper against one chunk column and drops rows that
//!   can never join.
//!
//! Key exported interfaces:
//! - Functions: `probe_mask`, `filter_chunk_with_array`.

use arrow::array::{ArrayRef, BooleanArray};
use arrow::compute::filter_record_batch;

use crate::exec::chunk::Chunk;

use super::values::ColumnView;
use super::wrapper::FilterWrapper;

/// AND the filter's probe results into `keep`.
pub fn probe_mask(
    filter: &FilterWrapper,
    array: &ArrayRef,
    keep: &mut [bool],
) -> Result<(), String> {
    if filter.is_disabled() {
        return Ok(());
    }
    let view = ColumnView::try_new(array, filter.column())?;
    if view.len() != keep.len() {
        return Err("runtime filter selection size mismatch".to_string());
    }
    for (row, slot) in keep.iter_mut().enumerate() {
        if !*slot {
            continue;
        }
        let key = view.key_at(row)?;
        if !filter.probe_key(key.as_ref())? {
            *slot = false;
        }
    }
    Ok(())
}

/// Filter one chunk by probing `array` (the evaluated probe expression).
/// Returns `None` when every row is dropped.
pub fn filter_chunk_with_array(
    filter: &FilterWrapper,
    array: &ArrayRef,
    chunk: Chunk,
) -> Result<Option<Chunk>, String> {
    if filter.is_disabled() || chunk.is_empty() {
        return Ok(Some(chunk));
    }
    if array.len() != chunk.len() {
        return Err("runtime filter array length mismatch".to_string());
    }
    let mut keep = vec![true; chunk.len()];
    probe_mask(filter, array, &mut keep)?;
    if keep.iter().all(|v| *v) {
        return Ok(Some(chunk));
    }
    if keep.iter().all(|v| !*v) {
        return Ok(None);
    }
    let mask = BooleanArray::from(keep);
    let filtered_batch = filter_record_batch(&chunk.batch, &mask).map_err(|e| e.to_string())?;
    Ok(Some(Chunk::new(filtered_batch)))
}
