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
//! Columnar batch wrapper used by filter build and apply paths.
//!
//! Responsibilities:
//! - Wraps an Arrow `RecordBatch` with a slot-id to column-index map so
//!   operators address columns by plan slot rather than position.
//!
//! Key exported interfaces:
//! - Types: `Chunk`.
//! - Functions: `field_with_slot_id`.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::common::ids::SlotId;

/// Schema field metadata key carrying the plan slot id.
pub const FIELD_META_SLOT_ID: &str = "quartzite.slot_id";

/// A batch of rows flowing between operators.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub batch: RecordBatch,
    slot_id_to_index: Arc<HashMap<SlotId, usize>>,
}

impl Chunk {
    pub fn try_new(batch: RecordBatch) -> Result<Self, String> {
        let slot_id_to_index = slot_id_to_index_from_schema(batch.schema().as_ref())?;
        Ok(Self {
            batch,
            slot_id_to_index: Arc::new(slot_id_to_index),
        })
    }

    pub fn new(batch: RecordBatch) -> Self {
        match Self::try_new(batch) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn slot_id_to_index(&self) -> &HashMap<SlotId, usize> {
        &self.slot_id_to_index
    }

    pub fn column_by_slot_id(&self, slot_id: SlotId) -> Result<ArrayRef, String> {
        let idx = self
            .slot_id_to_index
            .get(&slot_id)
            .copied()
            .ok_or_else(|| {
                format!(
                    "slot id {} not found in chunk (num_columns={})",
                    slot_id,
                    self.batch.num_columns()
                )
            })?;
        self.batch
            .columns()
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("slot id {} mapped to invalid index {}", slot_id, idx))
    }

    pub fn len(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        self.batch.columns()
    }
}

/// Build a schema field tagged with its plan slot id.
pub fn field_with_slot_id(name: &str, data_type: DataType, nullable: bool, slot_id: SlotId) -> Field {
    let mut metadata = HashMap::new();
    metadata.insert(FIELD_META_SLOT_ID.to_string(), slot_id.to_string());
    Field::new(name, data_type, nullable).with_metadata(metadata)
}

fn field_slot_id(field: &Field) -> Result<Option<SlotId>, String> {
    let Some(raw) = field.metadata().get(FIELD_META_SLOT_ID) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u32>()
        .map_err(|e| format!("invalid slot id metadata '{}' on field {}: {}", raw, field.name(), e))?;
    Ok(Some(SlotId::new(parsed)))
}

fn slot_id_to_index_from_schema(schema: &Schema) -> Result<HashMap<SlotId, usize>, String> {
    let mut map = HashMap::new();
    for (idx, f) in schema.fields().iter().enumerate() {
        let slot_id = field_slot_id(f.as_ref())?.ok_or_else(|| {
            format!(
                "missing {} in chunk schema field at index {} (name={})",
                FIELD_META_SLOT_ID,
                idx,
                f.name()
            )
        })?;
        if map.insert(slot_id, idx).is_some() {
            // Duplicate slot ids would make column lookup ambiguous.
            return Err(format!("duplicate slot id {} in chunk schema", slot_id));
        }
    }
    Ok(map)
}
