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
//! Runtime-filter payloads and shared value plumbing.
//!
//! Responsibilities:
//! - Re-exports the five filter payload kinds, the wrapper container, the
//!   wire codec, and chunk apply helpers.
//!
//! Key exported interfaces:
//! - Types: `FilterWrapper`, `FilterKind`, `ColumnBinding`.

use crate::common::types::PrimitiveKind;

pub mod apply;
mod bitmap;
mod bloom;
pub mod codec;
mod in_filter;
mod min_max;
pub mod values;
pub mod wrapper;

pub use bitmap::BitmapFilter;
pub use bloom::BloomFilter;
pub use in_filter::InFilter;
pub use min_max::MinMaxFilter;
pub use wrapper::{BloomBudget, BloomParams, FilterKind, FilterPayload, FilterWrapper, WrapperParams};

/// Column binding a filter is constructed against. Immutable for the
/// filter's lifetime; precision/scale only matter for decimal kinds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnBinding {
    pub kind: PrimitiveKind,
    pub precision: u8,
    pub scale: i8,
}

impl ColumnBinding {
    pub fn new(kind: PrimitiveKind) -> Self {
        Self {
            kind,
            precision: 0,
            scale: 0,
        }
    }

    pub fn decimal(kind: PrimitiveKind, precision: u8, scale: i8) -> Self {
        Self {
            kind,
            precision,
            scale,
        }
    }
}
