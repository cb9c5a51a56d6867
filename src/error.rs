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
use std::time::Duration;

use thiserror::Error;

/// Error taxonomy of the runtime-filter subsystem.
///
/// Most of these never propagate to the query: a filter that cannot be
/// built, shipped, or decoded degrades to ignored and the scan runs
/// unfiltered. Only `Cancelled` (and errors the caller itself raises) abort
/// execution.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Unknown kind, incompatible column type, or a non-positive cap.
    #[error("invalid filter config: {0}")]
    InvalidConfig(String),

    /// Bloom allocation denied by the per-query memory cap.
    #[error("filter resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Consumer wait exceeded its budget; terminal for the filter.
    #[error("runtime filter wait timed out after {0:?}")]
    Timeout(Duration),

    /// Truncated or malformed wire payload.
    #[error("filter payload malformed: {0}")]
    Serialization(String),

    /// Transport gave up after bounded retries.
    #[error("filter transport failed: {0}")]
    Transport(String),

    #[error("query cancelled")]
    Cancelled,

    /// A literal cannot be represented for the bound column type.
    #[error("literal not representable: {0}")]
    DataQuality(String),
}

impl FilterError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        FilterError::InvalidConfig(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        FilterError::Serialization(msg.into())
    }

    /// Whether the subsystem may swallow this error by degrading the filter
    /// instead of failing the query.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, FilterError::Cancelled)
    }
}
