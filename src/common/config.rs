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
use crate::common::app_config::config as app_config;

pub(crate) fn runtime_filter_wait_ms_default() -> u64 {
    app_config().runtime_filter.wait_ms_default
}

pub(crate) fn runtime_filter_wait_ms_floor() -> u64 {
    app_config().runtime_filter.wait_ms_floor
}

pub(crate) fn runtime_filter_max_in_count() -> usize {
    app_config().runtime_filter.max_in_count
}

pub(crate) fn bloom_filter_fpp() -> f64 {
    app_config().runtime_filter.bloom_fpp
}

pub(crate) fn bloom_filter_min_bits() -> u32 {
    app_config().runtime_filter.bloom_min_bits
}

pub(crate) fn bloom_filter_max_bits() -> u32 {
    app_config().runtime_filter.bloom_max_bits
}

pub(crate) fn bloom_filter_expected_entries() -> u64 {
    app_config().runtime_filter.bloom_expected_entries
}

pub(crate) fn bloom_memory_cap_bytes() -> usize {
    app_config().runtime_filter.bloom_memory_cap_bytes
}

pub(crate) fn max_pushdown_conditions_per_column() -> usize {
    app_config().runtime_filter.max_pushdown_conditions_per_column
}

pub(crate) fn transport_retries() -> usize {
    app_config().runtime_filter.transport_retries
}

pub(crate) fn runtime_filter_max_serialized_bytes() -> usize {
    app_config().runtime_filter.max_serialized_bytes
}
