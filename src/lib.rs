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
//! Runtime-filter subsystem of the Quartzite columnar execution engine.
//!
//! During hash-join execution the build side summarizes the right-hand
//! relation into a compact predicate (in-set, min-max, bloom, in-or-bloom,
//! or bitmap), ships it through a local-build / merge / broadcast protocol,
//! and the scan operators feeding the probe side fold it into per-column
//! pushdown sinks plus a residual conjunct tree. Correctness holds whether
//! a filter is applied, partially applied, or skipped on deadline.

pub mod common;
pub mod error;
pub mod exec;
pub mod runtime;

pub use common::app_config as quartzite_config;
pub use common::logging as quartzite_logging;
pub use common::types::UniqueId;
pub use error::FilterError;
pub use runtime::hub::RuntimeFilterHub;
