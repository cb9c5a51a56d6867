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
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

static CONFIG: OnceLock<QuartziteConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static QuartziteConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = QuartziteConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

/// Resolve the process config. Unlike the engine binary, the filter
/// subsystem runs fine with every setting defaulted, so a missing file is
/// not an error.
pub fn config() -> &'static QuartziteConfig {
    if let Some(cfg) = CONFIG.get() {
        return cfg;
    }
    let cfg = config_path_from_env_or_default()
        .and_then(|p| QuartziteConfig::load_from_file(&p))
        .unwrap_or_default();
    let _ = CONFIG.set(cfg);
    CONFIG.get().expect("CONFIG set")
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("QUARTZITE_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let candidate = PathBuf::from("quartzite.toml");
    if candidate.exists() {
        return Ok(candidate);
    }
    anyhow::bail!("missing config file: set $QUARTZITE_CONFIG or create ./quartzite.toml")
}

#[derive(Clone, Default, Deserialize)]
pub struct QuartziteConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression. Takes precedence over
    /// `log_level` when set.
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime_filter: RuntimeFilterConfig,
}

#[derive(Clone, Deserialize)]
pub struct RuntimeFilterConfig {
    /// Default consumer wait budget when the query options carry none.
    #[serde(default = "default_wait_ms")]
    pub wait_ms_default: u64,

    /// Hard floor applied to any configured wait budget.
    #[serde(default = "default_wait_floor_ms")]
    pub wait_ms_floor: u64,

    /// Default cardinality cap K for in-set and in-or-bloom filters.
    #[serde(default = "default_max_in_count")]
    pub max_in_count: usize,

    /// Target false-positive rate used to size bloom payloads.
    #[serde(default = "default_bloom_fpp")]
    pub bloom_fpp: f64,

    #[serde(default = "default_bloom_min_bits")]
    pub bloom_min_bits: u32,

    #[serde(default = "default_bloom_max_bits")]
    pub bloom_max_bits: u32,

    /// Expected insertion count used when a descriptor does not carry one
    /// (in-or-bloom promotion sizes its bloom from this).
    #[serde(default = "default_bloom_expected_entries")]
    pub bloom_expected_entries: u64,

    /// Per-query cap on total bloom buffer bytes; allocations past the cap
    /// degrade the filter to ignored.
    #[serde(default = "default_bloom_memory_cap")]
    pub bloom_memory_cap_bytes: usize,

    /// Per-column cap on conditions pushed into storage sinks.
    #[serde(default = "default_max_pushdown_conditions")]
    pub max_pushdown_conditions_per_column: usize,

    /// Bounded retry count for transport sends before a filter degrades.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: usize,

    /// Merged payloads above this size are republished as always-true.
    #[serde(default = "default_max_serialized_bytes")]
    pub max_serialized_bytes: usize,
}

fn default_wait_ms() -> u64 {
    1_000
}

fn default_wait_floor_ms() -> u64 {
    10
}

fn default_max_in_count() -> usize {
    1024
}

fn default_bloom_fpp() -> f64 {
    0.05
}

fn default_bloom_min_bits() -> u32 {
    1 << 10
}

fn default_bloom_max_bits() -> u32 {
    1 << 26
}

fn default_bloom_expected_entries() -> u64 {
    65_536
}

fn default_bloom_memory_cap() -> usize {
    64 * 1024 * 1024
}

fn default_max_pushdown_conditions() -> usize {
    1024
}

fn default_transport_retries() -> usize {
    3
}

fn default_max_serialized_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for RuntimeFilterConfig {
    fn default() -> Self {
        Self {
            wait_ms_default: default_wait_ms(),
            wait_ms_floor: default_wait_floor_ms(),
            max_in_count: default_max_in_count(),
            bloom_fpp: default_bloom_fpp(),
            bloom_min_bits: default_bloom_min_bits(),
            bloom_max_bits: default_bloom_max_bits(),
            bloom_expected_entries: default_bloom_expected_entries(),
            bloom_memory_cap_bytes: default_bloom_memory_cap(),
            max_pushdown_conditions_per_column: default_max_pushdown_conditions(),
            transport_retries: default_transport_retries(),
            max_serialized_bytes: default_max_serialized_bytes(),
        }
    }
}

impl QuartziteConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let cfg: QuartziteConfig = toml::from_str(&text)
            .with_context(|| format!("parse config file {}", path.display()))?;
        Ok(cfg)
    }
}
