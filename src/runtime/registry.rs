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
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::common::ids::FilterId;
use crate::common::types::UniqueId;

use super::instance::{FilterInstance, FilterRole};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct RegistryKey {
    fragment_instance_id: UniqueId,
    filter_id: FilterId,
    role: FilterRole,
}

/// Process-wide, per-query map from (fragment instance, filter id, role) to
/// filter instance.
///
/// Read-mostly: the map is copy-on-write behind the lock, so lookups clone
/// one `Arc` and walk an immutable snapshot while registration replaces the
/// whole map. The registry owns the instances for the query's lifetime.
#[derive(Default)]
pub struct FilterRegistry {
    map: RwLock<Arc<HashMap<RegistryKey, Arc<FilterInstance>>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<HashMap<RegistryKey, Arc<FilterInstance>>> {
        Arc::clone(&self.map.read().expect("filter registry lock"))
    }

    /// Register one instance; duplicate registration for the same key is an
    /// error. Instances start in `not-ready`.
    pub fn register(
        &self,
        fragment_instance_id: UniqueId,
        instance: Arc<FilterInstance>,
    ) -> Result<(), String> {
        let key = RegistryKey {
            fragment_instance_id,
            filter_id: instance.filter_id(),
            role: instance.role(),
        };
        let mut guard = self.map.write().expect("filter registry lock");
        if guard.contains_key(&key) {
            return Err(format!(
                "runtime filter already registered: fragment={} filter_id={} role={:?}",
                fragment_instance_id,
                instance.filter_id(),
                instance.role()
            ));
        }
        let mut next = HashMap::clone(&guard);
        next.insert(key, instance);
        *guard = Arc::new(next);
        Ok(())
    }

    pub fn lookup(
        &self,
        fragment_instance_id: UniqueId,
        filter_id: FilterId,
        role: FilterRole,
    ) -> Option<Arc<FilterInstance>> {
        let key = RegistryKey {
            fragment_instance_id,
            filter_id,
            role,
        };
        self.snapshot().get(&key).map(Arc::clone)
    }

    /// Every consumer of one filter id, across fragment instances.
    pub fn consumers_of(&self, filter_id: FilterId) -> Vec<Arc<FilterInstance>> {
        self.snapshot()
            .iter()
            .filter(|(key, _)| key.role == FilterRole::Consumer && key.filter_id == filter_id)
            .map(|(_, instance)| Arc::clone(instance))
            .collect()
    }

    pub fn all_instances(&self) -> Vec<Arc<FilterInstance>> {
        self.snapshot().values().map(Arc::clone).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
