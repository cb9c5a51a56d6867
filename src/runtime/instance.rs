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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use arrow::array::ArrayRef;

use crate::common::config;
use crate::common::ids::{FilterId, SlotId};
use crate::error::FilterError;
use crate::exec::expr::{ColumnRef, CompareOp, LiteralValue, PredExpr, create_literal_node};
use crate::exec::runtime_filter::values::{self, FilterKey, KeyConvert};
use crate::exec::runtime_filter::wrapper::BloomBudget;
use crate::exec::runtime_filter::{
    ColumnBinding, FilterKind, FilterPayload, FilterWrapper, WrapperParams, codec,
};
use crate::quartzite_logging::debug;

use super::wait::{ExecMode, FilterSignal, FilterState};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FilterRole {
    Producer,
    Consumer,
}

/// Broadcast builds have one producer and need no merge; shuffle builds
/// merge N partial payloads at the coordinator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BuildClass {
    Broadcast,
    Shuffle { producer_count: usize },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TargetClass {
    Local,
    Remote,
    Both,
}

impl TargetClass {
    pub fn has_local(self) -> bool {
        matches!(self, TargetClass::Local | TargetClass::Both)
    }

    pub fn has_remote(self) -> bool {
        matches!(self, TargetClass::Remote | TargetClass::Both)
    }
}

/// Planner descriptor for one runtime filter.
#[derive(Clone, Debug)]
pub struct FilterDesc {
    pub filter_id: FilterId,
    pub kind: FilterKind,
    pub column: ColumnBinding,
    /// Probe-side slot the materialized predicates act on.
    pub probe_slot: SlotId,
    pub build_class: BuildClass,
    pub target_class: TargetClass,
    pub params: WrapperParams,
}

/// Per-query execution options the filter subsystem cares about.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    pub exec_mode: ExecMode,
    /// Consumer wait budget in milliseconds; the configured hard floor
    /// applies.
    pub wait_ms: u64,
    pub enable_function_pushdown: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            exec_mode: ExecMode::Blocking,
            wait_ms: config::runtime_filter_wait_ms_default(),
            enable_function_pushdown: false,
        }
    }
}

impl QueryOptions {
    pub fn effective_wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms.max(config::runtime_filter_wait_ms_floor()))
    }
}

/// Per-query filter object: one per (fragment, filter id, role).
///
/// The wrapper is mutated only by its producer until publish, then
/// read-only; consumers install a decoded wrapper exactly once on the
/// `not-ready -> ready` transition.
pub struct FilterInstance {
    desc: FilterDesc,
    role: FilterRole,
    options: QueryOptions,
    wrapper: RwLock<FilterWrapper>,
    signal: FilterSignal,
    registered_at: Instant,
    finalized: AtomicBool,
    published: AtomicBool,
    closed: AtomicBool,
    ignored: AtomicBool,
    /// Best-effort diagnostics; first writer wins.
    ignored_reason: Mutex<Option<String>>,
}

impl FilterInstance {
    pub fn new(
        desc: FilterDesc,
        role: FilterRole,
        options: QueryOptions,
        budget: Option<Arc<BloomBudget>>,
    ) -> Result<Arc<Self>, FilterError> {
        let wrapper = FilterWrapper::new(desc.kind, desc.column.clone(), desc.params.clone(), budget)
            .map_err(FilterError::invalid_config)?;
        let signal = FilterSignal::new(options.exec_mode);
        Ok(Arc::new(Self {
            desc,
            role,
            options,
            wrapper: RwLock::new(wrapper),
            signal,
            registered_at: Instant::now(),
            finalized: AtomicBool::new(false),
            published: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            ignored: AtomicBool::new(false),
            ignored_reason: Mutex::new(None),
        }))
    }

    pub fn desc(&self) -> &FilterDesc {
        &self.desc
    }

    pub fn filter_id(&self) -> FilterId {
        self.desc.filter_id
    }

    pub fn role(&self) -> FilterRole {
        self.role
    }

    pub fn is_producer(&self) -> bool {
        self.role == FilterRole::Producer
    }

    pub fn is_consumer(&self) -> bool {
        self.role == FilterRole::Consumer
    }

    pub fn signal(&self) -> &FilterSignal {
        &self.signal
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn remaining_wait(&self) -> Duration {
        self.options
            .effective_wait()
            .saturating_sub(self.registered_at.elapsed())
    }

    // ---- producer side ----

    /// Add one build value. Valid only before `ready_for_publish`.
    pub fn insert_value(&self, value: &LiteralValue) -> Result<(), String> {
        self.check_insertable()?;
        let key = match values::literal_to_key(value, &self.desc.column)? {
            KeyConvert::Exact(key) => Some(key),
            KeyConvert::Null => None,
            KeyConvert::Inexact => {
                return Err(format!(
                    "build value {:?} not representable for column kind {}",
                    value, self.desc.column.kind
                ));
            }
        };
        let mut wrapper = self.wrapper.write().expect("filter wrapper lock");
        wrapper.insert_key(key)
    }

    /// Vectorized insert of the build-key column; equal to per-row
    /// `insert_value` in any order.
    pub fn insert_batch(&self, column: &ArrayRef, rows: Option<&[usize]>) -> Result<(), String> {
        self.check_insertable()?;
        let mut wrapper = self.wrapper.write().expect("filter wrapper lock");
        wrapper.insert_batch(column, rows)
    }

    fn check_insertable(&self) -> Result<(), String> {
        if !self.is_producer() {
            return Err("insert is a producer-side operation".to_string());
        }
        if self.finalized.load(Ordering::Acquire) {
            return Err("insert after ready_for_publish".to_string());
        }
        Ok(())
    }

    /// Mark the build final on this producer.
    pub fn ready_for_publish(&self) {
        self.finalized.store(true, Ordering::Release);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Serialize exactly once; the second caller gets `None`.
    pub fn take_publish_payload(&self) -> Result<Option<Vec<u8>>, String> {
        if self.published.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let wrapper = self.wrapper.read().expect("filter wrapper lock");
        Ok(Some(codec::encode_filter(self.desc.filter_id, &wrapper)?))
    }

    /// Snapshot of the current wrapper (used for same-process publish).
    pub fn wrapper_snapshot(&self) -> FilterWrapper {
        self.wrapper.read().expect("filter wrapper lock").clone()
    }

    // ---- consumer side ----

    /// Transport ingress: install the published payload. Updates after a
    /// terminal state are discarded.
    pub fn update(&self, data: &[u8]) -> Result<(), String> {
        if self.signal.current_state().is_terminal() {
            debug!(
                "runtime filter update discarded after terminal state: filter_id={}",
                self.desc.filter_id
            );
            return Ok(());
        }
        let (filter_id, wrapper) =
            codec::decode_filter(data, self.desc.column.clone(), self.desc.params.clone())?;
        if filter_id != self.desc.filter_id {
            return Err(format!(
                "runtime filter id mismatch: wire={} local={}",
                filter_id, self.desc.filter_id
            ));
        }
        self.install(wrapper);
        Ok(())
    }

    /// Same-process publish path: install a wrapper snapshot directly.
    pub fn update_with_wrapper(&self, wrapper: FilterWrapper) {
        if self.signal.current_state().is_terminal() {
            return;
        }
        self.install(wrapper);
    }

    fn install(&self, wrapper: FilterWrapper) {
        {
            let mut guard = self.wrapper.write().expect("filter wrapper lock");
            *guard = wrapper;
        }
        if self.signal.signal_ready() {
            debug!(
                "runtime filter ready: filter_id={} waited_ms={}",
                self.desc.filter_id,
                self.registered_at.elapsed().as_millis()
            );
        }
    }

    /// Block until ready or until the wait budget (measured from
    /// registration) runs out. Idempotent; late calls observe the terminal
    /// state immediately.
    pub fn await_ready(&self) -> bool {
        self.signal.await_terminal(self.remaining_wait()) == FilterState::Ready
    }

    pub fn current_state(&self) -> FilterState {
        self.signal.current_state()
    }

    pub fn is_ready(&self) -> bool {
        self.signal.is_ready()
    }

    /// Non-blocking: true when terminal, performing the deadline transition
    /// if the budget is already exhausted.
    pub fn is_ready_or_timeout(&self) -> bool {
        if self.signal.current_state().is_terminal() {
            return true;
        }
        if self.remaining_wait().is_zero() {
            self.signal.signal_timeout();
            return true;
        }
        false
    }

    /// Orthogonal to the state machine and sticky. Ignored filters never
    /// prune; waiters are signalled so nobody sleeps for a filter that will
    /// not arrive.
    pub fn set_ignored(&self, reason: &str) {
        if !self.ignored.swap(true, Ordering::AcqRel) {
            let mut guard = self.ignored_reason.lock().expect("ignored reason lock");
            if guard.is_none() {
                *guard = Some(reason.to_string());
            }
            drop(guard);
            {
                let mut wrapper = self.wrapper.write().expect("filter wrapper lock");
                wrapper.set_ignored(reason);
            }
            self.signal.signal_ready();
            debug!(
                "runtime filter ignored: filter_id={} reason={}",
                self.desc.filter_id, reason
            );
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored.load(Ordering::Acquire)
    }

    pub fn ignored_reason(&self) -> Option<String> {
        self.ignored_reason
            .lock()
            .expect("ignored reason lock")
            .clone()
    }

    /// Consumer teardown; idempotent. A closed consumer stops waiting.
    pub fn consumer_close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.signal.signal_timeout();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Materialize the received payload into predicates on the probe slot.
    ///
    /// Ignored and always-true filters contribute nothing; an empty build
    /// contributes constant false, short-circuiting the scan.
    pub fn push_predicates(&self) -> Result<Vec<PredExpr>, String> {
        let wrapper = self.wrapper.read().expect("filter wrapper lock");
        if wrapper.is_disabled() {
            return Ok(Vec::new());
        }
        if wrapper.is_empty_build() {
            return Ok(vec![PredExpr::ConstBool(false)]);
        }
        let binding = wrapper.column();
        let column = ColumnRef {
            slot: self.desc.probe_slot,
            kind: binding.kind,
            precision: binding.precision,
            scale: binding.scale,
            nullable: true,
            cast_to: None,
        };
        let shared = || Arc::new(wrapper.clone());
        let preds = match wrapper.payload() {
            FilterPayload::In(in_filter) => {
                match self.in_list_predicate(&column, in_filter.values()) {
                    Some(pred) => vec![pred],
                    // Literal construction failed (e.g. hll); fall back to
                    // an exact probe node.
                    None => vec![PredExpr::InProbe {
                        column,
                        filter: shared(),
                    }],
                }
            }
            FilterPayload::MinMax(min_max) => {
                let mut preds = Vec::with_capacity(2);
                for (endpoint, op) in [(min_max.min(), CompareOp::Ge), (min_max.max(), CompareOp::Le)]
                {
                    let Some(key) = endpoint else {
                        continue;
                    };
                    let Some(literal) = self.key_literal(key, binding) else {
                        continue;
                    };
                    preds.push(PredExpr::Compare {
                        column: column.clone(),
                        op,
                        literal,
                    });
                }
                preds
            }
            FilterPayload::Bloom(_) => vec![PredExpr::BloomProbe {
                column,
                filter: shared(),
            }],
            FilterPayload::Bitmap(_) => vec![PredExpr::BitmapProbe {
                column,
                filter: shared(),
            }],
        };
        Ok(preds)
    }

    fn key_literal(
        &self,
        key: &FilterKey,
        binding: &ColumnBinding,
    ) -> Option<crate::exec::expr::LiteralNode> {
        let value = values::key_to_literal(key, binding).ok()?;
        create_literal_node(binding.kind, &value, binding.precision, binding.scale).ok()
    }

    fn in_list_predicate(&self, column: &ColumnRef, keys: &[FilterKey]) -> Option<PredExpr> {
        let binding = ColumnBinding {
            kind: column.kind,
            precision: column.precision,
            scale: column.scale,
        };
        let mut literals = Vec::with_capacity(keys.len());
        for key in keys {
            literals.push(self.key_literal(key, &binding)?);
        }
        Some(PredExpr::InList {
            column: column.clone(),
            values: literals,
            not_in: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{BuildClass, FilterDesc, FilterInstance, FilterRole, QueryOptions, TargetClass};
    use crate::common::ids::{FilterId, SlotId};
    use crate::common::types::PrimitiveKind;
    use crate::exec::expr::{LiteralValue, PredExpr};
    use crate::exec::runtime_filter::{ColumnBinding, FilterKind, WrapperParams};

    fn desc(kind: FilterKind) -> FilterDesc {
        FilterDesc {
            filter_id: FilterId::new(1),
            kind,
            column: ColumnBinding::new(PrimitiveKind::Int32),
            probe_slot: SlotId::new(9),
            build_class: BuildClass::Broadcast,
            target_class: TargetClass::Local,
            params: WrapperParams {
                max_in_count: 8,
                ..WrapperParams::default()
            },
        }
    }

    fn options(wait_ms: u64) -> QueryOptions {
        QueryOptions {
            wait_ms,
            ..QueryOptions::default()
        }
    }

    #[test]
    fn producer_lifecycle_is_ordered() {
        let producer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Producer, options(50), None)
                .unwrap();
        producer.insert_value(&LiteralValue::Int32(7)).unwrap();
        producer.ready_for_publish();
        assert!(producer.insert_value(&LiteralValue::Int32(8)).is_err());
        let payload = producer.take_publish_payload().unwrap();
        assert!(payload.is_some());
        // Publish is exactly-once.
        assert!(producer.take_publish_payload().unwrap().is_none());
    }

    #[test]
    fn consumer_update_after_timeout_is_discarded() {
        let producer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Producer, options(50), None)
                .unwrap();
        producer.insert_value(&LiteralValue::Int32(7)).unwrap();
        producer.ready_for_publish();
        let payload = producer.take_publish_payload().unwrap().unwrap();

        let consumer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Consumer, options(0), None)
                .unwrap();
        std::thread::sleep(Duration::from_millis(15));
        assert!(!consumer.await_ready());
        consumer.update(&payload).unwrap();
        // Late publish must not resurrect the filter.
        assert!(!consumer.is_ready());
        assert!(consumer.is_ready_or_timeout());
    }

    #[test]
    fn ignored_consumer_pushes_nothing_and_unblocks() {
        let consumer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Consumer, options(10_000), None)
                .unwrap();
        consumer.set_ignored("producer aborted");
        assert!(consumer.await_ready());
        assert!(consumer.push_predicates().unwrap().is_empty());
        assert_eq!(consumer.ignored_reason().as_deref(), Some("producer aborted"));
    }

    #[test]
    fn empty_build_materializes_constant_false() {
        let producer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Producer, options(50), None)
                .unwrap();
        producer.ready_for_publish();
        let payload = producer.take_publish_payload().unwrap().unwrap();
        let consumer =
            FilterInstance::new(desc(FilterKind::In), FilterRole::Consumer, options(1_000), None)
                .unwrap();
        consumer.update(&payload).unwrap();
        let preds = consumer.push_predicates().unwrap();
        assert!(matches!(preds.as_slice(), [PredExpr::ConstBool(false)]));
    }
}
