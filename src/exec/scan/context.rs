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
//! Scan-operator filter context.
//!
//! Responsibilities:
//! - Tracks the scan's subscribed consumer filters, acquires them with or
//!   without waiting, folds materialized predicates through the
//!   normalizer, and applies the result to chunks.
//! - Late arrivals AND onto the current residual tree in a fresh conjunct
//!   context; the prior context stays alive until the in-flight batch
//!   drains.
//!
//! Key exported interfaces:
//! - Types: `ScanFilterContext`, `ConjunctContext`, `AcquireResult`.

use std::sync::Arc;

use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;

use crate::exec::chunk::Chunk;
use crate::exec::expr::{PredExpr, eval_keep_mask};
use crate::exec::runtime_filter::apply::probe_mask;
use crate::exec::runtime_filter::values::ColumnView;
use crate::quartzite_logging::debug;
use crate::runtime::hub::ConsumerHandle;
use crate::runtime::wait::FilterState;

use super::normalizer::{PredicateNormalizer, ScanPushdown, SlotDesc};

/// Outcome of one `acquire_and_push_down` round.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcquireResult {
    /// Filters whose predicates were folded in during this round.
    pub applied: usize,
    /// Filters that reached their deadline; the scan runs without them.
    pub timed_out: usize,
    /// Cooperative mode only: at least one filter is still not ready and
    /// the scan should suspend at the batch boundary.
    pub blocked: bool,
}

/// One immutable normalization result: residual tree plus sinks.
#[derive(Debug)]
pub struct ConjunctContext {
    pub residual: Option<PredExpr>,
    pub pushdown: ScanPushdown,
}

struct ConsumerState {
    handle: ConsumerHandle,
    applied: bool,
}

pub struct ScanFilterContext {
    slots: Vec<SlotDesc>,
    enable_function_pushdown: bool,
    base_conjuncts: Option<PredExpr>,
    consumers: Vec<ConsumerState>,
    /// Predicates already materialized from ready filters.
    filter_preds: Vec<PredExpr>,
    current: Arc<ConjunctContext>,
    /// Replaced contexts kept alive until the current batch drains.
    stale: Vec<Arc<ConjunctContext>>,
    batches_started: bool,
    eos: bool,
}

impl ScanFilterContext {
    pub fn new(
        slots: Vec<SlotDesc>,
        conjuncts: Option<PredExpr>,
        consumers: Vec<ConsumerHandle>,
        enable_function_pushdown: bool,
    ) -> Self {
        let mut normalizer = PredicateNormalizer::new(&slots, enable_function_pushdown);
        let residual = normalizer.normalize_conjuncts(conjuncts.clone());
        let pushdown = normalizer.into_pushdown();
        let eos = pushdown.eos;
        Self {
            slots,
            enable_function_pushdown,
            base_conjuncts: conjuncts,
            consumers: consumers
                .into_iter()
                .map(|handle| ConsumerState {
                    handle,
                    applied: false,
                })
                .collect(),
            filter_preds: Vec::new(),
            current: Arc::new(ConjunctContext { residual, pushdown }),
            stale: Vec::new(),
            batches_started: false,
            eos,
        }
    }

    pub fn current_context(&self) -> &Arc<ConjunctContext> {
        &self.current
    }

    pub fn pushdown(&self) -> &ScanPushdown {
        &self.current.pushdown
    }

    pub fn residual(&self) -> Option<&PredExpr> {
        self.current.residual.as_ref()
    }

    /// Constant-false conjuncts or an empty-build filter collapsed the
    /// scan; report EOF without reading.
    pub fn eos(&self) -> bool {
        self.eos
    }

    /// Acquire subscribed filters, optionally waiting out their deadline,
    /// and fold the predicates of every newly ready filter.
    pub fn acquire_and_push_down(&mut self, wait: bool) -> AcquireResult {
        let mut result = AcquireResult::default();
        let mut fresh_preds = Vec::new();
        for consumer in &mut self.consumers {
            if consumer.applied {
                continue;
            }
            let instance = consumer.handle.instance();
            let mut ready = instance.is_ready();
            if !ready && wait {
                ready = instance.await_ready();
            }
            if ready {
                match instance.push_predicates() {
                    Ok(preds) => {
                        fresh_preds.extend(preds);
                        consumer.applied = true;
                        result.applied += 1;
                    }
                    Err(e) => {
                        debug!(
                            "runtime filter predicates dropped: filter_id={} err={}",
                            instance.filter_id(),
                            e
                        );
                        instance.set_ignored("predicate materialization failed");
                        consumer.applied = true;
                    }
                }
            } else {
                match instance.current_state() {
                    FilterState::TimedOut => {
                        // Terminal: this filter will never be applied.
                        consumer.applied = true;
                        result.timed_out += 1;
                    }
                    FilterState::NotReady => {
                        if instance.is_ready_or_timeout() {
                            consumer.applied = true;
                            result.timed_out += 1;
                        } else {
                            result.blocked = true;
                        }
                    }
                    FilterState::Ready => {}
                }
            }
        }
        if !fresh_preds.is_empty() {
            self.filter_preds.extend(fresh_preds.iter().cloned());
            self.rebuild_context(fresh_preds);
        }
        result
    }

    /// Fold filters that became ready after scanning started. Returns how
    /// many were newly applied.
    pub fn try_append_late_arrivals(&mut self) -> usize {
        let result = self.acquire_and_push_down(false);
        result.applied
    }

    /// The scan produced (or is about to produce) a batch under the
    /// current context.
    pub fn begin_batch(&mut self) {
        self.batches_started = true;
    }

    /// The in-flight batch fully drained; stale contexts can go.
    pub fn batch_drained(&mut self) {
        self.stale.clear();
    }

    pub fn close(&mut self) {
        for consumer in &self.consumers {
            consumer.handle.close();
        }
        self.stale.clear();
    }

    fn rebuild_context(&mut self, fresh_preds: Vec<PredExpr>) {
        let fresh = if self.batches_started {
            // Late arrival: AND onto the existing residual, keeping the
            // established sinks untouched (scanners already consumed them).
            let mut residual = self.current.residual.clone();
            let mut pushdown = self.current.pushdown.clone();
            for pred in fresh_preds {
                if matches!(pred, PredExpr::ConstBool(false)) {
                    pushdown.eos = true;
                    continue;
                }
                if matches!(pred, PredExpr::ConstBool(true)) {
                    continue;
                }
                residual = PredExpr::conjoin(residual, [pred]);
            }
            ConjunctContext { residual, pushdown }
        } else {
            // Before the first batch the whole tree is renormalized so the
            // filter predicates reach the storage sinks too.
            let mut normalizer =
                PredicateNormalizer::new(&self.slots, self.enable_function_pushdown);
            let base_residual = normalizer.normalize_conjuncts(self.base_conjuncts.clone());
            normalizer.set_marking_runtime_filter(true);
            let filter_tree = PredExpr::conjoin(None, self.filter_preds.iter().cloned());
            let filter_residual = normalizer.normalize_conjuncts(filter_tree);
            let residual = PredExpr::conjoin(base_residual, filter_residual);
            ConjunctContext {
                residual,
                pushdown: normalizer.into_pushdown(),
            }
        };
        self.eos |= fresh.pushdown.eos;
        let old = std::mem::replace(&mut self.current, Arc::new(fresh));
        if self.batches_started {
            self.stale.push(old);
        }
    }

    /// Apply the current context to one chunk: hard value ranges, filter
    /// sinks, then the residual tree. Returns `None` when no row survives.
    pub fn apply_to_chunk(&mut self, chunk: Chunk) -> Result<Option<Chunk>, String> {
        self.begin_batch();
        if self.eos || chunk.is_empty() {
            return Ok(None);
        }
        let len = chunk.len();
        let mut keep = vec![true; len];

        for range in self.current.pushdown.value_ranges.values() {
            let array = match chunk.column_by_slot_id(range.slot()) {
                Ok(array) => array,
                Err(_) => continue,
            };
            let view = ColumnView::try_new(&array, range.binding())?;
            for (row, slot) in keep.iter_mut().enumerate() {
                if !*slot {
                    continue;
                }
                let key = view.key_at(row)?;
                if !range.matches_key(key.as_ref())? {
                    *slot = false;
                }
            }
        }

        let sinks = [
            &self.current.pushdown.in_filters,
            &self.current.pushdown.bloom_filters,
            &self.current.pushdown.bitmap_filters,
        ];
        for sink in sinks {
            for (slot, filter) in sink.iter() {
                let Ok(array) = chunk.column_by_slot_id(*slot) else {
                    continue;
                };
                probe_mask(filter, &array, &mut keep)?;
            }
        }

        if let Some(residual) = &self.current.residual {
            let mask = eval_keep_mask(residual, &chunk)?;
            for (slot, pass) in keep.iter_mut().zip(mask) {
                *slot &= pass;
            }
        }

        if keep.iter().all(|v| !*v) {
            return Ok(None);
        }
        if keep.iter().all(|v| *v) {
            return Ok(Some(chunk));
        }
        let mask = BooleanArray::from(keep);
        let filtered = filter_record_batch(&chunk.batch, &mask).map_err(|e| e.to_string())?;
        Ok(Some(Chunk::new(filtered)))
    }
}
