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
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::ids::FilterId;
use crate::common::types::UniqueId;
use crate::exec::runtime_filter::{
    ColumnBinding, FilterPayload, FilterWrapper, InFilter, WrapperParams, codec,
};
use crate::quartzite_logging::{debug, warn};

use super::transport::{Endpoint, FilterFrame, FilterTransport};

/// One consumer endpoint the merged payload is published to.
#[derive(Clone, Debug)]
pub struct ConsumerTarget {
    pub endpoint: Endpoint,
    pub fragment_instance_id: UniqueId,
}

struct MergeState {
    received: HashSet<i32>,
    merged: Option<FilterWrapper>,
    done: bool,
}

/// Aggregates partial payloads of one shuffled filter until all expected
/// producers contributed, then broadcasts the merged payload.
///
/// `accept` is idempotent per producer id and insensitive to arrival order;
/// every consumer observes the same serialized payload.
pub struct MergeCoordinator {
    query_id: UniqueId,
    filter_id: FilterId,
    column: ColumnBinding,
    params: WrapperParams,
    expected_producers: usize,
    targets: Vec<ConsumerTarget>,
    transport: Arc<dyn FilterTransport>,
    publish_retries: usize,
    max_serialized_bytes: usize,
    state: Mutex<MergeState>,
}

impl MergeCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        query_id: UniqueId,
        filter_id: FilterId,
        column: ColumnBinding,
        params: WrapperParams,
        expected_producers: usize,
        targets: Vec<ConsumerTarget>,
        transport: Arc<dyn FilterTransport>,
        publish_retries: usize,
        max_serialized_bytes: usize,
    ) -> Self {
        Self {
            query_id,
            filter_id,
            column,
            params,
            expected_producers: expected_producers.max(1),
            targets,
            transport,
            publish_retries,
            max_serialized_bytes,
            state: Mutex::new(MergeState {
                received: HashSet::new(),
                merged: None,
                done: false,
            }),
        }
    }

    pub fn filter_id(&self) -> FilterId {
        self.filter_id
    }

    /// Merge one producer's contribution. Returns true when this call
    /// completed the merge and triggered the broadcast.
    ///
    /// Malformed payloads are reported as errors and contribute nothing;
    /// duplicate deliveries from the same producer are discarded silently.
    pub fn accept(&self, producer_id: i32, data: &[u8]) -> Result<bool, String> {
        let (filter_id, wrapper) =
            codec::decode_filter(data, self.column.clone(), self.params.clone())?;
        if filter_id != self.filter_id {
            return Err(format!(
                "merge coordinator received filter {} but expected {}",
                filter_id, self.filter_id
            ));
        }
        let merged = {
            let mut state = self.state.lock().expect("merge coordinator lock");
            if state.done || state.received.contains(&producer_id) {
                return Ok(false);
            }
            state.received.insert(producer_id);
            match &mut state.merged {
                Some(current) => current.merge_from(&wrapper)?,
                None => state.merged = Some(wrapper),
            }
            debug!(
                "runtime filter partial merged: filter_id={} producer={} received={}/{}",
                self.filter_id,
                producer_id,
                state.received.len(),
                self.expected_producers
            );
            if state.received.len() < self.expected_producers {
                return Ok(false);
            }
            state.done = true;
            state.merged.take()
        };
        let Some(merged) = merged else {
            return Ok(false);
        };
        if let Err(e) = self.broadcast(merged) {
            // The merge itself completed; a failed broadcast must not be
            // reported as a bad contribution.
            warn!(
                "runtime filter broadcast failed: filter_id={} err={}",
                self.filter_id, e
            );
        }
        Ok(true)
    }

    fn broadcast(&self, merged: FilterWrapper) -> Result<(), String> {
        let mut data = codec::encode_filter(self.filter_id, &merged)?;
        if data.len() > self.max_serialized_bytes {
            // Too large to ship: republish as always-true so consumers
            // unblock and stay correct.
            warn!(
                "runtime filter merged payload too large: filter_id={} bytes={} limit={}",
                self.filter_id,
                data.len(),
                self.max_serialized_bytes
            );
            let empty = FilterWrapper::from_decoded(
                merged.kind(),
                self.column.clone(),
                self.params.clone(),
                FilterPayload::In(InFilter::new()),
                true,
                false,
                merged.row_count().max(1),
            );
            data = codec::encode_filter(self.filter_id, &empty)?;
        }
        debug!(
            "runtime filter broadcast: filter_id={} bytes={} targets={}",
            self.filter_id,
            data.len(),
            self.targets.len()
        );
        for target in &self.targets {
            let frame = FilterFrame {
                query_id: self.query_id,
                fragment_instance_id: target.fragment_instance_id,
                filter_id: self.filter_id,
                producer_id: -1,
                data: data.clone(),
            };
            let mut delivered = false;
            for attempt in 0..=self.publish_retries {
                match self.transport.send_publish(&target.endpoint, &frame) {
                    Ok(()) => {
                        delivered = true;
                        break;
                    }
                    Err(e) => {
                        debug!(
                            "runtime filter publish retry: dest={} filter_id={} attempt={} err={}",
                            target.endpoint, self.filter_id, attempt, e
                        );
                        std::thread::sleep(Duration::from_millis(1 << attempt));
                    }
                }
            }
            if !delivered {
                // Best-effort: the consumer times out and runs unfiltered.
                warn!(
                    "runtime filter publish failed permanently: dest={} filter_id={}",
                    target.endpoint, self.filter_id
                );
            }
        }
        Ok(())
    }
}
