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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use arrow::array::ArrayRef;

use crate::common::config;
use crate::common::ids::FilterId;
use crate::common::types::UniqueId;
use crate::error::FilterError;
use crate::exec::expr::LiteralValue;
use crate::exec::runtime_filter::wrapper::BloomBudget;
use crate::exec::runtime_filter::{ColumnBinding, WrapperParams};
use crate::quartzite_logging::{debug, warn};

use super::coordinator::{ConsumerTarget, MergeCoordinator};
use super::instance::{BuildClass, FilterDesc, FilterInstance, FilterRole, QueryOptions};
use super::registry::FilterRegistry;
use super::transport::{Endpoint, FilterFrame, FilterTransport, PublishQueue, SendTask};

/// Per-query entry point of the runtime-filter subsystem.
///
/// Owns the registry, the merge coordinators hosted on this node, and the
/// asynchronous publish queue. The hash-join build side talks to it through
/// `ProducerHandle`; the scan side registers consumers and drives them
/// through `ScanFilterContext`.
pub struct RuntimeFilterHub {
    query_id: UniqueId,
    options: QueryOptions,
    registry: FilterRegistry,
    transport: Arc<dyn FilterTransport>,
    merger_endpoint: Option<Endpoint>,
    coordinators: Mutex<HashMap<FilterId, Arc<MergeCoordinator>>>,
    publish_queue: PublishQueue,
    bloom_budget: Arc<BloomBudget>,
    cancelled: AtomicBool,
}

/// Build-side handle for one registered producer filter.
#[derive(Clone)]
pub struct ProducerHandle {
    instance: Arc<FilterInstance>,
    fragment_instance_id: UniqueId,
    producer_id: i32,
    hub: Weak<RuntimeFilterHub>,
}

/// Scan-side handle for one registered consumer filter.
#[derive(Clone)]
pub struct ConsumerHandle {
    instance: Arc<FilterInstance>,
    fragment_instance_id: UniqueId,
}

impl RuntimeFilterHub {
    pub fn new(
        query_id: UniqueId,
        options: QueryOptions,
        transport: Arc<dyn FilterTransport>,
        merger_endpoint: Option<Endpoint>,
    ) -> Arc<Self> {
        let publish_queue = PublishQueue::new(Arc::clone(&transport), config::transport_retries());
        Arc::new(Self {
            query_id,
            options,
            registry: FilterRegistry::new(),
            transport,
            merger_endpoint,
            coordinators: Mutex::new(HashMap::new()),
            publish_queue,
            bloom_budget: Arc::new(BloomBudget::from_config()),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn query_id(&self) -> UniqueId {
        self.query_id
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn register_producer(
        self: &Arc<Self>,
        fragment_instance_id: UniqueId,
        desc: FilterDesc,
        producer_id: i32,
    ) -> Result<ProducerHandle, FilterError> {
        let instance = FilterInstance::new(
            desc,
            FilterRole::Producer,
            self.options.clone(),
            Some(Arc::clone(&self.bloom_budget)),
        )?;
        self.registry
            .register(fragment_instance_id, Arc::clone(&instance))
            .map_err(FilterError::invalid_config)?;
        Ok(ProducerHandle {
            instance,
            fragment_instance_id,
            producer_id,
            hub: Arc::downgrade(self),
        })
    }

    pub fn register_consumer(
        self: &Arc<Self>,
        fragment_instance_id: UniqueId,
        desc: FilterDesc,
    ) -> Result<ConsumerHandle, FilterError> {
        let instance = FilterInstance::new(
            desc,
            FilterRole::Consumer,
            self.options.clone(),
            Some(Arc::clone(&self.bloom_budget)),
        )?;
        self.registry
            .register(fragment_instance_id, Arc::clone(&instance))
            .map_err(FilterError::invalid_config)?;
        Ok(ConsumerHandle {
            instance,
            fragment_instance_id,
        })
    }

    /// Host the merge coordinator for one shuffled filter on this node.
    pub fn register_merge_coordinator(
        &self,
        filter_id: FilterId,
        column: ColumnBinding,
        params: WrapperParams,
        expected_producers: usize,
        targets: Vec<ConsumerTarget>,
    ) {
        let coordinator = Arc::new(MergeCoordinator::new(
            self.query_id,
            filter_id,
            column,
            params,
            expected_producers,
            targets,
            Arc::clone(&self.transport),
            config::transport_retries(),
            config::runtime_filter_max_serialized_bytes(),
        ));
        let mut guard = self.coordinators.lock().expect("hub coordinator lock");
        guard.insert(filter_id, coordinator);
    }

    /// Producer build completion: snapshot, then route by target class.
    /// Local broadcast targets are signalled directly; anything that needs
    /// merging or remote delivery ships to the coordinator asynchronously.
    pub fn finalize_and_publish(self: &Arc<Self>, handle: &ProducerHandle) -> Result<(), FilterError> {
        if self.is_cancelled() {
            return Err(FilterError::Cancelled);
        }
        let instance = &handle.instance;
        instance.ready_for_publish();
        let data = match instance.take_publish_payload() {
            Ok(Some(data)) => data,
            // Already published.
            Ok(None) => return Ok(()),
            Err(e) => {
                // A payload we cannot serialize is dropped, not fatal: the
                // filter degrades and consumers run unfiltered.
                let err = FilterError::serialization(e);
                warn!(
                    "runtime filter publish payload failed: filter_id={} err={}",
                    instance.filter_id(),
                    err
                );
                if err.is_degradable() {
                    self.degrade_filter(instance.filter_id(), "publish serialization failed");
                    return Ok(());
                }
                return Err(err);
            }
        };
        let desc = instance.desc().clone();
        let is_broadcast = matches!(desc.build_class, BuildClass::Broadcast);

        if desc.target_class.has_local() && is_broadcast {
            let snapshot = instance.wrapper_snapshot();
            let consumers = self.registry.consumers_of(desc.filter_id);
            debug!(
                "runtime filter local publish: filter_id={} consumers={}",
                desc.filter_id,
                consumers.len()
            );
            for consumer in consumers {
                consumer.update_with_wrapper(snapshot.clone());
            }
        }

        let needs_merger = desc.target_class.has_remote() || !is_broadcast;
        if needs_merger {
            let Some(dest) = self.merger_endpoint.clone() else {
                warn!(
                    "runtime filter has no merge coordinator endpoint: filter_id={}",
                    desc.filter_id
                );
                self.degrade_filter(desc.filter_id, "no merge coordinator endpoint");
                return Ok(());
            };
            let frame = FilterFrame {
                query_id: self.query_id,
                fragment_instance_id: handle.fragment_instance_id,
                filter_id: desc.filter_id,
                producer_id: handle.producer_id,
                data,
            };
            let hub = Arc::downgrade(self);
            let filter_id = desc.filter_id;
            self.publish_queue.enqueue(SendTask {
                dest,
                frame,
                on_failure: Box::new(move |err| {
                    if let Some(hub) = hub.upgrade() {
                        let err = FilterError::Transport(err);
                        hub.degrade_filter(filter_id, &err.to_string());
                    }
                }),
            });
        }
        Ok(())
    }

    /// Best-effort empty publish for builds that finished with zero rows.
    pub fn publish_finally(self: &Arc<Self>, handle: &ProducerHandle) {
        if let Err(e) = self.finalize_and_publish(handle) {
            debug!(
                "runtime filter publish_finally skipped: filter_id={} err={}",
                handle.instance.filter_id(),
                e
            );
        }
    }

    /// Transport ingress for partial payloads headed to a coordinator on
    /// this node.
    pub fn receive_partial(&self, frame: &FilterFrame) -> Result<(), String> {
        let coordinator = {
            let guard = self.coordinators.lock().expect("hub coordinator lock");
            guard.get(&frame.filter_id).cloned()
        };
        let Some(coordinator) = coordinator else {
            return Err(format!(
                "no merge coordinator registered: filter_id={}",
                frame.filter_id
            ));
        };
        match coordinator.accept(frame.producer_id, &frame.data) {
            Ok(_published) => Ok(()),
            Err(e) => {
                // Malformed contributions are discarded; the merge can
                // still complete if the producer retries successfully.
                warn!(
                    "runtime filter partial discarded: filter_id={} producer={} err={}",
                    frame.filter_id, frame.producer_id, e
                );
                Ok(())
            }
        }
    }

    /// Transport ingress for merged payloads headed to consumers on this
    /// node.
    pub fn receive_publish(&self, frame: &FilterFrame) -> Result<(), String> {
        let exact = self.registry.lookup(
            frame.fragment_instance_id,
            frame.filter_id,
            FilterRole::Consumer,
        );
        let consumers = match exact {
            Some(consumer) => vec![consumer],
            None => self.registry.consumers_of(frame.filter_id),
        };
        if consumers.is_empty() {
            return Err(format!(
                "no consumer registered: filter_id={} fragment={}",
                frame.filter_id, frame.fragment_instance_id
            ));
        }
        for consumer in consumers {
            if let Err(e) = consumer.update(&frame.data) {
                // A payload we cannot decode can never be applied; drop the
                // filter so the scan proceeds unfiltered.
                let err = FilterError::serialization(e);
                warn!(
                    "runtime filter payload dropped by consumer: filter_id={} err={}",
                    frame.filter_id, err
                );
                if err.is_degradable() {
                    consumer.set_ignored("malformed filter payload");
                } else {
                    return Err(err.to_string());
                }
            }
        }
        Ok(())
    }

    fn degrade_filter(&self, filter_id: FilterId, reason: &str) {
        for instance in self.registry.all_instances() {
            if instance.filter_id() == filter_id {
                instance.set_ignored(reason);
            }
        }
    }

    /// Query cancellation: wake every waiter and disable every filter.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("runtime filter hub cancelled: query_id={}", self.query_id);
        for instance in self.registry.all_instances() {
            instance.set_ignored("query cancelled");
        }
    }
}

impl ProducerHandle {
    pub fn instance(&self) -> &Arc<FilterInstance> {
        &self.instance
    }

    pub fn insert(&self, value: &LiteralValue) -> Result<(), String> {
        self.instance.insert_value(value)
    }

    pub fn insert_batch(&self, column: &ArrayRef, rows: Option<&[usize]>) -> Result<(), String> {
        self.instance.insert_batch(column, rows)
    }

    pub fn finalize_and_publish(&self) -> Result<(), FilterError> {
        let Some(hub) = self.hub.upgrade() else {
            return Err(FilterError::Cancelled);
        };
        hub.finalize_and_publish(self)
    }

    pub fn publish_finally(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.publish_finally(self);
        }
    }
}

impl ConsumerHandle {
    pub fn instance(&self) -> &Arc<FilterInstance> {
        &self.instance
    }

    pub fn fragment_instance_id(&self) -> UniqueId {
        self.fragment_instance_id
    }

    pub fn close(&self) {
        self.instance.consumer_close();
    }
}
