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
use std::fmt;
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::common::ids::FilterId;
use crate::common::types::UniqueId;
use crate::quartzite_logging::{debug, warn};

use super::hub::RuntimeFilterHub;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One runtime-filter datagram: a partial payload headed to the merge
/// coordinator, or a merged payload headed to a consumer.
#[derive(Clone, Debug)]
pub struct FilterFrame {
    pub query_id: UniqueId,
    /// Routing target for publishes; the producing fragment for partials.
    pub fragment_instance_id: UniqueId,
    pub filter_id: FilterId,
    pub producer_id: i32,
    pub data: Vec<u8>,
}

/// Best-effort datagram-with-ack seam to the RPC layer. Implementations
/// return an error when the send is known to have failed; retry policy
/// belongs to the callers.
pub trait FilterTransport: Send + Sync {
    fn send_partial(&self, dest: &Endpoint, frame: &FilterFrame) -> Result<(), String>;

    fn send_publish(&self, dest: &Endpoint, frame: &FilterFrame) -> Result<(), String>;
}

/// In-process transport wiring hubs together by endpoint; used by local
/// deployments and tests.
#[derive(Default)]
pub struct LoopbackTransport {
    hubs: Mutex<HashMap<Endpoint, Weak<RuntimeFilterHub>>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_hub(&self, endpoint: Endpoint, hub: &Arc<RuntimeFilterHub>) {
        let mut guard = self.hubs.lock().expect("loopback transport lock");
        guard.insert(endpoint, Arc::downgrade(hub));
    }

    fn hub_at(&self, dest: &Endpoint) -> Result<Arc<RuntimeFilterHub>, String> {
        let guard = self.hubs.lock().expect("loopback transport lock");
        guard
            .get(dest)
            .and_then(Weak::upgrade)
            .ok_or_else(|| format!("no hub registered at {dest}"))
    }
}

impl FilterTransport for LoopbackTransport {
    fn send_partial(&self, dest: &Endpoint, frame: &FilterFrame) -> Result<(), String> {
        self.hub_at(dest)?.receive_partial(frame)
    }

    fn send_publish(&self, dest: &Endpoint, frame: &FilterFrame) -> Result<(), String> {
        self.hub_at(dest)?.receive_publish(frame)
    }
}

pub struct SendTask {
    pub dest: Endpoint,
    pub frame: FilterFrame,
    pub on_failure: Box<dyn FnOnce(String) + Send>,
}

/// Asynchronous producer-side send queue.
///
/// Publishing enqueues and returns; a dedicated sender thread performs the
/// transport call with bounded retries and reports permanent failure
/// through the task's callback. The caller is never blocked by transport
/// back-pressure.
pub struct PublishQueue {
    tx: Mutex<Option<Sender<SendTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PublishQueue {
    pub fn new(transport: Arc<dyn FilterTransport>, retries: usize) -> Self {
        let (tx, rx) = channel::<SendTask>();
        let worker = std::thread::Builder::new()
            .name("rf-publish".to_string())
            .spawn(move || {
                for task in rx {
                    let mut last_err = String::new();
                    let mut delivered = false;
                    for attempt in 0..=retries {
                        match transport.send_partial(&task.dest, &task.frame) {
                            Ok(()) => {
                                delivered = true;
                                break;
                            }
                            Err(e) => {
                                last_err = e;
                                debug!(
                                    "runtime filter send retry: dest={} filter_id={} attempt={}",
                                    task.dest, task.frame.filter_id, attempt
                                );
                                std::thread::sleep(Duration::from_millis(2 << attempt));
                            }
                        }
                    }
                    if !delivered {
                        warn!(
                            "runtime filter send failed permanently: dest={} filter_id={} err={}",
                            task.dest, task.frame.filter_id, last_err
                        );
                        (task.on_failure)(last_err);
                    }
                }
            })
            .expect("spawn rf-publish thread");
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn enqueue(&self, task: SendTask) {
        let guard = self.tx.lock().expect("publish queue lock");
        if let Some(tx) = guard.as_ref() {
            // Receiver lives as long as the queue; a send only fails during
            // shutdown, where dropping the task is acceptable best-effort.
            let _ = tx.send(task);
        }
    }

    /// Stop accepting tasks and drain the worker.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().expect("publish queue lock").take();
        drop(tx);
        let worker = self.worker.lock().expect("publish queue lock").take();
        if let Some(handle) = worker {
            let _ = handle.join();
        }
    }
}

impl Drop for PublishQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
