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
//! End-to-end distribution scenarios: local broadcast, shuffled merge,
//! deadlines, empty builds, and cancellation.

mod common;

use std::time::{Duration, Instant};

use quartzite::common::ids::{FilterId, SlotId};
use quartzite::common::types::{PrimitiveKind, UniqueId};
use quartzite::exec::runtime_filter::values::FilterKey;
use quartzite::exec::runtime_filter::{ColumnBinding, FilterKind, WrapperParams};
use quartzite::exec::scan::ScanFilterContext;
use quartzite::runtime::coordinator::ConsumerTarget;
use quartzite::runtime::hub::RuntimeFilterHub;
use quartzite::runtime::transport::{Endpoint, LoopbackTransport};

use common::{
    chunk_values_i32, filter_desc, int32_chunk, int64_array, key_slot, shuffle_desc, wait_options,
};

#[test]
fn broadcast_in_set_prunes_probe_rows() {
    quartzite::quartzite_logging::init_with_level("warn");
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(1, 1), wait_options(1_000), transport, None);
    let build_finst = UniqueId::new(1, 10);
    let probe_finst = UniqueId::new(1, 20);

    let producer = hub
        .register_producer(build_finst, filter_desc(1, FilterKind::In, PrimitiveKind::Int32, 9), 0)
        .unwrap();
    let consumer = hub
        .register_consumer(probe_finst, filter_desc(1, FilterKind::In, PrimitiveKind::Int32, 9))
        .unwrap();

    let keys = common::int32_array(&[Some(7), Some(11), Some(13)]);
    producer.insert_batch(&keys, None).unwrap();
    producer.finalize_and_publish().unwrap();

    // The publish already happened; await must return promptly.
    let start = Instant::now();
    assert!(consumer.instance().await_ready());
    assert!(start.elapsed() < Duration::from_millis(10));

    let mut scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![consumer],
        false,
    );
    let result = scan.acquire_and_push_down(true);
    assert_eq!(result.applied, 1);
    assert_eq!(result.timed_out, 0);
    assert!(!result.blocked);

    let chunk = int32_chunk(SlotId::new(9), &[Some(5), Some(7), Some(9), Some(11)]);
    let filtered = scan.apply_to_chunk(chunk).unwrap().unwrap();
    assert_eq!(chunk_values_i32(&filtered, SlotId::new(9)), vec![7, 11]);
}

#[test]
fn shuffle_merge_publishes_interval_hull() {
    let transport = LoopbackTransport::new();
    let endpoint = Endpoint::new("local", 7001);
    let hub = RuntimeFilterHub::new(
        UniqueId::new(2, 1),
        wait_options(2_000),
        transport.clone(),
        Some(endpoint.clone()),
    );
    transport.register_hub(endpoint.clone(), &hub);

    let desc = shuffle_desc(4, FilterKind::MinMax, PrimitiveKind::Int64, 3, 2);
    let probe_finst = UniqueId::new(2, 30);
    let consumer = hub.register_consumer(probe_finst, desc.clone()).unwrap();
    hub.register_merge_coordinator(
        FilterId::new(4),
        ColumnBinding::new(PrimitiveKind::Int64),
        WrapperParams::default(),
        2,
        vec![ConsumerTarget {
            endpoint: endpoint.clone(),
            fragment_instance_id: probe_finst,
        }],
    );

    let producer_a = hub
        .register_producer(UniqueId::new(2, 10), desc.clone(), 1)
        .unwrap();
    let producer_b = hub
        .register_producer(UniqueId::new(2, 11), desc, 2)
        .unwrap();

    producer_a
        .insert_batch(&int64_array(&[Some(1), Some(100)]), None)
        .unwrap();
    producer_b
        .insert_batch(&int64_array(&[Some(50), Some(200)]), None)
        .unwrap();
    producer_a.finalize_and_publish().unwrap();
    producer_b.finalize_and_publish().unwrap();

    assert!(consumer.instance().await_ready());
    let merged = consumer.instance().wrapper_snapshot();
    assert!(merged.probe_key(Some(&FilterKey::I64(150))).unwrap());
    assert!(!merged.probe_key(Some(&FilterKey::I64(250))).unwrap());
    assert!(!merged.probe_key(Some(&FilterKey::I64(0))).unwrap());
}

#[test]
fn merge_coordinator_ignores_duplicate_contributions() {
    use quartzite::exec::runtime_filter::codec::encode_filter;
    use quartzite::exec::runtime_filter::FilterWrapper;
    use quartzite::runtime::coordinator::MergeCoordinator;

    let transport = LoopbackTransport::new();
    let endpoint = Endpoint::new("local", 7002);
    let hub = RuntimeFilterHub::new(
        UniqueId::new(3, 1),
        wait_options(2_000),
        transport.clone(),
        Some(endpoint.clone()),
    );
    transport.register_hub(endpoint.clone(), &hub);
    let desc = shuffle_desc(8, FilterKind::MinMax, PrimitiveKind::Int64, 3, 2);
    let consumer = hub
        .register_consumer(UniqueId::new(3, 30), desc.clone())
        .unwrap();

    let coordinator = MergeCoordinator::new(
        UniqueId::new(3, 1),
        FilterId::new(8),
        ColumnBinding::new(PrimitiveKind::Int64),
        WrapperParams::default(),
        2,
        vec![ConsumerTarget {
            endpoint,
            fragment_instance_id: UniqueId::new(3, 30),
        }],
        transport.clone(),
        1,
        1 << 20,
    );

    let make_payload = |lo: i64, hi: i64| {
        let mut wrapper = FilterWrapper::new(
            FilterKind::MinMax,
            ColumnBinding::new(PrimitiveKind::Int64),
            WrapperParams::default(),
            None,
        )
        .unwrap();
        wrapper.insert_key(Some(FilterKey::I64(lo))).unwrap();
        wrapper.insert_key(Some(FilterKey::I64(hi))).unwrap();
        encode_filter(FilterId::new(8), &wrapper).unwrap()
    };

    let payload_a = make_payload(1, 100);
    let payload_b = make_payload(50, 200);

    // Duplicate deliveries from producer 1 must not complete the merge.
    assert!(!coordinator.accept(1, &payload_a).unwrap());
    assert!(!coordinator.accept(1, &payload_a).unwrap());
    assert!(!coordinator.accept(1, &payload_b).unwrap());
    assert!(!consumer.instance().is_ready());

    // The second distinct producer completes and broadcasts.
    assert!(coordinator.accept(2, &payload_b).unwrap());
    assert!(consumer.instance().is_ready());
    // Post-completion contributions are discarded.
    assert!(!coordinator.accept(3, &payload_a).unwrap());

    let merged = consumer.instance().wrapper_snapshot();
    assert!(merged.probe_key(Some(&FilterKey::I64(150))).unwrap());
    assert!(!merged.probe_key(Some(&FilterKey::I64(250))).unwrap());
}

#[test]
fn await_timeout_is_terminal_and_late_publish_is_discarded() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(4, 1), wait_options(20), transport, None);
    let consumer = hub
        .register_consumer(
            UniqueId::new(4, 20),
            filter_desc(2, FilterKind::In, PrimitiveKind::Int32, 9),
        )
        .unwrap();

    let start = Instant::now();
    assert!(!consumer.instance().await_ready());
    assert!(start.elapsed() >= Duration::from_millis(15));

    let mut scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![consumer.clone()],
        false,
    );
    let result = scan.acquire_and_push_down(true);
    assert_eq!(result.applied, 0);
    assert_eq!(result.timed_out, 1);

    // The scan proceeds with the conjunct tree unchanged.
    let chunk = int32_chunk(SlotId::new(9), &[Some(5), Some(7)]);
    let filtered = scan.apply_to_chunk(chunk).unwrap().unwrap();
    assert_eq!(chunk_values_i32(&filtered, SlotId::new(9)), vec![5, 7]);

    // A publish arriving after the deadline must not alter results.
    std::thread::sleep(Duration::from_millis(50));
    let producer = hub
        .register_producer(
            UniqueId::new(4, 10),
            filter_desc(2, FilterKind::In, PrimitiveKind::Int32, 9),
            0,
        )
        .unwrap();
    producer.insert_batch(&common::int32_array(&[Some(5)]), None).unwrap();
    producer.finalize_and_publish().unwrap();
    assert!(!consumer.instance().is_ready());
    assert_eq!(scan.try_append_late_arrivals(), 0);
    let chunk = int32_chunk(SlotId::new(9), &[Some(5), Some(7)]);
    let filtered = scan.apply_to_chunk(chunk).unwrap().unwrap();
    assert_eq!(chunk_values_i32(&filtered, SlotId::new(9)), vec![5, 7]);
}

#[test]
fn empty_build_short_circuits_scan_to_eof() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(5, 1), wait_options(1_000), transport, None);
    let producer = hub
        .register_producer(
            UniqueId::new(5, 10),
            filter_desc(3, FilterKind::In, PrimitiveKind::Int32, 9),
            0,
        )
        .unwrap();
    let consumer = hub
        .register_consumer(
            UniqueId::new(5, 20),
            filter_desc(3, FilterKind::In, PrimitiveKind::Int32, 9),
        )
        .unwrap();

    // Build side finished with zero rows.
    producer.publish_finally();
    assert!(consumer.instance().await_ready());

    let mut scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![consumer],
        false,
    );
    scan.acquire_and_push_down(true);
    assert!(scan.eos());
    let chunk = int32_chunk(SlotId::new(9), &[Some(1), Some(2), Some(3)]);
    assert!(scan.apply_to_chunk(chunk).unwrap().is_none());
}

#[test]
fn cancellation_wakes_waiters_and_disables_filters() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(6, 1), wait_options(60_000), transport, None);
    let consumer = hub
        .register_consumer(
            UniqueId::new(6, 20),
            filter_desc(5, FilterKind::Bloom, PrimitiveKind::Int64, 3),
        )
        .unwrap();

    let instance = consumer.instance().clone();
    let waiter = std::thread::spawn(move || instance.await_ready());
    std::thread::sleep(Duration::from_millis(20));
    hub.cancel();
    // The waiter wakes immediately instead of sleeping out the minute.
    assert!(waiter.join().unwrap());
    assert!(consumer.instance().is_ignored());
    assert!(consumer.instance().push_predicates().unwrap().is_empty());
}

#[test]
fn producer_without_merger_degrades_to_ignored() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(7, 1), wait_options(10_000), transport, None);
    let desc = shuffle_desc(6, FilterKind::MinMax, PrimitiveKind::Int64, 3, 2);
    let consumer = hub
        .register_consumer(UniqueId::new(7, 20), desc.clone())
        .unwrap();
    let producer = hub.register_producer(UniqueId::new(7, 10), desc, 0).unwrap();
    producer
        .insert_batch(&int64_array(&[Some(1)]), None)
        .unwrap();
    // No coordinator endpoint is configured: the filter silently degrades
    // and local consumers unblock.
    producer.finalize_and_publish().unwrap();
    assert!(consumer.instance().await_ready());
    assert!(consumer.instance().is_ignored());
}
