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
//! Late-arrival and cooperative-wait behavior of the scan filter context.

mod common;

use quartzite::common::ids::SlotId;
use quartzite::common::types::{PrimitiveKind, UniqueId};
use quartzite::exec::scan::ScanFilterContext;
use quartzite::exec::runtime_filter::FilterKind;
use quartzite::runtime::hub::RuntimeFilterHub;
use quartzite::runtime::instance::QueryOptions;
use quartzite::runtime::transport::LoopbackTransport;
use quartzite::runtime::wait::ExecMode;

use common::{chunk_values_i32, filter_desc, int32_chunk, int32_array, key_slot, wait_options};

#[test]
fn late_arrival_matches_filter_available_from_start() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(10, 1), wait_options(5_000), transport, None);
    let desc = filter_desc(1, FilterKind::In, PrimitiveKind::Int32, 9);

    let producer = hub
        .register_producer(UniqueId::new(10, 10), desc.clone(), 0)
        .unwrap();
    let late_consumer = hub
        .register_consumer(UniqueId::new(10, 20), desc.clone())
        .unwrap();
    let upfront_consumer = hub
        .register_consumer(UniqueId::new(10, 21), desc.clone())
        .unwrap();

    let mut late_scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![late_consumer],
        false,
    );

    // First batch runs before the filter is ready: nothing is applied.
    let first = late_scan.acquire_and_push_down(false);
    assert_eq!(first.applied, 0);
    let batch1 = int32_chunk(SlotId::new(9), &[Some(1), Some(7), Some(9)]);
    let out1 = late_scan.apply_to_chunk(batch1).unwrap().unwrap();
    assert_eq!(chunk_values_i32(&out1, SlotId::new(9)), vec![1, 7, 9]);

    // The build completes between batches.
    producer
        .insert_batch(&int32_array(&[Some(7), Some(11)]), None)
        .unwrap();
    producer.finalize_and_publish().unwrap();
    assert_eq!(late_scan.try_append_late_arrivals(), 1);
    // The replaced context stays alive until the in-flight batch drains.
    late_scan.batch_drained();

    let mut upfront_scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![upfront_consumer],
        false,
    );
    upfront_scan.acquire_and_push_down(true);

    let batch2 = &[Some(5), Some(7), Some(11), Some(12)];
    let late_out = late_scan
        .apply_to_chunk(int32_chunk(SlotId::new(9), batch2))
        .unwrap()
        .unwrap();
    let upfront_out = upfront_scan
        .apply_to_chunk(int32_chunk(SlotId::new(9), batch2))
        .unwrap()
        .unwrap();
    assert_eq!(
        chunk_values_i32(&late_out, SlotId::new(9)),
        chunk_values_i32(&upfront_out, SlotId::new(9))
    );
    assert_eq!(chunk_values_i32(&late_out, SlotId::new(9)), vec![7, 11]);
}

#[test]
fn cooperative_scan_reports_blocked_instead_of_sleeping() {
    let transport = LoopbackTransport::new();
    let options = QueryOptions {
        exec_mode: ExecMode::Cooperative,
        wait_ms: 60_000,
        ..QueryOptions::default()
    };
    let hub = RuntimeFilterHub::new(UniqueId::new(11, 1), options, transport, None);
    let desc = filter_desc(2, FilterKind::In, PrimitiveKind::Int32, 9);
    let producer = hub
        .register_producer(UniqueId::new(11, 10), desc.clone(), 0)
        .unwrap();
    let consumer = hub.register_consumer(UniqueId::new(11, 20), desc).unwrap();

    let mut scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![consumer],
        false,
    );
    let start = std::time::Instant::now();
    let result = scan.acquire_and_push_down(true);
    // No thread parking in cooperative mode.
    assert!(start.elapsed() < std::time::Duration::from_millis(50));
    assert!(result.blocked);
    assert_eq!(result.applied, 0);

    producer
        .insert_batch(&int32_array(&[Some(3)]), None)
        .unwrap();
    producer.finalize_and_publish().unwrap();
    let result = scan.acquire_and_push_down(false);
    assert_eq!(result.applied, 1);
    assert!(!result.blocked);
    let out = scan
        .apply_to_chunk(int32_chunk(SlotId::new(9), &[Some(2), Some(3)]))
        .unwrap()
        .unwrap();
    assert_eq!(chunk_values_i32(&out, SlotId::new(9)), vec![3]);
}

#[test]
fn late_empty_build_collapses_remaining_batches() {
    let transport = LoopbackTransport::new();
    let hub = RuntimeFilterHub::new(UniqueId::new(12, 1), wait_options(5_000), transport, None);
    let desc = filter_desc(3, FilterKind::In, PrimitiveKind::Int32, 9);
    let producer = hub
        .register_producer(UniqueId::new(12, 10), desc.clone(), 0)
        .unwrap();
    let consumer = hub.register_consumer(UniqueId::new(12, 20), desc).unwrap();

    let mut scan = ScanFilterContext::new(
        vec![key_slot(9, PrimitiveKind::Int32)],
        None,
        vec![consumer],
        false,
    );
    scan.acquire_and_push_down(false);
    let out = scan
        .apply_to_chunk(int32_chunk(SlotId::new(9), &[Some(1)]))
        .unwrap();
    assert!(out.is_some());

    producer.publish_finally();
    assert_eq!(scan.try_append_late_arrivals(), 1);
    assert!(scan.eos());
    assert!(scan
        .apply_to_chunk(int32_chunk(SlotId::new(9), &[Some(1)]))
        .unwrap()
        .is_none());
}
