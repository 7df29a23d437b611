mod common;

use common::{InFlight, ScriptedAdapter, bit_mappings, publisher, scripted_channel, wait_for};
use domain::{Channel, ChannelState, ConnectionParams, UnitKind, VirtualParams, VirtualUnit};
use ems_pipeline::{Publisher, PublisherConfig};
use ems_polling::{Scheduler, SchedulerConfig, SchedulerError};
use ems_protocol::{AdapterFactory, VirtualDeviceRegistry};
use ems_storage::InMemorySnapshotStore;
use std::sync::Arc;
use std::time::Duration;

fn config(max_concurrent_polls: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_polls,
        poll_timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        ..SchedulerConfig::default()
    }
}

async fn run_ceiling(channels: u32, ceiling: usize) -> (usize, Vec<u64>) {
    let in_flight = Arc::new(InFlight::default());
    let store = Arc::new(InMemorySnapshotStore::new());
    let mut scheduler = Scheduler::new(config(ceiling), publisher(store));
    let mut adapters = Vec::new();
    for id in 1..=channels {
        let adapter = Arc::new(ScriptedAdapter::new(
            Duration::from_millis(60),
            Arc::clone(&in_flight),
        ));
        adapter.set_register(0, 0xFF);
        scheduler
            .add_channel(scripted_channel(id, 20), bit_mappings(0), adapter.clone())
            .expect("add");
        adapters.push(adapter);
    }

    scheduler.start().expect("start");
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.shutdown().await;

    (in_flight.max(), adapters.iter().map(|a| a.reads()).collect())
}

#[tokio::test]
async fn ceiling_is_reached_but_never_exceeded() {
    let (max, reads) = run_ceiling(2, 2).await;
    assert_eq!(max, 2);
    assert!(reads.iter().all(|r| *r > 0));
}

#[tokio::test]
async fn extra_channel_waits_for_a_slot() {
    let before = ems_telemetry::metrics().snapshot().deferred_ticks;
    let (max, reads) = run_ceiling(3, 2).await;
    assert_eq!(max, 2);
    assert!(reads.iter().all(|r| *r > 0), "every channel polled: {:?}", reads);
    assert!(ems_telemetry::metrics().snapshot().deferred_ticks > before);
}

fn virtual_channel(id: u32, value: u16) -> Channel {
    Channel::new(
        id,
        format!("bay-{}", id),
        ConnectionParams::Virtual(VirtualParams {
            device: format!("e2e-{}", id),
            units: vec![VirtualUnit {
                kind: UnitKind::HoldingRegister,
                address: 0,
                value,
            }],
        }),
        Duration::from_millis(50),
    )
}

#[tokio::test]
async fn two_channels_publish_sixteen_bit_values() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let factory =
        AdapterFactory::new().with_virtual_devices(Arc::new(VirtualDeviceRegistry::new()));
    let mut scheduler = Scheduler::new(config(4), publisher(store.clone()));
    for (id, value) in [(1, 0xA5), (2, 0x5A)] {
        let channel = virtual_channel(id, value);
        let adapter = factory.for_channel(&channel);
        scheduler
            .add_channel(channel, bit_mappings(0), adapter)
            .expect("add");
    }
    let status = scheduler.status();
    scheduler.start().expect("start");

    let ready = wait_for(Duration::from_secs(3), || {
        status
            .list_statuses()
            .iter()
            .all(|s| s.active_point_count == 8)
    })
    .await;
    assert!(ready, "both channels published");

    let mut values = Vec::new();
    for channel_id in [1, 2] {
        for point in 1..=8 {
            let value = store
                .field(&format!("comsrv:{}:s", channel_id), &point.to_string())
                .expect("field");
            values.push(value);
        }
    }
    let expected: Vec<String> = [0xA5u16, 0x5A]
        .iter()
        .flat_map(|v| (0..8).map(move |k| ((v >> k) & 1).to_string()))
        .collect();
    assert_eq!(values.len(), 16);
    assert_eq!(values, expected);
    assert!(store.field("comsrv:1:s", "_timestamp").is_some());

    for channel_status in status.list_statuses() {
        assert!(channel_status.connected);
        assert_eq!(channel_status.state, ChannelState::Connected);
    }

    scheduler.shutdown().await;
    for channel_status in status.list_statuses() {
        assert!(!channel_status.connected);
        assert_eq!(channel_status.state, ChannelState::Disconnected);
    }
}

#[tokio::test]
async fn poll_timeout_reclaims_the_slot() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let mut scheduler = Scheduler::new(
        SchedulerConfig {
            poll_timeout: Duration::from_millis(100),
            ..config(1)
        },
        publisher(store.clone()),
    );

    let in_flight = Arc::new(InFlight::default());
    let stuck = Arc::new(ScriptedAdapter::new(
        Duration::from_secs(30),
        Arc::clone(&in_flight),
    ));
    let mut stuck_channel = scripted_channel(1, 20);
    stuck_channel.read_timeout = Duration::from_secs(60);
    scheduler
        .add_channel(stuck_channel, bit_mappings(0), stuck.clone())
        .expect("add");

    let healthy = Arc::new(ScriptedAdapter::new(Duration::ZERO, in_flight));
    healthy.set_register(0, 0x01);
    scheduler
        .add_channel(scripted_channel(2, 20), bit_mappings(0), healthy.clone())
        .expect("add");

    let status = scheduler.status();
    scheduler.start().expect("start");

    let progressed = wait_for(Duration::from_secs(3), || {
        status
            .get_status(2)
            .is_some_and(|s| s.active_point_count == 8)
    })
    .await;
    assert!(progressed, "healthy channel still polled");

    let stuck_status = status.get_status(1).expect("status");
    assert!(
        stuck_status
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("poll cycle exceeded"))
    );
    assert!(stuck.closes() >= 1);
    assert_eq!(store.field("comsrv:2:s", "1").as_deref(), Some("1"));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn slow_store_does_not_close_field_session() {
    let store = Arc::new(InMemorySnapshotStore::new());
    store.set_write_delay(Duration::from_millis(200));
    let publisher = Arc::new(Publisher::new(
        store.clone(),
        PublisherConfig {
            max_retries: 3,
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            write_timeout: Duration::from_millis(100),
            ..PublisherConfig::default()
        },
    ));
    let mut scheduler = Scheduler::new(
        SchedulerConfig {
            poll_timeout: Duration::from_millis(300),
            ..config(1)
        },
        publisher,
    );

    let adapter = Arc::new(ScriptedAdapter::new(Duration::ZERO, Arc::new(InFlight::default())));
    adapter.set_register(0, 0xA5);
    scheduler
        .add_channel(scripted_channel(1, 20), bit_mappings(0), adapter.clone())
        .expect("add");

    let status = scheduler.status();
    scheduler.start().expect("start");

    let dropped = wait_for(Duration::from_secs(3), || {
        status
            .get_status(1)
            .is_some_and(|s| s.publish_failures >= 2)
    })
    .await;
    assert!(dropped, "snapshots dropped after publish retries");

    let channel_status = status.get_status(1).expect("status");
    assert_eq!(channel_status.state, ChannelState::Connected);
    assert!(channel_status.connected);
    assert_eq!(channel_status.last_error, None);
    assert_eq!(channel_status.consecutive_failures, 0);
    assert_eq!(adapter.closes(), 0);
    assert_eq!(adapter.connects(), 1);
    assert!(adapter.reads() >= 2);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn lifecycle_errors_and_single_channel_stop() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let mut scheduler = Scheduler::new(config(2), publisher(store));
    let in_flight = Arc::new(InFlight::default());
    let first = Arc::new(ScriptedAdapter::new(Duration::ZERO, Arc::clone(&in_flight)));
    let second = Arc::new(ScriptedAdapter::new(Duration::ZERO, in_flight));

    scheduler
        .add_channel(scripted_channel(1, 20), bit_mappings(0), first.clone())
        .expect("add");
    assert_eq!(
        scheduler.add_channel(scripted_channel(1, 20), bit_mappings(0), first.clone()),
        Err(SchedulerError::DuplicateChannel(1))
    );
    assert_eq!(
        scheduler.stop_channel(1).await,
        Err(SchedulerError::NotStarted)
    );
    scheduler
        .add_channel(scripted_channel(2, 20), bit_mappings(0), second.clone())
        .expect("add");

    scheduler.start().expect("start");
    assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyStarted));
    assert_eq!(
        scheduler.add_channel(scripted_channel(3, 20), bit_mappings(0), second.clone()),
        Err(SchedulerError::AlreadyStarted)
    );
    assert_eq!(
        scheduler.stop_channel(9).await,
        Err(SchedulerError::UnknownChannel(9))
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop_channel(1).await.expect("stop");
    let status = scheduler.status();
    assert_eq!(
        status.get_status(1).expect("status").state,
        ChannelState::Disconnected
    );

    let stopped_reads = first.reads();
    let running_reads = second.reads();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(first.reads(), stopped_reads);
    assert!(second.reads() > running_reads);
    assert_eq!(scheduler.channel_ids(), vec![2]);

    scheduler.shutdown().await;
    scheduler.shutdown().await;
}
