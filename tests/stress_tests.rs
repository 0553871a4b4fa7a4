//! Stress tests for the relay over a lossy radio
//!
//! Run with: cargo test --test stress_tests -- --nocapture

#[path = "simulation/mod.rs"]
mod simulation;

use bytes::Bytes;
use meshrelay::broker::RecordingBroker;
use meshrelay::protocol::data_topic;
use meshrelay::queue::{DurableQueue, MemoryQueueStore};
use meshrelay::sensor::{FixedSensor, Reading};
use meshrelay::transport::{MacAddress, MemoryMesh, MemoryRadio, SharedKey, StaticLink};
use meshrelay::{EngineTimings, GatewayEngine, NodeEngine, RelayError};
use simulation::{LossyRadio, LossyRadioConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;

const KEY: SharedKey = *b"0123456789abcdef";
const GATEWAY: MacAddress = MacAddress::new([0x24, 0x6f, 0x28, 0x00, 0x00, 0xaa]);

type LossyNode = NodeEngine<LossyRadio<MemoryRadio>, FixedSensor, MemoryQueueStore>;
type TestGateway = GatewayEngine<MemoryRadio, RecordingBroker, FixedSensor, StaticLink>;

fn node_address(i: u8) -> MacAddress {
    MacAddress::new([0x24, 0x6f, 0x28, 0x00, 0x01, i])
}

/// Fast gateway, no periodic sampling or heartbeats
fn timings() -> EngineTimings {
    EngineTimings {
        gateway_tick: Duration::from_millis(1),
        heartbeat_interval: Duration::from_secs(86_400),
        sensor_interval: Duration::from_secs(86_400),
        ..EngineTimings::default()
    }
}

/// Every fourth entry needs three fragments
fn payloads(node: u8, count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| {
            let head = format!("node{node}-entry{i:02}|");
            if i % 4 == 0 {
                let mut body = head.into_bytes();
                body.resize(500, b'x');
                Bytes::from(body)
            } else {
                Bytes::from(head)
            }
        })
        .collect()
}

fn start_gateway(
    mesh: &MemoryMesh,
    broker: &RecordingBroker,
    timings: EngineTimings,
) -> tokio::task::JoinHandle<(TestGateway, Result<(), RelayError>)> {
    let mut gateway = GatewayEngine::new(
        mesh.radio(GATEWAY),
        broker.clone(),
        FixedSensor::new(None),
        StaticLink::new(true),
        KEY,
        timings,
    );

    tokio::spawn(async move {
        let result = gateway.run().await;
        (gateway, result)
    })
}

fn lossy_node(
    mesh: &MemoryMesh,
    address: MacAddress,
    entries: Vec<Bytes>,
    radio: LossyRadioConfig,
    timings: EngineTimings,
) -> LossyNode {
    let queue = DurableQueue::load(MemoryQueueStore::with_entries(entries), 64);
    NodeEngine::new(
        LossyRadio::new(mesh.radio(address), radio),
        FixedSensor::new(None),
        queue,
        KEY,
        timings,
    )
}

/// Step a node until its queue is empty or `max_steps` is reached
async fn drain_node(mut node: LossyNode, max_steps: usize) -> LossyNode {
    let tick = timings().node_tick;
    for _ in 0..max_steps {
        if node.queue().is_empty() {
            break;
        }
        node.step().await.unwrap();
        tokio::time::sleep(tick).await;
    }
    node
}

async fn stop_gateway(
    mesh: &MemoryMesh,
    handle: tokio::task::JoinHandle<(TestGateway, Result<(), RelayError>)>,
) -> TestGateway {
    mesh.shutdown();
    let (gateway, result) = handle.await.unwrap();
    assert!(matches!(result, Err(RelayError::Transport(_))));
    gateway
}

/// Rejected sends are retried, so every entry arrives exactly once and in order
#[tokio::test(start_paused = true)]
async fn test_rejected_sends_eventually_deliver_everything() {
    println!("\n=== Five nodes, 30% rejected frames ===\n");

    let mesh = MemoryMesh::new();
    let broker = RecordingBroker::new();
    let gateway = start_gateway(&mesh, &broker, timings());

    let mut tasks = Vec::new();
    for i in 1..=5u8 {
        let node = lossy_node(
            &mesh,
            node_address(i),
            payloads(i, 24),
            LossyRadioConfig::with_rejects(0.3, u64::from(i)),
            timings(),
        );
        tasks.push(tokio::spawn(drain_node(node, 5_000)));
    }

    let mut nodes = Vec::new();
    for task in tasks {
        nodes.push(task.await.unwrap());
    }

    // Let the gateway empty its inbox
    tokio::time::sleep(Duration::from_secs(1)).await;
    let gateway = stop_gateway(&mesh, gateway).await;

    for (i, node) in (1..=5u8).zip(&nodes) {
        let stats = node.radio().stats();
        println!("node {}: {}", i, stats.summary());

        assert!(node.queue().is_empty(), "node {i} still has entries");
        assert!(stats.frames_rejected.load(Ordering::Relaxed) > 0);
        assert_eq!(node.kpi().sent, 24);
        assert!(node.kpi().failures > 0);

        let delivered = broker.on_topic(&data_topic(&node_address(i)));
        assert_eq!(delivered, payloads(i, 24), "node {i} delivery mismatch");
    }

    assert_eq!(gateway.stats().reassembled, 5 * 6);
    println!("✓ {} messages published", broker.published().len());
}

/// Silently dropped frames are lost, but what arrives is intact and ordered
#[tokio::test(start_paused = true)]
async fn test_silent_drops_lose_single_frame_entries_in_order() {
    println!("\n=== Single-frame entries, 25% silent drops ===\n");

    let mesh = MemoryMesh::new();
    let broker = RecordingBroker::new();
    let gateway = start_gateway(&mesh, &broker, timings());

    let entries: Vec<Bytes> = (0..40).map(|i| Bytes::from(format!("reading-{i:02}"))).collect();
    let node = lossy_node(
        &mesh,
        node_address(1),
        entries.clone(),
        LossyRadioConfig::with_drops(0.25, 99),
        timings(),
    );
    let node = drain_node(node, 100).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    stop_gateway(&mesh, gateway).await;

    let stats = node.radio().stats();
    println!("{}", stats.summary());

    let delivered = broker.on_topic(&data_topic(&node_address(1)));
    let dropped = stats.frames_dropped.load(Ordering::Relaxed) as usize;

    assert!(node.queue().is_empty());
    assert_eq!(node.kpi().sent, 40);
    assert_eq!(delivered.len() + dropped, entries.len());

    // Delivered entries form an ordered subsequence of the queue
    let mut remaining = entries.iter();
    for payload in &delivered {
        assert!(remaining.any(|entry| entry == payload));
    }
    println!("✓ {}/{} delivered", delivered.len(), entries.len());
}

/// Lost fragments never leave state behind once the reassembly timeout passes
#[tokio::test(start_paused = true)]
async fn test_partial_messages_expire_under_drops() {
    println!("\n=== Three-part entries, 30% silent drops ===\n");

    let mesh = MemoryMesh::new();
    let broker = RecordingBroker::new();
    let gateway = start_gateway(&mesh, &broker, timings());

    let entries: Vec<Bytes> = (0..30)
        .map(|i| {
            let mut body = format!("big-{i:02}|").into_bytes();
            body.resize(500, b'y');
            Bytes::from(body)
        })
        .collect();
    let node = lossy_node(
        &mesh,
        node_address(2),
        entries.clone(),
        LossyRadioConfig::with_drops(0.3, 7),
        timings(),
    );
    let node = drain_node(node, 100).await;
    assert!(node.queue().is_empty());

    // Longer than the reassembly timeout
    tokio::time::sleep(Duration::from_secs(31)).await;
    let gateway = stop_gateway(&mesh, gateway).await;

    println!("{}", node.radio().stats().summary());
    println!("gateway: {:?}", gateway.stats());

    assert!(gateway.tracker().is_empty());

    let delivered = broker.on_topic(&data_topic(&node_address(2)));
    assert!(!delivered.is_empty());
    assert!(delivered.len() <= entries.len());
    assert!(delivered.iter().all(|payload| payload.len() == 500));
    assert_eq!(gateway.stats().reassembled, delivered.len() as u64);
    println!("✓ {} complete messages, tracker empty", delivered.len());
}

/// A node that never sees a gateway keeps the oldest readings up to capacity
/// and delivers them in order once one appears
#[tokio::test(start_paused = true)]
async fn test_queue_pressure_then_recovery() {
    println!("\n=== Gateway absent for 40 sampling periods ===\n");

    let timings = EngineTimings {
        sensor_interval: Duration::from_secs(1),
        queue_capacity: 20,
        ..timings()
    };

    let mesh = MemoryMesh::new();
    let broker = RecordingBroker::new();

    let readings = (0..200u16)
        .map(|raw| Some(Reading::Light { raw }))
        .collect();
    let mut node = NodeEngine::new(
        mesh.radio(node_address(3)),
        FixedSensor::sequence(readings),
        DurableQueue::new(MemoryQueueStore::new(), timings.queue_capacity),
        KEY,
        timings,
    );

    let mut accepted = 0;
    let mut rejected = 0;
    for _ in 0..40 {
        tokio::time::sleep(timings.sensor_interval).await;
        let step = node.step().await.unwrap();
        match step.reading_queued {
            Some(true) => accepted += 1,
            Some(false) => rejected += 1,
            None => {}
        }
    }
    println!("accepted {accepted}, rejected {rejected}");

    assert_eq!(accepted, 20);
    assert_eq!(rejected, 20);
    assert!(node.queue().is_full());

    let gateway = start_gateway(&mesh, &broker, timings);

    let mut sent = 0;
    for _ in 0..10 {
        tokio::time::sleep(timings.sensor_interval).await;
        let step = node.step().await.unwrap();
        sent += step.sent;
        if sent >= 20 {
            break;
        }
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    stop_gateway(&mesh, gateway).await;

    let delivered = broker.on_topic(&data_topic(&node_address(3)));
    let expected: Vec<Bytes> = (0..20)
        .map(|raw| Bytes::from(format!("LDR={raw}")))
        .collect();

    assert!(delivered.len() >= 20);
    assert_eq!(&delivered[..20], &expected[..]);
    println!("✓ oldest 20 readings delivered in order");
}
