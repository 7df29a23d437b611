#![allow(dead_code)]

use async_trait::async_trait;
use domain::{
    Channel, ConnectionParams, DataType, PointMapping, RawUnitBuffer, UnitKind, UnitRange,
    VirtualParams,
};
use ems_pipeline::{Publisher, PublisherConfig};
use ems_protocol::{AdapterHandle, ConnectError, ProtocolAdapter, ReadError};
use ems_storage::InMemorySnapshotStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn publisher(store: Arc<InMemorySnapshotStore>) -> Arc<Publisher> {
    Arc::new(Publisher::new(
        store,
        PublisherConfig {
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..PublisherConfig::default()
        },
    ))
}

pub fn scripted_channel(id: u32, interval_ms: u64) -> Channel {
    Channel::new(
        id,
        format!("scripted-{}", id),
        ConnectionParams::Virtual(VirtualParams::default()),
        Duration::from_millis(interval_ms),
    )
}

pub fn bit_mappings(address: u16) -> Vec<PointMapping> {
    (0..8u8)
        .map(|bit| PointMapping::new(bit as u32 + 1, DataType::Status, address).with_bit(bit))
        .collect()
}

/// 所有脚本适配器共享的在途读取计数。
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl<'a> InFlightGuard<'a> {
    fn enter(gauge: &'a InFlight) -> Self {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.max.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 测试用适配器：只返回预置的单元，读取可设置延迟。
pub struct ScriptedAdapter {
    units: Mutex<BTreeMap<(UnitKind, u16), u16>>,
    read_delay: Duration,
    in_flight: Arc<InFlight>,
    reads: AtomicU64,
    connects: AtomicU64,
    closes: AtomicU64,
}

impl ScriptedAdapter {
    pub fn new(read_delay: Duration, in_flight: Arc<InFlight>) -> Self {
        Self {
            units: Mutex::new(BTreeMap::new()),
            read_delay,
            in_flight,
            reads: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.units
            .lock()
            .expect("units")
            .insert((UnitKind::HoldingRegister, address), value);
    }

    pub fn remove_register(&self, address: u16) {
        self.units
            .lock()
            .expect("units")
            .remove(&(UnitKind::HoldingRegister, address));
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self, _params: &ConnectionParams) -> Result<AdapterHandle, ConnectError> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(AdapterHandle(n + 1))
    }

    async fn read_units(
        &self,
        _handle: AdapterHandle,
        ranges: &[UnitRange],
    ) -> Result<RawUnitBuffer, ReadError> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        let units = self.units.lock().expect("units").clone();
        let mut buffer = RawUnitBuffer::new();
        for range in ranges {
            for address in range.addresses() {
                if let Some(value) = units.get(&(range.kind, address)) {
                    buffer.insert(range.kind, address, *value);
                }
            }
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(buffer)
    }

    async fn close(&self, _handle: AdapterHandle) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// 轮询直到条件满足或超时。
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
