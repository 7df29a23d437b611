//! 虚拟设备适配器
//!
//! 按名称共享的内存寄存器组，用于仿真通道与测试。支持故障注入：
//! 拒绝连接、读取断开、读取延迟。

use crate::adapter::{AdapterHandle, ProtocolAdapter, SessionTable};
use crate::error::{ConnectError, ReadError};
use async_trait::async_trait;
use domain::{ConnectionParams, RawUnitBuffer, UnitKind, UnitRange, VirtualUnit};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

/// 一台虚拟设备
#[derive(Default)]
pub struct VirtualDevice {
    units: RwLock<BTreeMap<(UnitKind, u16), u16>>,
    refuse_connect: AtomicBool,
    fail_reads: AtomicBool,
    read_delay_ms: AtomicU64,
    connects: AtomicU64,
    reads: AtomicU64,
}

impl VirtualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unit(&self, kind: UnitKind, address: u16, value: u16) {
        let mut units = self.units.write().unwrap_or_else(|p| p.into_inner());
        units.insert((kind, address), value);
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.set_unit(UnitKind::HoldingRegister, address, value);
    }

    pub fn unit(&self, kind: UnitKind, address: u16) -> u16 {
        let units = self.units.read().unwrap_or_else(|p| p.into_inner());
        units.get(&(kind, address)).copied().unwrap_or(0)
    }

    fn seed(&self, seed: &[VirtualUnit]) {
        let mut units = self.units.write().unwrap_or_else(|p| p.into_inner());
        for unit in seed {
            units.entry((unit.kind, unit.address)).or_insert(unit.value);
        }
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// 成功建立的会话次数
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// 已完成的读取次数
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self, ranges: &[UnitRange]) -> RawUnitBuffer {
        let units = self.units.read().unwrap_or_else(|p| p.into_inner());
        let mut buffer = RawUnitBuffer::new();
        for range in ranges {
            for address in range.addresses() {
                let value = units.get(&(range.kind, address)).copied().unwrap_or(0);
                let value = if range.kind.is_bit() {
                    u16::from(value != 0)
                } else {
                    value
                };
                buffer.insert(range.kind, address, value);
            }
        }
        buffer
    }
}

/// 虚拟设备注册表（按名称查找，首次连接时创建）
#[derive(Default)]
pub struct VirtualDeviceRegistry {
    devices: RwLock<HashMap<String, Arc<VirtualDevice>>>,
}

impl VirtualDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<VirtualDevice> {
        if let Some(device) = self
            .devices
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
        {
            return Arc::clone(device);
        }
        let mut devices = self.devices.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(devices.entry(name.to_string()).or_default())
    }

    pub fn get(&self, name: &str) -> Option<Arc<VirtualDevice>> {
        self.devices
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }
}

/// 虚拟设备适配器
pub struct VirtualAdapter {
    registry: Arc<VirtualDeviceRegistry>,
    sessions: SessionTable<Arc<VirtualDevice>>,
}

impl VirtualAdapter {
    pub fn new(registry: Arc<VirtualDeviceRegistry>) -> Self {
        Self {
            registry,
            sessions: SessionTable::new(),
        }
    }

    /// 当前打开的会话数
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl ProtocolAdapter for VirtualAdapter {
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<AdapterHandle, ConnectError> {
        let ConnectionParams::Virtual(params) = params else {
            return Err(ConnectError::InvalidParams(format!(
                "virtual adapter cannot handle {} params",
                params.protocol()
            )));
        };
        if params.device.is_empty() {
            return Err(ConnectError::InvalidParams(
                "virtual device name is empty".to_string(),
            ));
        }

        let device = self.registry.get_or_create(&params.device);
        if device.refuse_connect.load(Ordering::SeqCst) {
            return Err(ConnectError::Refused(format!(
                "virtual device {} refused connection",
                params.device
            )));
        }
        device.seed(&params.units);
        device.connects.fetch_add(1, Ordering::SeqCst);
        let handle = self.sessions.insert(device);
        debug!(
            target: "ems.protocol",
            device = %params.device,
            handle = %handle,
            "virtual_connected"
        );
        Ok(handle)
    }

    async fn read_units(
        &self,
        handle: AdapterHandle,
        ranges: &[UnitRange],
    ) -> Result<RawUnitBuffer, ReadError> {
        let session = self.sessions.get(handle)?;
        let device = Arc::clone(&*session.lock().await);

        let delay = device.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if device.fail_reads.load(Ordering::SeqCst) {
            return Err(ReadError::Disconnected(
                "virtual device dropped the session".to_string(),
            ));
        }

        let buffer = device.read(ranges);
        device.reads.fetch_add(1, Ordering::SeqCst);
        Ok(buffer)
    }

    async fn close(&self, handle: AdapterHandle) {
        self.sessions.remove(handle);
    }
}
