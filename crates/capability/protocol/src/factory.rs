//! 适配器工厂：按通道配置选择进程内实现或 RPC 桩。

use crate::adapter::ProtocolAdapter;
use crate::modbus_rtu::ModbusRtuAdapter;
use crate::modbus_tcp::ModbusTcpAdapter;
use crate::rpc::{RpcAdapter, RpcClientConfig};
use crate::virtual_device::{VirtualAdapter, VirtualDeviceRegistry};
use domain::{AdapterLocation, Channel, ProtocolKind};
use std::sync::Arc;

pub struct AdapterFactory {
    virtual_devices: Arc<VirtualDeviceRegistry>,
    rpc: RpcClientConfig,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self {
            virtual_devices: Arc::new(VirtualDeviceRegistry::new()),
            rpc: RpcClientConfig::default(),
        }
    }

    /// 共享外部虚拟设备注册表（测试中用于注入寄存器值与故障）。
    pub fn with_virtual_devices(mut self, registry: Arc<VirtualDeviceRegistry>) -> Self {
        self.virtual_devices = registry;
        self
    }

    pub fn with_rpc_config(mut self, config: RpcClientConfig) -> Self {
        self.rpc = config;
        self
    }

    pub fn virtual_devices(&self) -> Arc<VirtualDeviceRegistry> {
        Arc::clone(&self.virtual_devices)
    }

    /// 创建进程内适配器实例
    pub fn in_process(&self, protocol: ProtocolKind) -> Arc<dyn ProtocolAdapter> {
        match protocol {
            ProtocolKind::ModbusTcp => Arc::new(ModbusTcpAdapter::new()),
            ProtocolKind::ModbusRtu => Arc::new(ModbusRtuAdapter::new()),
            ProtocolKind::Virtual => Arc::new(VirtualAdapter::new(Arc::clone(
                &self.virtual_devices,
            ))),
        }
    }

    /// 为通道创建独占的适配器实例
    pub fn for_channel(&self, channel: &Channel) -> Arc<dyn ProtocolAdapter> {
        match &channel.adapter {
            AdapterLocation::InProcess => self.in_process(channel.protocol()),
            AdapterLocation::Remote { endpoint } => {
                let mut config = self.rpc.clone();
                config.connect_timeout = channel.connect_timeout;
                config.call_timeout = channel.read_timeout;
                Arc::new(RpcAdapter::new(endpoint.clone(), config))
            }
        }
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::wire::{encode_frame, read_frame, RpcCall, RpcRequest, RpcResponse};
    use crate::rpc::DEFAULT_MAX_FRAME_BYTES;
    use domain::{ConnectionParams, RawUnitBuffer, UnitKind, UnitRange, VirtualParams};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn channel(adapter: AdapterLocation) -> Channel {
        let mut channel = Channel::new(
            1,
            "sim",
            ConnectionParams::Virtual(VirtualParams::default()),
            Duration::from_millis(100),
        );
        channel.adapter = adapter;
        channel
    }

    #[test]
    fn selects_backend_by_location() {
        let factory = AdapterFactory::new();
        assert_eq!(
            factory.for_channel(&channel(AdapterLocation::InProcess)).name(),
            "virtual"
        );
        assert_eq!(
            factory
                .for_channel(&channel(AdapterLocation::Remote {
                    endpoint: "127.0.0.1:7600".to_string()
                }))
                .name(),
            "rpc"
        );
        assert_eq!(factory.in_process(ProtocolKind::ModbusTcp).name(), "modbus_tcp");
        assert_eq!(factory.in_process(ProtocolKind::ModbusRtu).name(), "modbus_rtu");
    }

    /// 只接受一个连接的宿主：`connect` 立即应答，读取延迟 `read_delay` 后应答 0xA5。
    async fn slow_host(read_delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            while let Ok(Some(frame)) = read_frame(&mut reader, DEFAULT_MAX_FRAME_BYTES).await {
                let request: RpcRequest = serde_json::from_slice(&frame).expect("request");
                let response = match &request.call {
                    RpcCall::Connect { .. } => RpcResponse::connected(request.id, 7),
                    RpcCall::ReadUnits { ranges, .. } => {
                        tokio::time::sleep(read_delay).await;
                        let mut buffer = RawUnitBuffer::new();
                        for range in ranges {
                            for address in range.addresses() {
                                buffer.insert(range.kind, address, 0xA5);
                            }
                        }
                        RpcResponse::units(request.id, ranges, &buffer)
                    }
                    _ => RpcResponse::ok(request.id),
                };
                let frame = encode_frame(&response).expect("encode");
                if write_half.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn remote_channel_uses_its_own_read_timeout() {
        let addr = slow_host(Duration::from_millis(300)).await;
        let factory = AdapterFactory::new().with_rpc_config(RpcClientConfig {
            connect_timeout: Duration::from_millis(100),
            call_timeout: Duration::from_millis(100),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        });
        let mut remote = channel(AdapterLocation::Remote { endpoint: addr });
        remote.connect_timeout = Duration::from_secs(2);
        remote.read_timeout = Duration::from_secs(2);

        let adapter = factory.for_channel(&remote);
        let handle = adapter.connect(&remote.params).await.expect("connect");
        let ranges = [UnitRange::new(UnitKind::HoldingRegister, 0, 2)];
        let buffer = adapter
            .read_units(handle, &ranges)
            .await
            .expect("read completes within the channel read timeout");
        assert_eq!(buffer.get(UnitKind::HoldingRegister, 1), Some(0xA5));
    }
}
