//! Modbus TCP 适配器
//!
//! 每个句柄对应一条到从设备的 TCP 会话；读取按区间依次发起 FC01-04 请求。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let adapter = ModbusTcpAdapter::new();
//! let handle = adapter.connect(&channel.params).await?;
//! let buffer = adapter.read_units(handle, &ranges).await?;
//! adapter.close(handle).await;
//! ```

use crate::adapter::{AdapterHandle, ProtocolAdapter, SessionTable};
use crate::error::{connect_error_from_io, read_error_from_io, ConnectError, ReadError};
use async_trait::async_trait;
use domain::{ConnectionParams, RawUnitBuffer, UnitKind, UnitRange};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tracing::{debug, info};

/// Modbus TCP 适配器
pub struct ModbusTcpAdapter {
    sessions: SessionTable<Context>,
}

impl ModbusTcpAdapter {
    pub fn new() -> Self {
        Self {
            sessions: SessionTable::new(),
        }
    }
}

impl Default for ModbusTcpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for ModbusTcpAdapter {
    fn name(&self) -> &'static str {
        "modbus_tcp"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<AdapterHandle, ConnectError> {
        let ConnectionParams::ModbusTcp(params) = params else {
            return Err(ConnectError::InvalidParams(format!(
                "modbus_tcp adapter cannot handle {} params",
                params.protocol()
            )));
        };

        let addr = tokio::net::lookup_host((params.host.as_str(), params.port))
            .await
            .map_err(|e| ConnectError::InvalidParams(format!("invalid address: {}", e)))?
            .next()
            .ok_or_else(|| {
                ConnectError::InvalidParams(format!("no address for {}", params.host))
            })?;

        let ctx = tcp::connect_slave(addr, Slave(params.slave_id))
            .await
            .map_err(connect_error_from_io)?;
        let handle = self.sessions.insert(ctx);

        info!(
            target: "ems.protocol",
            %addr,
            slave = params.slave_id,
            handle = %handle,
            "modbus_tcp_connected"
        );
        Ok(handle)
    }

    async fn read_units(
        &self,
        handle: AdapterHandle,
        ranges: &[UnitRange],
    ) -> Result<RawUnitBuffer, ReadError> {
        let session = self.sessions.get(handle)?;
        let mut ctx = session.lock().await;
        read_modbus_ranges(&mut ctx, ranges).await
    }

    async fn close(&self, handle: AdapterHandle) {
        if let Some(session) = self.sessions.remove(handle) {
            let mut ctx = session.lock().await;
            let _ = ctx.disconnect().await;
            debug!(target: "ems.protocol", handle = %handle, "modbus_tcp_closed");
        }
    }
}

/// 按区间依次读取；任一区间失败即返回错误。
pub(crate) async fn read_modbus_ranges(
    ctx: &mut Context,
    ranges: &[UnitRange],
) -> Result<RawUnitBuffer, ReadError> {
    let mut buffer = RawUnitBuffer::new();
    for range in ranges {
        if range.count == 0 {
            continue;
        }
        let values: Vec<u16> = match range.kind {
            UnitKind::Coil => bits_to_units(
                ctx.read_coils(range.start, range.count)
                    .await
                    .map_err(modbus_error)?
                    .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
            ),
            UnitKind::DiscreteInput => bits_to_units(
                ctx.read_discrete_inputs(range.start, range.count)
                    .await
                    .map_err(modbus_error)?
                    .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
            ),
            UnitKind::HoldingRegister => ctx
                .read_holding_registers(range.start, range.count)
                .await
                .map_err(modbus_error)?
                .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
            UnitKind::InputRegister => ctx
                .read_input_registers(range.start, range.count)
                .await
                .map_err(modbus_error)?
                .map_err(|e| ReadError::Exception(format!("{:?}", e)))?,
        };

        if values.len() < range.count as usize {
            return Err(ReadError::Malformed(format!(
                "expected {} units at {}, got {}",
                range.count,
                range.start,
                values.len()
            )));
        }

        debug!(
            target: "ems.protocol",
            function_code = range.kind.function_code(),
            start = range.start,
            count = range.count,
            "read modbus units"
        );
        buffer.insert_range(range.kind, range.start, &values[..range.count as usize]);
    }
    Ok(buffer)
}

fn bits_to_units(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}

fn modbus_error(err: tokio_modbus::Error) -> ReadError {
    match err {
        tokio_modbus::Error::Transport(io) => read_error_from_io(io),
        other => ReadError::Malformed(other.to_string()),
    }
}
