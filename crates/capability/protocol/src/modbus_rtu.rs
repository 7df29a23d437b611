//! Modbus RTU 适配器（串口）

use crate::adapter::{AdapterHandle, ProtocolAdapter, SessionTable};
use crate::error::{ConnectError, ReadError};
use crate::modbus_tcp::read_modbus_ranges;
use async_trait::async_trait;
use domain::{ConnectionParams, ModbusRtuParams, Parity, RawUnitBuffer, UnitRange};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, SerialPortBuilderExt, StopBits};
use tracing::{debug, info};

/// Modbus RTU 适配器
pub struct ModbusRtuAdapter {
    sessions: SessionTable<Context>,
}

impl ModbusRtuAdapter {
    pub fn new() -> Self {
        Self {
            sessions: SessionTable::new(),
        }
    }
}

impl Default for ModbusRtuAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn data_bits(bits: u8) -> Result<DataBits, ConnectError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(ConnectError::InvalidParams(format!(
            "unsupported data bits: {}",
            other
        ))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits, ConnectError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(ConnectError::InvalidParams(format!(
            "unsupported stop bits: {}",
            other
        ))),
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn open_serial(params: &ModbusRtuParams) -> Result<tokio_serial::SerialStream, ConnectError> {
    tokio_serial::new(&params.device, params.baud_rate)
        .data_bits(data_bits(params.data_bits)?)
        .parity(parity(params.parity))
        .stop_bits(stop_bits(params.stop_bits)?)
        .open_native_async()
        .map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice | tokio_serial::ErrorKind::InvalidInput => {
                ConnectError::InvalidParams(format!("{}: {}", params.device, e))
            }
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                ConnectError::InvalidParams(format!("{}: {}", params.device, e))
            }
            tokio_serial::ErrorKind::Io(std::io::ErrorKind::TimedOut) => {
                ConnectError::Timeout(format!("{}: {}", params.device, e))
            }
            _ => ConnectError::Refused(format!("{}: {}", params.device, e)),
        })
}

#[async_trait]
impl ProtocolAdapter for ModbusRtuAdapter {
    fn name(&self) -> &'static str {
        "modbus_rtu"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<AdapterHandle, ConnectError> {
        let ConnectionParams::ModbusRtu(params) = params else {
            return Err(ConnectError::InvalidParams(format!(
                "modbus_rtu adapter cannot handle {} params",
                params.protocol()
            )));
        };

        let serial = open_serial(params)?;
        let ctx = rtu::attach_slave(serial, Slave(params.slave_id));
        let handle = self.sessions.insert(ctx);

        info!(
            target: "ems.protocol",
            device = %params.device,
            baud_rate = params.baud_rate,
            slave = params.slave_id,
            handle = %handle,
            "modbus_rtu_connected"
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
            debug!(target: "ems.protocol", handle = %handle, "modbus_rtu_closed");
        }
    }
}
