//! 通道定义与连接参数。

use crate::point::UnitKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type ChannelId = u32;

/// 通道协议类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    ModbusTcp,
    ModbusRtu,
    Virtual,
}

impl ProtocolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModbusTcp => "modbus_tcp",
            Self::ModbusRtu => "modbus_rtu",
            Self::Virtual => "virtual",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协议相关连接参数（按 `protocol` 字段区分）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ConnectionParams {
    ModbusTcp(ModbusTcpParams),
    ModbusRtu(ModbusRtuParams),
    Virtual(VirtualParams),
}

impl ConnectionParams {
    pub fn protocol(&self) -> ProtocolKind {
        match self {
            Self::ModbusTcp(_) => ProtocolKind::ModbusTcp,
            Self::ModbusRtu(_) => ProtocolKind::ModbusRtu,
            Self::Virtual(_) => ProtocolKind::Virtual,
        }
    }
}

/// Modbus TCP 连接参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusTcpParams {
    /// 从设备主机地址
    pub host: String,
    /// 端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID (1-247)
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
}

/// Modbus RTU 串口参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModbusRtuParams {
    /// 串口设备路径（如 /dev/ttyUSB0）
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// 虚拟设备参数：按名称共享的内存寄存器组，可带初始值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualParams {
    pub device: String,
    #[serde(default)]
    pub units: Vec<VirtualUnit>,
}

/// 虚拟设备初始单元值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualUnit {
    #[serde(default)]
    pub kind: UnitKind,
    pub address: u16,
    pub value: u16,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_slave_id() -> u8 {
    1
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// 适配器运行位置：进程内，或通过 RPC 边界访问的独立进程。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdapterLocation {
    #[default]
    InProcess,
    Remote { endpoint: String },
}

/// 通道：一条到现场设备的独立连接配置。
///
/// 运行期状态（连接状态、最近错误）由通道运行时持有，见 [`ChannelState`]。
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub params: ConnectionParams,
    pub adapter: AdapterLocation,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Channel {
    /// 以默认超时（连接 5s、读取 3s）构造进程内通道。
    pub fn new(
        id: ChannelId,
        name: impl Into<String>,
        params: ConnectionParams,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            adapter: AdapterLocation::InProcess,
            poll_interval,
            connect_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(3000),
        }
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.params.protocol()
    }
}

/// 通道连接状态机
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
