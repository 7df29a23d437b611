//! 通信服务核心数据模型。
//!
//! - [`channel`]：通道定义、连接参数、适配器位置、连接状态
//! - [`point`]：点位映射（数据类型、单元类型、位偏移、缩放）
//! - [`data`]：单次轮询的原始单元缓冲、解码值与快照
//! - [`status`]：对外查询的通道健康状态

pub mod channel;
pub mod data;
pub mod point;
pub mod status;

pub use channel::{
    AdapterLocation, Channel, ChannelId, ChannelState, ConnectionParams, ModbusRtuParams,
    ModbusTcpParams, Parity, ProtocolKind, VirtualParams, VirtualUnit,
};
pub use data::{PointValueData, RawUnitBuffer, Snapshot, UnitRange};
pub use point::{DataType, PointId, PointMapping, RegisterFormat, UnitKind, ValueKind, WordOrder};
pub use status::ChannelStatus;

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
