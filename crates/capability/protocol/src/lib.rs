//! # 协议适配能力模块
//!
//! 为通道运行时提供统一的读取接口 [`ProtocolAdapter`]：
//! - **Modbus TCP / RTU**：读取线圈、离散输入、保持寄存器、输入寄存器
//! - **Virtual**：内存寄存器组，用于仿真与测试
//! - **RPC**：通过 TCP 行帧访问独立进程中托管的适配器
//!
//! ## 架构设计
//!
//! ```text
//! ChannelRuntime
//!       │ connect / read_units / close
//!       ▼
//! Arc<dyn ProtocolAdapter>  ◄── AdapterFactory::for_channel
//!       │
//!       ├── ModbusTcpAdapter
//!       ├── ModbusRtuAdapter
//!       ├── VirtualAdapter
//!       └── RpcAdapter ──TCP──► AdapterHost ──► 进程内适配器
//! ```
//!
//! 所有后端共用 [`ConnectError`] / [`ReadError`] 错误分类。
//! 读取区间由 [`plan_reads`] 从点位映射生成。

mod adapter;
mod error;
mod factory;
mod modbus_rtu;
mod modbus_tcp;
mod planner;
pub mod rpc;
mod virtual_device;

pub use adapter::{AdapterHandle, ProtocolAdapter};
pub use error::{ConnectError, ReadError};
pub use factory::AdapterFactory;
pub use modbus_rtu::ModbusRtuAdapter;
pub use modbus_tcp::ModbusTcpAdapter;
pub use planner::{plan_reads, PlanLimits};
pub use rpc::{AdapterHost, RpcAdapter, RpcClientConfig};
pub use virtual_device::{VirtualAdapter, VirtualDevice, VirtualDeviceRegistry};
