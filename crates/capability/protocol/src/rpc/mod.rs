//! 适配器 RPC 边界（进程外适配器）

mod client;
mod server;
pub mod wire;

pub use client::{RpcAdapter, RpcClientConfig};
pub use server::AdapterHost;
pub use wire::DEFAULT_MAX_FRAME_BYTES;
