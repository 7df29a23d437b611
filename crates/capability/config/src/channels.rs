//! 通道表加载与校验。
//!
//! ```json
//! {
//!   "channels": [{
//!     "id": 1,
//!     "name": "bay-1",
//!     "connection": { "protocol": "modbus_tcp", "host": "10.0.0.5", "port": 502 },
//!     "adapter": { "mode": "remote", "endpoint": "127.0.0.1:7600" },
//!     "poll_interval_ms": 1000,
//!     "points": [{ "point_id": 1, "data_type": "status", "address": 0, "bit_offset": 3 }]
//!   }]
//! }
//! ```

use crate::ConfigError;
use domain::{AdapterLocation, Channel, ChannelId, ConnectionParams, PointMapping};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// 通道未声明超时时的默认值
#[derive(Debug, Clone, Copy)]
pub struct ChannelDefaults {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            read_timeout: Duration::from_millis(3_000),
        }
    }
}

/// 加载后的通道及其点位映射
#[derive(Debug, Clone)]
pub struct ChannelDefinition {
    pub channel: Channel,
    pub mappings: Vec<PointMapping>,
}

#[derive(Debug, Deserialize)]
struct ChannelTable {
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    id: ChannelId,
    #[serde(default)]
    name: Option<String>,
    connection: ConnectionParams,
    #[serde(default)]
    adapter: AdapterLocation,
    poll_interval_ms: u64,
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    read_timeout_ms: Option<u64>,
    #[serde(default)]
    points: Vec<PointMapping>,
}

pub fn load_channels(
    path: impl AsRef<Path>,
    defaults: ChannelDefaults,
) -> Result<Vec<ChannelDefinition>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|err| ConfigError::Io(format!("{}: {}", path.display(), err)))?;
    parse_channels(&content, defaults)
}

pub fn parse_channels(
    json: &str,
    defaults: ChannelDefaults,
) -> Result<Vec<ChannelDefinition>, ConfigError> {
    let table: ChannelTable =
        serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;

    let mut seen = HashSet::new();
    let mut definitions = Vec::with_capacity(table.channels.len());
    for entry in table.channels {
        if !seen.insert(entry.id) {
            return Err(ConfigError::Validation(format!(
                "duplicate channel id {}",
                entry.id
            )));
        }
        definitions.push(into_definition(entry, defaults)?);
    }
    Ok(definitions)
}

fn into_definition(
    entry: ChannelEntry,
    defaults: ChannelDefaults,
) -> Result<ChannelDefinition, ConfigError> {
    let id = entry.id;
    if entry.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(format!(
            "channel {}: poll_interval_ms must be greater than 0",
            id
        )));
    }
    validate_params(id, &entry.connection)?;
    if let AdapterLocation::Remote { endpoint } = &entry.adapter {
        if endpoint.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "channel {}: remote adapter endpoint is empty",
                id
            )));
        }
    }

    let mut point_ids = HashSet::new();
    for mapping in &entry.points {
        if !point_ids.insert(mapping.point_id) {
            return Err(ConfigError::Validation(format!(
                "channel {}: duplicate point id {}",
                id, mapping.point_id
            )));
        }
        if let Some(bit) = mapping.bit_offset {
            if bit > 15 {
                return Err(ConfigError::Validation(format!(
                    "channel {}: point {} bit_offset {} out of range 0-15",
                    id, mapping.point_id, bit
                )));
            }
        }
        if !mapping.scale.is_finite() || !mapping.offset.is_finite() {
            return Err(ConfigError::Validation(format!(
                "channel {}: point {} scale/offset must be finite",
                id, mapping.point_id
            )));
        }
    }

    let name = entry.name.unwrap_or_else(|| format!("channel-{}", id));
    let mut channel = Channel::new(
        id,
        name,
        entry.connection,
        Duration::from_millis(entry.poll_interval_ms),
    );
    channel.adapter = entry.adapter;
    channel.connect_timeout = positive_or(entry.connect_timeout_ms, defaults.connect_timeout);
    channel.read_timeout = positive_or(entry.read_timeout_ms, defaults.read_timeout);

    Ok(ChannelDefinition {
        channel,
        mappings: entry.points,
    })
}

fn positive_or(value: Option<u64>, default: Duration) -> Duration {
    match value {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => default,
    }
}

fn validate_params(id: ChannelId, params: &ConnectionParams) -> Result<(), ConfigError> {
    let problem = match params {
        ConnectionParams::ModbusTcp(tcp) if tcp.host.trim().is_empty() => Some("host is empty"),
        ConnectionParams::ModbusTcp(tcp) if tcp.port == 0 => Some("port must be non-zero"),
        ConnectionParams::ModbusRtu(rtu) if rtu.device.trim().is_empty() => {
            Some("serial device is empty")
        }
        ConnectionParams::ModbusRtu(rtu) if rtu.baud_rate == 0 => {
            Some("baud_rate must be non-zero")
        }
        ConnectionParams::Virtual(v) if v.device.trim().is_empty() => {
            Some("virtual device name is empty")
        }
        _ => None,
    };
    match problem {
        Some(problem) => Err(ConfigError::Validation(format!(
            "channel {}: {}",
            id, problem
        ))),
        None => Ok(()),
    }
}
