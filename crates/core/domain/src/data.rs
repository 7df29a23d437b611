use crate::channel::ChannelId;
use crate::point::{DataType, PointId, UnitKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一次连续读取的单元区间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRange {
    pub kind: UnitKind,
    pub start: u16,
    pub count: u16,
}

impl UnitRange {
    pub fn new(kind: UnitKind, start: u16, count: u16) -> Self {
        Self { kind, start, count }
    }

    /// 区间结束地址（不含）
    pub fn end(&self) -> u32 {
        self.start as u32 + self.count as u32
    }

    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = self.start as u32;
        (start..self.end()).map(|address| address as u16)
    }
}

/// 单次轮询返回的原始单元：`(单元类型, 地址) -> 值`，位单元存为 0/1。
///
/// 仅在一次轮询周期内有效，解码后丢弃。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawUnitBuffer {
    units: BTreeMap<(UnitKind, u16), u16>,
}

impl RawUnitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: UnitKind, address: u16, value: u16) {
        self.units.insert((kind, address), value);
    }

    /// 从 `start` 开始写入连续单元值。
    pub fn insert_range(&mut self, kind: UnitKind, start: u16, values: &[u16]) {
        for (index, value) in values.iter().enumerate() {
            let address = start as usize + index;
            if address > u16::MAX as usize {
                break;
            }
            self.units.insert((kind, address as u16), *value);
        }
    }

    pub fn get(&self, kind: UnitKind, address: u16) -> Option<u16> {
        self.units.get(&(kind, address)).copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitKind, u16, u16)> + '_ {
        self.units
            .iter()
            .map(|((kind, address), value)| (*kind, *address, *value))
    }

    /// 合并另一个缓冲（同地址以后者为准）。
    pub fn merge(&mut self, other: RawUnitBuffer) {
        self.units.extend(other.units);
    }
}

/// 点位值的数据类型。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointValueData {
    I64(i64),
    F64(f64),
    Bool(bool),
}

impl PointValueData {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::I64(v) => *v as f64,
            Self::F64(v) => *v,
            Self::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// 一次轮询、一种数据类型的完整解码结果。发布后不可变，由下一次成功轮询整体替代。
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub channel_id: ChannelId,
    pub data_type: DataType,
    pub values: BTreeMap<PointId, PointValueData>,
    pub timestamp_ms: i64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
