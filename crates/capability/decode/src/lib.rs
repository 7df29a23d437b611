//! 位/寄存器解码。
//!
//! [`decode`] 是纯函数：输入一次轮询的原始单元缓冲与点位映射，输出按数据类型分组的
//! 点位值和逐点位的非致命告警。缺失的单元只跳过对应点位，不影响其他点位。

mod format;
mod registers;

pub use format::{format_measurement, render_fields, render_value};
pub use registers::{combine_registers, extract_bit};

use domain::{
    ChannelId, DataType, PointId, PointMapping, PointValueData, RawUnitBuffer, Snapshot,
    UnitKind, ValueKind,
};
use std::collections::BTreeMap;

/// 单个点位的解码告警（非致命）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeWarning {
    #[error("point {point_id}: unit {kind:?}@{address} missing from read")]
    MissingUnit {
        point_id: PointId,
        kind: UnitKind,
        address: u16,
    },
    #[error("point {point_id}: bit offset {bit_offset} out of range 0-15")]
    BitOffsetOutOfRange { point_id: PointId, bit_offset: u8 },
    #[error("point {point_id}: decoded value is not finite")]
    NonFinite { point_id: PointId },
}

impl DecodeWarning {
    pub fn point_id(&self) -> PointId {
        match self {
            Self::MissingUnit { point_id, .. }
            | Self::BitOffsetOutOfRange { point_id, .. }
            | Self::NonFinite { point_id } => *point_id,
        }
    }
}

/// 解码结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutcome {
    pub values: BTreeMap<DataType, BTreeMap<PointId, PointValueData>>,
    pub warnings: Vec<DecodeWarning>,
}

impl DecodeOutcome {
    pub fn point_count(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }

    /// 每种有值的数据类型生成一个快照；没有点位值的类型不生成。
    pub fn snapshots(&self, channel_id: ChannelId, timestamp_ms: i64) -> Vec<Snapshot> {
        self.values
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(data_type, values)| Snapshot {
                channel_id,
                data_type: *data_type,
                values: values.clone(),
                timestamp_ms,
            })
            .collect()
    }
}

/// 解码一次轮询的全部点位。
pub fn decode(buffer: &RawUnitBuffer, mappings: &[PointMapping]) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    for mapping in mappings {
        match decode_point(buffer, mapping) {
            Ok(value) => {
                outcome
                    .values
                    .entry(mapping.data_type)
                    .or_default()
                    .insert(mapping.point_id, value);
            }
            Err(warning) => outcome.warnings.push(warning),
        }
    }
    outcome
}

fn unit_at(
    buffer: &RawUnitBuffer,
    mapping: &PointMapping,
    address: u16,
) -> Result<u16, DecodeWarning> {
    buffer
        .get(mapping.unit_kind, address)
        .ok_or(DecodeWarning::MissingUnit {
            point_id: mapping.point_id,
            kind: mapping.unit_kind,
            address,
        })
}

fn decode_point(
    buffer: &RawUnitBuffer,
    mapping: &PointMapping,
) -> Result<PointValueData, DecodeWarning> {
    if let Some(bit_offset) = mapping.bit_offset {
        if bit_offset > 15 {
            return Err(DecodeWarning::BitOffsetOutOfRange {
                point_id: mapping.point_id,
                bit_offset,
            });
        }
        let unit = unit_at(buffer, mapping, mapping.source_unit_address)?;
        return Ok(PointValueData::Bool(extract_bit(unit, bit_offset)));
    }

    if mapping.unit_kind.is_bit() {
        let unit = unit_at(buffer, mapping, mapping.source_unit_address)?;
        return Ok(PointValueData::Bool(unit != 0));
    }

    let count = mapping.format.register_count();
    let mut registers = Vec::with_capacity(count as usize);
    for index in 0..count {
        let address = mapping.source_unit_address.checked_add(index).ok_or(
            DecodeWarning::MissingUnit {
                point_id: mapping.point_id,
                kind: mapping.unit_kind,
                address: mapping.source_unit_address,
            },
        )?;
        registers.push(unit_at(buffer, mapping, address)?);
    }

    let raw = combine_registers(&registers, mapping.format, mapping.word_order).ok_or(
        DecodeWarning::MissingUnit {
            point_id: mapping.point_id,
            kind: mapping.unit_kind,
            address: mapping.source_unit_address,
        },
    )?;
    let value = raw * mapping.scale + mapping.offset;
    if !value.is_finite() {
        return Err(DecodeWarning::NonFinite {
            point_id: mapping.point_id,
        });
    }

    Ok(match mapping.value_kind {
        ValueKind::Float => PointValueData::F64(value),
        ValueKind::Integer => PointValueData::I64(value.trunc() as i64),
        ValueKind::Boolean => PointValueData::Bool(value != 0.0),
    })
}
