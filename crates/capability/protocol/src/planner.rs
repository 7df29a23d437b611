//! 读取规划：把点位映射合并成尽量少的连续读取区间。
//!
//! 同一单元类型内按地址排序，相邻点位间隔不超过 `max_gap` 且合并后长度不超过
//! `max_batch` 时合并为一个区间。

use domain::{PointMapping, UnitKind, UnitRange};
use std::collections::BTreeMap;

/// 合并参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_gap: u16,
    pub max_batch: u16,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_gap: 5,
            max_batch: 100,
        }
    }
}

/// 生成读取区间，结果按 (单元类型, 起始地址) 有序。
pub fn plan_reads(mappings: &[PointMapping], limits: PlanLimits) -> Vec<UnitRange> {
    let max_batch = u32::from(limits.max_batch.max(1));
    let max_gap = u32::from(limits.max_gap);

    let mut by_kind: BTreeMap<UnitKind, Vec<(u32, u32)>> = BTreeMap::new();
    for mapping in mappings {
        let start = u32::from(mapping.source_unit_address);
        let end = (start + u32::from(mapping.unit_span())).min(u32::from(u16::MAX) + 1);
        by_kind.entry(mapping.unit_kind).or_default().push((start, end));
    }

    let mut ranges = Vec::new();
    for (kind, mut spans) in by_kind {
        spans.sort_unstable();
        let mut current: Option<(u32, u32)> = None;
        for (start, end) in spans {
            current = match current {
                Some((cur_start, cur_end)) => {
                    let merged_end = cur_end.max(end);
                    if start <= cur_end + max_gap && merged_end - cur_start <= max_batch {
                        Some((cur_start, merged_end))
                    } else {
                        ranges.push(to_range(kind, cur_start, cur_end));
                        Some((start, end))
                    }
                }
                None => Some((start, end)),
            };
        }
        if let Some((start, end)) = current {
            ranges.push(to_range(kind, start, end));
        }
    }
    ranges
}

fn to_range(kind: UnitKind, start: u32, end: u32) -> UnitRange {
    UnitRange::new(kind, start as u16, (end - start) as u16)
}
