//! 发布值的字符串表示。

use domain::{DataType, PointValueData, Snapshot};

/// 遥测值固定输出六位小数；负零输出为 `0.000000`。
pub fn format_measurement(value: f64) -> String {
    let text = format!("{:.6}", value);
    if text == "-0.000000" {
        "0.000000".to_string()
    } else {
        text
    }
}

/// 按数据类型渲染单个点位值。
pub fn render_value(data_type: DataType, value: &PointValueData) -> String {
    if data_type == DataType::Measurement {
        return format_measurement(value.as_f64());
    }
    match value {
        PointValueData::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        PointValueData::I64(v) => v.to_string(),
        PointValueData::F64(v) => format_measurement(*v),
    }
}

/// 快照的哈希字段：`point_id -> 值`，按点位号升序。
pub fn render_fields(snapshot: &Snapshot) -> Vec<(String, String)> {
    snapshot
        .values
        .iter()
        .map(|(point_id, value)| (point_id.to_string(), render_value(snapshot.data_type, value)))
        .collect()
}
