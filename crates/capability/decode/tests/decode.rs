use domain::{
    DataType, PointMapping, PointValueData, RawUnitBuffer, RegisterFormat, UnitKind, ValueKind,
    WordOrder,
};
use ems_decode::{decode, render_fields, DecodeWarning};

fn bit_points(first_point: u32, address: u16) -> Vec<PointMapping> {
    (0..8u8)
        .map(|bit| {
            PointMapping::new(first_point + bit as u32, DataType::Status, address).with_bit(bit)
        })
        .collect()
}

#[test]
fn bit_points_follow_register_pattern() {
    let mut buffer = RawUnitBuffer::new();
    buffer.insert(UnitKind::HoldingRegister, 0xA5, 0xA5);

    let outcome = decode(&buffer, &bit_points(1, 0xA5));
    assert!(outcome.warnings.is_empty());
    let status = &outcome.values[&DataType::Status];
    let bits: Vec<bool> = status
        .values()
        .map(|v| matches!(v, PointValueData::Bool(true)))
        .collect();
    assert_eq!(bits, vec![true, false, true, false, false, true, false, true]);
}

#[test]
fn missing_unit_skips_only_that_point() {
    let mut buffer = RawUnitBuffer::new();
    buffer.insert(UnitKind::HoldingRegister, 10, 250);

    let mappings = vec![
        PointMapping::new(1, DataType::Measurement, 10).with_scale(0.1, 0.0),
        PointMapping::new(2, DataType::Measurement, 11),
    ];
    let outcome = decode(&buffer, &mappings);
    assert_eq!(outcome.point_count(), 1);
    assert_eq!(
        outcome.values[&DataType::Measurement][&1],
        PointValueData::F64(250.0 * 0.1)
    );
    assert_eq!(
        outcome.warnings,
        vec![DecodeWarning::MissingUnit {
            point_id: 2,
            kind: UnitKind::HoldingRegister,
            address: 11,
        }]
    );
}

#[test]
fn bit_offset_above_fifteen_is_a_warning() {
    let mut buffer = RawUnitBuffer::new();
    buffer.insert(UnitKind::HoldingRegister, 0, 0xFFFF);
    let mut mapping = PointMapping::new(3, DataType::Alarm, 0);
    mapping.bit_offset = Some(16);

    let outcome = decode(&buffer, &[mapping]);
    assert!(outcome.values.is_empty());
    assert_eq!(outcome.warnings[0].point_id(), 3);
    assert!(matches!(
        outcome.warnings[0],
        DecodeWarning::BitOffsetOutOfRange { bit_offset: 16, .. }
    ));
}

#[test]
fn coils_and_integer_registers() {
    let mut buffer = RawUnitBuffer::new();
    buffer.insert(UnitKind::Coil, 4, 1);
    buffer.insert(UnitKind::InputRegister, 20, 0xFFFF);
    buffer.insert(UnitKind::InputRegister, 21, 0xFFFE);

    let mappings = vec![
        PointMapping::new(1, DataType::Status, 4).with_unit_kind(UnitKind::Coil),
        PointMapping::new(2, DataType::Control, 20)
            .with_unit_kind(UnitKind::InputRegister)
            .with_format(RegisterFormat::I32, WordOrder::HighFirst)
            .with_value_kind(ValueKind::Integer),
    ];
    let outcome = decode(&buffer, &mappings);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.values[&DataType::Status][&1], PointValueData::Bool(true));
    assert_eq!(outcome.values[&DataType::Control][&2], PointValueData::I64(-2));
}

#[test]
fn snapshots_only_for_types_with_values() {
    let mut buffer = RawUnitBuffer::new();
    buffer.insert(UnitKind::HoldingRegister, 0, 7);
    let mappings = vec![PointMapping::new(1, DataType::Measurement, 0)];

    let snapshots = decode(&buffer, &mappings).snapshots(9, 1_700_000_000_000);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].channel_id, 9);
    assert_eq!(snapshots[0].data_type, DataType::Measurement);
    assert_eq!(
        render_fields(&snapshots[0]),
        vec![("1".to_string(), "7.000000".to_string())]
    );
}
