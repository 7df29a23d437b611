//! 点位映射：逻辑点位与通道原始单元之间的对应关系。

use serde::{Deserialize, Serialize};

pub type PointId = u32;

/// 点位数据类型（四遥）。发布键中的类型码分别为 m/s/c/a。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[serde(alias = "m")]
    Measurement,
    #[serde(alias = "s")]
    Status,
    #[serde(alias = "c")]
    Control,
    #[serde(alias = "a")]
    Alarm,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Measurement,
        DataType::Status,
        DataType::Control,
        DataType::Alarm,
    ];

    pub fn type_code(self) -> &'static str {
        match self {
            Self::Measurement => "m",
            Self::Status => "s",
            Self::Control => "c",
            Self::Alarm => "a",
        }
    }

    pub fn from_type_code(code: &str) -> Option<Self> {
        match code {
            "m" => Some(Self::Measurement),
            "s" => Some(Self::Status),
            "c" => Some(Self::Control),
            "a" => Some(Self::Alarm),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_code())
    }
}

/// 原始单元类型（对应 Modbus 功能码 01/02/03/04）
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Coil,
    DiscreteInput,
    #[default]
    HoldingRegister,
    InputRegister,
}

impl UnitKind {
    /// 单元是否为位（线圈/离散输入）
    pub fn is_bit(self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    pub fn function_code(self) -> u8 {
        match self {
            Self::Coil => 1,
            Self::DiscreteInput => 2,
            Self::HoldingRegister => 3,
            Self::InputRegister => 4,
        }
    }
}

/// 寄存器数值格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterFormat {
    #[default]
    U16,
    I16,
    U32,
    I32,
    F32,
}

impl RegisterFormat {
    /// 占用的寄存器个数
    pub fn register_count(self) -> u16 {
        match self {
            Self::U16 | Self::I16 => 1,
            Self::U32 | Self::I32 | Self::F32 => 2,
        }
    }
}

/// 多寄存器字序：HighFirst 为 ABCD，LowFirst 为 CDAB。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    #[default]
    HighFirst,
    LowFirst,
}

/// 解码后数值的表示
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Float,
    Integer,
    Boolean,
}

/// 点位映射。加载后不可变；同一通道内 `point_id` 唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMapping {
    pub point_id: PointId,
    pub data_type: DataType,
    #[serde(alias = "address")]
    pub source_unit_address: u16,
    #[serde(default)]
    pub unit_kind: UnitKind,
    /// 寄存器内位偏移（0 为最低位，0-15）
    #[serde(default)]
    pub bit_offset: Option<u8>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub value_kind: ValueKind,
    #[serde(default)]
    pub format: RegisterFormat,
    #[serde(default)]
    pub word_order: WordOrder,
}

fn default_scale() -> f64 {
    1.0
}

impl PointMapping {
    /// 单寄存器、缩放 1.0 的保持寄存器点位。
    pub fn new(point_id: PointId, data_type: DataType, source_unit_address: u16) -> Self {
        Self {
            point_id,
            data_type,
            source_unit_address,
            unit_kind: UnitKind::default(),
            bit_offset: None,
            scale: default_scale(),
            offset: 0.0,
            value_kind: ValueKind::default(),
            format: RegisterFormat::default(),
            word_order: WordOrder::default(),
        }
    }

    pub fn with_bit(mut self, bit_offset: u8) -> Self {
        self.bit_offset = Some(bit_offset);
        self.value_kind = ValueKind::Boolean;
        self
    }

    pub fn with_unit_kind(mut self, unit_kind: UnitKind) -> Self {
        self.unit_kind = unit_kind;
        self
    }

    pub fn with_scale(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn with_format(mut self, format: RegisterFormat, word_order: WordOrder) -> Self {
        self.format = format;
        self.word_order = word_order;
        self
    }

    pub fn with_value_kind(mut self, value_kind: ValueKind) -> Self {
        self.value_kind = value_kind;
        self
    }

    /// 本点位需要读取的连续单元数。
    pub fn unit_span(&self) -> u16 {
        if self.unit_kind.is_bit() || self.bit_offset.is_some() {
            1
        } else {
            self.format.register_count()
        }
    }
}
