//! 寄存器字组合与位提取。

use domain::{RegisterFormat, WordOrder};

/// 提取第 `bit_offset` 位（0 为最低位）。
pub fn extract_bit(unit: u16, bit_offset: u8) -> bool {
    (unit >> bit_offset) & 1 == 1
}

/// 按格式与字序把寄存器组合为数值；寄存器数量不足时返回 `None`。
pub fn combine_registers(
    registers: &[u16],
    format: RegisterFormat,
    word_order: WordOrder,
) -> Option<f64> {
    let needed = format.register_count() as usize;
    if registers.len() < needed {
        return None;
    }

    let value = match format {
        RegisterFormat::U16 => registers[0] as f64,
        RegisterFormat::I16 => registers[0] as i16 as f64,
        RegisterFormat::U32 => join_words(registers, word_order) as f64,
        RegisterFormat::I32 => join_words(registers, word_order) as i32 as f64,
        RegisterFormat::F32 => f32::from_bits(join_words(registers, word_order)) as f64,
    };
    Some(value)
}

fn join_words(registers: &[u16], word_order: WordOrder) -> u32 {
    let (high, low) = match word_order {
        WordOrder::HighFirst => (registers[0], registers[1]),
        WordOrder::LowFirst => (registers[1], registers[0]),
    };
    ((high as u32) << 16) | low as u32
}
