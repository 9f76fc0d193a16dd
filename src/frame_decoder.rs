use crate::error::DecodeError;
use std::collections::HashMap;

/// Responses of this many bytes or fewer are incomplete.
pub const MIN_FRAME_LEN: usize = 91;
/// Upper bound of a single response read.
pub const MAX_FRAME_LEN: usize = 128;

/// Raw 16 bit value meaning "no reading available".
const NO_READING: u32 = 0xFFFF;

pub const TEMPERATURE: &str = "temperature";
pub const DC_VOLTAGE: &str = "vpv1";
pub const AC_VOLTAGE: &str = "vac1";
pub const AC_POWER: &str = "pac1";
pub const LIFETIME_ENERGY: &str = "etotal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    /// 2 bytes, `0xFFFF` is the "no reading" sentinel.
    Short,
    /// 4 bytes, no sentinel.
    Long,
}

impl FieldWidth {
    pub fn byte_len(self) -> usize {
        match self {
            FieldWidth::Short => 2,
            FieldWidth::Long => 4,
        }
    }
}

/// Where a named measurement lives in the response frame and how to scale it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub width: FieldWidth,
    pub divisor: f64,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, offset: usize, width: FieldWidth, divisor: f64) -> Self {
        Self {
            name,
            offset,
            width,
            divisor,
        }
    }
}

/// Single phase fields used by the bridge.
///
/// Other known offsets (vpv2/3 at 35/37, ipv1-3 at 39-43, iac1-3 at 45-49, vac2/3 at 53/55,
/// fac1 at 57 /100, etoday at 69 /100, htotal at 75 as a long) are left out on purpose.
pub const INVERTER_FIELDS: [FieldDescriptor; 5] = [
    FieldDescriptor::new(TEMPERATURE, 31, FieldWidth::Short, 10.0),
    FieldDescriptor::new(DC_VOLTAGE, 33, FieldWidth::Short, 10.0),
    FieldDescriptor::new(AC_VOLTAGE, 51, FieldWidth::Short, 10.0),
    FieldDescriptor::new(AC_POWER, 59, FieldWidth::Short, 1.0),
    FieldDescriptor::new(LIFETIME_ENERGY, 71, FieldWidth::Long, 10.0),
];

/// Decoded values for every field of a mapping, keyed by field name.
pub type Readings = HashMap<&'static str, f64>;

/// Extracts every mapped field from `frame`.
///
/// Either all fields decode or none do; a partially decoded frame is never returned.
pub fn decode(
    frame: &[u8],
    mapping: &[FieldDescriptor],
    temperature_max: f64,
) -> Result<Readings, DecodeError> {
    let mut readings = Readings::with_capacity(mapping.len());
    for field in mapping {
        readings.insert(field.name, decode_field(frame, field)?);
    }

    if let Some(temperature) = readings.get_mut(TEMPERATURE) {
        *temperature = clamp_temperature(*temperature, temperature_max);
    }

    Ok(readings)
}

fn decode_field(frame: &[u8], field: &FieldDescriptor) -> Result<f64, DecodeError> {
    if field.divisor.is_nan() || field.divisor <= 0.0 {
        return Err(DecodeError::InvalidDivisor { field: field.name });
    }

    let length = field.width.byte_len();
    let bytes = field
        .offset
        .checked_add(length)
        .and_then(|end| frame.get(field.offset..end))
        .ok_or(DecodeError::OutOfBounds {
            field: field.name,
            offset: field.offset,
            length,
            frame_len: frame.len(),
        })?;

    let raw = big_endian_value(bytes);
    if field.width == FieldWidth::Short && raw == NO_READING {
        return Ok(0.0);
    }
    Ok(f64::from(raw) / field.divisor)
}

/// Most significant byte first: the last byte weighs 256^0, the one before 256^1 and so on.
fn big_endian_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .enumerate()
        .fold(0, |acc, (i, &byte)| acc | u32::from(byte) << (8 * i))
}

/// The inverter reports huge temperatures while it is not inverting; cap them.
pub fn clamp_temperature(value: f64, max: f64) -> f64 {
    if value > max {
        max
    } else {
        value
    }
}
