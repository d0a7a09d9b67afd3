use crate::error::DecodeError;

const HEART_RATE_FLAG_U16: u8 = 0x01;

fn read_u16_le(payload: &[u8], offset: usize) -> Result<u16, DecodeError> {
    match payload.get(offset..offset + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(DecodeError::PayloadTooShort { expected: offset + 2, actual: payload.len() }),
    }
}

/// Heart rate measurement: a flags byte, bit 0 selects a u8 or a little endian u16 value.
pub fn decode_heart_rate(payload: &[u8]) -> Result<f64, DecodeError> {
    let flags = *payload.first()
        .ok_or(DecodeError::PayloadTooShort { expected: 2, actual: 0 })?;

    if flags & HEART_RATE_FLAG_U16 != 0 {
        return read_u16_le(payload, 1).map(f64::from);
    }

    match payload.get(1) {
        Some(value) => Ok(f64::from(*value)),
        None => Err(DecodeError::PayloadTooShort { expected: 2, actual: payload.len() }),
    }
}

/// Airflow: a raw little endian u16.
pub fn decode_airflow(payload: &[u8]) -> Result<f64, DecodeError> {
    read_u16_le(payload, 0).map(f64::from)
}
