//! Built-in codecs
//!
//! All multi-byte fields are big-endian. Variable-length payloads carry a
//! 4-byte length or element count prefix.

use byteorder::{BigEndian, ByteOrder};

use super::{types, Codec, CodecError, Value};

const SIZE_OF_BOOL: usize = 1;
const SIZE_OF_INT: usize = 4;
const SIZE_OF_DOUBLE: usize = 8;

type CodecResult<T> = std::result::Result<T, CodecError>;

fn check(buffer: &[u8], offset: usize, needed: usize) -> CodecResult<()> {
    if offset.checked_add(needed).map_or(true, |end| end > buffer.len()) {
        return Err(CodecError::Truncated {
            offset,
            needed,
            len: buffer.len(),
        });
    }
    Ok(())
}

fn read_len(buffer: &[u8], offset: usize) -> CodecResult<usize> {
    check(buffer, offset, SIZE_OF_INT)?;
    Ok(BigEndian::read_u32(&buffer[offset..]) as usize)
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    let mut bytes = [0u8; SIZE_OF_INT];
    BigEndian::write_u32(&mut bytes, len as u32);
    out.extend_from_slice(&bytes);
}

fn push_f64(out: &mut Vec<u8>, value: f64) {
    let mut bytes = [0u8; SIZE_OF_DOUBLE];
    BigEndian::write_f64(&mut bytes, value);
    out.extend_from_slice(&bytes);
}

fn push_str(out: &mut Vec<u8>, value: &str) {
    push_len(out, value.len());
    out.extend_from_slice(value.as_bytes());
}

fn read_str(buffer: &[u8], offset: usize) -> CodecResult<(String, usize)> {
    let len = read_len(buffer, offset)?;
    let start = offset + SIZE_OF_INT;
    check(buffer, start, len)?;
    let s = std::str::from_utf8(&buffer[start..start + len]).map_err(|_| CodecError::InvalidUtf8)?;
    Ok((s.to_string(), SIZE_OF_INT + len))
}

fn mismatch(expected: &'static str, actual: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected,
        actual: actual.kind(),
    }
}

/// Codec for [`Value::Number`]: 8-byte IEEE-754 double
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberCodec;

impl Codec for NumberCodec {
    fn data_type(&self) -> &str {
        types::NUMBER
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::Number(v) => {
                let mut out = Vec::with_capacity(SIZE_OF_DOUBLE);
                push_f64(&mut out, *v);
                Ok(out)
            }
            other => Err(mismatch(types::NUMBER, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        check(buffer, offset, SIZE_OF_DOUBLE)?;
        Ok(Value::Number(BigEndian::read_f64(&buffer[offset..])))
    }

    fn serialized_size(&self, _value: &Value) -> usize {
        SIZE_OF_DOUBLE
    }
}

/// Codec for [`Value::Boolean`]: one byte, nonzero is true
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCodec;

impl Codec for BooleanCodec {
    fn data_type(&self) -> &str {
        types::BOOLEAN
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::Boolean(v) => Ok(vec![u8::from(*v)]),
            other => Err(mismatch(types::BOOLEAN, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        check(buffer, offset, SIZE_OF_BOOL)?;
        Ok(Value::Boolean(buffer[offset] != 0))
    }

    fn serialized_size(&self, _value: &Value) -> usize {
        SIZE_OF_BOOL
    }
}

/// Codec for [`Value::String`]: byte length followed by UTF-8 bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn data_type(&self) -> &str {
        types::STRING
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::String(s) => {
                let mut out = Vec::with_capacity(SIZE_OF_INT + s.len());
                push_str(&mut out, s);
                Ok(out)
            }
            other => Err(mismatch(types::STRING, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        read_str(buffer, offset).map(|(s, _)| Value::String(s))
    }

    fn serialized_size(&self, value: &Value) -> usize {
        match value {
            Value::String(s) => SIZE_OF_INT + s.len(),
            _ => 0,
        }
    }
}

/// Codec for [`Value::NumberArray`]: element count followed by doubles
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberArrayCodec;

impl Codec for NumberArrayCodec {
    fn data_type(&self) -> &str {
        types::NUMBER_ARRAY
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::NumberArray(values) => {
                let mut out = Vec::with_capacity(self.serialized_size(value));
                push_len(&mut out, values.len());
                for v in values {
                    push_f64(&mut out, *v);
                }
                Ok(out)
            }
            other => Err(mismatch(types::NUMBER_ARRAY, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        let count = read_len(buffer, offset)?;
        let start = offset + SIZE_OF_INT;
        let needed = count
            .checked_mul(SIZE_OF_DOUBLE)
            .ok_or(CodecError::Truncated {
                offset: start,
                needed: usize::MAX,
                len: buffer.len(),
            })?;
        check(buffer, start, needed)?;
        let values = buffer[start..start + needed]
            .chunks_exact(SIZE_OF_DOUBLE)
            .map(BigEndian::read_f64)
            .collect();
        Ok(Value::NumberArray(values))
    }

    fn serialized_size(&self, value: &Value) -> usize {
        match value {
            Value::NumberArray(values) => SIZE_OF_INT + SIZE_OF_DOUBLE * values.len(),
            _ => 0,
        }
    }
}

/// Codec for [`Value::BooleanArray`]: element count followed by one byte per element
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanArrayCodec;

impl Codec for BooleanArrayCodec {
    fn data_type(&self) -> &str {
        types::BOOLEAN_ARRAY
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::BooleanArray(values) => {
                let mut out = Vec::with_capacity(self.serialized_size(value));
                push_len(&mut out, values.len());
                out.extend(values.iter().map(|b| u8::from(*b)));
                Ok(out)
            }
            other => Err(mismatch(types::BOOLEAN_ARRAY, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        let count = read_len(buffer, offset)?;
        let start = offset + SIZE_OF_INT;
        check(buffer, start, count)?;
        let values = buffer[start..start + count].iter().map(|b| *b != 0).collect();
        Ok(Value::BooleanArray(values))
    }

    fn serialized_size(&self, value: &Value) -> usize {
        match value {
            Value::BooleanArray(values) => SIZE_OF_INT + SIZE_OF_BOOL * values.len(),
            _ => 0,
        }
    }
}

/// Codec for [`Value::StringArray`]: element count followed by length-prefixed strings
#[derive(Debug, Clone, Copy, Default)]
pub struct StringArrayCodec;

impl Codec for StringArrayCodec {
    fn data_type(&self) -> &str {
        types::STRING_ARRAY
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::StringArray(values) => {
                let mut out = Vec::with_capacity(self.serialized_size(value));
                push_len(&mut out, values.len());
                for s in values {
                    push_str(&mut out, s);
                }
                Ok(out)
            }
            other => Err(mismatch(types::STRING_ARRAY, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        let count = read_len(buffer, offset)?;
        let mut cursor = offset + SIZE_OF_INT;
        // Each element needs at least its length prefix
        check(buffer, cursor, count.saturating_mul(SIZE_OF_INT))?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let (s, used) = read_str(buffer, cursor)?;
            cursor += used;
            values.push(s);
        }
        Ok(Value::StringArray(values))
    }

    fn serialized_size(&self, value: &Value) -> usize {
        match value {
            Value::StringArray(values) => {
                SIZE_OF_INT + values.iter().map(|s| SIZE_OF_INT + s.len()).sum::<usize>()
            }
            _ => 0,
        }
    }
}

/// Codec for [`Value::Raw`]: byte length followed by the bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    fn data_type(&self) -> &str {
        types::RAW
    }

    fn encode(&self, value: &Value) -> CodecResult<Vec<u8>> {
        match value {
            Value::Raw(bytes) => {
                let mut out = Vec::with_capacity(SIZE_OF_INT + bytes.len());
                push_len(&mut out, bytes.len());
                out.extend_from_slice(bytes);
                Ok(out)
            }
            other => Err(mismatch(types::RAW, other)),
        }
    }

    fn decode(&self, buffer: &[u8], offset: usize) -> CodecResult<Value> {
        let len = read_len(buffer, offset)?;
        let start = offset + SIZE_OF_INT;
        check(buffer, start, len)?;
        Ok(Value::Raw(buffer[start..start + len].to_vec()))
    }

    fn serialized_size(&self, value: &Value) -> usize {
        match value {
            Value::Raw(bytes) => SIZE_OF_INT + bytes.len(),
            _ => 0,
        }
    }
}
