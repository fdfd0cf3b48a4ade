//! Protobuf wire-format decoding for the app's binary blobs.
//!
//! Contact records, cell data and settings archives all use the protobuf
//! wire encoding without a published schema. Field numbers are interpreted
//! by the callers; this module only splits a buffer into tagged fields.

/// Errors raised when a blob is not valid wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Unexpected end of data at offset {offset}")]
    Truncated { offset: usize },

    #[error("Varint too long at offset {offset}")]
    VarintOverflow { offset: usize },

    #[error("Unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType { wire_type: u8, offset: usize },
}

/// Decoded field payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// One tagged field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            FieldValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Length-delimited payload decoded as (lossy) UTF-8.
    pub fn as_string(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.value {
            FieldValue::Varint(v) | FieldValue::Fixed64(v) => Some(v),
            FieldValue::Fixed32(v) => Some(u64::from(v)),
            FieldValue::Bytes(_) => None,
        }
    }
}

/// Cursor over a byte buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or(WireError::Truncated { offset: self.pos })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow { offset: start })
    }

    /// Read `len` raw bytes.
    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(WireError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a varint length followed by that many bytes.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| WireError::Truncated { offset: self.pos })?;
        self.read_exact(len)
    }

    pub fn read_field(&mut self) -> Result<Field<'a>, WireError> {
        let offset = self.pos;
        let tag = self.read_varint()?;
        let number = (tag >> 3) as u32;
        let wire_type = (tag & 0x07) as u8;
        let value = match wire_type {
            0 => FieldValue::Varint(self.read_varint()?),
            1 => {
                let b = self.read_exact(8)?;
                FieldValue::Fixed64(u64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            2 => FieldValue::Bytes(self.read_length_delimited()?),
            5 => {
                let b = self.read_exact(4)?;
                FieldValue::Fixed32(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            other => {
                return Err(WireError::UnsupportedWireType {
                    wire_type: other,
                    offset,
                })
            }
        };
        Ok(Field { number, value })
    }
}

/// Split a whole buffer into fields.
///
/// # Errors
///
/// Fails if any field is truncated or uses a group wire type.
pub fn decode_fields(data: &[u8]) -> Result<Vec<Field<'_>>, WireError> {
    let mut reader = WireReader::new(data);
    let mut fields = Vec::new();
    while !reader.is_at_end() {
        fields.push(reader.read_field()?);
    }
    Ok(fields)
}

/// Last string value of field `number` (later fields override earlier ones).
pub fn string_field(fields: &[Field<'_>], number: u32) -> Option<String> {
    fields
        .iter()
        .rev()
        .find(|f| f.number == number)
        .and_then(Field::as_string)
}

/// Last integer value of field `number`.
pub fn int_field(fields: &[Field<'_>], number: u32) -> Option<u64> {
    fields
        .iter()
        .rev()
        .find(|f| f.number == number)
        .and_then(Field::as_u64)
}

/// Wire-format encoding, used to synthesize blobs for fixtures.
pub mod encode {
    pub fn varint(mut value: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    pub fn bytes_field(number: u32, data: &[u8], out: &mut Vec<u8>) {
        varint(u64::from(number) << 3 | 2, out);
        varint(data.len() as u64, out);
        out.extend_from_slice(data);
    }

    pub fn string_field(number: u32, value: &str, out: &mut Vec<u8>) {
        bytes_field(number, value.as_bytes(), out);
    }

    pub fn varint_field(number: u32, value: u64, out: &mut Vec<u8>) {
        varint(u64::from(number) << 3, out);
        varint(value, out);
    }
}
