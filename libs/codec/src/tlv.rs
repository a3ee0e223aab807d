//! OMA TLV records: lazy decoding, value extraction and encoding.
//!
//! A TLV buffer is a concatenation of records. Each record starts with one
//! header byte: bits 7-6 carry the record kind, bit 5 widens the id field to
//! 16 bits, bits 4-3 select how many length bytes follow (0 meaning the
//! length sits inline in bits 2-0). Id and length are big-endian. A
//! multi-resource's value is itself a concatenation of resource-instance
//! records, reached through [`Tlv::children`].

use byteorder::{BigEndian, ByteOrder};

use types::{DataType, Resource, ResourceItems, ResourceValue};

use crate::error::{CodecError, CodecResult};

const ID_16BIT: u8 = 0x20;
const LEN_BYTES_MASK: u8 = 0x18;
const LEN_INLINE_MASK: u8 = 0x07;

/// Largest value length the 24-bit TLV length field can carry.
pub const MAX_VALUE_LEN: usize = 0xFF_FFFF;

/// The record kind, encoded in the top two bits of the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TlvKind {
    ObjectInstance = 0x00,
    ResourceInstance = 0x40,
    MultipleResources = 0x80,
    ResourceWithValue = 0xC0,
}

impl TlvKind {
    fn from_header(header: u8) -> TlvKind {
        match header & 0xC0 {
            0x00 => TlvKind::ObjectInstance,
            0x40 => TlvKind::ResourceInstance,
            0x80 => TlvKind::MultipleResources,
            _ => TlvKind::ResourceWithValue,
        }
    }
}

/// One decoded record; the value borrows from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tlv<'a> {
    pub kind: TlvKind,
    pub id: u16,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Iterates the records nested inside this one. Meaningful for
    /// `ObjectInstance` and `MultipleResources` records.
    pub fn children(&self) -> TlvIter<'a> {
        TlvIter::new(self.value)
    }

    /// Big-endian two's-complement integer of 1, 2, 4 or 8 bytes.
    pub fn as_int(&self) -> CodecResult<i64> {
        match self.value.len() {
            1 => Ok(self.value[0] as i8 as i64),
            2 => Ok(BigEndian::read_i16(self.value) as i64),
            4 => Ok(BigEndian::read_i32(self.value) as i64),
            8 => Ok(BigEndian::read_i64(self.value)),
            len => Err(CodecError::IntLength { len }),
        }
    }

    /// IEEE-754 float of 4 or 8 bytes.
    pub fn as_float(&self) -> CodecResult<f64> {
        match self.value.len() {
            4 => Ok(BigEndian::read_f32(self.value) as f64),
            8 => Ok(BigEndian::read_f64(self.value)),
            len => Err(CodecError::FloatLength { len }),
        }
    }

    /// Single byte, 0 or 1.
    pub fn as_bool(&self) -> CodecResult<bool> {
        match self.value {
            [0] => Ok(false),
            [1] => Ok(true),
            value => Err(CodecError::BoolValue {
                len: value.len(),
                byte: value.first().copied().unwrap_or(0),
            }),
        }
    }

    /// Owned copy of the raw bytes.
    pub fn as_bytes(&self) -> Vec<u8> {
        self.value.to_vec()
    }

    /// UTF-8 text.
    pub fn as_str(&self) -> CodecResult<&'a str> {
        std::str::from_utf8(self.value).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Two big-endian 16-bit ids: (object, instance).
    pub fn as_obj_link(&self) -> CodecResult<(u16, u16)> {
        if self.value.len() != 4 {
            return Err(CodecError::ObjLinkLength {
                len: self.value.len(),
            });
        }
        Ok((
            BigEndian::read_u16(&self.value[..2]),
            BigEndian::read_u16(&self.value[2..]),
        ))
    }

    /// Extracts the value under a declared data type. `None` and `Opaque`
    /// both yield the raw bytes.
    pub fn value_as(&self, data_type: DataType) -> CodecResult<ResourceValue> {
        Ok(match data_type {
            DataType::String => ResourceValue::String(self.as_str()?.to_string()),
            DataType::Int => ResourceValue::Int(self.as_int()?),
            DataType::Float => ResourceValue::Float(self.as_float()?),
            DataType::Bool => ResourceValue::Bool(self.as_bool()?),
            DataType::Time => ResourceValue::Time(self.as_int()?),
            DataType::ObjLink => {
                let (object, instance) = self.as_obj_link()?;
                ResourceValue::ObjLink(object, instance)
            }
            DataType::Opaque | DataType::None => ResourceValue::Opaque(self.as_bytes()),
        })
    }
}

/// Lazy iterator over the records of a TLV buffer.
///
/// Yields `Err` once on malformed input and then stops.
pub struct TlvIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TlvIter<'a> {
    pub fn new(data: &'a [u8]) -> TlvIter<'a> {
        TlvIter {
            data,
            offset: 0,
            failed: false,
        }
    }

    fn take(&mut self, need: usize) -> CodecResult<&'a [u8]> {
        let have = self.data.len() - self.offset;
        if need > have {
            return Err(CodecError::truncated(self.offset, need, have));
        }
        let slice = &self.data[self.offset..self.offset + need];
        self.offset += need;
        Ok(slice)
    }

    fn next_record(&mut self) -> CodecResult<Tlv<'a>> {
        let header = self.take(1)?[0];
        let kind = TlvKind::from_header(header);

        let id = if header & ID_16BIT != 0 {
            BigEndian::read_u16(self.take(2)?)
        } else {
            self.take(1)?[0] as u16
        };

        let len_bytes = ((header & LEN_BYTES_MASK) >> 3) as usize;
        let len = if len_bytes == 0 {
            (header & LEN_INLINE_MASK) as usize
        } else {
            self.take(len_bytes)?
                .iter()
                .fold(0usize, |acc, byte| (acc << 8) | *byte as usize)
        };

        let value = self.take(len)?;
        Ok(Tlv { kind, id, value })
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = CodecResult<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let record = self.next_record();
        if record.is_err() {
            self.failed = true;
        }
        Some(record)
    }
}

/// Eagerly decodes a whole buffer, failing on the first malformed record.
pub fn parse_tlv(data: &[u8]) -> CodecResult<Vec<Tlv<'_>>> {
    TlvIter::new(data).collect()
}

fn write_header(kind: TlvKind, id: u16, len: usize, out: &mut Vec<u8>) -> CodecResult<()> {
    if len > MAX_VALUE_LEN {
        return Err(CodecError::ValueTooLarge {
            len,
            max: MAX_VALUE_LEN,
        });
    }

    let mut header = kind as u8;
    if id > 0xFF {
        header |= ID_16BIT;
    }

    // Smallest legal length encoding: inline for 0..=7, then 1 to 3 bytes.
    let len_bytes: usize = match len {
        0..=7 => {
            header |= len as u8;
            0
        }
        8..=0xFF => {
            header |= 0x08;
            1
        }
        0x100..=0xFFFF => {
            header |= 0x10;
            2
        }
        _ => {
            header |= 0x18;
            3
        }
    };

    out.push(header);
    if id > 0xFF {
        out.extend_from_slice(&id.to_be_bytes());
    } else {
        out.push(id as u8);
    }
    for shift in (0..len_bytes).rev() {
        out.push((len >> (shift * 8)) as u8);
    }
    Ok(())
}

/// Encodes an integer in the smallest of 1, 2, 4 or 8 bytes that preserves
/// the signed value.
fn encode_int(value: i64, out: &mut Vec<u8>) {
    if let Ok(v) = i8::try_from(value) {
        out.push(v as u8);
    } else if let Ok(v) = i16::try_from(value) {
        out.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i32::try_from(value) {
        out.extend_from_slice(&v.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_be_bytes());
    }
}

fn encode_value(value: &ResourceValue, out: &mut Vec<u8>) {
    match value {
        ResourceValue::String(s) => out.extend_from_slice(s.as_bytes()),
        ResourceValue::Int(v) | ResourceValue::Time(v) => encode_int(*v, out),
        // Always 8 bytes; a fixed float width keeps the encoder deterministic.
        ResourceValue::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
        ResourceValue::Bool(v) => out.push(*v as u8),
        ResourceValue::Opaque(bytes) => out.extend_from_slice(bytes),
        ResourceValue::ObjLink(object, instance) => {
            out.extend_from_slice(&object.to_be_bytes());
            out.extend_from_slice(&instance.to_be_bytes());
        }
    }
}

/// Appends the record(s) of one resource descriptor.
pub fn encode_resource(resource: &Resource, out: &mut Vec<u8>) -> CodecResult<()> {
    match resource.items() {
        ResourceItems::Single(value) => {
            let mut bytes = Vec::new();
            encode_value(value, &mut bytes);
            write_header(TlvKind::ResourceWithValue, resource.id(), bytes.len(), out)?;
            out.extend_from_slice(&bytes);
        }
        ResourceItems::Multiple(entries) => {
            let mut inner = Vec::new();
            for (index, value) in entries {
                let mut bytes = Vec::new();
                encode_value(value, &mut bytes);
                write_header(TlvKind::ResourceInstance, *index, bytes.len(), &mut inner)?;
                inner.extend_from_slice(&bytes);
            }
            write_header(TlvKind::MultipleResources, resource.id(), inner.len(), out)?;
            out.extend_from_slice(&inner);
        }
    }
    Ok(())
}

/// Encodes a flat sequence of resources (an instance representation).
pub fn encode_resources(resources: &[Resource]) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    for resource in resources {
        encode_resource(resource, &mut out)?;
    }
    Ok(out)
}

/// Encodes instances wrapped in object-instance records, as used by
/// object-level reads and bootstrap write-object payloads.
pub fn encode_object_instances(instances: &[(u16, Vec<Resource>)]) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    for (instance_id, resources) in instances {
        let inner = encode_resources(resources)?;
        write_header(TlvKind::ObjectInstance, *instance_id, inner.len(), &mut out)?;
        out.extend_from_slice(&inner);
    }
    Ok(out)
}
