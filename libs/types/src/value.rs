//! Resource values and their data-type tags.
//!
//! A resource value is one of the seven LWM2M scalar kinds. TLV carries no
//! type information on the wire, so the tag travels separately: readers know
//! the declared type of each resource and pick the matching extraction.

/// The data type of a resource, as declared by the object that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Length-prefixed UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Int,
    /// IEEE-754 double.
    Float,
    /// Boolean.
    Bool,
    /// Raw bytes.
    Opaque,
    /// Unix time, signed 64-bit seconds since the epoch.
    Time,
    /// Pair of 16-bit object/instance ids.
    ObjLink,
    /// Not yet determined (a resource that was never read or written).
    None,
}

/// A single resource value.
///
/// `Time` is kept distinct from `Int` even though both are `i64` on the wire,
/// so a descriptor round-trips with its declared type intact.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Opaque(Vec<u8>),
    Time(i64),
    ObjLink(u16, u16),
}

impl ResourceValue {
    /// The data-type tag matching this value.
    pub fn data_type(&self) -> DataType {
        match self {
            ResourceValue::String(_) => DataType::String,
            ResourceValue::Int(_) => DataType::Int,
            ResourceValue::Float(_) => DataType::Float,
            ResourceValue::Bool(_) => DataType::Bool,
            ResourceValue::Opaque(_) => DataType::Opaque,
            ResourceValue::Time(_) => DataType::Time,
            ResourceValue::ObjLink(_, _) => DataType::ObjLink,
        }
    }

    /// Integer content of an `Int` or `Time` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ResourceValue::Int(v) | ResourceValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean content of a `Bool` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResourceValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text content of a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResourceValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ResourceValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for ResourceValue {
    fn from(v: &str) -> Self {
        ResourceValue::String(v.to_string())
    }
}

impl From<i64> for ResourceValue {
    fn from(v: i64) -> Self {
        ResourceValue::Int(v)
    }
}

impl From<bool> for ResourceValue {
    fn from(v: bool) -> Self {
        ResourceValue::Bool(v)
    }
}

impl From<f64> for ResourceValue {
    fn from(v: f64) -> Self {
        ResourceValue::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        assert_eq!(ResourceValue::Int(7).data_type(), DataType::Int);
        assert_eq!(ResourceValue::Time(7).data_type(), DataType::Time);
        assert_eq!(ResourceValue::ObjLink(1, 2).data_type(), DataType::ObjLink);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(ResourceValue::Time(42).as_int(), Some(42));
        assert_eq!(ResourceValue::Bool(true).as_int(), None);
        assert_eq!(ResourceValue::String("x".into()).as_str(), Some("x"));
    }
}
