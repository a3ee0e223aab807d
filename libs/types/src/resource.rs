//! Resource descriptors.
//!
//! A resource is a 16-bit id plus either a single value or an ordered
//! sequence of values keyed by a 16-bit index (multi-resource). Descriptors
//! are produced by an object's `read` callback and consumed by the encoders;
//! the write path builds them from decoded payloads.

use thiserror::Error;

use crate::value::{DataType, ResourceValue};

/// Errors building a resource descriptor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A multi-resource mixed values of different data types.
    #[error("resource {id} mixes {expected:?} and {found:?} values")]
    MixedTypes {
        id: u16,
        expected: DataType,
        found: DataType,
    },

    /// A multi-resource was built with no values at all.
    #[error("resource {id} has no values")]
    Empty { id: u16 },
}

/// The value payload of a resource: single, or multiple keyed by index.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceItems {
    Single(ResourceValue),
    Multiple(Vec<(u16, ResourceValue)>),
}

/// A resource descriptor: id, data-type tag, arity and values.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: u16,
    data_type: DataType,
    items: ResourceItems,
}

impl Resource {
    /// Builds a single-valued resource from any value.
    pub fn new(id: u16, value: ResourceValue) -> Resource {
        Resource {
            id,
            data_type: value.data_type(),
            items: ResourceItems::Single(value),
        }
    }

    /// Builds a multi-resource. All values must share one data type.
    pub fn multiple(id: u16, values: Vec<(u16, ResourceValue)>) -> Result<Resource, ResourceError> {
        let first = values.first().ok_or(ResourceError::Empty { id })?;
        let data_type = first.1.data_type();
        for (_, value) in &values {
            if value.data_type() != data_type {
                return Err(ResourceError::MixedTypes {
                    id,
                    expected: data_type,
                    found: value.data_type(),
                });
            }
        }
        Ok(Resource {
            id,
            data_type,
            items: ResourceItems::Multiple(values),
        })
    }

    /// Integer helper. Takes anything that widens losslessly into `i64`, so
    /// callers passing literals or narrower integer types cannot hit
    /// platform-dependent narrowing at the API boundary.
    pub fn integer(id: u16, value: impl Into<i64>) -> Resource {
        Resource::new(id, ResourceValue::Int(value.into()))
    }

    /// Boolean helper, same rationale as [`Resource::integer`].
    pub fn boolean(id: u16, value: bool) -> Resource {
        Resource::new(id, ResourceValue::Bool(value))
    }

    pub fn string(id: u16, value: impl Into<String>) -> Resource {
        Resource::new(id, ResourceValue::String(value.into()))
    }

    pub fn float(id: u16, value: f64) -> Resource {
        Resource::new(id, ResourceValue::Float(value))
    }

    pub fn opaque(id: u16, value: impl Into<Vec<u8>>) -> Resource {
        Resource::new(id, ResourceValue::Opaque(value.into()))
    }

    /// Time helper; accepts the same lossless widening as [`Resource::integer`].
    pub fn time(id: u16, value: impl Into<i64>) -> Resource {
        Resource::new(id, ResourceValue::Time(value.into()))
    }

    pub fn obj_link(id: u16, object_id: u16, instance_id: u16) -> Resource {
        Resource::new(id, ResourceValue::ObjLink(object_id, instance_id))
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn items(&self) -> &ResourceItems {
        &self.items
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self.items, ResourceItems::Multiple(_))
    }

    /// The value of a single-valued resource.
    pub fn single_value(&self) -> Option<&ResourceValue> {
        match &self.items {
            ResourceItems::Single(value) => Some(value),
            ResourceItems::Multiple(_) => None,
        }
    }
}
