//! LWM2M Data Model
//!
//! Pure data structures shared by the codec, the transport glue and the three
//! protocol engines: resource values and descriptors, object/instance/resource
//! paths, binding modes, content formats and lifecycle events.
//!
//! This crate deliberately contains no transport or encoding logic - the TLV
//! rules live in `codec` and the CoAP surface in `transport`.

pub mod constants;
pub mod event;
pub mod path;
pub mod registration;
pub mod resource;
pub mod value;

pub use event::{BootstrapEvent, RegistrationEvent};
pub use path::{Path, PathError};
pub use registration::{BindingMode, BindingModeError, ContentFormat};
pub use resource::{Resource, ResourceError, ResourceItems};
pub use value::{DataType, ResourceValue};
