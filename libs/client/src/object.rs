//! The object model: the capability trait users implement, and the erased
//! entries the engine dispatches on.
//!
//! Per-instance state is owned by the engine - each registered object lives
//! in an [`ObjectEntry`] together with its `instance id -> Instance` map -
//! and is handed to the trait methods by mutable reference. Operations an
//! object does not support keep their default implementation, and the engine
//! answers them with "method not allowed" or "not implemented".

use std::any::Any;
use std::collections::BTreeMap;

use tracing::warn;

use codec::{encode_resources, parse_tlv, Tlv, TlvKind};
use types::{path, Resource};

use crate::error::{ClientError, OpError};

/// The payload handed to `create`, tagged by content format.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// No payload (programmatic creation).
    None,
    Text(&'a str),
    Opaque(&'a [u8]),
    /// Raw TLV bytes; decode with `codec::parse_tlv`.
    Tlv(&'a [u8]),
}

/// A LWM2M object implementation.
///
/// Override the operations the object supports; the defaults report the
/// capability as missing. `read` is called one resource at a time - a read
/// of a whole instance or object is expanded by the engine, which silently
/// omits resources that answer [`OpError::NotFound`].
pub trait Object: Send + 'static {
    /// Per-instance state, owned by the engine.
    type Instance: Send + 'static;

    /// The 16-bit object id.
    fn object_id(&self) -> u16;

    /// Number of resources; reads of instances iterate ids `0..count`.
    fn resource_count(&self) -> u16;

    /// Creates a new instance from an initial payload.
    fn create(&mut self, instance_id: u16, payload: Payload<'_>) -> Result<Self::Instance, OpError> {
        let _ = (instance_id, payload);
        Err(OpError::NotImplemented)
    }

    /// Reads one resource. `NotFound` means "empty right now", a unknown
    /// resource id is `BadRequest`.
    fn read(&mut self, instance: &mut Self::Instance, resource_id: u16) -> Result<Resource, OpError>;

    /// Writes one resource from a text or opaque representation.
    fn write_resource(
        &mut self,
        instance: &mut Self::Instance,
        resource: &Resource,
    ) -> Result<(), OpError> {
        let _ = (instance, resource);
        Err(OpError::MethodNotAllowed)
    }

    /// Writes one or more resources from decoded TLV records. TLV carries no
    /// type information, so the implementation picks the extraction matching
    /// each resource's declared type.
    fn write_tlv(
        &mut self,
        instance: &mut Self::Instance,
        records: &[Tlv<'_>],
    ) -> Result<(), OpError> {
        let _ = (instance, records);
        Err(OpError::MethodNotAllowed)
    }

    /// Resets one resource to its empty state, so a following `read` answers
    /// `NotFound`. The engine calls this when rolling back a failed TLV
    /// write that had set a previously-empty resource. Objects whose
    /// writable resources are never empty can keep the default.
    fn clear_resource(
        &mut self,
        instance: &mut Self::Instance,
        resource_id: u16,
    ) -> Result<(), OpError> {
        let _ = (instance, resource_id);
        Err(OpError::MethodNotAllowed)
    }

    /// Executes a resource with a text argument string.
    fn execute(
        &mut self,
        instance: &mut Self::Instance,
        resource_id: u16,
        args: &str,
    ) -> Result<(), OpError> {
        let _ = (instance, resource_id, args);
        Err(OpError::MethodNotAllowed)
    }

    /// Tears an instance down. On `Ok` the engine drops the state; on error
    /// the instance stays registered untouched.
    fn delete(&mut self, instance: &mut Self::Instance) -> Result<(), OpError> {
        let _ = instance;
        Err(OpError::MethodNotAllowed)
    }
}

/// Object-shaped dispatch the engine stores, with the instance ids erased
/// from the type.
pub(crate) trait ObjectDispatch: Send {
    fn object_id(&self) -> u16;
    fn resource_count(&self) -> u16;
    fn instance_ids(&self) -> Vec<u16>;
    fn has_instance(&self, instance_id: u16) -> bool;

    /// The lowest unused instance id, if any remain.
    fn free_instance_id(&self) -> Option<u16>;

    /// Creates an instance through the object's `create` callback.
    fn create(&mut self, instance_id: u16, payload: Payload<'_>) -> Result<(), OpError>;

    /// Inserts caller-provided instance state, allocating an id if none is
    /// given. Fails when the state's type does not match the object.
    fn insert_instance(
        &mut self,
        instance_id: Option<u16>,
        state: Box<dyn Any + Send>,
    ) -> Result<u16, ClientError>;

    fn read(&mut self, instance_id: u16, resource_id: u16) -> Result<Resource, OpError>;

    /// Reads every non-empty resource of one instance, in resource-id order.
    fn read_instance(&mut self, instance_id: u16) -> Result<Vec<Resource>, OpError>;

    fn write_resource(&mut self, instance_id: u16, resource: &Resource) -> Result<(), OpError>;

    /// Applies a TLV write all-or-nothing: targeted resources are
    /// snapshotted first and restored when any inner write fails, with
    /// previously-empty ones cleared back to empty.
    fn write_tlv(&mut self, instance_id: u16, records: &[Tlv<'_>]) -> Result<(), OpError>;

    fn execute(&mut self, instance_id: u16, resource_id: u16, args: &str) -> Result<(), OpError>;

    fn delete(&mut self, instance_id: u16) -> Result<(), OpError>;
}

pub(crate) struct ObjectEntry<O: Object> {
    object: O,
    instances: BTreeMap<u16, O::Instance>,
}

impl<O: Object> ObjectEntry<O> {
    pub(crate) fn new(object: O) -> ObjectEntry<O> {
        ObjectEntry {
            object,
            instances: BTreeMap::new(),
        }
    }

    fn free_instance_id(&self) -> Option<u16> {
        (0..path::RESERVED_ID).find(|id| !self.instances.contains_key(id))
    }

    /// Puts the targeted resources back the way they were before a failed
    /// write: non-empty ones are rewritten from their snapshots, the ones
    /// that were empty are cleared again. True when everything went back.
    fn roll_back(
        object: &mut O,
        instance: &mut O::Instance,
        snapshots: &[Resource],
        empty_before: &[u16],
    ) -> bool {
        let mut complete = true;
        if !snapshots.is_empty() {
            complete &= encode_resources(snapshots)
                .ok()
                .and_then(|bytes| {
                    parse_tlv(&bytes)
                        .ok()
                        .map(|restore| object.write_tlv(instance, &restore).is_ok())
                })
                .unwrap_or(false);
        }
        for resource_id in empty_before {
            complete &= object.clear_resource(instance, *resource_id).is_ok();
        }
        complete
    }
}

impl<O: Object> ObjectDispatch for ObjectEntry<O> {
    fn object_id(&self) -> u16 {
        self.object.object_id()
    }

    fn resource_count(&self) -> u16 {
        self.object.resource_count()
    }

    fn instance_ids(&self) -> Vec<u16> {
        self.instances.keys().copied().collect()
    }

    fn has_instance(&self, instance_id: u16) -> bool {
        self.instances.contains_key(&instance_id)
    }

    fn free_instance_id(&self) -> Option<u16> {
        ObjectEntry::free_instance_id(self)
    }

    fn create(&mut self, instance_id: u16, payload: Payload<'_>) -> Result<(), OpError> {
        if self.instances.contains_key(&instance_id) {
            return Err(OpError::BadRequest);
        }
        let instance = self.object.create(instance_id, payload)?;
        self.instances.insert(instance_id, instance);
        Ok(())
    }

    fn insert_instance(
        &mut self,
        instance_id: Option<u16>,
        state: Box<dyn Any + Send>,
    ) -> Result<u16, ClientError> {
        let object_id = self.object.object_id();
        let state = state
            .downcast::<O::Instance>()
            .map_err(|_| ClientError::InstanceTypeMismatch { object_id })?;

        let instance_id = match instance_id {
            Some(id) => {
                if self.instances.contains_key(&id) {
                    return Err(ClientError::DuplicateInstance {
                        object_id,
                        instance_id: id,
                    });
                }
                id
            }
            None => self
                .free_instance_id()
                .ok_or(ClientError::InstancesExhausted { object_id })?,
        };

        self.instances.insert(instance_id, *state);
        Ok(instance_id)
    }

    fn read(&mut self, instance_id: u16, resource_id: u16) -> Result<Resource, OpError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;
        self.object.read(instance, resource_id)
    }

    fn read_instance(&mut self, instance_id: u16) -> Result<Vec<Resource>, OpError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;

        let mut resources = Vec::new();
        for resource_id in 0..self.object.resource_count() {
            match self.object.read(instance, resource_id) {
                Ok(resource) => resources.push(resource),
                // Empty and unknown resources are omitted from expansions.
                Err(OpError::NotFound) | Err(OpError::BadRequest) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(resources)
    }

    fn write_resource(&mut self, instance_id: u16, resource: &Resource) -> Result<(), OpError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;
        self.object.write_resource(instance, resource)
    }

    fn write_tlv(&mut self, instance_id: u16, records: &[Tlv<'_>]) -> Result<(), OpError> {
        let object_id = self.object.object_id();
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;

        // Snapshot the current value of every targeted resource, remembering
        // the empty ones too, so a failed multi-resource write leaves no
        // partial state behind - not even on a resource it set from empty.
        let mut snapshots = Vec::new();
        let mut empty_before = Vec::new();
        for record in records {
            if !matches!(
                record.kind,
                TlvKind::ResourceWithValue | TlvKind::MultipleResources
            ) {
                continue;
            }
            match self.object.read(instance, record.id) {
                Ok(resource) => snapshots.push(resource),
                Err(OpError::NotFound) => empty_before.push(record.id),
                Err(_) => {}
            }
        }

        let result = self.object.write_tlv(instance, records);
        if result.is_err()
            && !(snapshots.is_empty() && empty_before.is_empty())
            && !Self::roll_back(&mut self.object, instance, &snapshots, &empty_before)
        {
            warn!(
                object_id,
                instance_id, "could not fully restore resources after a failed write"
            );
        }
        result
    }

    fn execute(&mut self, instance_id: u16, resource_id: u16, args: &str) -> Result<(), OpError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;
        self.object.execute(instance, resource_id, args)
    }

    fn delete(&mut self, instance_id: u16) -> Result<(), OpError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(OpError::NotFound)?;
        self.object.delete(instance)?;
        self.instances.remove(&instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ResourceValue;

    /// A two-resource object: 0 = label (string), 1 = level (int).
    struct Dimmer;

    #[derive(Default)]
    struct DimmerState {
        label: Option<String>,
        level: i64,
    }

    impl Object for Dimmer {
        type Instance = DimmerState;

        fn object_id(&self) -> u16 {
            3311
        }

        fn resource_count(&self) -> u16 {
            2
        }

        fn create(&mut self, _instance_id: u16, _payload: Payload<'_>) -> Result<DimmerState, OpError> {
            Ok(DimmerState::default())
        }

        fn read(&mut self, instance: &mut DimmerState, resource_id: u16) -> Result<Resource, OpError> {
            match resource_id {
                0 => instance
                    .label
                    .as_ref()
                    .map(|label| Resource::string(0, label.clone()))
                    .ok_or(OpError::NotFound),
                1 => Ok(Resource::integer(1, instance.level)),
                _ => Err(OpError::BadRequest),
            }
        }

        fn write_tlv(
            &mut self,
            instance: &mut DimmerState,
            records: &[Tlv<'_>],
        ) -> Result<(), OpError> {
            for record in records {
                match record.id {
                    0 => {
                        instance.label =
                            Some(record.as_str().map_err(|_| OpError::BadRequest)?.to_string())
                    }
                    1 => {
                        instance.level = record.as_int().map_err(|_| OpError::BadRequest)?;
                        if instance.level > 100 {
                            return Err(OpError::BadRequest);
                        }
                    }
                    _ => return Err(OpError::BadRequest),
                }
            }
            Ok(())
        }

        fn clear_resource(
            &mut self,
            instance: &mut DimmerState,
            resource_id: u16,
        ) -> Result<(), OpError> {
            match resource_id {
                0 => {
                    instance.label = None;
                    Ok(())
                }
                _ => Err(OpError::MethodNotAllowed),
            }
        }

        fn delete(&mut self, _instance: &mut DimmerState) -> Result<(), OpError> {
            Ok(())
        }
    }

    fn entry_with_instance() -> Box<dyn ObjectDispatch> {
        let mut entry = ObjectEntry::new(Dimmer);
        entry.create(0, Payload::None).expect("create");
        Box::new(entry)
    }

    #[test]
    fn test_read_instance_omits_empty_resources() {
        let mut entry = entry_with_instance();
        let resources = entry.read_instance(0).expect("read");
        // The label was never set, only the level shows up.
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id(), 1);
    }

    #[test]
    fn test_create_rejects_existing_id() {
        let mut entry = entry_with_instance();
        assert_eq!(entry.create(0, Payload::None), Err(OpError::BadRequest));
    }

    #[test]
    fn test_insert_instance_allocates_free_id() {
        let mut entry = ObjectEntry::new(Dimmer);
        let boxed: Box<dyn Any + Send> = Box::new(DimmerState::default());
        let id = entry.insert_instance(None, boxed).expect("insert");
        assert_eq!(id, 0);
        let boxed: Box<dyn Any + Send> = Box::new(DimmerState::default());
        assert_eq!(entry.insert_instance(None, boxed).expect("insert"), 1);
    }

    #[test]
    fn test_insert_instance_rejects_wrong_type() {
        let mut entry = ObjectEntry::new(Dimmer);
        let boxed: Box<dyn Any + Send> = Box::new(42u32);
        assert!(matches!(
            entry.insert_instance(None, boxed),
            Err(ClientError::InstanceTypeMismatch { object_id: 3311 })
        ));
    }

    #[test]
    fn test_failed_tlv_write_restores_prior_values() {
        let mut entry = entry_with_instance();

        let good = encode_resources(&[Resource::string(0, "lamp"), Resource::integer(1, 40)])
            .expect("encode");
        let records = parse_tlv(&good).expect("parse");
        entry.write_tlv(0, &records).expect("write");

        // Level 900 fails validation after the label was already written.
        let bad = encode_resources(&[Resource::string(0, "changed"), Resource::integer(1, 900)])
            .expect("encode");
        let records = parse_tlv(&bad).expect("parse");
        assert_eq!(entry.write_tlv(0, &records), Err(OpError::BadRequest));

        let resources = entry.read_instance(0).expect("read");
        assert_eq!(
            resources[0].single_value(),
            Some(&ResourceValue::String("lamp".into()))
        );
        assert_eq!(resources[1].single_value(), Some(&ResourceValue::Int(40)));
    }

    #[test]
    fn test_failed_tlv_write_clears_resources_set_from_empty() {
        let mut entry = entry_with_instance();

        // The label is empty before this batch; the level fails validation
        // after the label was already applied.
        let bad = encode_resources(&[Resource::string(0, "ghost"), Resource::integer(1, 900)])
            .expect("encode");
        let records = parse_tlv(&bad).expect("parse");
        assert_eq!(entry.write_tlv(0, &records), Err(OpError::BadRequest));

        // The label went back to empty, not to "ghost".
        let resources = entry.read_instance(0).expect("read");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id(), 1);
        assert_eq!(entry.read(0, 0), Err(OpError::NotFound));
    }
}
