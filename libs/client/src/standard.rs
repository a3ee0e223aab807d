//! Stock implementations of the two bootstrap-configurable objects.
//!
//! Every client needs a Security object (id 0) and usually a Server object
//! (id 1); the engine's startup scan reads them through the normal object
//! model to learn which servers to contact. These implementations keep the
//! account data in plain structs so factory configuration is a matter of
//! adding instances programmatically, and a bootstrap server can create and
//! rewrite them over the wire.
//!
//! The Server object's registration-update trigger (resource 8) is accepted
//! here and honored by the engine, which sends the update.

use codec::Tlv;
use types::constants::{security, server};
use types::{BindingMode, Resource, ResourceValue};

use crate::error::OpError;
use crate::object::{Object, Payload};

/// One Security object instance: a server or bootstrap-server account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityInstance {
    pub server_uri: String,
    pub is_bootstrap: bool,
    /// Numeric security mode (resource 2): 0 PSK, 1 RPK, 2 certificate,
    /// 3 NoSec.
    pub security_mode: i64,
    pub short_server_id: i64,
    pub client_hold_off_time: i64,
    pub bootstrap_account_timeout: Option<i64>,
}

impl SecurityInstance {
    /// A NoSec account for a regular server.
    pub fn server(server_uri: impl Into<String>, short_server_id: i64) -> SecurityInstance {
        SecurityInstance {
            server_uri: server_uri.into(),
            security_mode: 3,
            short_server_id,
            ..SecurityInstance::default()
        }
    }

    /// A NoSec account for a bootstrap server.
    pub fn bootstrap(server_uri: impl Into<String>, client_hold_off_time: i64) -> SecurityInstance {
        SecurityInstance {
            server_uri: server_uri.into(),
            is_bootstrap: true,
            security_mode: 3,
            client_hold_off_time,
            ..SecurityInstance::default()
        }
    }
}

/// The Security object (id 0).
#[derive(Debug, Default)]
pub struct SecurityObject;

fn apply_security_record(instance: &mut SecurityInstance, record: &Tlv<'_>) -> Result<(), OpError> {
    let bad = |_| OpError::BadRequest;
    match record.id {
        security::RES_SERVER_URI => {
            instance.server_uri = record.as_str().map_err(bad)?.to_string();
        }
        security::RES_IS_BOOTSTRAP => instance.is_bootstrap = record.as_bool().map_err(bad)?,
        security::RES_SECURITY_MODE => instance.security_mode = record.as_int().map_err(bad)?,
        security::RES_SHORT_SERVER_ID => {
            instance.short_server_id = record.as_int().map_err(bad)?;
        }
        security::RES_CLIENT_HOLD_OFF_TIME => {
            instance.client_hold_off_time = record.as_int().map_err(bad)?;
        }
        security::RES_BOOTSTRAP_ACCOUNT_TIMEOUT => {
            instance.bootstrap_account_timeout = Some(record.as_int().map_err(bad)?);
        }
        _ => return Err(OpError::BadRequest),
    }
    Ok(())
}

impl Object for SecurityObject {
    type Instance = SecurityInstance;

    fn object_id(&self) -> u16 {
        security::OBJECT_ID
    }

    fn resource_count(&self) -> u16 {
        13
    }

    fn create(&mut self, _instance_id: u16, payload: Payload<'_>) -> Result<SecurityInstance, OpError> {
        let mut instance = SecurityInstance::default();
        match payload {
            Payload::Tlv(bytes) => {
                for record in codec::TlvIter::new(bytes) {
                    let record = record.map_err(|_| OpError::BadRequest)?;
                    apply_security_record(&mut instance, &record)?;
                }
            }
            Payload::None => {}
            Payload::Text(_) | Payload::Opaque(_) => return Err(OpError::BadRequest),
        }
        if instance.server_uri.is_empty() {
            return Err(OpError::BadRequest);
        }
        Ok(instance)
    }

    fn read(&mut self, instance: &mut SecurityInstance, resource_id: u16) -> Result<Resource, OpError> {
        match resource_id {
            security::RES_SERVER_URI => {
                Ok(Resource::string(resource_id, instance.server_uri.clone()))
            }
            security::RES_IS_BOOTSTRAP => Ok(Resource::boolean(resource_id, instance.is_bootstrap)),
            security::RES_SECURITY_MODE => Ok(Resource::integer(resource_id, instance.security_mode)),
            security::RES_SHORT_SERVER_ID => {
                Ok(Resource::integer(resource_id, instance.short_server_id))
            }
            security::RES_CLIENT_HOLD_OFF_TIME => {
                Ok(Resource::integer(resource_id, instance.client_hold_off_time))
            }
            security::RES_BOOTSTRAP_ACCOUNT_TIMEOUT => instance
                .bootstrap_account_timeout
                .map(|timeout| Resource::integer(resource_id, timeout))
                .ok_or(OpError::NotFound),
            id if id < 13 => Err(OpError::NotFound),
            _ => Err(OpError::BadRequest),
        }
    }

    fn write_tlv(
        &mut self,
        instance: &mut SecurityInstance,
        records: &[Tlv<'_>],
    ) -> Result<(), OpError> {
        for record in records {
            apply_security_record(instance, record)?;
        }
        Ok(())
    }

    fn clear_resource(
        &mut self,
        instance: &mut SecurityInstance,
        resource_id: u16,
    ) -> Result<(), OpError> {
        // The account timeout is the only resource of this object that can
        // be empty; everything else always carries a value.
        match resource_id {
            security::RES_BOOTSTRAP_ACCOUNT_TIMEOUT => {
                instance.bootstrap_account_timeout = None;
                Ok(())
            }
            _ => Err(OpError::MethodNotAllowed),
        }
    }

    fn delete(&mut self, _instance: &mut SecurityInstance) -> Result<(), OpError> {
        Ok(())
    }
}

/// One Server object instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInstance {
    pub short_server_id: i64,
    /// Registration lifetime in seconds.
    pub lifetime: i64,
    pub binding: BindingMode,
}

impl ServerInstance {
    pub fn new(short_server_id: i64, lifetime: i64) -> ServerInstance {
        ServerInstance {
            short_server_id,
            lifetime,
            binding: BindingMode::U,
        }
    }
}

impl Default for ServerInstance {
    fn default() -> ServerInstance {
        ServerInstance::new(0, types::constants::DEFAULT_CLIENT_LIFETIME as i64)
    }
}

/// The Server object (id 1).
#[derive(Debug, Default)]
pub struct ServerObject;

fn apply_server_record(instance: &mut ServerInstance, record: &Tlv<'_>) -> Result<(), OpError> {
    let bad = |_| OpError::BadRequest;
    match record.id {
        server::RES_SHORT_SERVER_ID => instance.short_server_id = record.as_int().map_err(bad)?,
        server::RES_LIFETIME => instance.lifetime = record.as_int().map_err(bad)?,
        server::RES_BINDING => {
            instance.binding = record
                .as_str()
                .map_err(bad)?
                .parse()
                .map_err(|_| OpError::BadRequest)?;
        }
        _ => return Err(OpError::BadRequest),
    }
    Ok(())
}

impl Object for ServerObject {
    type Instance = ServerInstance;

    fn object_id(&self) -> u16 {
        server::OBJECT_ID
    }

    fn resource_count(&self) -> u16 {
        9
    }

    fn create(&mut self, _instance_id: u16, payload: Payload<'_>) -> Result<ServerInstance, OpError> {
        let mut instance = ServerInstance::default();
        match payload {
            Payload::Tlv(bytes) => {
                for record in codec::TlvIter::new(bytes) {
                    let record = record.map_err(|_| OpError::BadRequest)?;
                    apply_server_record(&mut instance, &record)?;
                }
            }
            Payload::None => {}
            Payload::Text(_) | Payload::Opaque(_) => return Err(OpError::BadRequest),
        }
        Ok(instance)
    }

    fn read(&mut self, instance: &mut ServerInstance, resource_id: u16) -> Result<Resource, OpError> {
        match resource_id {
            server::RES_SHORT_SERVER_ID => {
                Ok(Resource::integer(resource_id, instance.short_server_id))
            }
            server::RES_LIFETIME => Ok(Resource::integer(resource_id, instance.lifetime)),
            server::RES_BINDING => {
                Ok(Resource::string(resource_id, instance.binding.to_string()))
            }
            id if id < 9 => Err(OpError::NotFound),
            _ => Err(OpError::BadRequest),
        }
    }

    fn write_resource(
        &mut self,
        instance: &mut ServerInstance,
        resource: &Resource,
    ) -> Result<(), OpError> {
        let value = resource.single_value().ok_or(OpError::BadRequest)?;
        match (resource.id(), value) {
            (server::RES_SHORT_SERVER_ID, ResourceValue::Int(v)) => instance.short_server_id = *v,
            (server::RES_LIFETIME, ResourceValue::Int(v)) => instance.lifetime = *v,
            (server::RES_BINDING, ResourceValue::String(v)) => {
                instance.binding = v.parse().map_err(|_| OpError::BadRequest)?;
            }
            _ => return Err(OpError::BadRequest),
        }
        Ok(())
    }

    fn write_tlv(
        &mut self,
        instance: &mut ServerInstance,
        records: &[Tlv<'_>],
    ) -> Result<(), OpError> {
        for record in records {
            apply_server_record(instance, record)?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        _instance: &mut ServerInstance,
        resource_id: u16,
        _args: &str,
    ) -> Result<(), OpError> {
        // The engine watches for this execute and sends the update itself.
        if resource_id == server::RES_REGISTRATION_UPDATE_TRIGGER {
            Ok(())
        } else {
            Err(OpError::MethodNotAllowed)
        }
    }

    fn delete(&mut self, _instance: &mut ServerInstance) -> Result<(), OpError> {
        Ok(())
    }
}
