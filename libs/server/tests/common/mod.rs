//! Shared fixtures: a device-flavored client wired to a server over the
//! loopback transport.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use codec::Tlv;
use lwm2m_client::standard::{SecurityInstance, SecurityObject, ServerInstance, ServerObject};
use lwm2m_client::{Client, Object, OpError, Payload};
use lwm2m_server::{Server, ServerConfig};
use transport::loopback::Network;
use types::{RegistrationEvent, Resource};

pub fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().expect("test addr")
}

/// A device-ish object: 0 = manufacturer (string, read-only), 9 = battery
/// level (int, writable), 4 = reboot (executable).
pub struct DeviceObject;

pub struct DeviceState {
    pub manufacturer: String,
    pub battery: i64,
    pub reboots: u32,
}

impl DeviceState {
    pub fn new(manufacturer: &str) -> DeviceState {
        DeviceState {
            manufacturer: manufacturer.to_string(),
            battery: 100,
            reboots: 0,
        }
    }
}

impl Object for DeviceObject {
    type Instance = DeviceState;

    fn object_id(&self) -> u16 {
        3
    }

    fn resource_count(&self) -> u16 {
        10
    }

    fn create(&mut self, _instance_id: u16, _payload: Payload<'_>) -> Result<DeviceState, OpError> {
        Ok(DeviceState::new("Acme Corp"))
    }

    fn read(&mut self, instance: &mut DeviceState, resource_id: u16) -> Result<Resource, OpError> {
        match resource_id {
            0 => Ok(Resource::string(0, instance.manufacturer.clone())),
            9 => Ok(Resource::integer(9, instance.battery)),
            id if id < 10 => Err(OpError::NotFound),
            _ => Err(OpError::BadRequest),
        }
    }

    fn write_tlv(
        &mut self,
        instance: &mut DeviceState,
        records: &[Tlv<'_>],
    ) -> Result<(), OpError> {
        for record in records {
            match record.id {
                9 => instance.battery = record.as_int().map_err(|_| OpError::BadRequest)?,
                _ => return Err(OpError::BadRequest),
            }
        }
        Ok(())
    }

    fn execute(
        &mut self,
        instance: &mut DeviceState,
        resource_id: u16,
        _args: &str,
    ) -> Result<(), OpError> {
        if resource_id == 4 {
            instance.reboots += 1;
            Ok(())
        } else {
            Err(OpError::MethodNotAllowed)
        }
    }

    fn delete(&mut self, _instance: &mut DeviceState) -> Result<(), OpError> {
        Ok(())
    }
}

/// A location object (id 6): 0 = latitude, 1 = longitude, both floats.
pub struct LocationObject;

pub struct LocationState {
    pub latitude: f64,
    pub longitude: f64,
}

impl Object for LocationObject {
    type Instance = LocationState;

    fn object_id(&self) -> u16 {
        6
    }

    fn resource_count(&self) -> u16 {
        2
    }

    fn read(&mut self, instance: &mut LocationState, resource_id: u16) -> Result<Resource, OpError> {
        match resource_id {
            0 => Ok(Resource::float(0, instance.latitude)),
            1 => Ok(Resource::float(1, instance.longitude)),
            _ => Err(OpError::BadRequest),
        }
    }

    fn write_tlv(
        &mut self,
        instance: &mut LocationState,
        records: &[Tlv<'_>],
    ) -> Result<(), OpError> {
        for record in records {
            match record.id {
                0 => instance.latitude = record.as_float().map_err(|_| OpError::BadRequest)?,
                1 => instance.longitude = record.as_float().map_err(|_| OpError::BadRequest)?,
                _ => return Err(OpError::BadRequest),
            }
        }
        Ok(())
    }

    fn delete(&mut self, _instance: &mut LocationState) -> Result<(), OpError> {
        Ok(())
    }
}

pub fn new_server(network: &Network, server_addr: SocketAddr) -> Server {
    let (endpoint, inbound) = network.endpoint(server_addr);
    Server::new(ServerConfig::default(), endpoint, inbound).expect("server")
}

/// Builds a client announcing the standard objects plus device and location,
/// pointed at `server_addr` with the given registration lifetime.
pub fn device_client(
    network: &Network,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    name: &str,
    lifetime: i64,
) -> Client {
    let (endpoint, inbound) = network.endpoint(client_addr);
    let client = Client::builder(name)
        .object(SecurityObject)
        .object(ServerObject)
        .object(DeviceObject)
        .object(LocationObject)
        .build(endpoint, inbound);

    client
        .add_object_instance(
            0,
            SecurityInstance::server(format!("coap://{}", server_addr), 101),
        )
        .expect("security instance");
    client
        .add_object_instance(1, ServerInstance::new(101, lifetime))
        .expect("server instance");
    client
        .add_object_instance(3, DeviceState::new("Acme Corp"))
        .expect("device instance");
    client
        .add_object_instance(
            6,
            LocationState {
                latitude: 48.15,
                longitude: 11.58,
            },
        )
        .expect("location instance");
    client
}

pub type Events = Arc<Mutex<Vec<(String, RegistrationEvent)>>>;

/// Records every registration event the server dispatches.
pub fn record_events(server: &Server) -> Events {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    server.add_registration_monitor(move |client, event| {
        sink.lock()
            .expect("events lock")
            .push((client.name().to_string(), event));
    });
    events
}
