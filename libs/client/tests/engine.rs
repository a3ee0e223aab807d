//! Client engine behavior observed from a hand-driven server endpoint:
//! registration wire format, heartbeat timing, TLV reads, the update
//! trigger and deregistration.

use std::net::SocketAddr;
use std::time::Duration;

use codec::{parse_registration_payload, Tlv};
use lwm2m_client::standard::{SecurityInstance, SecurityObject, ServerInstance, ServerObject};
use lwm2m_client::{Client, LifecycleState, Object, OpError, Payload};
use tokio::sync::mpsc;
use transport::loopback::Network;
use transport::{Endpoint, InboundRequest, Method, Request, Response, ResponseCode};
use types::{ContentFormat, Resource};

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().expect("test addr")
}

struct DeviceObject;

struct DeviceState {
    manufacturer: String,
}

impl Object for DeviceObject {
    type Instance = DeviceState;

    fn object_id(&self) -> u16 {
        3
    }

    fn resource_count(&self) -> u16 {
        1
    }

    fn create(&mut self, _instance_id: u16, _payload: Payload<'_>) -> Result<DeviceState, OpError> {
        Ok(DeviceState {
            manufacturer: "Acme Corp".to_string(),
        })
    }

    fn read(&mut self, instance: &mut DeviceState, resource_id: u16) -> Result<Resource, OpError> {
        match resource_id {
            0 => Ok(Resource::string(0, instance.manufacturer.clone())),
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
                0 => {
                    instance.manufacturer =
                        record.as_str().map_err(|_| OpError::BadRequest)?.to_string()
                }
                _ => return Err(OpError::BadRequest),
            }
        }
        Ok(())
    }

    fn delete(&mut self, _instance: &mut DeviceState) -> Result<(), OpError> {
        Ok(())
    }
}

fn test_client(network: &Network, client_addr: SocketAddr, server_addr: SocketAddr, lifetime: i64) -> Client {
    let (endpoint, inbound) = network.endpoint(client_addr);
    let client = Client::builder("dev1")
        .object(SecurityObject)
        .object(ServerObject)
        .object(DeviceObject)
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
        .add_object_instance(
            3,
            DeviceState {
                manufacturer: "Acme Corp".to_string(),
            },
        )
        .expect("device instance");
    client
}

const LOCATION: &str = "00112233445566778899aabbccddeeff";

/// Accepts one registration, handing back the assigned location path.
async fn accept_registration(server_rx: &mut mpsc::Receiver<InboundRequest>) -> Vec<String> {
    let inbound = server_rx.recv().await.expect("registration request");
    assert_eq!(inbound.request.method, Method::Post);
    assert_eq!(inbound.request.path, ["rd"]);
    let location = vec!["rd".to_string(), LOCATION.to_string()];
    inbound.respond(Response::new(ResponseCode::Created).with_location(location.clone()));
    location
}

#[tokio::test]
async fn test_registration_request_format() {
    let network = Network::new();
    let (_server, mut server_rx) = network.endpoint(addr(23001));
    let client = test_client(&network, addr(23002), addr(23001), 45);

    let serve = async {
        let inbound = server_rx.recv().await.expect("registration request");
        let request = &inbound.request;
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, ["rd"]);
        assert_eq!(request.query_param("ep"), Some("dev1"));
        assert_eq!(request.query_param("lt"), Some("45"));
        assert_eq!(request.query_param("b"), Some("U"));
        assert_eq!(request.query_param("lwm2m"), Some("1.0"));

        let payload = std::str::from_utf8(&request.payload).expect("utf8 payload");
        let entries = parse_registration_payload(payload).expect("link format");
        assert!(entries.objects.contains(&(0, vec![0])));
        assert!(entries.objects.contains(&(1, vec![0])));
        assert!(entries.objects.contains(&(3, vec![0])));

        inbound.respond(
            Response::new(ResponseCode::Created)
                .with_location(vec!["rd".to_string(), LOCATION.to_string()]),
        );
    };

    let (result, ()) = tokio::join!(client.start(), serve);
    result.expect("start");
    assert_eq!(client.lifecycle(), LifecycleState::Registered);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_updates_before_lifetime_expires() {
    let network = Network::new();
    let (_server, mut server_rx) = network.endpoint(addr(23011));
    let client = test_client(&network, addr(23012), addr(23011), 10);

    let (result, location) = tokio::join!(client.start(), accept_registration(&mut server_rx));
    result.expect("start");

    let started = tokio::time::Instant::now();
    let update = server_rx.recv().await.expect("heartbeat update");
    // lifetime 10s minus the 2s margin.
    assert_eq!(started.elapsed(), Duration::from_secs(8));
    assert_eq!(update.request.method, Method::Post);
    assert_eq!(update.request.path, location);
    assert!(update.request.payload.is_empty(), "plain update has no payload");
    update.respond(Response::new(ResponseCode::Changed));
}

#[tokio::test]
async fn test_read_resource_yields_tlv() {
    let network = Network::new();
    let (server, mut server_rx) = network.endpoint(addr(23021));
    let client = test_client(&network, addr(23022), addr(23021), 60);
    let (result, _location) = tokio::join!(client.start(), accept_registration(&mut server_rx));
    result.expect("start");

    let request = Request::new(
        Method::Get,
        vec!["3".to_string(), "0".to_string(), "0".to_string()],
    );
    let response = server.request(addr(23022), request).await.expect("read");
    assert_eq!(response.code, ResponseCode::Content);
    assert_eq!(response.content_format, Some(ContentFormat::Tlv));
    // One resource-with-value record: 0xC8, id 0, one length byte of 9.
    let mut expected = vec![0xC8, 0x00, 0x09];
    expected.extend_from_slice(b"Acme Corp");
    assert_eq!(response.payload.as_ref(), expected.as_slice());
}

#[tokio::test]
async fn test_update_trigger_execute_sends_update() {
    let network = Network::new();
    let (server, mut server_rx) = network.endpoint(addr(23031));
    let client = test_client(&network, addr(23032), addr(23031), 60);
    let (result, location) = tokio::join!(client.start(), accept_registration(&mut server_rx));
    result.expect("start");

    let request = Request::new(
        Method::Post,
        vec!["1".to_string(), "0".to_string(), "8".to_string()],
    );
    let execute = server.request(addr(23032), request);
    let serve = async {
        let update = server_rx.recv().await.expect("triggered update");
        assert_eq!(update.request.method, Method::Post);
        assert_eq!(update.request.path, location);
        update.respond(Response::new(ResponseCode::Changed));
    };
    let (response, ()) = tokio::join!(execute, serve);
    assert_eq!(response.expect("execute").code, ResponseCode::Changed);
}

#[tokio::test]
async fn test_certificate_security_mode_is_rejected() {
    let network = Network::new();
    let (_server, _server_rx) = network.endpoint(addr(23051));
    let (endpoint, inbound) = network.endpoint(addr(23052));
    let client = Client::builder("dev1")
        .object(SecurityObject)
        .build(endpoint, inbound);

    let mut account = SecurityInstance::server(format!("coap://{}", addr(23051)), 101);
    account.security_mode = 2;
    client.add_object_instance(0, account).expect("account");

    let err = client.start().await.expect_err("certificate mode refused");
    assert!(matches!(
        err,
        lwm2m_client::ClientError::Security(transport::SecurityError::UnsupportedMode { .. })
    ));
    assert_eq!(client.lifecycle(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_stop_deregisters_and_stops_serving() {
    let network = Network::new();
    let (server, mut server_rx) = network.endpoint(addr(23041));
    let client = test_client(&network, addr(23042), addr(23041), 60);
    let (result, location) = tokio::join!(client.start(), accept_registration(&mut server_rx));
    result.expect("start");

    let serve = async {
        let inbound = server_rx.recv().await.expect("deregistration");
        assert_eq!(inbound.request.method, Method::Delete);
        assert_eq!(inbound.request.path, location);
        inbound.respond(Response::new(ResponseCode::Deleted));
    };
    let (stopped, ()) = tokio::join!(client.stop(), serve);
    stopped.expect("stop");
    assert_eq!(client.lifecycle(), LifecycleState::Stopped);

    // A stopped client answers nothing useful.
    let request = Request::new(
        Method::Get,
        vec!["3".to_string(), "0".to_string(), "0".to_string()],
    );
    let response = server.request(addr(23042), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::ServiceUnavailable);
}
