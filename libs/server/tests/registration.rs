//! Registration-interface scenarios: register and read, name uniqueness,
//! lifetime eviction, create/delete and malformed payloads.

mod common;

use std::time::Duration;

use codec::parse_tlv;
use common::{addr, device_client, new_server, record_events};
use transport::loopback::Network;
use transport::{Endpoint, Method, Request, ResponseCode};
use types::{ContentFormat, RegistrationEvent, Resource};

/// Link-format registration payload used by the raw (engine-less) client.
const RAW_PAYLOAD: &str = "</3>,</3/0>";

fn raw_register(name: &str, lifetime: u32) -> Request {
    let mut request = Request::new(Method::Post, vec!["rd".into()])
        .with_query("ep", name)
        .with_query("lt", lifetime)
        .with_query("b", "U");
    request.payload = RAW_PAYLOAD.as_bytes().to_vec().into();
    request
}

#[tokio::test]
async fn test_register_and_read() {
    let network = Network::new();
    let server = new_server(&network, addr(20001));
    let events = record_events(&server);

    let client = device_client(&network, addr(20002), addr(20001), "dev1", 60);
    client.start().await.expect("start");

    let clients = server.get_clients();
    assert_eq!(clients.len(), 1);
    let info = &clients[0];
    assert_eq!(info.name(), "dev1");
    assert_eq!(info.location().len(), 32);
    assert_eq!(info.lifetime(), 60);
    let objects = info.objects();
    assert!(objects.contains(&(3, vec![0])));
    assert!(objects.contains(&(6, vec![0])));

    // Read the manufacturer resource; the representation is TLV.
    let read = server.read(info, "/3/0/0").await.expect("read");
    assert_eq!(read.code, ResponseCode::Content);
    assert_eq!(read.content_format, Some(ContentFormat::Tlv));
    let records = parse_tlv(&read.payload).expect("decode");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, 0);
    assert_eq!(records[0].as_str().expect("utf8"), "Acme Corp");

    // Reading a whole instance omits the empty resources.
    let read = server.read(info, "/3/0").await.expect("read instance");
    let records = parse_tlv(&read.payload).expect("decode");
    assert_eq!(records.len(), 2);

    assert_eq!(
        events.lock().expect("events")[..],
        [("dev1".to_string(), RegistrationEvent::Register)]
    );
}

#[tokio::test]
async fn test_same_name_evicts_earlier_client() {
    let network = Network::new();
    let server = new_server(&network, addr(20011));
    let events = record_events(&server);

    let first = device_client(&network, addr(20012), addr(20011), "twin", 60);
    first.start().await.expect("first start");
    let second = device_client(&network, addr(20013), addr(20011), "twin", 60);
    second.start().await.expect("second start");

    let clients = server.get_clients();
    assert_eq!(clients.len(), 1, "only the later registration survives");
    assert_eq!(clients[0].address(), addr(20013));

    // The eviction itself dispatches nothing; only the two registrations.
    let recorded = events.lock().expect("events").clone();
    assert_eq!(
        recorded,
        vec![
            ("twin".to_string(), RegistrationEvent::Register),
            ("twin".to_string(), RegistrationEvent::Register),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_eviction_after_silence() {
    let network = Network::new();
    let server = new_server(&network, addr(20021));
    let events = record_events(&server);

    // A raw client that will never send updates.
    let (raw, _raw_inbound) = network.endpoint(addr(20022));
    let response = raw
        .request(addr(20021), raw_register("sleepy", 3))
        .await
        .expect("register");
    assert_eq!(response.code, ResponseCode::Created);
    assert_eq!(server.get_clients().len(), 1);

    // lifetime 3s + 2s margin: nothing happens before second 5.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(events
        .lock()
        .expect("events")
        .iter()
        .all(|(_, e)| *e != RegistrationEvent::Timeout));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(server.get_clients().is_empty());
    assert!(events
        .lock()
        .expect("events")
        .contains(&("sleepy".to_string(), RegistrationEvent::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_update_defers_eviction() {
    let network = Network::new();
    let server = new_server(&network, addr(20031));
    let events = record_events(&server);

    let (raw, _raw_inbound) = network.endpoint(addr(20032));
    let response = raw
        .request(addr(20031), raw_register("heartbeat", 3))
        .await
        .expect("register");
    let location = response.location_path.clone();
    assert_eq!(location.len(), 2);

    // Update at second 2 pushes the deadline to 2 + 3 (+2 margin).
    tokio::time::sleep(Duration::from_secs(2)).await;
    let update = Request::new(Method::Post, location);
    let response = raw.request(addr(20031), update).await.expect("update");
    assert_eq!(response.code, ResponseCode::Changed);

    tokio::time::sleep(Duration::from_secs(4)).await;
    {
        let recorded = events.lock().expect("events");
        assert!(recorded.contains(&("heartbeat".to_string(), RegistrationEvent::Update)));
        assert!(
            recorded.iter().all(|(_, e)| *e != RegistrationEvent::Timeout),
            "no timeout within the refreshed lifetime"
        );
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(events
        .lock()
        .expect("events")
        .contains(&("heartbeat".to_string(), RegistrationEvent::Timeout)));
}

#[tokio::test]
async fn test_register_query_validation() {
    let network = Network::new();
    let server = new_server(&network, addr(20041));
    let (raw, _raw_inbound) = network.endpoint(addr(20042));

    // No endpoint name at all.
    let mut request = Request::new(Method::Post, vec!["rd".into()]).with_query("lt", 60);
    request.payload = RAW_PAYLOAD.as_bytes().to_vec().into();
    let response = raw.request(addr(20041), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::BadRequest);

    // Empty endpoint name is refused on register.
    let mut request = Request::new(Method::Post, vec!["rd".into()]).with_query("ep", "");
    request.payload = RAW_PAYLOAD.as_bytes().to_vec().into();
    let response = raw.request(addr(20041), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::BadRequest);

    // Registration without a payload is refused.
    let request = raw_register("nopayload", 60);
    let request = Request {
        payload: Default::default(),
        ..request
    };
    let response = raw.request(addr(20041), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::BadRequest);

    // Unsupported protocol version.
    let request = raw_register("versioned", 60).with_query("lwm2m", "1.1");
    let response = raw.request(addr(20041), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::BadRequest);

    assert!(server.get_clients().is_empty());

    // An empty `ep` is tolerated on update, unlike on register.
    let response = raw
        .request(addr(20041), raw_register("updatable", 60))
        .await
        .expect("register");
    assert_eq!(response.code, ResponseCode::Created);
    let update = Request::new(Method::Post, response.location_path).with_query("ep", "");
    let response = raw.request(addr(20041), update).await.expect("update");
    assert_eq!(response.code, ResponseCode::Changed);
}

#[tokio::test]
async fn test_create_instance_then_delete() {
    let network = Network::new();
    let server = new_server(&network, addr(20051));
    let client = device_client(&network, addr(20052), addr(20051), "dev5", 120);
    client.start().await.expect("start");

    let info = &server.get_clients()[0];

    // Create a second server-object instance; the client assigns id 1.
    let code = server
        .create_object_instance(
            info,
            "/1",
            &[Resource::integer(0, 102), Resource::integer(1, 300)],
        )
        .await
        .expect("create");
    assert_eq!(code, ResponseCode::Created);

    // The client announces the new instance set through an update.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(info.objects().contains(&(1, vec![0, 1])));

    let code = server
        .delete_object_instance(info, "/1/1")
        .await
        .expect("delete");
    assert_eq!(code, ResponseCode::Deleted);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(info.objects().contains(&(1, vec![0])));
}

#[tokio::test]
async fn test_malformed_tlv_write_leaves_state_untouched() {
    let network = Network::new();
    let server = new_server(&network, addr(20061));
    let client = device_client(&network, addr(20062), addr(20061), "dev6", 120);
    client.start().await.expect("start");
    let info = &server.get_clients()[0];

    // A length header pointing past the end of the buffer.
    let (raw, _raw_inbound) = network.endpoint(addr(20063));
    let mut request = Request::new(Method::Put, vec!["3".into(), "0".into()]);
    request.content_format = Some(ContentFormat::Tlv);
    request.payload = vec![0xC8, 0x00, 0x09, b'a'].into();
    let response = raw.request(addr(20062), request).await.expect("exchange");
    assert_eq!(response.code, ResponseCode::BadRequest);

    // No resource was mutated.
    let read = server.read(info, "/3/0/9").await.expect("read");
    assert_eq!(read.code, ResponseCode::Content);
    let records = parse_tlv(&read.payload).expect("decode");
    assert_eq!(records[0].as_int().expect("int"), 100);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_client_reports_gateway_timeout() {
    let network = Network::new();
    let server = new_server(&network, addr(20071));
    let client = device_client(&network, addr(20072), addr(20071), "dev7", 120);
    client.start().await.expect("start");
    let info = server.get_clients()[0].clone();

    network.partition(addr(20072));
    let read = server.read(&info, "/3/0/0").await.expect("read completes");
    assert_eq!(read.code, ResponseCode::GatewayTimeout);
}
