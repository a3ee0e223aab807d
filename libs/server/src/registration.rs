//! The registration interface: POST on `/rd`, update and deregister on the
//! per-client location `/rd/<loc>`.
//!
//! Locations are 32-character UUID-derived opaques without hyphens. A second
//! registration under an already-known endpoint name evicts the earlier
//! entry first, including its observer entries, which receive no further
//! dispatches.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use codec::parse_registration_payload;
use transport::{InboundRequest, Method, Request, Response, ResponseCode};
use types::constants::{DEFAULT_CLIENT_LIFETIME, LWM2M_VERSION};
use types::{BindingMode, RegistrationEvent};

use crate::client_info::{ClientDetails, ClientInfo};
use crate::Server;

pub(crate) async fn run(server: Server, mut inbound: mpsc::Receiver<InboundRequest>) {
    while let Some(request) = inbound.recv().await {
        handle(&server, request).await;
    }
    debug!("inbound channel closed, registration dispatch ending");
}

async fn handle(server: &Server, inbound: InboundRequest) {
    let method = inbound.request.method;
    let segments = inbound.request.path.clone();

    if segments.first().map(String::as_str) != Some("rd") || segments.len() > 2 {
        inbound.respond(Response::new(ResponseCode::NotFound));
        return;
    }

    match (method, segments.len()) {
        (Method::Post, 1) => register(server, inbound).await,
        (Method::Post | Method::Put, 2) => {
            let location = segments[1].clone();
            update(server, inbound, &location).await;
        }
        (Method::Delete, 2) => {
            let location = segments[1].clone();
            deregister(server, inbound, &location).await;
        }
        _ => inbound.respond(Response::new(ResponseCode::MethodNotAllowed)),
    }
}

/// Query parameters common to register and update. `ep` handling differs
/// between the two, so it stays with the callers.
struct QueryParams {
    lifetime: Option<u32>,
    binding: Option<BindingMode>,
    sms: Option<String>,
}

fn parse_query(request: &Request) -> Result<QueryParams, ()> {
    let lifetime = match request.query_param("lt") {
        None => None,
        Some(raw) => match raw.parse::<u32>() {
            Ok(lifetime) => Some(lifetime),
            Err(_) => {
                warn!(lt = raw, "lifetime is not an integer");
                return Err(());
            }
        },
    };

    let binding = match request.query_param("b") {
        None => None,
        Some(raw) => match raw.parse::<BindingMode>() {
            Ok(binding) => Some(binding),
            Err(err) => {
                warn!(error = %err, "unusable binding mode");
                return Err(());
            }
        },
    };

    if let Some(version) = request.query_param("lwm2m") {
        if version != LWM2M_VERSION {
            warn!(version, "unsupported protocol version");
            return Err(());
        }
    }

    Ok(QueryParams {
        lifetime,
        binding,
        sms: request.query_param("sms").map(String::from),
    })
}

async fn register(server: &Server, inbound: InboundRequest) {
    let request = &inbound.request;

    let name = match request.query_param("ep") {
        Some(ep) if !ep.is_empty() => ep.to_string(),
        _ => {
            warn!("registration without an endpoint name");
            inbound.respond(Response::new(ResponseCode::BadRequest));
            return;
        }
    };

    let Ok(params) = parse_query(request) else {
        inbound.respond(Response::new(ResponseCode::BadRequest));
        return;
    };

    if request.payload.is_empty() {
        warn!(name = %name, "registration request has no payload");
        inbound.respond(Response::new(ResponseCode::BadRequest));
        return;
    }
    let entries = match std::str::from_utf8(&request.payload)
        .map_err(|_| ())
        .and_then(|text| parse_registration_payload(text).map_err(|err| {
            warn!(name = %name, error = %err, "unusable registration payload");
        })) {
        Ok(entries) => entries,
        Err(()) => {
            inbound.respond(Response::new(ResponseCode::BadRequest));
            return;
        }
    };

    // A name collision evicts the earlier registration silently.
    if let Some(old) = server.find_client_by_name(&name) {
        debug!(name = %name, "client already exists, replacing it");
        server.remove_client(&old).await;
    }

    let location = Uuid::new_v4().simple().to_string();
    let client = Arc::new(ClientInfo::new(
        name,
        location.clone(),
        inbound.peer,
        inbound.secure,
        ClientDetails {
            sms: params.sms,
            objects_path: entries.objects_path,
            lifetime: params.lifetime.unwrap_or(DEFAULT_CLIENT_LIFETIME),
            binding: params.binding.unwrap_or_default(),
            registered_at: Instant::now(),
            objects: entries.objects,
        },
    ));

    info!(
        name = client.name(),
        location = %location,
        lifetime = client.lifetime(),
        binding = %client.binding_mode(),
        secure = client.is_secure(),
        "client registered"
    );

    server.register_client(Arc::clone(&client));
    inbound.respond(
        Response::new(ResponseCode::Created)
            .with_location(vec!["rd".to_string(), location]),
    );
    server.dispatch_event(&client, RegistrationEvent::Register);
}

async fn update(server: &Server, inbound: InboundRequest, location: &str) {
    let Some(client) = server.find_client_by_location(location) else {
        inbound.respond(Response::new(ResponseCode::NotFound));
        return;
    };
    let request = &inbound.request;

    // The name is immutable; an update naming a different (non-empty) `ep`
    // is refused, while an empty one is tolerated.
    if let Some(ep) = request.query_param("ep") {
        if !ep.is_empty() {
            warn!(name = client.name(), "client tried to rename itself on update");
            inbound.respond(Response::new(ResponseCode::BadRequest));
            return;
        }
    }

    let Ok(params) = parse_query(request) else {
        inbound.respond(Response::new(ResponseCode::BadRequest));
        return;
    };

    let replacement = if request.payload.is_empty() {
        None
    } else {
        match std::str::from_utf8(&request.payload)
            .ok()
            .and_then(|text| parse_registration_payload(text).ok())
        {
            Some(entries) => Some(entries),
            None => {
                warn!(name = client.name(), "unusable update payload");
                inbound.respond(Response::new(ResponseCode::BadRequest));
                return;
            }
        }
    };

    {
        let mut details = client.details.lock();
        if let Some(lifetime) = params.lifetime {
            details.lifetime = lifetime;
        }
        if let Some(binding) = params.binding {
            details.binding = binding;
        }
        if params.sms.is_some() {
            details.sms = params.sms;
        }
        if let Some(entries) = replacement {
            details.objects_path = entries.objects_path;
            details.objects = entries.objects;
        }
        details.registered_at = Instant::now();
    }

    debug!(name = client.name(), "client updated");
    server.reschedule_lifetime();
    inbound.respond(Response::new(ResponseCode::Changed));
    server.dispatch_event(&client, RegistrationEvent::Update);
}

async fn deregister(server: &Server, inbound: InboundRequest, location: &str) {
    let Some(client) = server.find_client_by_location(location) else {
        inbound.respond(Response::new(ResponseCode::NotFound));
        return;
    };

    info!(name = client.name(), "client deregistered");
    server.remove_client(&client).await;
    server.reschedule_lifetime();
    inbound.respond(Response::new(ResponseCode::Deleted));
    server.dispatch_event(&client, RegistrationEvent::Unregister);
}
