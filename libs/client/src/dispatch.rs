//! Inbound request dispatch: management and bootstrap operations arriving
//! from servers, routed into the object model.
//!
//! Every request gets exactly one response. Mutating operations collect the
//! changed paths and feed them to the observation machinery after the reply
//! is sent, so observers always see the post-write state.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use codec::{parse_tlv, Tlv, TlvKind};
use transport::message::observe;
use transport::{InboundRequest, Method, Request, Response, ResponseCode, Token};
use types::constants::{security, server};
use types::{ContentFormat, Path};

use crate::error::OpError;
use crate::object::{ObjectDispatch, Payload};
use crate::{Client, ClientState, LifecycleState, Observation};

/// Work to do after the response went out.
enum PostAction {
    /// A successful execute on the registration-update trigger, or an
    /// instance-set change that servers must learn about.
    TriggerUpdate,
    /// Bootstrap-Finish arrived; dispatch the event and re-register.
    CompleteBootstrap,
}

pub(crate) async fn run(client: Client, mut inbound: mpsc::Receiver<InboundRequest>) {
    while let Some(request) = inbound.recv().await {
        handle(&client, request).await;
    }
    debug!("inbound channel closed, dispatch ending");
}

async fn handle(client: &Client, inbound: InboundRequest) {
    let peer = inbound.peer;
    let token = inbound.token;
    let request = inbound.request.clone();
    let (response, changed, actions) = process(client, peer, token, &request);
    inbound.respond(response);

    if !changed.is_empty() {
        client.notify_changed(&changed).await;
    }
    for action in actions {
        match action {
            PostAction::TriggerUpdate => {
                client.spawn_update();
            }
            PostAction::CompleteBootstrap => {
                info!("bootstrap finished");
                client.complete_bootstrap();
            }
        }
    }
}

fn process(
    client: &Client,
    peer: std::net::SocketAddr,
    token: Token,
    request: &Request,
) -> (Response, Vec<Path>, Vec<PostAction>) {
    let plain = |code| (Response::new(code), Vec::new(), Vec::new());

    let mut state = client.inner.state.lock();

    // Bootstrap-Finish is addressed to /bs, outside the objects tree.
    if request.method == Method::Post && request.path == ["bs"] {
        if state.lifecycle != LifecycleState::Bootstrapping {
            warn!("bootstrap finish outside a bootstrap session");
            return plain(ResponseCode::BadRequest);
        }
        state.lifecycle = LifecycleState::BootstrapFinished;
        return (
            Response::new(ResponseCode::Changed),
            Vec::new(),
            vec![PostAction::CompleteBootstrap],
        );
    }

    if state.lifecycle == LifecycleState::Stopped {
        return plain(ResponseCode::ServiceUnavailable);
    }

    let segments = strip_objects_path(client.inner.objects_path.as_deref(), &request.path);
    let path = match Path::from_segments(&segments) {
        Ok(path) => path,
        Err(err) => {
            debug!(error = %err, "unparseable request path");
            return plain(ResponseCode::BadRequest);
        }
    };

    let bootstrapping = state.lifecycle == LifecycleState::Bootstrapping;
    if bootstrapping {
        state.bootstrap_write_seen = true;
    }

    match request.method {
        Method::Get => handle_read(&mut state, peer, token, path, request),
        Method::Put => handle_write(&mut state, path, request, bootstrapping),
        Method::Post => handle_post(&mut state, path, request, bootstrapping),
        Method::Delete => handle_delete(&mut state, path, bootstrapping),
    }
}

fn strip_objects_path(objects_path: Option<&str>, path: &[String]) -> Vec<String> {
    if let Some(prefix) = objects_path {
        let prefix: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        if path.len() >= prefix.len()
            && prefix.iter().zip(path).all(|(a, b)| a == b)
        {
            return path[prefix.len()..].to_vec();
        }
    }
    path.to_vec()
}

/// Expands a read of a path into its TLV representation. Resources that
/// answer `NotFound` are omitted; a fully-empty result is `NotFound`.
pub(crate) fn read_representation(
    objects: &mut BTreeMap<u16, Box<dyn ObjectDispatch>>,
    path: &Path,
) -> Result<Vec<u8>, OpError> {
    let object_id = path.object_id().ok_or(OpError::BadRequest)?;
    let entry = objects.get_mut(&object_id).ok_or(OpError::NotFound)?;

    let internal = |_| OpError::Internal;
    match *path {
        Path::Resource(_, instance_id, resource_id) => {
            let resource = entry.read(instance_id, resource_id)?;
            codec::encode_resources(std::slice::from_ref(&resource)).map_err(internal)
        }
        Path::Instance(_, instance_id) => {
            let resources = entry.read_instance(instance_id)?;
            if resources.is_empty() {
                return Err(OpError::NotFound);
            }
            codec::encode_resources(&resources).map_err(internal)
        }
        Path::Object(_) => {
            let mut instances = Vec::new();
            for instance_id in entry.instance_ids() {
                match entry.read_instance(instance_id) {
                    Ok(resources) if !resources.is_empty() => {
                        instances.push((instance_id, resources))
                    }
                    Ok(_) | Err(OpError::NotFound) => continue,
                    Err(err) => return Err(err),
                }
            }
            if instances.is_empty() {
                return Err(OpError::NotFound);
            }
            codec::encode_object_instances(&instances).map_err(internal)
        }
        Path::Root => Err(OpError::BadRequest),
    }
}

fn handle_read(
    state: &mut ClientState,
    peer: std::net::SocketAddr,
    token: Token,
    path: Path,
    request: &Request,
) -> (Response, Vec<Path>, Vec<PostAction>) {
    let plain = |code| (Response::new(code), Vec::new(), Vec::new());
    if path == Path::Root {
        return plain(ResponseCode::BadRequest);
    }

    let ClientState {
        objects,
        observations,
        ..
    } = &mut *state;

    let payload = match read_representation(objects, &path) {
        Ok(payload) => payload,
        Err(err) => return plain(err.response_code()),
    };
    let mut response =
        Response::new(ResponseCode::Content).with_payload(ContentFormat::Tlv, payload);

    match request.observe {
        Some(observe::REGISTER) => {
            let index = match observations.iter().position(|o| o.token == token) {
                Some(index) => {
                    observations[index].path = path;
                    index
                }
                None => {
                    observations.push(Observation {
                        token,
                        peer,
                        path,
                        sequence: 0,
                    });
                    observations.len() - 1
                }
            };
            response = response.with_observe(observations[index].next_sequence());
        }
        Some(observe::DEREGISTER) => {
            observations.retain(|o| o.token != token);
        }
        _ => {}
    }

    (response, Vec::new(), Vec::new())
}

fn content_payload<'a>(request: &'a Request) -> Result<Payload<'a>, OpError> {
    if request.payload.is_empty() {
        return Ok(Payload::None);
    }
    match request.content_format {
        Some(ContentFormat::Tlv) => Ok(Payload::Tlv(&request.payload)),
        Some(ContentFormat::Opaque) => Ok(Payload::Opaque(&request.payload)),
        Some(ContentFormat::Json) => Err(OpError::BadRequest),
        // Text is the default when no content format was specified.
        Some(ContentFormat::Text) | None => std::str::from_utf8(&request.payload)
            .map(Payload::Text)
            .map_err(|_| OpError::BadRequest),
    }
}

/// Flattens a TLV payload addressed at one instance: a single
/// object-instance wrapper is unwrapped, everything else is used as is.
fn instance_records<'a>(records: Vec<Tlv<'a>>) -> Result<Vec<Tlv<'a>>, OpError> {
    if records.len() == 1 && records[0].kind == TlvKind::ObjectInstance {
        return records[0]
            .children()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| OpError::BadRequest);
    }
    Ok(records)
}

fn handle_write(
    state: &mut ClientState,
    path: Path,
    request: &Request,
    bootstrapping: bool,
) -> (Response, Vec<Path>, Vec<PostAction>) {
    let plain = |code| (Response::new(code), Vec::new(), Vec::new());

    let Some(object_id) = path.object_id() else {
        return plain(ResponseCode::BadRequest);
    };
    let Some(entry) = state.objects.get_mut(&object_id) else {
        return plain(ResponseCode::NotFound);
    };

    match path {
        Path::Object(_) => {
            // Only the bootstrap interface may write several instances at
            // once through an object-level TLV.
            if !bootstrapping {
                return plain(ResponseCode::MethodNotAllowed);
            }
            if request.content_format != Some(ContentFormat::Tlv) {
                return plain(ResponseCode::BadRequest);
            }
            let Ok(records) = parse_tlv(&request.payload) else {
                return plain(ResponseCode::BadRequest);
            };
            let mut changed = Vec::new();
            for record in records {
                if record.kind != TlvKind::ObjectInstance {
                    return plain(ResponseCode::BadRequest);
                }
                let result = if entry.has_instance(record.id) {
                    match record.children().collect::<Result<Vec<_>, _>>() {
                        Ok(children) => entry.write_tlv(record.id, &children),
                        Err(_) => Err(OpError::BadRequest),
                    }
                } else {
                    entry.create(record.id, Payload::Tlv(record.value))
                };
                if let Err(err) = result {
                    warn!(object_id, instance_id = record.id, error = %err, "bootstrap write failed");
                    return plain(err.response_code());
                }
                changed.push(Path::Instance(object_id, record.id));
            }
            (Response::new(ResponseCode::Changed), changed, Vec::new())
        }
        Path::Instance(_, instance_id) => {
            if request.content_format != Some(ContentFormat::Tlv) {
                return plain(ResponseCode::BadRequest);
            }
            if !entry.has_instance(instance_id) {
                // The bootstrap write path doubles as create.
                if !bootstrapping {
                    return plain(ResponseCode::NotFound);
                }
                return match entry.create(instance_id, Payload::Tlv(&request.payload)) {
                    Ok(()) => (
                        Response::new(ResponseCode::Changed),
                        vec![path],
                        Vec::new(),
                    ),
                    Err(err) => plain(err.response_code()),
                };
            }
            let records = match parse_tlv(&request.payload).map(instance_records) {
                Ok(Ok(records)) => records,
                _ => return plain(ResponseCode::BadRequest),
            };
            match entry.write_tlv(instance_id, &records) {
                Ok(()) => (
                    Response::new(ResponseCode::Changed),
                    vec![path],
                    Vec::new(),
                ),
                Err(err) => plain(err.response_code()),
            }
        }
        Path::Resource(_, instance_id, resource_id) => {
            let result = match request.content_format {
                Some(ContentFormat::Tlv) => match parse_tlv(&request.payload) {
                    Ok(records) => entry.write_tlv(instance_id, &records),
                    Err(_) => Err(OpError::BadRequest),
                },
                Some(ContentFormat::Opaque) => entry.write_resource(
                    instance_id,
                    &types::Resource::opaque(resource_id, request.payload.to_vec()),
                ),
                Some(ContentFormat::Json) => Err(OpError::BadRequest),
                Some(ContentFormat::Text) | None => {
                    match std::str::from_utf8(&request.payload) {
                        Ok(text) => entry
                            .write_resource(instance_id, &types::Resource::string(resource_id, text)),
                        Err(_) => Err(OpError::BadRequest),
                    }
                }
            };
            match result {
                Ok(()) => (
                    Response::new(ResponseCode::Changed),
                    vec![path],
                    Vec::new(),
                ),
                Err(err) => plain(err.response_code()),
            }
        }
        Path::Root => plain(ResponseCode::BadRequest),
    }
}

fn handle_post(
    state: &mut ClientState,
    path: Path,
    request: &Request,
    bootstrapping: bool,
) -> (Response, Vec<Path>, Vec<PostAction>) {
    let plain = |code| (Response::new(code), Vec::new(), Vec::new());

    // A POST to an instance is the partial-update form of write.
    if matches!(path, Path::Instance(..)) {
        return handle_write(state, path, request, bootstrapping);
    }

    let Some(object_id) = path.object_id() else {
        return plain(ResponseCode::BadRequest);
    };
    let Some(entry) = state.objects.get_mut(&object_id) else {
        return plain(ResponseCode::NotFound);
    };

    match path {
        Path::Object(_) => {
            // Create. The payload may wrap the resources in an
            // object-instance record carrying the desired id.
            let (instance_id, result) = if request.content_format == Some(ContentFormat::Tlv) {
                let Ok(records) = parse_tlv(&request.payload) else {
                    return plain(ResponseCode::BadRequest);
                };
                match records.as_slice() {
                    [record] if record.kind == TlvKind::ObjectInstance => (
                        record.id,
                        entry.create(record.id, Payload::Tlv(record.value)),
                    ),
                    _ => match entry.free_instance_id() {
                        Some(id) => (id, entry.create(id, Payload::Tlv(&request.payload))),
                        None => (0, Err(OpError::Internal)),
                    },
                }
            } else {
                let payload = match content_payload(request) {
                    Ok(payload) => payload,
                    Err(err) => return plain(err.response_code()),
                };
                match entry.free_instance_id() {
                    Some(id) => (id, entry.create(id, payload)),
                    None => (0, Err(OpError::Internal)),
                }
            };

            match result {
                Ok(()) => {
                    for registration in &mut state.registrations {
                        registration.dirty = true;
                    }
                    let created = Path::Instance(object_id, instance_id);
                    (
                        Response::new(ResponseCode::Created)
                            .with_location(created.segments()),
                        vec![created, path],
                        vec![PostAction::TriggerUpdate],
                    )
                }
                Err(err) => plain(err.response_code()),
            }
        }
        Path::Instance(..) => plain(ResponseCode::BadRequest),
        Path::Resource(_, instance_id, resource_id) => {
            let args = match std::str::from_utf8(&request.payload) {
                Ok(args) => args,
                Err(_) => return plain(ResponseCode::BadRequest),
            };
            match entry.execute(instance_id, resource_id, args) {
                Ok(()) => {
                    let mut actions = Vec::new();
                    if object_id == server::OBJECT_ID
                        && resource_id == server::RES_REGISTRATION_UPDATE_TRIGGER
                    {
                        actions.push(PostAction::TriggerUpdate);
                    }
                    (Response::new(ResponseCode::Changed), Vec::new(), actions)
                }
                Err(err) => plain(err.response_code()),
            }
        }
        Path::Root => plain(ResponseCode::BadRequest),
    }
}

fn handle_delete(
    state: &mut ClientState,
    path: Path,
    bootstrapping: bool,
) -> (Response, Vec<Path>, Vec<PostAction>) {
    let plain = |code| (Response::new(code), Vec::new(), Vec::new());

    match path {
        Path::Instance(object_id, instance_id) => {
            let Some(entry) = state.objects.get_mut(&object_id) else {
                return plain(ResponseCode::NotFound);
            };
            match entry.delete(instance_id) {
                Ok(()) => {
                    for registration in &mut state.registrations {
                        registration.dirty = true;
                    }
                    state.observations.retain(|o| !path.contains(&o.path));
                    (
                        Response::new(ResponseCode::Deleted),
                        Vec::new(),
                        vec![PostAction::TriggerUpdate],
                    )
                }
                Err(err) => plain(err.response_code()),
            }
        }
        Path::Object(object_id) if bootstrapping => {
            let Some(entry) = state.objects.get_mut(&object_id) else {
                return plain(ResponseCode::NotFound);
            };
            delete_instances(entry.as_mut(), object_id == security::OBJECT_ID);
            state.observations.retain(|o| !path.contains(&o.path));
            (Response::new(ResponseCode::Deleted), Vec::new(), Vec::new())
        }
        Path::Root if bootstrapping => {
            // Factory reset, sparing the bootstrap-server account itself.
            for (object_id, entry) in state.objects.iter_mut() {
                delete_instances(entry.as_mut(), *object_id == security::OBJECT_ID);
            }
            state.observations.clear();
            (Response::new(ResponseCode::Deleted), Vec::new(), Vec::new())
        }
        _ => plain(ResponseCode::MethodNotAllowed),
    }
}

/// Deletes every instance of one object; when `spare_bootstrap` is set,
/// Security instances describing a bootstrap server survive.
fn delete_instances(entry: &mut dyn ObjectDispatch, spare_bootstrap: bool) {
    for instance_id in entry.instance_ids() {
        if spare_bootstrap {
            let is_bootstrap = entry
                .read(instance_id, security::RES_IS_BOOTSTRAP)
                .ok()
                .and_then(|resource| resource.single_value().and_then(|v| v.as_bool()))
                .unwrap_or(false);
            if is_bootstrap {
                continue;
            }
        }
        if let Err(err) = entry.delete(instance_id) {
            warn!(instance_id, error = %err, "instance not deleted during bootstrap erase");
        }
    }
}
