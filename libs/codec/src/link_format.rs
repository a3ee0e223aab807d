//! CoRE link-format registration payloads.
//!
//! A registering client announces its objects and instances as
//! `</obj>[,</obj/inst>]*`, optionally preceded by an alternate objects-path
//! entry tagged `rt="oma.lwm2m"`. The server parses the reverse. Entries
//! carrying a `ct=` attribute are rejected: the only representation beside
//! link text is TLV and that is negotiated per request, not at registration.

use crate::error::{CodecError, CodecResult};

/// The parsed registration payload: optional alternate objects-path plus the
/// announced `object id -> instance ids` index, in announcement order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkEntries {
    pub objects_path: Option<String>,
    pub objects: Vec<(u16, Vec<u16>)>,
}

/// Builds the payload a client sends on register and full update.
pub fn build_registration_payload(
    objects_path: Option<&str>,
    objects: &[(u16, Vec<u16>)],
) -> String {
    let mut entries = Vec::new();

    if let Some(path) = objects_path {
        let path = path.trim_matches('/');
        if !path.is_empty() {
            entries.push(format!("</{}>;rt=\"oma.lwm2m\"", path));
        }
    }

    for (object_id, instances) in objects {
        entries.push(format!("</{}>", object_id));
        for instance_id in instances {
            entries.push(format!("</{}/{}>", object_id, instance_id));
        }
    }

    entries.join(",")
}

fn parse_ids(entry: &str, inner: &str) -> CodecResult<(u16, Option<u16>)> {
    let malformed = || CodecError::MalformedLink {
        entry: entry.to_string(),
    };

    let mut parts = inner.split('/');
    let object = parts
        .next()
        .filter(|p| !p.is_empty())
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(malformed)?;

    let instance = match parts.next() {
        None => None,
        Some(part) => {
            let id = part.parse::<u16>().map_err(|_| malformed())?;
            if id == types::path::RESERVED_ID {
                return Err(CodecError::LinkReservedInstanceId {
                    entry: entry.to_string(),
                });
            }
            Some(id)
        }
    };

    if parts.next().is_some() {
        return Err(malformed());
    }
    Ok((object, instance))
}

/// Parses a registration or update payload.
pub fn parse_registration_payload(payload: &str) -> CodecResult<LinkEntries> {
    let mut entries = LinkEntries::default();

    for raw in payload.split(',') {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let malformed = || CodecError::MalformedLink {
            entry: entry.to_string(),
        };

        if !entry.starts_with('<') {
            return Err(malformed());
        }

        if entry.contains("rt=\"oma.lwm2m\"") {
            let end = entry.rfind('>').ok_or_else(malformed)?;
            let path = entry[1..end].trim_matches('/');
            entries.objects_path = if path.is_empty() {
                None
            } else {
                Some(path.to_string())
            };
            continue;
        }

        if entry.contains("ct=") {
            return Err(CodecError::LinkContentType {
                entry: entry.to_string(),
            });
        }

        let end = entry.rfind('>').ok_or_else(malformed)?;
        if end + 1 != entry.len() {
            return Err(malformed());
        }
        let inner = entry[1..end].strip_prefix('/').ok_or_else(malformed)?;

        let (object_id, instance_id) = parse_ids(entry, inner)?;
        let pos = match entries.objects.iter().position(|(id, _)| *id == object_id) {
            Some(pos) => pos,
            None => {
                entries.objects.push((object_id, Vec::new()));
                entries.objects.len() - 1
            }
        };
        if let Some(instance_id) = instance_id {
            entries.objects[pos].1.push(instance_id);
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_plain() {
        let payload = build_registration_payload(None, &[(3, vec![0]), (6, vec![])]);
        assert_eq!(payload, "</3>,</3/0>,</6>");
    }

    #[test]
    fn test_build_with_alternate_path() {
        let payload = build_registration_payload(Some("lwm2m"), &[(1, vec![0])]);
        assert_eq!(payload, "</lwm2m>;rt=\"oma.lwm2m\",</1>,</1/0>");
    }

    #[test]
    fn test_parse_round_trip() {
        let parsed = parse_registration_payload("</3>,</3/0>,</3/1>,</6>").unwrap();
        assert_eq!(parsed.objects_path, None);
        assert_eq!(parsed.objects, vec![(3, vec![0, 1]), (6, vec![])]);
    }

    #[test]
    fn test_parse_alternate_path() {
        let parsed =
            parse_registration_payload("</custom/path>;rt=\"oma.lwm2m\",</3/0>").unwrap();
        assert_eq!(parsed.objects_path.as_deref(), Some("custom/path"));
        assert_eq!(parsed.objects, vec![(3, vec![0])]);
    }

    #[test]
    fn test_parse_root_path_means_none() {
        let parsed = parse_registration_payload("</>;rt=\"oma.lwm2m\",</3>").unwrap();
        assert_eq!(parsed.objects_path, None);
    }

    #[test]
    fn test_parse_rejects_content_type() {
        assert!(matches!(
            parse_registration_payload("</3>;ct=11543"),
            Err(CodecError::LinkContentType { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_reserved_instance() {
        assert!(matches!(
            parse_registration_payload("</3/65535>"),
            Err(CodecError::LinkReservedInstanceId { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["3/0", "</>", "</a/b>", "</1/2/3>"] {
            assert!(
                parse_registration_payload(bad).is_err(),
                "accepted {:?}",
                bad
            );
        }
    }
}
