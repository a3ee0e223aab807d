//! LWM2M paths.
//!
//! Every externally supplied path is classified into one of four shapes:
//! `/obj`, `/obj/inst`, `/obj/inst/res`, or the root `/` - which only the
//! bootstrap delete operation accepts.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Instance id reserved as "none"; never valid for a real instance.
pub const RESERVED_ID: u16 = u16::MAX;

/// Errors classifying a path string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A segment was not a decimal unsigned 16-bit integer.
    #[error("path segment {segment:?} is not a 16-bit id")]
    InvalidSegment { segment: String },

    /// More than three id segments.
    #[error("path has {got} segments, at most 3 are allowed")]
    TooDeep { got: usize },

    /// The reserved id 0xFFFF was used for an instance.
    #[error("instance id {RESERVED_ID} is reserved")]
    ReservedInstanceId,
}

/// A classified LWM2M path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Path {
    /// `/` - accepted only by the bootstrap delete operation.
    Root,
    Object(u16),
    Instance(u16, u16),
    Resource(u16, u16, u16),
}

impl Path {
    /// Classifies a path given as uri-path style segments.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Path, PathError> {
        let mut ids = [0u16; 3];
        let mut count = 0;
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                continue;
            }
            if count == 3 {
                return Err(PathError::TooDeep {
                    got: segments.len(),
                });
            }
            ids[count] = segment
                .parse::<u16>()
                .map_err(|_| PathError::InvalidSegment {
                    segment: segment.to_string(),
                })?;
            count += 1;
        }
        let path = match count {
            0 => Path::Root,
            1 => Path::Object(ids[0]),
            2 => Path::Instance(ids[0], ids[1]),
            _ => Path::Resource(ids[0], ids[1], ids[2]),
        };
        if path.instance_id() == Some(RESERVED_ID) {
            return Err(PathError::ReservedInstanceId);
        }
        Ok(path)
    }

    pub fn object_id(&self) -> Option<u16> {
        match self {
            Path::Root => None,
            Path::Object(o) | Path::Instance(o, _) | Path::Resource(o, _, _) => Some(*o),
        }
    }

    pub fn instance_id(&self) -> Option<u16> {
        match self {
            Path::Instance(_, i) | Path::Resource(_, i, _) => Some(*i),
            _ => None,
        }
    }

    pub fn resource_id(&self) -> Option<u16> {
        match self {
            Path::Resource(_, _, r) => Some(*r),
            _ => None,
        }
    }

    /// The uri-path segments of this path (empty for root).
    pub fn segments(&self) -> Vec<String> {
        match self {
            Path::Root => vec![],
            Path::Object(o) => vec![o.to_string()],
            Path::Instance(o, i) => vec![o.to_string(), i.to_string()],
            Path::Resource(o, i, r) => {
                vec![o.to_string(), i.to_string(), r.to_string()]
            }
        }
    }

    /// True when `other` lies inside this path (equal, or a descendant).
    pub fn contains(&self, other: &Path) -> bool {
        match (self, other) {
            (Path::Root, _) => true,
            (Path::Object(a), _) => other.object_id() == Some(*a),
            (Path::Instance(a, b), _) => {
                other.object_id() == Some(*a) && other.instance_id() == Some(*b)
            }
            (Path::Resource(..), Path::Resource(..)) => self == other,
            (Path::Resource(..), _) => false,
        }
    }

    /// True when the two paths name the same node or one encloses the other.
    /// This is the matching rule for observation delivery: notifying a
    /// resource wakes observers of its instance and object, and notifying an
    /// instance wakes observers of any of its resources.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Path, PathError> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Path::Root);
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        Path::from_segments(&segments)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Root => write!(f, "/"),
            Path::Object(o) => write!(f, "/{}", o),
            Path::Instance(o, i) => write!(f, "/{}/{}", o, i),
            Path::Resource(o, i, r) => write!(f, "/{}/{}/{}", o, i, r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert_eq!("/".parse::<Path>().unwrap(), Path::Root);
        assert_eq!("/3".parse::<Path>().unwrap(), Path::Object(3));
        assert_eq!("/3/0".parse::<Path>().unwrap(), Path::Instance(3, 0));
        assert_eq!("/3/0/9".parse::<Path>().unwrap(), Path::Resource(3, 0, 9));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "/a/b".parse::<Path>(),
            Err(PathError::InvalidSegment { .. })
        ));
        assert!(matches!(
            "/1/2/3/4".parse::<Path>(),
            Err(PathError::TooDeep { .. })
        ));
        assert!(matches!(
            "/1/65535".parse::<Path>(),
            Err(PathError::ReservedInstanceId)
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["/", "/6", "/6/0", "/6/0/1"] {
            assert_eq!(s.parse::<Path>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_overlaps() {
        let obs: Path = "/6/0".parse().unwrap();
        let changed: Path = "/6/0/0".parse().unwrap();
        assert!(obs.overlaps(&changed));
        assert!(changed.overlaps(&obs));
        assert!(!obs.overlaps(&"/6/1".parse().unwrap()));
        assert!(!"/6/0/0"
            .parse::<Path>()
            .unwrap()
            .overlaps(&"/6/0/1".parse().unwrap()));
    }
}
