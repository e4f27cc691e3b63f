//! Permission requirements attached to routes.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::rbac::models::Permission;

/// What a principal must hold to open a route.
///
/// Wire form (JSON/TOML):
///
/// | Variant         | Form                                   |
/// |-----------------|----------------------------------------|
/// | `Authenticated` | `null` or absent                       |
/// | `One`           | `"user:read"` or `{target, action}`    |
/// | `All`           | `["user:read", "role:read"]`           |
/// | `Any`           | `{ any = ["user:read", "role:read"] }` |
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Requirement {
    /// Signing in is enough.
    #[default]
    Authenticated,
    One(Permission),
    /// Every permission is required.
    All(Vec<Permission>),
    /// At least one permission is required.
    Any(Vec<Permission>),
}

impl Requirement {
    pub fn one(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self::One(Permission::new(target, action))
    }

    /// Whether this is a single page-visibility gate.
    pub fn is_single_access(&self) -> bool {
        matches!(self, Self::One(p) if p.is_access())
    }

    /// Permissions named by this requirement.
    pub fn permissions(&self) -> &[Permission] {
        match self {
            Self::Authenticated => &[],
            Self::One(p) => std::slice::from_ref(p),
            Self::All(ps) | Self::Any(ps) => ps,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ps: &[Permission], sep: &str| {
            ps.iter().map(Permission::key).collect::<Vec<_>>().join(sep)
        };
        match self {
            Self::Authenticated => f.write_str("authenticated"),
            Self::One(p) => write!(f, "{}", p),
            Self::All(ps) => f.write_str(&join(ps, " & ")),
            Self::Any(ps) => f.write_str(&join(ps, " | ")),
        }
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Authenticated => serializer.serialize_unit(),
            Self::One(p) => serializer.serialize_str(&p.key()),
            Self::All(ps) => serializer.collect_seq(ps.iter().map(Permission::key)),
            Self::Any(ps) => {
                let keys: Vec<String> = ps.iter().map(Permission::key).collect();
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("any", &keys)?;
                map.end()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireRequirement {
    Authenticated,
    One(Permission),
    All(Vec<Permission>),
    Any { any: Vec<Permission> },
    AllExplicit { all: Vec<Permission> },
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireRequirement::deserialize(deserializer)? {
            WireRequirement::Authenticated => Self::Authenticated,
            WireRequirement::One(p) => Self::One(p),
            WireRequirement::All(ps) | WireRequirement::AllExplicit { all: ps } => Self::All(ps),
            WireRequirement::Any { any } => Self::Any(any),
        })
    }
}
