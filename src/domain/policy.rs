//! Policy tuple models

use super::common::StringUuid;
use super::rbac::{MethodSpec, PermissionKey};
use crate::error::AppError;
use serde::{Deserialize, Serialize};

const ROLE_SUBJECT_PREFIX: &str = "role:";

/// Actor side of a policy tuple.
///
/// Stored as `role:<uuid>`; the string form only exists at the store
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubjectRef {
    Role(StringUuid),
}

impl SubjectRef {
    pub fn role_id(&self) -> StringUuid {
        match self {
            SubjectRef::Role(id) => *id,
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectRef::Role(id) => write!(f, "{}{}", ROLE_SUBJECT_PREFIX, id),
        }
    }
}

impl std::str::FromStr for SubjectRef {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s
            .strip_prefix(ROLE_SUBJECT_PREFIX)
            .ok_or_else(|| AppError::Validation(format!("Unsupported policy subject: {}", s)))?;
        let id = StringUuid::parse_str(id)
            .map_err(|_| AppError::Validation(format!("Malformed role subject: {}", s)))?;
        Ok(SubjectRef::Role(id))
    }
}

impl Serialize for SubjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubjectRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `(subject, object, action)` grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyTuple {
    pub subject: SubjectRef,
    pub object: PermissionKey,
    pub action: MethodSpec,
}

impl PolicyTuple {
    pub fn new(subject: SubjectRef, object: PermissionKey, action: MethodSpec) -> Self {
        Self {
            subject,
            object,
            action,
        }
    }
}

/// Field filter for policy queries; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFilter {
    pub subject: Option<SubjectRef>,
    pub object: Option<PermissionKey>,
    pub action: Option<MethodSpec>,
}

impl PolicyFilter {
    pub fn by_subject(subject: SubjectRef) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    pub fn by_object(object: PermissionKey) -> Self {
        Self {
            object: Some(object),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.object.is_none() && self.action.is_none()
    }

    pub fn matches(&self, tuple: &PolicyTuple) -> bool {
        self.subject.is_none_or(|s| s == tuple.subject)
            && self.object.as_ref().is_none_or(|o| *o == tuple.object)
            && self.action.is_none_or(|a| a == tuple.action)
    }
}
