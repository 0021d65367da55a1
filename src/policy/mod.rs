//! Matching model shared by permission resolution and policy enforcement.
//!
//! Two predicates live here and nowhere else:
//! - [`action_matches`] decides whether a stored policy action covers a
//!   requested one.
//! - [`path_matches`] decides whether a permission's route prefix covers a
//!   request path, under the configured [`PathMatchMode`].

use crate::domain::MethodSpec;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Prefix semantics used when matching permission paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatchMode {
    /// `/api/users` covers `/api/users` and `/api/users/7`, not `/api/users2`
    #[default]
    Segment,
    /// Raw string prefix: `/api/users` also covers `/api/users2`.
    /// Kept for deployments whose stored routes rely on it.
    #[serde(rename = "character")]
    CharacterPrefix,
}

impl std::str::FromStr for PathMatchMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment" => Ok(PathMatchMode::Segment),
            "character" | "char" => Ok(PathMatchMode::CharacterPrefix),
            other => Err(AppError::Validation(format!(
                "unknown path match mode: {}",
                other
            ))),
        }
    }
}

/// Stored wildcard covers every requested action; exact actions only cover
/// themselves. A requested `*` is therefore covered only by a stored `*`.
pub fn action_matches(stored: MethodSpec, requested: MethodSpec) -> bool {
    stored.is_wildcard() || stored == requested
}

/// 2 for an exact method, 1 for the wildcard
pub fn method_specificity(method: MethodSpec) -> u8 {
    if method.is_wildcard() {
        1
    } else {
        2
    }
}

/// Strip a single trailing slash; an empty result becomes `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Whether `prefix` (normalized) covers `path` (normalized).
pub fn path_matches(mode: PathMatchMode, prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    match mode {
        PathMatchMode::CharacterPrefix => true,
        PathMatchMode::Segment => {
            prefix == "/"
                || path.len() == prefix.len()
                || path.as_bytes()[prefix.len()] == b'/'
        }
    }
}
