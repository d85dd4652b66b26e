//! Machine-distinguishable error kinds.
//!
//! Every component error carries a human-readable message through `Display`
//! and a stable [`ErrorKind`] tag for automated handling.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Entity ingestion
    Malformed,
    DuplicateProperty,
    // Model construction
    DuplicateIdentifier,
    UnresolvedReference,
    // Template resolution
    NotFound,
    AlreadyAdded,
    VersionGone,
    Incompatible,
    NoUsableVersion,
    // Rendering
    UnsupportedConstruct,
    IoFailure,
    NoRenderer,
    Engine,
    Cancelled,
    // Stores
    ManifestUnavailable,
    ImmutableVersion,
    ProjectUnavailable,
    // Build
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::DuplicateProperty => "duplicate_property",
            ErrorKind::DuplicateIdentifier => "duplicate_identifier",
            ErrorKind::UnresolvedReference => "unresolved_reference",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyAdded => "already_added",
            ErrorKind::VersionGone => "version_gone",
            ErrorKind::Incompatible => "incompatible",
            ErrorKind::NoUsableVersion => "no_usable_version",
            ErrorKind::UnsupportedConstruct => "unsupported_construct",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::NoRenderer => "no_renderer",
            ErrorKind::Engine => "engine",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ManifestUnavailable => "manifest_unavailable",
            ErrorKind::ImmutableVersion => "immutable_version",
            ErrorKind::ProjectUnavailable => "project_unavailable",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error type the crate surfaces.
pub trait Kinded {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_display_tag() {
        for kind in [
            ErrorKind::Malformed,
            ErrorKind::VersionGone,
            ErrorKind::UnsupportedConstruct,
            ErrorKind::ImmutableVersion,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
