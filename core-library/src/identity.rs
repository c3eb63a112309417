//! # Identity Model
//!
//! Canonical cross-backend identity for library entities.
//!
//! ## Overview
//!
//! Every normalized entity carries an [`EntityId`]: the backend kind, the
//! configured instance of that backend, and the backend's own key. Two ids are
//! equal iff all three parts are equal, so entities from different backends
//! never collide even when their native keys do.
//!
//! ## Tagged form
//!
//! [`EntityId::to_tagged`] renders `kind:instance:native` and
//! [`EntityId::parse_tagged`] reverses it. The instance segment is
//! percent-escaped (`%` as `%25`, `:` as `%3A`) so the first two `:` separators
//! are always structural; the native segment is written verbatim and may contain
//! `:`. The encoding is injective and `parse_tagged(id.to_tagged()) == id` for
//! every id.
//!
//! ## Resolution
//!
//! Backends hand over ids of uneven quality. The `resolve_*` functions never
//! fail: a missing or blank native id falls back to a display name so every
//! entity stays addressable.
//!
//! ```rust
//! use core_library::identity::{resolve_remote_b, EntityId, SourceKind};
//!
//! let id = resolve_remote_b("jellyfin", Some("living-room:abc123"), "Song");
//! assert_eq!(id.instance_id(), "living-room");
//! assert_eq!(id.native_id(), "abc123");
//!
//! let tagged = id.to_tagged();
//! assert_eq!(EntityId::parse_tagged(&tagged).unwrap(), id);
//! assert_eq!(id.kind(), SourceKind::RemoteB);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LibraryError, Result};

/// Instance id used for the on-device scanner.
pub const LOCAL_INSTANCE: &str = "local";

/// Instance id substituted when a RemoteA instance is configured without one.
pub const DEFAULT_REMOTE_A_INSTANCE: &str = "default";

/// Instance id assumed for RemoteB ids that do not name their server.
pub const DEFAULT_REMOTE_B_INSTANCE: &str = "jellyfin";

/// Backend family an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Remote catalog service (Subsonic-compatible API).
    #[serde(rename = "subsonic")]
    RemoteA,
    /// Remote catalog service with several servers configured at once.
    #[serde(rename = "jellyfin")]
    RemoteB,
    /// On-device scanner.
    Local,
    Other,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::RemoteA,
        SourceKind::RemoteB,
        SourceKind::Local,
        SourceKind::Other,
    ];

    /// Stable identifier used in tagged ids, settings and the search index.
    pub fn wire_id(self) -> &'static str {
        match self {
            SourceKind::RemoteA => "subsonic",
            SourceKind::RemoteB => "jellyfin",
            SourceKind::Local => "local",
            SourceKind::Other => "other",
        }
    }

    /// Case-insensitive lookup by wire id.
    pub fn from_wire_id(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.wire_id().eq_ignore_ascii_case(value))
    }

    pub fn is_remote(self) -> bool {
        matches!(self, SourceKind::RemoteA | SourceKind::RemoteB)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_id())
    }
}

impl FromStr for SourceKind {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire_id(s).ok_or_else(|| LibraryError::UnknownSourceKind(s.trim().to_string()))
    }
}

/// Canonical identity of an artist, album, song or playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    kind: SourceKind,
    instance_id: String,
    native_id: String,
}

impl EntityId {
    pub fn new(kind: SourceKind, instance_id: impl Into<String>, native_id: impl Into<String>) -> Self {
        Self {
            kind,
            instance_id: instance_id.into(),
            native_id: native_id.into(),
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn native_id(&self) -> &str {
        &self.native_id
    }

    /// Renders the injective `kind:instance:native` form.
    pub fn to_tagged(&self) -> String {
        let mut out = String::with_capacity(
            self.kind.wire_id().len() + self.instance_id.len() + self.native_id.len() + 2,
        );
        out.push_str(self.kind.wire_id());
        out.push(':');
        escape_instance(&self.instance_id, &mut out);
        out.push(':');
        out.push_str(&self.native_id);
        out
    }

    /// Strict decoder for [`EntityId::to_tagged`] output.
    pub fn parse_tagged(value: &str) -> Result<Self> {
        let invalid = |reason: &str| LibraryError::InvalidTaggedId {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (kind, rest) = value
            .split_once(':')
            .ok_or_else(|| invalid("missing kind separator"))?;
        let kind = SourceKind::from_wire_id(kind).ok_or_else(|| invalid("unknown source kind"))?;
        let (instance, native) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing instance separator"))?;
        let instance = unescape_instance(instance).ok_or_else(|| invalid("bad instance escape"))?;

        Ok(Self::new(kind, instance, native))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tagged())
    }
}

fn escape_instance(instance: &str, out: &mut String) {
    for c in instance.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
}

fn unescape_instance(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut rest = escaped;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Id for an entity from the on-device scanner.
pub fn resolve_local(native_id: Option<&str>, fallback: &str) -> EntityId {
    let native = non_blank(native_id).unwrap_or(fallback);
    EntityId::new(SourceKind::Local, LOCAL_INSTANCE, native)
}

/// Id for an entity from a RemoteA instance.
pub fn resolve_remote_a(instance_id: &str, native_id: Option<&str>, fallback: &str) -> EntityId {
    let native = non_blank(native_id).unwrap_or(fallback);
    EntityId::new(SourceKind::RemoteA, instance_id, native)
}

/// Id for an entity from a RemoteB instance.
///
/// Accepts a bare native id, a tagged id, or the legacy `instance:native`
/// shape. Tagged ids that decode to another kind, or that have an empty
/// instance or native part, fall through to the legacy parsing.
pub fn resolve_remote_b(
    default_instance_id: &str,
    raw_or_tagged: Option<&str>,
    fallback: &str,
) -> EntityId {
    let Some(raw) = non_blank(raw_or_tagged) else {
        return EntityId::new(SourceKind::RemoteB, default_instance_id, fallback);
    };

    if let Ok(id) = EntityId::parse_tagged(raw) {
        if id.kind == SourceKind::RemoteB && !id.instance_id.is_empty() && !id.native_id.is_empty() {
            return id;
        }
    }

    // Legacy single-namespace tag without an instance: "jellyfin:<native>".
    let untagged = raw
        .strip_prefix(SourceKind::RemoteB.wire_id())
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(raw);

    let (instance, native) = match untagged.split_once(':') {
        Some((instance, native)) if !instance.trim().is_empty() => (instance.trim(), native),
        Some((_, native)) => (default_instance_id, native),
        None => (default_instance_id, untagged),
    };

    let native = non_blank(Some(native)).unwrap_or(fallback);
    EntityId::new(SourceKind::RemoteB, instance, native)
}

/// Resolve an id read back from a single-namespace store for `kind`.
///
/// Tagged ids of the matching kind are taken as-is; anything else goes through
/// the kind's `resolve_*` function.
pub fn resolve_for_kind(
    kind: SourceKind,
    instance_id: &str,
    raw_or_tagged: Option<&str>,
    fallback: &str,
) -> EntityId {
    if let Some(raw) = non_blank(raw_or_tagged) {
        if let Ok(id) = EntityId::parse_tagged(raw) {
            if id.kind == kind && !id.native_id.is_empty() {
                return id;
            }
        }
    }

    match kind {
        SourceKind::Local => resolve_local(raw_or_tagged, fallback),
        SourceKind::RemoteA => resolve_remote_a(instance_id, raw_or_tagged, fallback),
        SourceKind::RemoteB => resolve_remote_b(instance_id, raw_or_tagged, fallback),
        SourceKind::Other => EntityId::new(
            SourceKind::Other,
            instance_id,
            non_blank(raw_or_tagged).unwrap_or(fallback),
        ),
    }
}

/// A configured backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub instance_id: String,
    pub kind: SourceKind,
    pub display_name: Option<String>,
}

impl SourceRef {
    pub fn new(kind: SourceKind, instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            kind,
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    pub fn local() -> Self {
        Self::new(SourceKind::Local, LOCAL_INSTANCE)
    }

    /// Descriptor synthesized for ids whose instance was never registered.
    pub fn synthesized_for(id: &EntityId) -> Self {
        Self {
            instance_id: id.instance_id.clone(),
            kind: id.kind,
            display_name: Some(id.kind.wire_id().to_string()),
        }
    }

    /// Name to show for this instance.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.instance_id)
    }
}
