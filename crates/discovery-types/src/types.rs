//! Member and group types.

use serde::{Deserialize, Serialize};

/// Identifier of a member, unique within its group.
pub type MemberId = String;

/// Lease length in microseconds, as carried on the wire.
pub type LeaseTimeoutMicros = i64;

// ── Attribute ──────────────────────────────────────────────────────

/// A single key/value pair attached to a member.
///
/// Values are opaque bytes; the discovery tier never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

// ── Member ─────────────────────────────────────────────────────────

/// One registered participant in a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    /// Conflict rank. Higher priority wins between competing registrations.
    pub priority: i64,
    /// Caller-chosen revision. Breaks ties between equal priorities.
    pub revision: i64,
    /// Ordered attributes. Keys are unique within one member.
    pub attributes: Vec<Attribute>,
}

impl Member {
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    /// Look up an attribute value by key.
    pub fn attribute(&self, key: &str) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_slice())
    }

    /// The `(priority, revision)` pair the discovery tier orders
    /// competing registrations by.
    pub fn rank(&self) -> (i64, i64) {
        (self.priority, self.revision)
    }
}

// ── Group ──────────────────────────────────────────────────────────

/// Aggregate state of a group at the time it was read.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupMeta {
    pub member_count: i32,
}
