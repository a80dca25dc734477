//! Query key composition.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use serde_json::Value;

/// Identity of a cached query.
///
/// A key is an ordered list of JSON values, e.g. `["user", 1]`. Equality
/// and hashing use a canonical string form, so keys built from equal
/// parameters are always equal.
#[derive(Debug, Clone)]
pub struct QueryKey {
    parts: Vec<Value>,
    canonical: String,
}

impl QueryKey {
    /// Create a key with a single leading segment.
    pub fn new(scope: impl Into<Value>) -> Self {
        Self::from_parts(vec![scope.into()])
    }

    /// Create a key from its parts.
    pub fn from_parts(parts: Vec<Value>) -> Self {
        // serde_json object maps are ordered, so this rendering is canonical.
        let canonical = Value::Array(parts.clone()).to_string();
        Self { parts, canonical }
    }

    /// Append a segment.
    pub fn with(self, part: impl Into<Value>) -> Self {
        let mut parts = self.parts;
        parts.push(part.into());
        Self::from_parts(parts)
    }

    /// Append a serializable segment (e.g. a filter struct).
    pub fn with_serialized<T: Serialize>(self, part: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with(serde_json::to_value(part)?))
    }

    /// Get the key parts.
    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    /// Get the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Whether `prefix` matches the leading parts of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for QueryKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
