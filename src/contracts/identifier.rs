use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one counting bucket.
///
/// Layouts: `ns` (perpetual), `ns:YYYYMMDD` (daily), `ns:YYYYMMDD:DEPT`
/// (department daily). Built by the scope resolver; opaque everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Wraps an already-derived key, e.g. one read back from a store.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a sequence resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// One counter per calendar day.
    Global,
    /// One counter per calendar day and department.
    Department,
    /// One counter for the lifetime of the store (MR numbers).
    Perpetual,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Department => "department",
            ScopeKind::Perpetual => "perpetual",
        }
    }

    /// Returns true if the counter restarts at local midnight.
    pub fn resets_daily(&self) -> bool {
        !matches!(self, ScopeKind::Perpetual)
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable counter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub scope: ScopeKey,
    pub value: u64,
}

/// A family of identifiers sharing one store namespace, e.g. MR numbers or tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    /// Namespace of the family's scope keys and key of its format configuration.
    pub name: String,
    /// Prefix used when the format configuration does not opt into a custom one.
    pub default_prefix: String,
}

impl Family {
    pub fn new(name: impl Into<String>, default_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_prefix: default_prefix.into(),
        }
    }

    /// Parses `name=PREFIX,name=PREFIX`. Entries without `=` use the upper-cased
    /// name as prefix; blank entries are skipped.
    pub fn parse_list(list: &str) -> Vec<Family> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once('=') {
                Some((name, prefix)) => Family::new(name.trim(), prefix.trim()),
                None => Family::new(entry, entry.to_ascii_uppercase()),
            })
            .collect()
    }
}

/// An issued identifier. Never mutated or reissued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedIdentifier {
    pub scope: ScopeKey,
    pub sequence: u64,
    pub formatted: String,
}

/// A committed counter value that has not been rendered yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedSequence {
    pub family: String,
    pub scope: ScopeKey,
    pub sequence: u64,
    /// Year the scope was resolved under; rendering uses it, not the current year.
    pub year: i32,
}
