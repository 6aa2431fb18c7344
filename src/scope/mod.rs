//! Scope resolution: maps a request and an instant to the counting bucket it
//! belongs to.
//!
//! Dates are computed in a fixed UTC offset. A fixed offset has no DST
//! transitions, so the local calendar date cannot shift in the middle of a
//! day. The resolver never reads the clock; callers pass `now` explicitly.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};

use crate::contracts::{ScopeError, ScopeKey, ScopeKind};

/// Longest accepted namespace or department code.
const MAX_CODE_LEN: usize = 32;

/// A resolved counting bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScope {
    pub key: ScopeKey,
    /// Local calendar date of `now`.
    pub date: NaiveDate,
    /// Year rendered into identifiers issued in this scope.
    pub year: i32,
}

/// Computes scope keys in a configured timezone.
#[derive(Debug, Clone, Copy)]
pub struct ScopeResolver {
    offset: FixedOffset,
}

impl Default for ScopeResolver {
    fn default() -> Self {
        Self::utc()
    }
}

impl ScopeResolver {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Builds a resolver from an offset in minutes east of UTC.
    /// Returns None outside of +/- 24 hours.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Returns true if the two instants fall on different local days.
    pub fn crosses_rollover(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.local_date(a) != self.local_date(b)
    }

    /// Resolves the scope for a request.
    ///
    /// `department` is trimmed and upper-cased; an empty code counts as absent.
    /// Department scope requires a code and other kinds reject one.
    pub fn resolve(
        &self,
        namespace: &str,
        kind: ScopeKind,
        now: DateTime<Utc>,
        department: Option<&str>,
    ) -> Result<ResolvedScope, ScopeError> {
        validate_namespace(namespace)?;

        let department = department.map(str::trim).filter(|d| !d.is_empty());
        let date = self.local_date(now);
        let day = date.format("%Y%m%d");

        let key = match (kind, department) {
            (ScopeKind::Department, None) => return Err(ScopeError::MissingDepartment),
            (ScopeKind::Department, Some(code)) => {
                let code = normalize_department(code)?;
                format!("{}:{}:{}", namespace, day, code)
            }
            (_, Some(code)) => return Err(ScopeError::UnexpectedDepartment(code.to_string())),
            (ScopeKind::Global, None) => format!("{}:{}", namespace, day),
            (ScopeKind::Perpetual, None) => namespace.to_string(),
        };

        Ok(ResolvedScope {
            key: ScopeKey::from_raw(key),
            date,
            year: date.year(),
        })
    }
}

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Namespaces are lowercase so that `mr` and `MR` cannot split one family's counters.
pub fn validate_namespace(namespace: &str) -> Result<(), ScopeError> {
    let valid = !namespace.is_empty()
        && namespace.len() <= MAX_CODE_LEN
        && namespace
            .chars()
            .all(|c| is_code_char(c) && !c.is_ascii_uppercase());
    if valid {
        Ok(())
    } else {
        Err(ScopeError::InvalidNamespace(namespace.to_string()))
    }
}

/// Upper-cases a department code and checks its character set.
pub fn normalize_department(code: &str) -> Result<String, ScopeError> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_CODE_LEN || !code.chars().all(is_code_char) {
        return Err(ScopeError::InvalidDepartment(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

/// The parts of a scope key, as produced by [`ScopeResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScope {
    pub namespace: String,
    /// None for perpetual scopes.
    pub date: Option<NaiveDate>,
    pub department: Option<String>,
}

/// Splits a key back into namespace, date and department. Only keys in the
/// exact shape `resolve` produces are accepted.
pub fn parse_key(key: &ScopeKey) -> Result<ParsedScope, ScopeError> {
    let invalid = || ScopeError::InvalidScopeKey(key.to_string());
    let mut parts = key.as_str().split(':');

    let namespace = parts.next().ok_or_else(invalid)?;
    validate_namespace(namespace).map_err(|_| invalid())?;

    let date = match parts.next() {
        Some(day) => {
            let date = NaiveDate::parse_from_str(day, "%Y%m%d").map_err(|_| invalid())?;
            if date.format("%Y%m%d").to_string() != day {
                return Err(invalid());
            }
            Some(date)
        }
        None => None,
    };

    let department = match parts.next() {
        Some(code) => {
            if normalize_department(code).map_err(|_| invalid())? != code {
                return Err(invalid());
            }
            Some(code.to_string())
        }
        None => None,
    };

    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(ParsedScope {
        namespace: namespace.to_string(),
        date,
        department,
    })
}
