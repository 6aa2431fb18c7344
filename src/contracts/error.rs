use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::contracts::identifier::ReservedSequence;

/// Extension trait for converting lock errors to StorageError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StorageError.
    fn map_lock_err(self) -> Result<T, StorageError>;
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

/// Failures of a counter store. None of them leave a partially committed value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Counter store did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Counter overflow for scope {0}")]
    Overflow(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Failures of a format configuration source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Rejected at write time: separator not one character, or digit count
    /// outside `1..=MAX_DIGIT_COUNT`. The upper bound of 20 is this crate's
    /// own limit on top of the `>= 1` rule.
    #[error("Invalid format configuration: {0}")]
    Invalid(String),

    #[error("Format configuration unavailable: {0}")]
    Unavailable(String),
}

/// A request that cannot be mapped to a scope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Department scope requires a department code")]
    MissingDepartment,

    #[error("Department code is only accepted for department scope, got {0:?}")]
    UnexpectedDepartment(String),

    #[error("Invalid department code {0:?}: expected 1-32 characters of [A-Za-z0-9_-]")]
    InvalidDepartment(String),

    #[error("Invalid namespace {0:?}: expected 1-32 characters of [a-z0-9_-]")]
    InvalidNamespace(String),

    #[error("Malformed scope key {0:?}")]
    InvalidScopeKey(String),

    #[error("Scope {scope} does not belong to family {family}")]
    ForeignScope { scope: String, family: String },

    #[error("Year {year} does not match the date of scope {scope}")]
    YearMismatch { scope: String, year: i32 },

    /// The sequence was never committed in the scope.
    #[error("Sequence {sequence} was not reserved in scope {scope}")]
    NotReserved { scope: String, sequence: u64 },
}

/// Errors returned by the identifier generator.
///
/// Only `ConfigUnavailable` means a counter value was consumed; every other
/// variant means no identifier was issued.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    /// The counter was already incremented. The reservation can be rendered
    /// later with `IdentifierGenerator::render`; calling `next` again would
    /// consume another value.
    #[error(
        "Format configuration unavailable after reserving {} #{}: {reason}",
        .reserved.scope,
        .reserved.sequence
    )]
    ConfigUnavailable {
        reserved: ReservedSequence,
        reason: String,
    },

    /// A format config write was refused, including digit counts above
    /// `MAX_DIGIT_COUNT` (20).
    #[error("Invalid format configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing settings failed outside of a generation call.
    #[error("Format configuration source unavailable: {0}")]
    ConfigSourceUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ScopeError),

    #[error("Unknown identifier family: {0}")]
    UnknownFamily(String),
}

impl From<StorageError> for GenerateError {
    fn from(e: StorageError) -> Self {
        GenerateError::StorageUnavailable(e)
    }
}

impl From<ConfigError> for GenerateError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Invalid(msg) => GenerateError::InvalidConfig(msg),
            ConfigError::Unavailable(msg) => GenerateError::ConfigSourceUnavailable(msg),
        }
    }
}
