use serde::{Deserialize, Serialize};

use crate::contracts::error::ConfigError;

/// Widest padding accepted. `u64::MAX` has 20 digits, so anything wider
/// would only add leading zeros. This cap is stricter than the bare
/// `digit_count >= 1` rule: a config asking for e.g. 24 digits is refused.
pub const MAX_DIGIT_COUNT: usize = 20;

/// Rendering template for one identifier family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub prefix: String,
    pub use_custom_prefix: bool,
    pub include_year: bool,
    pub digit_count: usize,
    /// Exactly one character.
    pub separator: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            use_custom_prefix: false,
            include_year: true,
            digit_count: 4,
            separator: "-".into(),
        }
    }
}

impl FormatConfig {
    /// Checks the write-time constraints: `1 <= digit_count <= MAX_DIGIT_COUNT`
    /// and a one-character separator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.digit_count < 1 || self.digit_count > MAX_DIGIT_COUNT {
            return Err(ConfigError::Invalid(format!(
                "digit_count must be between 1 and {}, got {}",
                MAX_DIGIT_COUNT, self.digit_count
            )));
        }
        if self.separator.chars().count() != 1 {
            return Err(ConfigError::Invalid(format!(
                "separator must be exactly one character, got {:?}",
                self.separator
            )));
        }
        Ok(())
    }
}

/// Source of format configurations, keyed by family name.
///
/// Read fresh on every generation call. Writes are validated before they
/// are accepted, so `load` only returns configurations that passed
/// `FormatConfig::validate` (sources backed by hand-editable files re-check).
pub trait FormatConfigSource: Send + Sync {
    /// Returns the configuration for `family`, or the default if none was stored.
    fn load(&self, family: &str) -> Result<FormatConfig, ConfigError>;

    /// Validates and stores the configuration for `family`.
    fn store(&self, family: &str, config: FormatConfig) -> Result<(), ConfigError>;
}

impl<C: FormatConfigSource + ?Sized> FormatConfigSource for std::sync::Arc<C> {
    fn load(&self, family: &str) -> Result<FormatConfig, ConfigError> {
        (**self).load(family)
    }

    fn store(&self, family: &str, config: FormatConfig) -> Result<(), ConfigError> {
        (**self).store(family, config)
    }
}
