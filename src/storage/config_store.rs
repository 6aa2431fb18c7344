use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::contracts::{ConfigError, FormatConfig, FormatConfigSource};
use crate::scope::validate_namespace;

/// Format configurations held in memory.
#[derive(Default)]
pub struct MemoryConfigSource {
    configs: RwLock<HashMap<String, FormatConfig>>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormatConfigSource for MemoryConfigSource {
    fn load(&self, family: &str) -> Result<FormatConfig, ConfigError> {
        let configs = self
            .configs
            .read()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        Ok(configs.get(family).cloned().unwrap_or_default())
    }

    fn store(&self, family: &str, config: FormatConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut configs = self
            .configs
            .write()
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;
        configs.insert(family.to_string(), config);
        Ok(())
    }
}

/// Format configurations stored as `<dir>/<family>.json`.
///
/// Files are read on every `load`, so edits by another instance are seen on
/// the next call. A missing file yields the default configuration; an
/// unreadable or invalid one is reported as unavailable.
pub struct FileConfigSource {
    dir: PathBuf,
}

impl FileConfigSource {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ConfigError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, family: &str) -> Result<PathBuf, ConfigError> {
        validate_namespace(family).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(self.dir.join(format!("{}.json", family)))
    }
}

impl FormatConfigSource for FileConfigSource {
    fn load(&self, family: &str) -> Result<FormatConfig, ConfigError> {
        let path = self.path_for(family)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FormatConfig::default()),
            Err(e) => {
                return Err(ConfigError::Unavailable(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let config: FormatConfig = serde_json::from_slice(&bytes).map_err(|e| {
            ConfigError::Unavailable(format!("cannot parse {}: {}", path.display(), e))
        })?;

        // Files can be edited by hand; don't render with a config we'd reject on write
        config
            .validate()
            .map_err(|e| ConfigError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    fn store(&self, family: &str, config: FormatConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let path = self.path_for(family)?;
        let bytes = serde_json::to_vec_pretty(&config)
            .map_err(|e| ConfigError::Unavailable(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };
        write().map_err(|e| {
            ConfigError::Unavailable(format!("cannot write {}: {}", path.display(), e))
        })?;

        tracing::info!(family = %family, path = %path.display(), "Stored format configuration");
        Ok(())
    }
}
