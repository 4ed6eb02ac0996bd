use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use depot_refs::validate_ref_name;

use crate::error::{RepositoryError, RepositoryResult};

/// Name of the configuration file inside a file repository.
pub const CONFIG_FILE: &str = "depot.toml";

/// Configuration for a tag repository.
///
/// Serialized as TOML; every field is optional and falls back to
/// [`RepositoryConfig::default`]:
///
/// ```toml
/// root_ref = "refs/depot/root"
/// max_retries = 64
/// backoff_initial_ms = 1
/// backoff_max_ms = 50
/// validation_cache_capacity = 4096
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Ref holding the commit of the installed tag snapshot.
    pub root_ref: String,
    /// Attempts a mutating call makes before giving up with
    /// `TooManyConflicts`.
    pub max_retries: u32,
    /// Sleep before the first retry; doubles per retry.
    #[serde(rename = "backoff_initial_ms", with = "millis")]
    pub backoff_initial: Duration,
    /// Upper bound for the retry sleep.
    #[serde(rename = "backoff_max_ms", with = "millis")]
    pub backoff_max: Duration,
    /// Number of object ids remembered as fully validated. Zero disables
    /// the cache.
    pub validation_cache_capacity: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root_ref: "refs/depot/root".into(),
            max_retries: 64,
            backoff_initial: Duration::from_millis(1),
            backoff_max: Duration::from_millis(50),
            validation_cache_capacity: 4096,
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(text: &str) -> RepositoryResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| RepositoryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> RepositoryResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepositoryError::Configuration(e.to_string()))
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> RepositoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RepositoryError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> RepositoryResult<Self> {
        match std::fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(RepositoryError::Configuration(format!(
                "cannot stat {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> RepositoryResult<()> {
        validate_ref_name(&self.root_ref)
            .map_err(|e| RepositoryError::Configuration(format!("root_ref: {e}")))?;
        if self.max_retries == 0 {
            return Err(RepositoryError::Configuration(
                "max_retries must be at least 1".into(),
            ));
        }
        if self.backoff_initial > self.backoff_max {
            return Err(RepositoryError::Configuration(
                "backoff_initial_ms must not exceed backoff_max_ms".into(),
            ));
        }
        Ok(())
    }

    /// Sleep before retry number `attempt` (1-based): exponential, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_initial
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
