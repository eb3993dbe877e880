// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{LockerError, Result};
use crate::locking::acquisition::PollingBackoff;
use crate::locking::timeout::LockTimeout;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "reslock";
const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "RESLOCK";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RESLOCK_CONFIG";

pub const DEFAULT_RESOURCE_NAME: &str = "node";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15 * 60;
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 5_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.2;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 15_000;
/// Stale markers are never reclaimed unless this is raised above zero.
pub const DEFAULT_STALE_AFTER_MULTIPLIER: u32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LockerConfig {
    #[serde(default)]
    pub locking: LockingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    /// Seconds to wait for a resource. Zero or negative selects the default.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,

    /// Directory holding marker files. Defaults to the system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_dir: Option<PathBuf>,

    /// Markers older than `timeout * multiplier` may be reclaimed. Zero disables reclaim.
    #[serde(default = "default_stale_after_multiplier")]
    pub stale_after_multiplier: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub factor: f64,

    #[serde(default = "default_backoff_cap_ms")]
    pub cap_ms: u64,
}

fn default_resource_name() -> String {
    DEFAULT_RESOURCE_NAME.to_string()
}

fn default_timeout_secs() -> i64 {
    DEFAULT_TIMEOUT_SECS as i64
}

fn default_stale_after_multiplier() -> u32 {
    DEFAULT_STALE_AFTER_MULTIPLIER
}

fn default_backoff_initial_ms() -> u64 {
    DEFAULT_BACKOFF_INITIAL_MS
}

fn default_backoff_factor() -> f64 {
    DEFAULT_BACKOFF_FACTOR
}

fn default_backoff_cap_ms() -> u64 {
    DEFAULT_BACKOFF_CAP_MS
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            resource_name: default_resource_name(),
            timeout_secs: default_timeout_secs(),
            shared_dir: None,
            stale_after_multiplier: default_stale_after_multiplier(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            factor: default_backoff_factor(),
            cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl LockingConfig {
    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::from_secs_or_default(self.timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        self.lock_timeout().as_duration()
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.shared_dir.clone().unwrap_or_else(env::temp_dir)
    }

    pub fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_ms == 0 || self.cap_ms == 0 {
            return Err(LockerError::InvalidConfig(
                "backoff.initial_ms and backoff.cap_ms must be greater than zero".to_string(),
            ));
        }
        if self.initial_ms > self.cap_ms {
            return Err(LockerError::InvalidConfig(format!(
                "backoff.initial_ms ({}) must not exceed backoff.cap_ms ({})",
                self.initial_ms, self.cap_ms
            )));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(LockerError::InvalidConfig(format!(
                "backoff.factor must be a finite number of at least 1.0, got {}",
                self.factor
            )));
        }
        Ok(())
    }

    pub fn polling_backoff(&self) -> PollingBackoff {
        PollingBackoff::new(
            Duration::from_millis(self.initial_ms),
            self.factor,
            Duration::from_millis(self.cap_ms),
        )
    }
}

impl LockerConfig {
    /// Loads configuration from the first config file found and `RESLOCK_*` variables.
    ///
    /// Lookup order for the file is the explicit path, then `RESLOCK_CONFIG`, then
    /// `<config dir>/reslock/config.toml`. Only the last one may be missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let (path, required) = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => (Some(path), true),
            None => (default_config_path(), false),
        };

        let mut builder = Config::builder();
        if let Some(path) = &path {
            log::debug!("Reading config from {path:?} (required: {required})");
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(required),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: LockerConfig = builder
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| LockerError::ConfigError(format!("Failed to load configuration: {e}")))?;

        config.locking.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LockerError::ConfigError(format!("Failed to serialize config: {e}")))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
