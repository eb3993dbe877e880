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

use crate::config::DEFAULT_TIMEOUT_SECS;
use std::fmt;
use std::time::Duration;

/// Environment variable overriding the configured lock timeout.
pub const TIMEOUT_ENV: &str = "RESLOCK_LOCK_TIMEOUT";

/// A strictly positive acquisition timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout(Duration);

impl LockTimeout {
    pub const DEFAULT: LockTimeout = LockTimeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

    /// Zero and negative values select [`LockTimeout::DEFAULT`].
    pub fn from_secs_or_default(seconds: i64) -> Self {
        if seconds <= 0 {
            Self::DEFAULT
        } else {
            Self(Duration::from_secs(seconds as u64))
        }
    }

    /// Zero selects [`LockTimeout::DEFAULT`].
    pub fn from_duration_or_default(duration: Duration) -> Self {
        if duration.is_zero() {
            Self::DEFAULT
        } else {
            Self(duration)
        }
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for LockTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeoutSource {
    #[default]
    Default,
    Config,
    Environment,
    Cli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeoutResolution {
    pub value: LockTimeout,
    pub source: LockTimeoutSource,
}

impl fmt::Display for LockTimeoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockTimeoutSource::Default => "built-in default",
            LockTimeoutSource::Config => "configuration file",
            LockTimeoutSource::Environment => "environment variable",
            LockTimeoutSource::Cli => "CLI flag",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeoutParseError {
    message: String,
}

impl fmt::Display for LockTimeoutParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LockTimeoutParseError {}

impl LockTimeoutParseError {
    fn invalid_value(value: &str) -> Self {
        Self {
            message: format!(
                "Lock timeout value '{value}' is invalid. Use an integer number of seconds \
                 (zero or less selects the default)."
            ),
        }
    }
}

pub fn parse_timeout_override(value: &str) -> Result<LockTimeout, LockTimeoutParseError> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .map(LockTimeout::from_secs_or_default)
        .map_err(|_| LockTimeoutParseError::invalid_value(trimmed))
}

/// Picks the effective timeout: CLI flag, then environment, then config, then default.
pub struct LockTimeoutResolver<'a> {
    cli_override: Option<&'a str>,
    env_override: Option<&'a str>,
    config_value: LockTimeout,
}

impl<'a> LockTimeoutResolver<'a> {
    pub fn new(
        cli_override: Option<&'a str>,
        env_override: Option<&'a str>,
        config_value: LockTimeout,
    ) -> Self {
        Self {
            cli_override,
            env_override,
            config_value,
        }
    }

    pub fn resolve(self) -> Result<LockTimeoutResolution, LockTimeoutParseError> {
        if let Some(cli_value) = self.cli_override {
            let value = parse_timeout_override(cli_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Cli,
            });
        }

        if let Some(env_value) = self.env_override {
            let value = parse_timeout_override(env_value)?;
            return Ok(LockTimeoutResolution {
                value,
                source: LockTimeoutSource::Environment,
            });
        }

        if self.config_value != LockTimeout::DEFAULT {
            return Ok(LockTimeoutResolution {
                value: self.config_value,
                source: LockTimeoutSource::Config,
            });
        }

        Ok(LockTimeoutResolution {
            value: LockTimeout::DEFAULT,
            source: LockTimeoutSource::Default,
        })
    }
}
