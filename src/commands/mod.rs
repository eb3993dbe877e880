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

pub mod acquire;
pub mod clean;
pub mod config;
pub mod release;
pub mod run;
pub mod status;

use crate::config::LockerConfig;
use crate::error::{LockerError, Result};
use crate::locking::{
    LockTimeoutResolution, LockTimeoutResolver, ResourceLocker, ResourceName, StatusReporter,
    TIMEOUT_ENV, global_token,
};
use log::debug;
use std::env;
use std::sync::Arc;

/// Resource named on the command line, or the configured default.
pub(crate) fn resolve_resource(config: &LockerConfig, name: Option<&str>) -> Result<ResourceName> {
    ResourceName::parse(name.unwrap_or(&config.locking.resource_name))
}

/// Applies `--timeout`, then `RESLOCK_LOCK_TIMEOUT`, then the configured value.
pub(crate) fn resolve_timeout(
    config: &LockerConfig,
    cli_override: Option<&str>,
) -> Result<LockTimeoutResolution> {
    let env_override = env::var(TIMEOUT_ENV).ok();
    let resolution = LockTimeoutResolver::new(
        cli_override,
        env_override.as_deref(),
        config.locking.lock_timeout(),
    )
    .resolve()
    .map_err(|e| LockerError::InvalidConfig(e.to_string()))?;
    debug!(
        "Resolved lock timeout {} from {}",
        resolution.value, resolution.source
    );
    Ok(resolution)
}

/// Locker that reports progress on stderr and stops waiting on SIGINT/SIGTERM.
pub(crate) fn interactive_locker(config: &LockerConfig) -> ResourceLocker {
    ResourceLocker::from_config(&config.locking)
        .with_observer(Arc::new(StatusReporter::stderr()))
        .with_cancellation(global_token())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::LockTimeoutSource;
    use serial_test::serial;
    use std::time::Duration;

    #[test]
    fn resource_defaults_to_configured_name() {
        let mut config = LockerConfig::default();
        assert_eq!(resolve_resource(&config, None).unwrap().as_str(), "node");

        config.locking.resource_name = "printer".to_string();
        assert_eq!(resolve_resource(&config, None).unwrap().as_str(), "printer");
        assert_eq!(resolve_resource(&config, Some("db")).unwrap().as_str(), "db");
    }

    #[test]
    #[serial]
    fn cli_timeout_wins_over_config() {
        let mut config = LockerConfig::default();
        config.locking.timeout_secs = 30;

        let resolution = resolve_timeout(&config, Some("5")).unwrap();
        assert_eq!(resolution.value.as_duration(), Duration::from_secs(5));
        assert_eq!(resolution.source, LockTimeoutSource::Cli);
    }

    #[test]
    #[serial]
    fn malformed_timeout_is_invalid_config() {
        let config = LockerConfig::default();
        assert!(matches!(
            resolve_timeout(&config, Some("soon")),
            Err(LockerError::InvalidConfig(_))
        ));
    }
}
