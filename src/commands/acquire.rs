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

use crate::commands::{interactive_locker, resolve_resource, resolve_timeout};
use crate::config::LockerConfig;
use crate::error::Result;
use log::info;

pub struct AcquireCommand<'a> {
    config: &'a LockerConfig,
}

impl<'a> AcquireCommand<'a> {
    pub fn new(config: &'a LockerConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Acquires the resource and leaves the marker in place for a later `release`.
    ///
    /// The token is printed on stdout so scripts can pass it to `release --token`.
    pub fn execute(&self, name: Option<&str>, timeout: Option<&str>, json: bool) -> Result<()> {
        let resource = resolve_resource(self.config, name)?;
        let resolution = resolve_timeout(self.config, timeout)?;
        let locker = interactive_locker(self.config);

        let handle = locker.acquire_with_source(&resource, resolution.value, resolution.source)?;
        let lease = handle.keep();
        info!("Marker kept at {}", lease.path.display());

        if json {
            println!("{}", serde_json::to_string_pretty(&lease)?);
        } else {
            println!("{}", lease.token);
        }
        Ok(())
    }
}
