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

use crate::commands::resolve_resource;
use crate::config::LockerConfig;
use crate::error::Result;
use crate::locking::{ResourceLocker, StatusReporter};
use std::sync::Arc;

pub struct ReleaseCommand<'a> {
    config: &'a LockerConfig,
}

impl<'a> ReleaseCommand<'a> {
    pub fn new(config: &'a LockerConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Deletes the marker. Without `force` the marker must carry `token`.
    pub fn execute(&self, name: Option<&str>, token: Option<&str>, force: bool) -> Result<()> {
        let resource = resolve_resource(self.config, name)?;
        let locker = ResourceLocker::from_config(&self.config.locking)
            .with_observer(Arc::new(StatusReporter::stderr()));

        let removed = match token {
            Some(token) if !force => locker.release_with_token(&resource, token)?,
            _ => locker.force_release(&resource)?,
        };

        if removed {
            println!("Released resource '{resource}'");
        } else {
            println!("Resource '{resource}' was not locked");
        }
        Ok(())
    }
}
