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
use crate::error::{LockerError, Result};
use crate::locking::LockWrapper;
use log::{debug, warn};
use std::process::{Command, ExitStatus};

pub struct RunCommand<'a> {
    config: &'a LockerConfig,
}

impl<'a> RunCommand<'a> {
    pub fn new(config: &'a LockerConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Runs `command` while holding the resource and returns its exit code.
    pub fn execute(
        &self,
        name: Option<&str>,
        timeout: Option<&str>,
        command: &[String],
    ) -> Result<i32> {
        let Some((program, args)) = command.split_first() else {
            return Err(LockerError::CommandFailed {
                command: String::new(),
                details: "No command given after '--'".to_string(),
            });
        };

        let resource = resolve_resource(self.config, name)?;
        let resolution = resolve_timeout(self.config, timeout)?;
        let locker = interactive_locker(self.config);
        let wrapper =
            LockWrapper::new(&locker, resource.as_str(), 0)?.with_timeout(resolution.value);

        let environment = wrapper.set_up()?;
        debug!("Running {program} {args:?} with resource '{resource}' held");
        let status = Command::new(program).args(args).status();
        if !environment.tear_down() {
            warn!("Resource '{resource}' may still be marked as held");
        }

        let status = status.map_err(|e| LockerError::CommandFailed {
            command: command.join(" "),
            details: e.to_string(),
        })?;
        Ok(exit_code(status))
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
