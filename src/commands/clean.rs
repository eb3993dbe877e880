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

use crate::config::LockerConfig;
use crate::error::Result;
use crate::locking::sweep_shared_dir;
use std::time::Duration;

pub struct CleanCommand<'a> {
    config: &'a LockerConfig,
}

impl<'a> CleanCommand<'a> {
    pub fn new(config: &'a LockerConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, older_than_secs: Option<u64>) -> Result<()> {
        let report = sweep_shared_dir(
            &self.config.locking,
            older_than_secs.map(Duration::from_secs),
        )?;

        if report.removed_markers.is_empty() {
            println!(
                "No stale markers found ({} inspected)",
                report.inspected_markers
            );
        } else {
            for resource in &report.removed_markers {
                println!("Removed stale marker for '{resource}'");
            }
        }
        if report.removed_tombstones > 0 {
            println!(
                "Removed {} leftover reclaim file(s)",
                report.removed_tombstones
            );
        }
        if report.errors > 0 {
            eprintln!(
                "Warning: {} marker(s) could not be inspected or removed; rerun with -v for details",
                report.errors
            );
        }
        Ok(())
    }
}
