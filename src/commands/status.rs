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
use crate::locking::{FsMarkerStore, MarkerInfo, MarkerStore, ResourceName};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Serialize, PartialEq)]
struct StatusEntry {
    resource: String,
    held: bool,
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    age_secs: Option<u64>,
}

impl StatusEntry {
    fn free(resource: &ResourceName, path: PathBuf) -> Self {
        Self {
            resource: resource.to_string(),
            held: false,
            path,
            token: None,
            pid: None,
            host: None,
            created_at: None,
            age_secs: None,
        }
    }

    fn held(info: MarkerInfo, now: DateTime<Utc>) -> Self {
        let age_secs = info.age(now).map(|age| age.as_secs());
        let created_at = info.created_at();
        let record = info.record;
        Self {
            resource: info.resource.to_string(),
            held: true,
            path: info.path,
            token: record.as_ref().map(|r| r.token.clone()),
            pid: record.as_ref().map(|r| r.pid),
            host: record.and_then(|r| r.host),
            created_at,
            age_secs,
        }
    }
}

pub struct StatusCommand<'a> {
    config: &'a LockerConfig,
}

impl<'a> StatusCommand<'a> {
    pub fn new(config: &'a LockerConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Shows one resource, or every marker in the shared directory when `name` is absent.
    pub fn execute(&self, name: Option<&str>, json: bool) -> Result<()> {
        let store = FsMarkerStore::new(self.config.locking.shared_dir());
        let entries = collect_entries(self.config, &store, name, Utc::now())?;

        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else if entries.is_empty() {
            println!(
                "No resources are locked in {}",
                store.root().display()
            );
        } else {
            for entry in &entries {
                print_standard_entry(entry);
            }
        }
        Ok(())
    }
}

fn collect_entries(
    config: &LockerConfig,
    store: &dyn MarkerStore,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<StatusEntry>> {
    if name.is_none() {
        return Ok(store
            .list()?
            .into_iter()
            .map(|info| StatusEntry::held(info, now))
            .collect());
    }

    let resource = resolve_resource(config, name)?;
    let entry = match store.read(&resource)? {
        Some(info) => StatusEntry::held(info, now),
        None => StatusEntry::free(&resource, store.marker_path(&resource)),
    };
    Ok(vec![entry])
}

fn print_standard_entry(entry: &StatusEntry) {
    if !entry.held {
        println!("{}: {}", entry.resource.bold(), "free".green());
        return;
    }

    let mut details = Vec::new();
    if let Some(pid) = entry.pid {
        details.push(format!("pid {pid}"));
    }
    if let Some(host) = &entry.host {
        details.push(format!("on {host}"));
    }
    if let Some(age) = entry.age_secs {
        details.push(format!("for {age}s"));
    }
    if entry.token.is_none() {
        details.push("foreign marker".to_string());
    }

    if details.is_empty() {
        println!("{}: {}", entry.resource.bold(), "held".red());
    } else {
        println!(
            "{}: {} ({})",
            entry.resource.bold(),
            "held".red(),
            details.join(", ")
        );
    }
    println!("  {}", entry.path.display().to_string().dimmed());
}
