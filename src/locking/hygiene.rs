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

//! Hygiene routines for abandoned markers in the shared directory.
//!
//! A holder that crashes leaves its marker behind and every later caller waits
//! out its full timeout. The sweep removes markers older than a threshold, plus
//! tombstones left by a reclaim that was interrupted half way.

use crate::config::LockingConfig;
use crate::error::Result;
use crate::locking::marker::{FsMarkerStore, MarkerStore, remove_file_if_exists};
use crate::paths::locking::is_tombstone;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::cmp;
use std::fs;
use std::io;
use std::time::{Duration, Instant, SystemTime};

/// Summary of a hygiene sweep.
#[derive(Debug, Default, Clone)]
pub struct LockHygieneReport {
    pub inspected_markers: usize,
    pub removed_markers: Vec<String>,
    pub removed_tombstones: usize,
    pub errors: usize,
    pub duration: Duration,
}

/// Removes stale markers and leftover tombstones from a shared directory.
#[derive(Debug, Clone)]
pub struct LockHygieneRunner {
    store: FsMarkerStore,
    age_threshold: Duration,
}

impl LockHygieneRunner {
    pub fn new(store: FsMarkerStore, age_threshold: Duration) -> Self {
        Self {
            store,
            age_threshold,
        }
    }

    /// Derives a conservative age threshold from the configured timeout.
    pub fn default_threshold(timeout: Duration) -> Duration {
        let minimum = Duration::from_secs(600);
        timeout
            .checked_add(Duration::from_secs(60))
            .map(|candidate| cmp::max(candidate, minimum))
            .unwrap_or(minimum)
    }

    pub fn age_threshold(&self) -> Duration {
        self.age_threshold
    }

    pub fn run(&self) -> Result<LockHygieneReport> {
        self.run_with_now(Utc::now())
    }

    pub(crate) fn run_with_now(&self, now: DateTime<Utc>) -> Result<LockHygieneReport> {
        let start = Instant::now();
        let mut report = LockHygieneReport::default();

        for info in self.store.list()? {
            report.inspected_markers += 1;
            let Some(age) = info.age(now) else {
                continue;
            };
            if age < self.age_threshold {
                continue;
            }

            match self.store.reclaim(&info.resource, &info) {
                Ok(true) => {
                    info!(
                        "Removed stale marker for '{}' ({}s old)",
                        info.resource,
                        age.as_secs()
                    );
                    report.removed_markers.push(info.resource.to_string());
                }
                Ok(false) => debug!(
                    "Marker for '{}' changed during sweep; leaving it",
                    info.resource
                ),
                Err(err) => {
                    warn!("{err}");
                    report.errors += 1;
                }
            }
        }

        self.sweep_tombstones(SystemTime::from(now), &mut report);

        report.duration = start.elapsed();
        debug!(
            "Lock hygiene sweep removed {} marker(s) and {} tombstone(s) in {:.3}s (errors: {})",
            report.removed_markers.len(),
            report.removed_tombstones,
            report.duration.as_secs_f64(),
            report.errors
        );
        Ok(report)
    }

    fn sweep_tombstones(&self, now: SystemTime, report: &mut LockHygieneReport) {
        let root = self.store.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                warn!("Failed to read shared directory {}: {err}", root.display());
                report.errors += 1;
                return;
            }
        };

        for entry in entries.flatten() {
            let is_candidate = entry
                .file_name()
                .to_str()
                .map(is_tombstone)
                .unwrap_or(false);
            if !is_candidate {
                continue;
            }

            let path = entry.path();
            let stale = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age >= self.age_threshold)
                .unwrap_or(false);
            if !stale {
                continue;
            }

            match remove_file_if_exists(&path) {
                Ok(true) => report.removed_tombstones += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!("Failed to remove tombstone {}: {err}", path.display());
                    report.errors += 1;
                }
            }
        }
    }
}

/// Sweeps the configured shared directory.
///
/// `older_than` overrides [`LockHygieneRunner::default_threshold`].
pub fn sweep_shared_dir(
    locking: &LockingConfig,
    older_than: Option<Duration>,
) -> Result<LockHygieneReport> {
    let threshold =
        older_than.unwrap_or_else(|| LockHygieneRunner::default_threshold(locking.timeout()));
    LockHygieneRunner::new(FsMarkerStore::new(locking.shared_dir()), threshold).run()
}
