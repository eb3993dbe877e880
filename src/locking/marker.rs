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

//! Marker files in the shared directory.
//!
//! A marker's existence is the whole lock state. Acquisition creates it with
//! `create_new`, so "already exists" is the only busy signal and two callers
//! can never both succeed. The JSON payload carries an ownership token and a
//! creation stamp; files written by other tooling (for example a bare `touch`)
//! are still treated as held markers and aged by their modification time.

use crate::error::{LockerError, Result};
use crate::locking::resource::ResourceName;
use crate::paths::locking::{marker_path, resource_from_file_name, tombstone_path};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Payload stored inside a marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub resource: String,
    pub token: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MarkerRecord {
    /// Builds a record for a fresh acquisition with a new ownership token.
    pub fn new(resource: &ResourceName) -> Self {
        Self {
            resource: resource.to_string(),
            token: generate_token(),
            pid: std::process::id(),
            host: host_name(),
            created_at: Utc::now(),
        }
    }
}

/// Result of an exclusive marker creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Busy,
}

/// Snapshot of a marker as found in storage.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInfo {
    pub resource: ResourceName,
    pub path: PathBuf,
    pub record: Option<MarkerRecord>,
    pub modified: Option<SystemTime>,
}

impl MarkerInfo {
    pub fn token(&self) -> Option<&str> {
        self.record.as_ref().map(|record| record.token.as_str())
    }

    /// Creation stamp from the payload, or the file modification time for foreign markers.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .as_ref()
            .map(|record| record.created_at)
            .or_else(|| self.modified.map(DateTime::<Utc>::from))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.created_at()
            .map(|created| (now - created).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether `other` describes the same acquisition as `self`.
    pub fn same_acquisition(&self, other: &MarkerInfo) -> bool {
        match (self.token(), other.token()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            (None, None) => self.modified == other.modified,
            _ => false,
        }
    }
}

/// Storage primitives the resource lock is built on.
pub trait MarkerStore: Send + Sync {
    /// Location of the marker for `resource`.
    fn marker_path(&self, resource: &ResourceName) -> PathBuf;

    fn exists(&self, resource: &ResourceName) -> Result<bool>;

    /// Creates the marker only if it does not exist yet.
    fn create(&self, resource: &ResourceName, record: &MarkerRecord) -> Result<CreateOutcome>;

    fn read(&self, resource: &ResourceName) -> Result<Option<MarkerInfo>>;

    /// Removes the marker, returning whether one was there.
    fn delete(&self, resource: &ResourceName) -> Result<bool>;

    /// Removes the marker only if it is still the one described by `observed`.
    fn reclaim(&self, resource: &ResourceName, observed: &MarkerInfo) -> Result<bool>;

    fn list(&self) -> Result<Vec<MarkerInfo>>;
}

/// [`MarkerStore`] backed by plain files in a shared directory.
#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_root(&self, resource: &ResourceName) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|err| {
            LockerError::storage(resource.as_str(), "prepare directory for", self.root.clone(), err)
        })
    }
}

impl MarkerStore for FsMarkerStore {
    fn marker_path(&self, resource: &ResourceName) -> PathBuf {
        marker_path(&self.root, resource)
    }

    fn exists(&self, resource: &ResourceName) -> Result<bool> {
        let path = self.marker_path(resource);
        path.try_exists()
            .map_err(|err| LockerError::storage(resource.as_str(), "check", path, err))
    }

    fn create(&self, resource: &ResourceName, record: &MarkerRecord) -> Result<CreateOutcome> {
        self.ensure_root(resource)?;
        let path = self.marker_path(resource);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(err) = write_record(&mut file, record) {
                    drop(file);
                    cleanup_partial_marker(&path);
                    return Err(LockerError::storage(resource.as_str(), "write", path, err));
                }
                debug!("Created marker {}", path.display());
                Ok(CreateOutcome::Created)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::Busy),
            // Windows reports a marker that is pending deletion this way.
            Err(err)
                if cfg!(windows)
                    && err.kind() == io::ErrorKind::PermissionDenied
                    && path.exists() =>
            {
                Ok(CreateOutcome::Busy)
            }
            Err(err) => Err(LockerError::storage(resource.as_str(), "create", path, err)),
        }
    }

    fn read(&self, resource: &ResourceName) -> Result<Option<MarkerInfo>> {
        let path = self.marker_path(resource);
        read_info(resource, &path)
            .map_err(|err| LockerError::storage(resource.as_str(), "read", path, err))
    }

    fn delete(&self, resource: &ResourceName) -> Result<bool> {
        let path = self.marker_path(resource);
        remove_file_if_exists(&path)
            .map_err(|err| LockerError::storage(resource.as_str(), "delete", path, err))
    }

    fn reclaim(&self, resource: &ResourceName, observed: &MarkerInfo) -> Result<bool> {
        let path = self.marker_path(resource);
        let tombstone = tombstone_path(&path, &Uuid::new_v4().simple().to_string());

        match fs::rename(&path, &tombstone) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(LockerError::storage(resource.as_str(), "reclaim", path, err));
            }
        }

        let moved = read_info(resource, &tombstone)
            .map_err(|err| LockerError::storage(resource.as_str(), "reclaim", tombstone.clone(), err))?;
        let matches = moved
            .as_ref()
            .map(|moved| observed.same_acquisition(moved))
            .unwrap_or(false);

        if !matches {
            // A new holder replaced the stale marker after it was inspected; put it back.
            let restored = restore_marker(&tombstone, &path, |from, to| fs::hard_link(from, to))
                .map_err(|err| {
                    LockerError::storage(resource.as_str(), "restore", tombstone.clone(), err)
                })?;
            match restored {
                RestoreOutcome::Linked => {}
                RestoreOutcome::Renamed => return Ok(false),
                RestoreOutcome::Occupied => {
                    warn!(
                        "Marker {} was recreated while restoring a live marker; kept it at {}",
                        path.display(),
                        tombstone.display()
                    );
                    return Ok(false);
                }
            }
        }

        if let Err(err) = remove_file_if_exists(&tombstone) {
            warn!("Failed to remove reclaimed marker {}: {err}", tombstone.display());
        }
        Ok(matches)
    }

    fn list(&self) -> Result<Vec<MarkerInfo>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(LockerError::storage("*", "list", self.root.clone(), err));
            }
        };

        let mut markers = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|err| LockerError::storage("*", "list", self.root.clone(), err))?;
            let Some(resource) = entry.file_name().to_str().and_then(resource_from_file_name)
            else {
                continue;
            };
            let path = entry.path();
            match read_info(&resource, &path) {
                Ok(Some(info)) => markers.push(info),
                Ok(None) => {}
                Err(err) => {
                    return Err(LockerError::storage(resource.as_str(), "read", path, err));
                }
            }
        }
        markers.sort_by(|a, b| a.resource.as_str().cmp(b.resource.as_str()));
        Ok(markers)
    }
}

fn write_record(file: &mut fs::File, record: &MarkerRecord) -> io::Result<()> {
    let payload =
        serde_json::to_vec_pretty(record).map_err(|err| io::Error::other(err.to_string()))?;
    file.write_all(&payload)?;
    file.sync_all()
}

fn read_info(resource: &ResourceName, path: &Path) -> io::Result<Option<MarkerInfo>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let record = match serde_json::from_slice::<MarkerRecord>(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(
                "Marker {} has no readable record ({err}); treating it as foreign",
                path.display()
            );
            None
        }
    };
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();

    Ok(Some(MarkerInfo {
        resource: resource.clone(),
        path: path.to_path_buf(),
        record,
        modified,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreOutcome {
    /// The marker is back in place; the tombstone is a second link to it.
    Linked,
    /// The tombstone itself was moved back.
    Renamed,
    /// Another caller created the marker meanwhile; the tombstone is left untouched.
    Occupied,
}

/// Puts a marker moved aside by `reclaim` back at `path`.
///
/// `link` is tried first so an occupied `path` is never overwritten. When linking
/// is unsupported the tombstone is renamed back, but only while `path` is free.
fn restore_marker<F>(tombstone: &Path, path: &Path, link: F) -> io::Result<RestoreOutcome>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match link(tombstone, path) {
        Ok(()) => Ok(RestoreOutcome::Linked),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(RestoreOutcome::Occupied),
        Err(err) => {
            debug!(
                "Hard link from {} failed ({err}); renaming it back instead",
                tombstone.display()
            );
            if path.try_exists()? {
                return Ok(RestoreOutcome::Occupied);
            }
            fs::rename(tombstone, path)?;
            Ok(RestoreOutcome::Renamed)
        }
    }
}

fn cleanup_partial_marker(path: &Path) {
    if let Err(err) = remove_file_if_exists(path) {
        warn!("Failed to remove partial marker {}: {err}", path.display());
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

fn generate_token() -> String {
    format!("{}-{}", std::process::id(), Uuid::new_v4())
}

fn host_name() -> Option<String> {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| env::var(key).ok())
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name(raw: &str) -> ResourceName {
        ResourceName::parse(raw).unwrap()
    }

    fn store() -> (TempDir, FsMarkerStore) {
        let temp = TempDir::new().unwrap();
        let store = FsMarkerStore::new(temp.path().join("shared"));
        (temp, store)
    }

    #[test]
    fn create_is_exclusive() {
        let (_temp, store) = store();
        let printer = name("printer");

        assert!(!store.exists(&printer).unwrap());
        let first = MarkerRecord::new(&printer);
        assert_eq!(store.create(&printer, &first).unwrap(), CreateOutcome::Created);
        assert!(store.exists(&printer).unwrap());

        let second = MarkerRecord::new(&printer);
        assert_eq!(store.create(&printer, &second).unwrap(), CreateOutcome::Busy);

        let info = store.read(&printer).unwrap().unwrap();
        assert_eq!(info.token(), Some(first.token.as_str()));
        assert_eq!(info.path, store.root().join("lock-printer.lock"));
    }

    #[test]
    fn tokens_are_unique_per_record() {
        let printer = name("printer");
        assert_ne!(
            MarkerRecord::new(&printer).token,
            MarkerRecord::new(&printer).token
        );
    }

    #[test]
    fn delete_reports_whether_marker_existed() {
        let (_temp, store) = store();
        let printer = name("printer");
        store.create(&printer, &MarkerRecord::new(&printer)).unwrap();

        assert!(store.delete(&printer).unwrap());
        assert!(!store.delete(&printer).unwrap());
        assert!(!store.exists(&printer).unwrap());
    }

    #[test]
    fn foreign_markers_are_readable() {
        let (_temp, store) = store();
        let printer = name("printer");
        fs::create_dir_all(store.root()).unwrap();
        fs::write(store.marker_path(&printer), b"").unwrap();

        let info = store.read(&printer).unwrap().unwrap();
        assert!(info.record.is_none());
        assert!(info.modified.is_some());
        assert!(info.created_at().is_some());
        assert_eq!(
            store.create(&printer, &MarkerRecord::new(&printer)).unwrap(),
            CreateOutcome::Busy
        );
    }

    #[test]
    fn read_missing_marker_returns_none() {
        let (_temp, store) = store();
        assert!(store.read(&name("printer")).unwrap().is_none());
    }

    #[test]
    fn age_uses_record_timestamp() {
        let printer = name("printer");
        let mut record = MarkerRecord::new(&printer);
        record.created_at = Utc::now() - chrono::Duration::seconds(120);
        let info = MarkerInfo {
            resource: printer,
            path: PathBuf::from("/tmp/lock-printer.lock"),
            record: Some(record),
            modified: None,
        };
        let age = info.age(Utc::now()).unwrap();
        assert!(age >= Duration::from_secs(120));
        assert!(age < Duration::from_secs(130));
    }

    #[test]
    fn reclaim_removes_observed_marker() {
        let (_temp, store) = store();
        let printer = name("printer");
        store.create(&printer, &MarkerRecord::new(&printer)).unwrap();
        let observed = store.read(&printer).unwrap().unwrap();

        assert!(store.reclaim(&printer, &observed).unwrap());
        assert!(!store.exists(&printer).unwrap());
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[test]
    fn reclaim_keeps_replaced_marker() {
        let (_temp, store) = store();
        let printer = name("printer");
        store.create(&printer, &MarkerRecord::new(&printer)).unwrap();
        let observed = store.read(&printer).unwrap().unwrap();

        store.delete(&printer).unwrap();
        let replacement = MarkerRecord::new(&printer);
        store.create(&printer, &replacement).unwrap();

        assert!(!store.reclaim(&printer, &observed).unwrap());
        let current = store.read(&printer).unwrap().unwrap();
        assert_eq!(current.token(), Some(replacement.token.as_str()));
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 1);
    }

    fn moved_aside(store: &FsMarkerStore, resource: &ResourceName) -> (PathBuf, PathBuf, MarkerRecord) {
        let record = MarkerRecord::new(resource);
        store.create(resource, &record).unwrap();
        let path = store.marker_path(resource);
        let tombstone = tombstone_path(&path, &Uuid::new_v4().simple().to_string());
        fs::rename(&path, &tombstone).unwrap();
        (path, tombstone, record)
    }

    #[test]
    fn restore_links_marker_back() {
        let (_temp, store) = store();
        let printer = name("printer");
        let (path, tombstone, record) = moved_aside(&store, &printer);

        let outcome = restore_marker(&tombstone, &path, |from, to| fs::hard_link(from, to)).unwrap();
        assert_eq!(outcome, RestoreOutcome::Linked);
        assert_eq!(store.read(&printer).unwrap().unwrap().token(), Some(record.token.as_str()));
    }

    #[test]
    fn restore_keeps_tombstone_when_marker_was_recreated() {
        let (_temp, store) = store();
        let printer = name("printer");
        let (path, tombstone, live) = moved_aside(&store, &printer);
        let newcomer = MarkerRecord::new(&printer);
        store.create(&printer, &newcomer).unwrap();

        let outcome = restore_marker(&tombstone, &path, |from, to| fs::hard_link(from, to)).unwrap();
        assert_eq!(outcome, RestoreOutcome::Occupied);
        assert_eq!(store.read(&printer).unwrap().unwrap().token(), Some(newcomer.token.as_str()));
        let kept = read_info(&printer, &tombstone).unwrap().unwrap();
        assert_eq!(kept.token(), Some(live.token.as_str()));
    }

    #[test]
    fn restore_renames_back_when_links_are_unsupported() {
        let (_temp, store) = store();
        let printer = name("printer");
        let (path, tombstone, record) = moved_aside(&store, &printer);

        let outcome = restore_marker(&tombstone, &path, |_, _| {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        })
        .unwrap();
        assert_eq!(outcome, RestoreOutcome::Renamed);
        assert!(!tombstone.exists());
        assert_eq!(store.read(&printer).unwrap().unwrap().token(), Some(record.token.as_str()));
    }

    #[test]
    fn failed_restore_never_overwrites_new_marker() {
        let (_temp, store) = store();
        let printer = name("printer");
        let (path, tombstone, live) = moved_aside(&store, &printer);
        let newcomer = MarkerRecord::new(&printer);
        store.create(&printer, &newcomer).unwrap();

        let outcome = restore_marker(&tombstone, &path, |_, _| {
            Err(io::Error::from(io::ErrorKind::Unsupported))
        })
        .unwrap();
        assert_eq!(outcome, RestoreOutcome::Occupied);
        assert!(tombstone.exists());
        assert_eq!(store.read(&printer).unwrap().unwrap().token(), Some(newcomer.token.as_str()));
        assert_eq!(
            read_info(&printer, &tombstone).unwrap().unwrap().token(),
            Some(live.token.as_str())
        );
    }

    #[test]
    fn reclaim_of_missing_marker_is_noop() {
        let (_temp, store) = store();
        let printer = name("printer");
        let observed = MarkerInfo {
            resource: printer.clone(),
            path: store.marker_path(&printer),
            record: None,
            modified: None,
        };
        assert!(!store.reclaim(&printer, &observed).unwrap());
    }

    #[test]
    fn list_returns_markers_sorted() {
        let (_temp, store) = store();
        assert!(store.list().unwrap().is_empty());

        for raw in ["scanner", "printer"] {
            let resource = name(raw);
            store.create(&resource, &MarkerRecord::new(&resource)).unwrap();
        }
        fs::write(store.root().join("unrelated.txt"), b"x").unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|info| info.resource.to_string())
            .collect();
        assert_eq!(names, ["printer", "scanner"]);
    }

    #[cfg(unix)]
    #[test]
    fn create_in_unwritable_directory_is_storage_error() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, store) = store();
        fs::create_dir_all(store.root()).unwrap();
        fs::set_permissions(store.root(), fs::Permissions::from_mode(0o500)).unwrap();

        let printer = name("printer");
        let result = store.create(&printer, &MarkerRecord::new(&printer));
        fs::set_permissions(store.root(), fs::Permissions::from_mode(0o700)).unwrap();

        // Running as root bypasses directory permissions.
        if let Err(err) = result {
            assert!(matches!(err, LockerError::Storage { operation: "create", .. }));
        }
    }
}
