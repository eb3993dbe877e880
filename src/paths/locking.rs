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

//! Marker path layout inside the shared directory.
//!
//! `<shared-dir>/lock-<resource>.lock` is relied on by operators and other
//! tooling to inspect or clear a stuck lock, so it must stay stable.

use crate::locking::ResourceName;
use std::path::{Path, PathBuf};

pub const MARKER_PREFIX: &str = "lock-";
pub const MARKER_SUFFIX: &str = ".lock";
/// Segment used for markers moved aside while being reclaimed.
pub const TOMBSTONE_SEGMENT: &str = ".reclaim-";
/// Length of the tag after [`TOMBSTONE_SEGMENT`], a simple-format UUID.
pub const TOMBSTONE_TAG_LEN: usize = 32;

pub fn marker_file_name(resource: &ResourceName) -> String {
    format!("{MARKER_PREFIX}{resource}{MARKER_SUFFIX}")
}

pub fn marker_path(shared_dir: &Path, resource: &ResourceName) -> PathBuf {
    shared_dir.join(marker_file_name(resource))
}

/// Recovers the resource name from a marker file name, if it is one.
pub fn resource_from_file_name(file_name: &str) -> Option<ResourceName> {
    let inner = file_name
        .strip_prefix(MARKER_PREFIX)?
        .strip_suffix(MARKER_SUFFIX)?;
    if inner.trim().is_empty() {
        return None;
    }
    ResourceName::parse(inner)
        .ok()
        .filter(|name| name.as_str() == inner)
}

pub fn tombstone_path(marker: &Path, tag: &str) -> PathBuf {
    let mut file_name = marker
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(TOMBSTONE_SEGMENT);
    file_name.push(tag);
    marker.with_file_name(file_name)
}

/// Whether `file_name` is exactly `lock-<name>.lock.reclaim-<32 hex digits>`.
///
/// Markers of names that merely contain `.reclaim-` do not match.
pub fn is_tombstone(file_name: &str) -> bool {
    let Some((marker, tag)) = file_name.rsplit_once(TOMBSTONE_SEGMENT) else {
        return false;
    };
    tag.len() == TOMBSTONE_TAG_LEN
        && tag.chars().all(|ch| ch.is_ascii_hexdigit())
        && resource_from_file_name(marker).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> ResourceName {
        ResourceName::parse(raw).unwrap()
    }

    #[test]
    fn marker_path_is_deterministic() {
        let dir = Path::new("/tmp");
        assert_eq!(
            marker_path(dir, &name("printer")),
            Path::new("/tmp/lock-printer.lock")
        );
        assert_eq!(
            marker_path(dir, &name("")),
            Path::new("/tmp/lock-node.lock")
        );
    }

    #[test]
    fn resource_is_recovered_from_file_name() {
        assert_eq!(
            resource_from_file_name("lock-printer.lock"),
            Some(name("printer"))
        );
        assert_eq!(
            resource_from_file_name("lock-db.v2.lock"),
            Some(name("db.v2"))
        );
        assert_eq!(resource_from_file_name("lock-.lock"), None);
        assert_eq!(resource_from_file_name("printer.lock"), None);
        assert_eq!(resource_from_file_name("lock-a b.lock"), None);
        assert_eq!(
            resource_from_file_name("lock-printer.lock.reclaim-1"),
            None
        );
    }

    #[test]
    fn tombstones_sit_next_to_marker() {
        let tag = "0123456789abcdef0123456789abcdef";
        let marker = Path::new("/tmp/lock-printer.lock");
        let tombstone = tombstone_path(marker, tag);
        assert_eq!(
            tombstone,
            Path::new("/tmp/lock-printer.lock.reclaim-0123456789abcdef0123456789abcdef")
        );
        assert!(is_tombstone(
            tombstone.file_name().and_then(|name| name.to_str()).unwrap()
        ));
        assert!(!is_tombstone("lock-printer.lock"));
    }

    #[test]
    fn markers_with_reclaim_in_name_are_not_tombstones() {
        let marker = marker_file_name(&name("db.reclaim-x"));
        assert_eq!(marker, "lock-db.reclaim-x.lock");
        assert!(!is_tombstone(&marker));
        assert!(!is_tombstone(&marker_file_name(&name(
            "db.reclaim-0123456789abcdef0123456789abcdef"
        ))));
        assert!(!is_tombstone("lock-printer.lock.reclaim-1234"));
        assert!(!is_tombstone("printer.lock.reclaim-0123456789abcdef0123456789abcdef"));
    }
}
