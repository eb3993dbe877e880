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

use crate::error::{LockerError, Result};
use crate::locking::marker::MarkerStore;
use crate::locking::resource::ResourceName;
use crate::locking::wait_observer::LockWaitObserver;
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Proof of a successful acquisition.
///
/// Dropping the handle releases the marker; call [`ResourceLockHandle::keep`]
/// to leave it in place for a later `release`.
pub struct ResourceLockHandle {
    resource: ResourceName,
    path: PathBuf,
    token: String,
    store: Arc<dyn MarkerStore>,
    observer: Arc<dyn LockWaitObserver>,
    acquired_at: Instant,
    released: bool,
}

/// Identity of a marker that outlives its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockLease {
    pub resource: String,
    pub path: PathBuf,
    pub token: String,
}

impl ResourceLockHandle {
    pub(crate) fn new(
        resource: ResourceName,
        token: String,
        store: Arc<dyn MarkerStore>,
        observer: Arc<dyn LockWaitObserver>,
    ) -> Self {
        let path = store.marker_path(&resource);
        Self {
            resource,
            path,
            token,
            store,
            observer,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Deletes the marker if it still carries this handle's token.
    ///
    /// Returns `Ok(false)` when the marker was already gone.
    pub fn release(mut self) -> Result<bool> {
        self.release_inner()
    }

    /// Disarms the handle and leaves the marker in storage.
    pub fn keep(mut self) -> LockLease {
        self.released = true;
        LockLease {
            resource: self.resource.to_string(),
            path: self.path.clone(),
            token: self.token.clone(),
        }
    }

    fn release_inner(&mut self) -> Result<bool> {
        if self.released {
            return Ok(false);
        }
        self.released = true;

        let removed = release_marker(
            self.store.as_ref(),
            self.observer.as_ref(),
            &self.resource,
            Some(&self.token),
        )?;
        debug!(
            "Released resource '{}' after {:.3}s",
            self.resource,
            self.held_for().as_secs_f64()
        );
        Ok(removed)
    }
}

impl std::fmt::Debug for ResourceLockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLockHandle")
            .field("resource", &self.resource)
            .field("path", &self.path)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for ResourceLockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.release_inner() {
            warn!(
                "Failed to release resource '{}' during drop: {err}",
                self.resource
            );
        }
    }
}

/// Announces the release and deletes the marker.
///
/// With `token` set, a marker holding a different token is left alone and
/// reported as [`LockerError::ReleaseMismatch`]. An absent marker is not an
/// error.
pub(crate) fn release_marker(
    store: &dyn MarkerStore,
    observer: &dyn LockWaitObserver,
    resource: &ResourceName,
    token: Option<&str>,
) -> Result<bool> {
    observer.on_release(resource);

    let Some(token) = token else {
        return store.delete(resource);
    };

    let Some(info) = store.read(resource)? else {
        debug!("Marker for '{resource}' was already absent at release");
        return Ok(false);
    };

    if info.token() != Some(token) {
        return Err(LockerError::ReleaseMismatch {
            resource: resource.to_string(),
            path: info.path,
        });
    }

    store.reclaim(resource, &info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::marker::{CreateOutcome, FsMarkerStore, MarkerRecord};
    use crate::locking::wait_observer::NoopLockWaitObserver;
    use tempfile::TempDir;

    fn held_marker() -> (TempDir, Arc<dyn MarkerStore>, ResourceName, MarkerRecord) {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn MarkerStore> = Arc::new(FsMarkerStore::new(temp.path()));
        let resource = ResourceName::parse("printer").unwrap();
        let record = MarkerRecord::new(&resource);
        assert_eq!(
            store.create(&resource, &record).unwrap(),
            CreateOutcome::Created
        );
        (temp, store, resource, record)
    }

    fn handle_for(
        store: &Arc<dyn MarkerStore>,
        resource: &ResourceName,
        token: &str,
    ) -> ResourceLockHandle {
        ResourceLockHandle::new(
            resource.clone(),
            token.to_string(),
            Arc::clone(store),
            Arc::new(NoopLockWaitObserver),
        )
    }

    #[test]
    fn release_removes_own_marker() {
        let (_temp, store, resource, record) = held_marker();
        let handle = handle_for(&store, &resource, &record.token);

        assert!(handle.release().unwrap());
        assert!(!store.exists(&resource).unwrap());
    }

    #[test]
    fn release_is_idempotent_when_marker_is_gone() {
        let (_temp, store, resource, record) = held_marker();
        let handle = handle_for(&store, &resource, &record.token);
        store.delete(&resource).unwrap();

        assert!(!handle.release().unwrap());
    }

    #[test]
    fn release_refuses_foreign_marker() {
        let (_temp, store, resource, _record) = held_marker();
        let handle = handle_for(&store, &resource, "someone-else");

        let err = handle.release().unwrap_err();
        assert!(matches!(err, LockerError::ReleaseMismatch { .. }));
        assert!(store.exists(&resource).unwrap());
    }

    #[test]
    fn held_for_grows_while_marker_is_held() {
        let (_temp, store, resource, record) = held_marker();
        let handle = handle_for(&store, &resource, &record.token);
        std::thread::sleep(Duration::from_millis(20));
        assert!(handle.held_for() >= Duration::from_millis(20));
        assert!(handle.release().unwrap());
    }

    #[test]
    fn drop_releases_marker() {
        let (_temp, store, resource, record) = held_marker();
        {
            let _handle = handle_for(&store, &resource, &record.token);
        }
        assert!(!store.exists(&resource).unwrap());
    }

    #[test]
    fn keep_leaves_marker_in_place() {
        let (_temp, store, resource, record) = held_marker();
        let lease = handle_for(&store, &resource, &record.token).keep();

        assert!(store.exists(&resource).unwrap());
        assert_eq!(lease.token, record.token);
        assert_eq!(lease.resource, "printer");
        assert_eq!(lease.path, store.marker_path(&resource));
    }

    #[test]
    fn untokened_release_deletes_anything() {
        let (_temp, store, resource, _record) = held_marker();
        let removed =
            release_marker(store.as_ref(), &NoopLockWaitObserver, &resource, None).unwrap();
        assert!(removed);
        assert!(
            !release_marker(store.as_ref(), &NoopLockWaitObserver, &resource, None).unwrap()
        );
    }
}
