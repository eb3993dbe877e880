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

//! Backoff-polling acquisition of named resource locks.
//!
//! Each attempt asks the marker store to create the marker exclusively. A busy
//! marker is polled with geometric backoff until the deadline; the last sleep is
//! clamped so one final attempt happens at the deadline itself. Storage errors
//! abort immediately and cancellation is observed during every sleep.

use crate::config::LockingConfig;
use crate::error::{LockerError, Result};
use crate::locking::acquisition::{AcquireMode, LockAcquisitionRequest, PollingBackoff};
use crate::locking::cancellation::CancellationToken;
use crate::locking::handle::{ResourceLockHandle, release_marker};
use crate::locking::marker::{CreateOutcome, FsMarkerStore, MarkerInfo, MarkerRecord, MarkerStore};
use crate::locking::resource::ResourceName;
use crate::locking::timeout::{LockTimeout, LockTimeoutSource};
use crate::locking::wait_observer::{LockWaitObserver, NoopLockWaitObserver};
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;

/// Acquires and releases markers for named resources.
pub struct ResourceLocker {
    store: Arc<dyn MarkerStore>,
    observer: Arc<dyn LockWaitObserver>,
    cancellation: CancellationToken,
    backoff: PollingBackoff,
    default_timeout: LockTimeout,
    stale_after_multiplier: u32,
}

impl ResourceLocker {
    pub fn new(config: &LockingConfig, store: Arc<dyn MarkerStore>) -> Self {
        Self {
            store,
            observer: Arc::new(NoopLockWaitObserver),
            cancellation: CancellationToken::new(),
            backoff: config.backoff.polling_backoff(),
            default_timeout: config.lock_timeout(),
            stale_after_multiplier: config.stale_after_multiplier,
        }
    }

    /// Locker over the configured shared directory.
    pub fn from_config(config: &LockingConfig) -> Self {
        let store = Arc::new(FsMarkerStore::new(config.shared_dir()));
        Self::new(config, store)
    }

    pub fn with_observer(mut self, observer: Arc<dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_backoff(mut self, backoff: PollingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn store(&self) -> &Arc<dyn MarkerStore> {
        &self.store
    }

    pub fn default_timeout(&self) -> LockTimeout {
        self.default_timeout
    }

    /// Acquires `resource_name`, waiting up to `timeout_secs` (zero or less selects the default).
    pub fn acquire_named(&self, resource_name: &str, timeout_secs: i64) -> Result<ResourceLockHandle> {
        let resource = ResourceName::parse(resource_name)?;
        self.acquire(&resource, LockTimeout::from_secs_or_default(timeout_secs))
    }

    pub fn acquire(&self, resource: &ResourceName, timeout: LockTimeout) -> Result<ResourceLockHandle> {
        self.acquire_with_source(resource, timeout, LockTimeoutSource::Default)
    }

    /// Acquires with a timeout whose origin is reported in diagnostics.
    pub fn acquire_with_source(
        &self,
        resource: &ResourceName,
        timeout: LockTimeout,
        source: LockTimeoutSource,
    ) -> Result<ResourceLockHandle> {
        let mut request = self
            .request(resource, timeout, AcquireMode::Blocking)
            .with_timeout_source(source);
        match self.run(&mut request)? {
            Some(handle) => Ok(handle),
            None => Err(self.timed_out(&request)),
        }
    }

    /// Makes a single attempt; `None` means somebody else holds the resource.
    pub fn try_acquire(&self, resource: &ResourceName) -> Result<Option<ResourceLockHandle>> {
        let mut request = self.request(resource, self.default_timeout, AcquireMode::NonBlocking);
        self.run(&mut request)
    }

    pub fn release(&self, handle: ResourceLockHandle) -> Result<bool> {
        handle.release()
    }

    /// Releases a marker kept by an earlier process, verifying its token.
    pub fn release_with_token(&self, resource: &ResourceName, token: &str) -> Result<bool> {
        release_marker(
            self.store.as_ref(),
            self.observer.as_ref(),
            resource,
            Some(token),
        )
    }

    /// Deletes the marker regardless of who created it.
    pub fn force_release(&self, resource: &ResourceName) -> Result<bool> {
        info!("Force-releasing resource '{resource}'");
        release_marker(self.store.as_ref(), self.observer.as_ref(), resource, None)
    }

    pub fn inspect(&self, resource: &ResourceName) -> Result<Option<MarkerInfo>> {
        self.store.read(resource)
    }

    fn request(
        &self,
        resource: &ResourceName,
        timeout: LockTimeout,
        mode: AcquireMode,
    ) -> LockAcquisitionRequest<'_> {
        LockAcquisitionRequest::new(resource.clone(), timeout)
            .with_mode(mode)
            .with_backoff(self.backoff.clone())
            .with_cancellation(self.cancellation.clone())
            .with_observer(Some(self.observer.as_ref()))
    }

    fn run(&self, request: &mut LockAcquisitionRequest<'_>) -> Result<Option<ResourceLockHandle>> {
        let resource = request.resource().clone();
        request.notify_attempt();

        loop {
            if request.cancellation().is_cancelled() {
                return Err(self.cancelled(request));
            }

            let record = MarkerRecord::new(&resource);
            match self.store.create(&resource, &record)? {
                CreateOutcome::Created => {
                    debug!(
                        "Acquired resource '{resource}' after {:.3}s and {} retries",
                        request.elapsed().as_secs_f64(),
                        request.retries()
                    );
                    request.notify_acquired();
                    return Ok(Some(ResourceLockHandle::new(
                        resource,
                        record.token,
                        Arc::clone(&self.store),
                        Arc::clone(&self.observer),
                    )));
                }
                CreateOutcome::Busy => {
                    if self.reclaim_if_stale(request)? {
                        continue;
                    }

                    if request.mode().is_non_blocking() {
                        return Ok(None);
                    }

                    request.record_wait_start();
                    if request.budget().is_expired() {
                        return Err(self.timed_out(request));
                    }

                    request.record_retry();
                    let Some(sleep_for) = request.next_sleep_interval() else {
                        return Err(self.timed_out(request));
                    };
                    if !request.cancellation().sleep(sleep_for) {
                        return Err(self.cancelled(request));
                    }
                }
            }
        }
    }

    /// Removes the current marker when stale reclaim is enabled and it is old enough.
    ///
    /// Returns `true` when the caller should retry immediately.
    fn reclaim_if_stale(&self, request: &LockAcquisitionRequest<'_>) -> Result<bool> {
        if self.stale_after_multiplier == 0 {
            return Ok(false);
        }
        let threshold = request
            .timeout()
            .as_duration()
            .saturating_mul(self.stale_after_multiplier);

        let resource = request.resource();
        let Some(info) = self.store.read(resource)? else {
            return Ok(true);
        };
        let Some(age) = info.age(Utc::now()) else {
            return Ok(false);
        };
        if age < threshold {
            return Ok(false);
        }

        info!(
            "Marker for '{resource}' is {}s old (limit {}s); reclaiming",
            age.as_secs(),
            threshold.as_secs()
        );
        let reclaimed = self.store.reclaim(resource, &info)?;
        if reclaimed {
            request.notify_reclaimed(age);
        }
        Ok(reclaimed)
    }

    fn timed_out(&self, request: &LockAcquisitionRequest<'_>) -> LockerError {
        debug!(
            "Giving up on '{}' after {} retries; timeout {} came from the {}",
            request.resource(),
            request.retries(),
            request.timeout(),
            request.timeout_source()
        );
        request.notify_timeout();
        LockerError::LockTimeout {
            resource: request.resource().to_string(),
            waited_secs: request.elapsed().as_secs_f64(),
            timeout_secs: request.timeout().as_secs(),
        }
    }

    fn cancelled(&self, request: &LockAcquisitionRequest<'_>) -> LockerError {
        request.notify_cancelled();
        LockerError::LockCancelled {
            resource: request.resource().to_string(),
            waited_secs: request.elapsed().as_secs_f64(),
        }
    }
}
