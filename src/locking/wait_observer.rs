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

//! Observer interfaces for lock progress.
//!
//! Observers decouple the `ResourceLocker` from operator-facing output so the
//! host decides where status lines go without duplicating polling logic.

use crate::locking::resource::ResourceName;
use crate::locking::timeout::LockTimeout;
use log::{debug, info};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

/// Observer hooks for lock lifecycle events.
pub trait LockWaitObserver: Send + Sync {
    fn on_attempt(&self, _resource: &ResourceName, _timeout: LockTimeout) {}

    fn on_wait_start(&self, _resource: &ResourceName, _timeout: LockTimeout) {}

    fn on_retry(
        &self,
        _resource: &ResourceName,
        _attempt: usize,
        _elapsed: Duration,
        _remaining: Duration,
    ) {
    }

    fn on_reclaimed(&self, _resource: &ResourceName, _age: Duration) {}

    fn on_acquired(&self, _resource: &ResourceName, _waited: Duration) {}

    fn on_timeout(&self, _resource: &ResourceName, _waited: Duration) {}

    fn on_cancelled(&self, _resource: &ResourceName, _waited: Duration) {}

    fn on_release(&self, _resource: &ResourceName) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}

/// Writes the operator status lines to a stream.
///
/// Only three lines are ever written: the attempt notice, the acquisition
/// notice and the release notice. Everything else goes to the logger.
pub struct StatusReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl StatusReporter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> StatusReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn line(&self, message: &str) {
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{message}");
            let _ = out.flush();
        }
    }
}

impl<W: Write + Send> LockWaitObserver for StatusReporter<W> {
    fn on_attempt(&self, resource: &ResourceName, _timeout: LockTimeout) {
        self.line(&format!("Attempting to lock resource '{resource}'..."));
    }

    fn on_wait_start(&self, resource: &ResourceName, timeout: LockTimeout) {
        info!("Resource '{resource}' is held elsewhere; waiting up to {timeout}");
    }

    fn on_retry(
        &self,
        resource: &ResourceName,
        attempt: usize,
        elapsed: Duration,
        remaining: Duration,
    ) {
        debug!(
            "Resource '{resource}' still held after attempt {attempt} ({:.1}s elapsed, {:.1}s left)",
            elapsed.as_secs_f64(),
            remaining.as_secs_f64()
        );
    }

    fn on_reclaimed(&self, resource: &ResourceName, age: Duration) {
        info!(
            "Reclaimed stale marker for '{resource}' ({}s old)",
            age.as_secs()
        );
    }

    fn on_acquired(&self, _resource: &ResourceName, _waited: Duration) {
        self.line("Got resource lock!");
    }

    fn on_release(&self, resource: &ResourceName) {
        self.line(&format!("Giving up resource '{resource}'..."));
    }
}
