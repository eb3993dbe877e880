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

//! Set-up/tear-down bracket for work that needs a resource to itself.

use crate::error::Result;
use crate::locking::controller::ResourceLocker;
use crate::locking::handle::ResourceLockHandle;
use crate::locking::resource::ResourceName;
use crate::locking::timeout::LockTimeout;
use log::warn;
use std::path::Path;

/// Acquires a named resource around a unit of work.
pub struct LockWrapper<'a> {
    locker: &'a ResourceLocker,
    resource: ResourceName,
    timeout: LockTimeout,
}

impl<'a> LockWrapper<'a> {
    /// Blank names select `node`; zero or negative timeouts select the default.
    pub fn new(locker: &'a ResourceLocker, resource_name: &str, timeout_secs: i64) -> Result<Self> {
        Ok(Self {
            locker,
            resource: ResourceName::parse(resource_name)?,
            timeout: LockTimeout::from_secs_or_default(timeout_secs),
        })
    }

    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resource(&self) -> &ResourceName {
        &self.resource
    }

    pub fn timeout(&self) -> LockTimeout {
        self.timeout
    }

    /// Blocks until the resource is ours or the timeout expires.
    pub fn set_up(&self) -> Result<LockedEnvironment> {
        let handle = self.locker.acquire(&self.resource, self.timeout)?;
        Ok(LockedEnvironment {
            handle: Some(handle),
        })
    }

    /// Runs `work` with the resource held and releases it afterwards.
    ///
    /// A failed release is logged and does not replace the work's result.
    pub fn run_locked<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&LockedEnvironment) -> T,
    {
        let environment = self.set_up()?;
        let outcome = work(&environment);
        environment.tear_down();
        Ok(outcome)
    }
}

/// Holds the resource between `set_up` and `tear_down`.
#[derive(Debug)]
pub struct LockedEnvironment {
    handle: Option<ResourceLockHandle>,
}

impl LockedEnvironment {
    pub fn resource(&self) -> Option<&ResourceName> {
        self.handle.as_ref().map(ResourceLockHandle::resource)
    }

    pub fn marker_path(&self) -> Option<&Path> {
        self.handle.as_ref().map(ResourceLockHandle::path)
    }

    pub fn token(&self) -> Option<&str> {
        self.handle.as_ref().map(ResourceLockHandle::token)
    }

    /// Releases the resource. Returns `false` if the marker could not be removed.
    pub fn tear_down(mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let resource = handle.resource().clone();
        match handle.release() {
            Ok(_) => true,
            Err(err) => {
                warn!("Failed to release resource '{resource}': {err}");
                false
            }
        }
    }
}
