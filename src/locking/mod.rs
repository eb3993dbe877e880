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

pub mod acquisition;
pub mod cancellation;
pub mod controller;
pub mod environment;
pub mod handle;
pub mod hygiene;
pub mod marker;
pub mod resource;
pub mod timeout;
pub mod wait_observer;

pub use acquisition::{AcquireMode, LockAcquisitionRequest, LockTimeoutBudget, PollingBackoff};
pub use cancellation::{CancellationToken, global_token};
pub use controller::ResourceLocker;
pub use environment::{LockWrapper, LockedEnvironment};
pub use handle::{LockLease, ResourceLockHandle};
pub use hygiene::{LockHygieneReport, LockHygieneRunner, sweep_shared_dir};
pub use marker::{CreateOutcome, FsMarkerStore, MarkerInfo, MarkerRecord, MarkerStore};
pub use resource::ResourceName;
pub use timeout::{
    LockTimeout, LockTimeoutResolution, LockTimeoutResolver, LockTimeoutSource, TIMEOUT_ENV,
    parse_timeout_override,
};
pub use wait_observer::{LockWaitObserver, NoopLockWaitObserver, StatusReporter};
