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

use crate::error::LockerError;

pub fn get_exit_code(error: &LockerError) -> i32 {
    match error {
        LockerError::InvalidResourceName { .. }
        | LockerError::InvalidConfig(_)
        | LockerError::ConfigError(_) => 2,

        LockerError::Storage { .. } | LockerError::Io(_) => 74,

        LockerError::LockTimeout { .. } => 75, // EX_TEMPFAIL: try again later

        LockerError::ReleaseMismatch { .. } => 77,

        LockerError::CommandFailed { .. } => 126,

        LockerError::LockCancelled { .. } => 130, // 128 + SIGINT

        _ => 1,
    }
}
