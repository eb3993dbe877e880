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

mod context;
mod exit_codes;
mod format;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockerError {
    #[error("Timed out after {waited_secs:.1}s trying to lock resource '{resource}'")]
    LockTimeout {
        resource: String,
        waited_secs: f64,
        timeout_secs: u64,
    },

    #[error("Waiting for resource '{resource}' was cancelled after {waited_secs:.1}s")]
    LockCancelled { resource: String, waited_secs: f64 },

    #[error("Failed to {operation} marker for resource '{resource}' at {}: {source}", path.display())]
    Storage {
        resource: String,
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Marker for resource '{resource}' is held by another acquisition")]
    ReleaseMismatch { resource: String, path: PathBuf },

    #[error("Invalid resource name '{name}': {reason}")]
    InvalidResourceName { name: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Command '{command}' failed: {details}")]
    CommandFailed { command: String, details: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LockerError {
    pub(crate) fn storage(
        resource: &str,
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    ) -> Self {
        LockerError::Storage {
            resource: resource.to_string(),
            operation,
            path,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockerError>;
