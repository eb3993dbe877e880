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
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a LockerError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockerError) -> Self {
        let (suggestion, details) = match error {
            LockerError::LockTimeout {
                resource,
                timeout_secs,
                ..
            } => {
                let suggestion = Some(format!(
                    "Another build may still hold the lock. Check it with 'reslock status \
                     {resource}'.\nIf the holder is gone, clear it with 'reslock release --force \
                     {resource}'.\nTo wait longer, raise --timeout or RESLOCK_LOCK_TIMEOUT."
                ));
                let details = Some(format!("Configured timeout was {timeout_secs}s."));
                (suggestion, details)
            }
            LockerError::LockCancelled { .. } => {
                let details =
                    Some("The wait was interrupted before the resource became free.".to_string());
                (None, details)
            }
            LockerError::Storage {
                path, operation, ..
            } => {
                let suggestion = Some(
                    "Ensure the shared directory exists, is writable by every build, and is \
                     reachable from this machine."
                        .to_string(),
                );
                let details = Some(format!(
                    "Storage operation '{operation}' failed for {}",
                    path.display()
                ));
                (suggestion, details)
            }
            LockerError::ReleaseMismatch { resource, path } => {
                let suggestion = Some(format!(
                    "The marker was replaced after this lock was taken. Use 'reslock release \
                     --force {resource}' only if you are sure the other holder is gone."
                ));
                let details = Some(format!("Marker left in place at {}", path.display()));
                (suggestion, details)
            }
            LockerError::InvalidResourceName { .. } => {
                let suggestion = Some(
                    "Resource names may contain ASCII letters, digits, '-', '_' and '.', and \
                     must not start with '.'."
                        .to_string(),
                );
                (suggestion, None)
            }
            LockerError::InvalidConfig(msg) | LockerError::ConfigError(msg) => {
                let suggestion = Some(
                    "Check the [locking] section of your config file and RESLOCK_* environment \
                     variables."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
