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

use crate::config::DEFAULT_RESOURCE_NAME;
use crate::error::{LockerError, Result};
use std::fmt;
use std::str::FromStr;

const MAX_NAME_LEN: usize = 128;

/// Validated name of a lockable resource.
///
/// Names are trimmed, blank input maps to `"node"`, and only characters that are
/// safe inside a single path segment are accepted.
///
/// Names are case-sensitive and kept as given. On a case-insensitive filesystem
/// `Printer` and `printer` map to the same marker file and therefore lock each
/// other out; pick one spelling per resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        if trimmed.len() > MAX_NAME_LEN {
            return Err(invalid(
                trimmed,
                format!("longer than {MAX_NAME_LEN} characters"),
            ));
        }

        if trimmed.starts_with('.') {
            return Err(invalid(trimmed, "must not start with '.'".to_string()));
        }

        if let Some(bad) = trimmed.chars().find(|ch| !is_allowed(*ch)) {
            return Err(invalid(trimmed, format!("character {bad:?} is not allowed")));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')
}

fn invalid(name: &str, reason: String) -> LockerError {
    LockerError::InvalidResourceName {
        name: name.to_string(),
        reason,
    }
}

impl Default for ResourceName {
    fn default() -> Self {
        Self(DEFAULT_RESOURCE_NAME.to_string())
    }
}

impl FromStr for ResourceName {
    type Err = LockerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
