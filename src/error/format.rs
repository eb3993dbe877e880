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

use crate::error::{ErrorContext, LockerError};
use colored::Colorize;

pub fn format_error_chain(error: &LockerError) -> String {
    let context = ErrorContext::new(error);
    context.to_string()
}

/// Format error for display to an operator terminal, optionally colored.
pub fn format_error_with_color(error: &LockerError, use_color: bool) -> String {
    if !use_color {
        return format_error_chain(error);
    }

    let context = ErrorContext::new(error);
    let mut output = String::new();

    output.push_str(&format!("{} {error}\n", "Error:".red().bold()));

    if let Some(details) = &context.details {
        output.push_str(&format!("\n{details}\n"));
    }

    if let Some(suggestion) = &context.suggestion {
        output.push_str(&format!("\n{}\n", "Suggestions:".yellow().bold()));
        for line in suggestion.lines() {
            if !line.trim().is_empty() {
                output.push_str(&format!("{}\n", format!("• {line}").cyan()));
            }
        }
    }

    output
}
