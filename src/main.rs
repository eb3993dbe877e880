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

use clap::{ArgGroup, Parser, Subcommand};
use reslock::commands::acquire::AcquireCommand;
use reslock::commands::clean::CleanCommand;
use reslock::commands::config::ConfigCommand;
use reslock::commands::release::ReleaseCommand;
use reslock::commands::run::RunCommand;
use reslock::commands::status::StatusCommand;
use reslock::config::LockerConfig;
use reslock::error::{LockerError, Result, format_error_with_color, get_exit_code};
use reslock::logging;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reslock")]
#[command(author, version, about = "Named resource locks shared between processes", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory holding marker files (overrides configuration)
    #[arg(long, value_name = "DIR", global = true)]
    shared_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a resource and keep it locked until `release`
    Acquire {
        /// Resource name (defaults to the configured name, "node")
        name: Option<String>,

        /// Seconds to wait; zero or less selects the default
        #[arg(long, allow_hyphen_values = true)]
        timeout: Option<String>,

        /// Print the lease as JSON instead of the bare token
        #[arg(long)]
        json: bool,
    },

    /// Release a resource kept by `acquire`
    #[command(group(ArgGroup::new("ownership").required(true).args(["token", "force"])))]
    Release {
        /// Resource name (defaults to the configured name, "node")
        name: Option<String>,

        /// Token printed by `acquire`; the marker must still carry it
        #[arg(long)]
        token: Option<String>,

        /// Delete the marker whoever created it
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command while holding a resource
    Run {
        /// Resource name (defaults to the configured name, "node")
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to wait; zero or less selects the default
        #[arg(long, allow_hyphen_values = true)]
        timeout: Option<String>,

        /// Command and arguments to run
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Show whether resources are held
    Status {
        /// Resource name; lists every marker when omitted
        name: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove markers left behind by crashed holders
    Clean {
        /// Minimum marker age in seconds (default: timeout + 60, at least 600)
        #[arg(long, value_name = "SECONDS")]
        older_than: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(cli: &Cli) -> Result<LockerConfig> {
    let mut config = LockerConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.shared_dir {
        config.locking.shared_dir = Some(dir.clone());
    }
    Ok(config)
}

fn exit_with_error(error: &LockerError) -> ! {
    eprintln!(
        "{}",
        format_error_with_color(error, std::io::stderr().is_terminal())
    );
    std::process::exit(get_exit_code(error));
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            exit_with_error(&e);
        }
    };

    let result: Result<i32> = (|| {
        match cli.command {
            Commands::Acquire {
                name,
                timeout,
                json,
            } => {
                let command = AcquireCommand::new(&config)?;
                command.execute(name.as_deref(), timeout.as_deref(), json)?;
            }
            Commands::Release { name, token, force } => {
                let command = ReleaseCommand::new(&config)?;
                command.execute(name.as_deref(), token.as_deref(), force)?;
            }
            Commands::Run {
                name,
                timeout,
                command,
            } => {
                let run = RunCommand::new(&config)?;
                return run.execute(name.as_deref(), timeout.as_deref(), &command);
            }
            Commands::Status { name, json } => {
                let command = StatusCommand::new(&config)?;
                command.execute(name.as_deref(), json)?;
            }
            Commands::Clean { older_than } => {
                let command = CleanCommand::new(&config)?;
                command.execute(older_than)?;
            }
            Commands::Config => {
                let command = ConfigCommand::new(&config)?;
                command.execute()?;
            }
        }
        Ok(0)
    })();

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            exit_with_error(&e);
        }
    }
}
