//! Command protocol types

use crate::error::{MigrationError, MigrationResult};
use crate::stats::MigrationStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strata_store::MigrationState;

/// Incoming command request: `{ "cmd": <string>, "verbose"?: <bool> }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub verbose: bool,
}

impl CommandRequest {
    pub fn new<T: Into<String>>(cmd: T) -> Self {
        Self {
            cmd: Some(cmd.into()),
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve the requested command
    pub fn command(&self) -> MigrationResult<Command> {
        match self.cmd.as_deref() {
            None | Some("") => Err(MigrationError::InvalidCommand(
                "No command provided".to_string(),
            )),
            Some(cmd) => cmd.parse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Stats,
    Progress,
    Migrate,
    Finalize,
    Reset,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Stats => "stats",
            Command::Progress => "progress",
            Command::Migrate => "migrate",
            Command::Finalize => "finalize",
            Command::Reset => "reset",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stats" => Ok(Command::Stats),
            "progress" => Ok(Command::Progress),
            "migrate" => Ok(Command::Migrate),
            "finalize" => Ok(Command::Finalize),
            "reset" => Ok(Command::Reset),
            other => Err(MigrationError::InvalidCommand(format!(
                "Unknown command: {}",
                other
            ))),
        }
    }
}

/// Response to a command; absent fields are omitted from the JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MigrationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<MigrationStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    /// Successful response reporting `status`
    pub fn with_status(status: MigrationState) -> Self {
        Self {
            success: true,
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_stats(stats: MigrationStats) -> Self {
        Self {
            success: true,
            stats: Some(stats),
            ..Self::default()
        }
    }

    pub fn failure<T: Into<String>>(message: T) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn output(mut self, output: Option<String>) -> Self {
        self.output = output;
        self
    }

    pub fn exception(mut self, exception: Option<String>) -> Self {
        self.exception = exception;
        self
    }

    /// Whether a worker was still running when the response was produced
    pub fn is_running(&self) -> bool {
        self.status.map_or(false, |status| status.is_running())
    }
}
