//! System clock updates.
//!
//! The time-sync listener forwards every received time string to a
//! [`ClockUpdater`]. The production updater shells out to `date -s` (optionally
//! through `sudo`), passing the candidate as a single argument so it is never
//! interpreted by a shell. The string format is whatever the clock program
//! accepts; it is not validated here.

use crate::config::SyncConfig;
use log::{debug, info};
use std::io;
use std::process::Command;
use thiserror::Error;

/// Setting the system time failed. Always recoverable.
#[derive(Error, Debug)]
pub enum ClockApplyError {
    /// The clock program could not be started
    #[error("could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The clock program ran and refused the time
    #[error("clock program exited with {status}: {stderr}")]
    Rejected { status: String, stderr: String },

    /// The clock program was still running when the link's grace period ended
    #[error("clock update still running after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Applies a candidate time string as the authoritative system time.
pub trait ClockUpdater: Send + Sync + 'static {
    fn apply_time(&self, candidate: &str) -> Result<(), ClockApplyError>;
}

impl<F> ClockUpdater for F
where
    F: Fn(&str) -> Result<(), ClockApplyError> + Send + Sync + 'static,
{
    fn apply_time(&self, candidate: &str) -> Result<(), ClockApplyError> {
        self(candidate)
    }
}

/// Runs `[sudo] <program> -s <candidate>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemClock {
    program: String,
    use_sudo: bool,
}

impl SystemClock {
    pub fn new(program: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            program: program.into(),
            use_sudo,
        }
    }

    fn command(&self, candidate: &str) -> Command {
        let mut command = if self.use_sudo {
            let mut sudo = Command::new("sudo");
            sudo.arg(&self.program);
            sudo
        } else {
            Command::new(&self.program)
        };
        command.arg("-s").arg(candidate);
        command
    }
}

impl From<&SyncConfig> for SystemClock {
    fn from(config: &SyncConfig) -> Self {
        Self::new(config.clock_program.clone(), config.use_sudo)
    }
}

impl ClockUpdater for SystemClock {
    fn apply_time(&self, candidate: &str) -> Result<(), ClockApplyError> {
        let mut command = self.command(candidate);
        debug!("Running {:?}", command);

        let output = command.output().map_err(|source| ClockApplyError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            info!("System time set to {:?}", candidate);
            Ok(())
        } else {
            Err(ClockApplyError::Rejected {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line() {
        let clock = SystemClock::new("date", true);
        let command = clock.command("2030-01-01 00:00:00");
        assert_eq!(command.get_program(), "sudo");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["date", "-s", "2030-01-01 00:00:00"]);

        let direct = SystemClock::new("date", false).command("now; rm -rf /");
        assert_eq!(direct.get_program(), "date");
        // The candidate stays one argument
        assert_eq!(direct.get_args().count(), 2);
    }

    #[test]
    fn test_from_sync_config() {
        let clock = SystemClock::from(&SyncConfig::default());
        assert_eq!(clock, SystemClock::new("date", true));
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_program() {
        assert!(SystemClock::new("true", false).apply_time("2030-01-01 00:00:00").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejecting_program() {
        let error = SystemClock::new("false", false).apply_time("garbage").unwrap_err();
        assert!(matches!(error, ClockApplyError::Rejected { .. }));
    }

    #[test]
    fn test_missing_program() {
        let error = SystemClock::new("/nonexistent/bible-clock-date", false)
            .apply_time("2030-01-01 00:00:00")
            .unwrap_err();
        assert!(matches!(error, ClockApplyError::Spawn { .. }));
        assert!(error.to_string().contains("/nonexistent/bible-clock-date"));
    }

    #[test]
    fn test_closure_updater() {
        let updater = |candidate: &str| {
            if candidate.is_empty() {
                Err(ClockApplyError::Rejected {
                    status: "1".to_string(),
                    stderr: "empty".to_string(),
                })
            } else {
                Ok(())
            }
        };
        assert!(updater.apply_time("12:00").is_ok());
        assert!(updater.apply_time("").is_err());
    }
}
