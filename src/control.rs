use std::str::FromStr;

use crate::error::CommandError;

/// A line typed by the operator on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Stops a running escalation countdown.
    Cancel,
    /// Switches the simulation between the normal and attack condition.
    Toggle,
    Share(bool),
    /// Clears the telemetry windows and the anomaly log.
    Reset,
    Status,
}

impl FromStr for OperatorCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace().map(|word| word.to_ascii_lowercase());
        let command = words.next().unwrap_or_default();
        let argument = words.next();

        match (command.as_str(), argument.as_deref()) {
            ("cancel", None) => Ok(OperatorCommand::Cancel),
            ("toggle", None) => Ok(OperatorCommand::Toggle),
            ("reset", None) => Ok(OperatorCommand::Reset),
            ("status", None) => Ok(OperatorCommand::Status),
            ("share", Some("on")) => Ok(OperatorCommand::Share(true)),
            ("share", Some("off")) => Ok(OperatorCommand::Share(false)),
            ("share", _) => Err(CommandError::InvalidShare),
            _ => Err(CommandError::Unknown(line.trim().to_string())),
        }
    }
}
