//! The closed set of commands the relay accepts.
//!
//! Commands are validated once, at the boundary. Everything past
//! [`Command::from_str`] works with the enum and never compares strings.

use super::error::CommandError;
use std::fmt;
use std::str::FromStr;

/// A validated control command.
///
/// # Example
///
/// ```rust
/// use keyrelay::Command;
///
/// let cmd: Command = "primary".parse().unwrap();
/// assert_eq!(cmd, Command::Primary);
/// assert!("jump".parse::<Command>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// The main action, bound to a jump by default.
    Primary,

    /// The secondary action (a duck).
    Secondary,
}

impl Command {
    /// Every command, in declaration order.
    pub const ALL: [Command; 2] = [Command::Primary, Command::Secondary];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Primary => "primary",
            Command::Secondary => "secondary",
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    /// Parses a wire name. `saltar` and `agachar` are accepted as aliases
    /// for older clients.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "" => Err(CommandError::Empty),
            "primary" | "saltar" => Ok(Command::Primary),
            "secondary" | "agachar" => Ok(Command::Secondary),
            other => Err(CommandError::Unrecognized(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
