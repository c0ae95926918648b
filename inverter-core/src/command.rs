//! Remote relay commands
//!
//! Commands arrive as a name plus an optional parameter and are decoded
//! exactly once, at the network boundary, into the closed [`Command`] type.
//! Anything unrecognised is reported back as a [`CommandError`] and never
//! reaches the control loop.
//!
//! | Name                                     | Parameter      | Command                |
//! |------------------------------------------|----------------|------------------------|
//! | `solar`, `eolica`, `red`, `carga`, `freno` | `on/off/1/0` | `SetRelay`             |
//! | `activar_freno` / `desactivar_freno`     | none           | `SetRelay` on brake    |
//! | `apagar_todo`                            | none           | `EmergencyAllOff`      |
//! | `estrategia_auto`                        | none           | `RunStrategy`          |

use crate::errors::{truncated, CommandError};
use crate::relay::RelayChannel;

/// Decoded remote command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Switch one relay (manual mode)
    SetRelay {
        /// Target channel
        channel: RelayChannel,
        /// Requested output
        on: bool,
    },
    /// Clear every relay unconditionally
    EmergencyAllOff,
    /// Return to automatic dispatch and evaluate now
    RunStrategy,
}

impl Command {
    /// Decode a command name and its parameter
    pub fn parse(name: &str, parameter: Option<&str>) -> Result<Self, CommandError> {
        let relay = match name {
            "solar" => RelayChannel::Solar,
            "eolica" => RelayChannel::Wind,
            "red" => RelayChannel::Grid,
            "carga" => RelayChannel::Load,
            "freno" => RelayChannel::Brake,
            "activar_freno" => {
                return Ok(Command::SetRelay { channel: RelayChannel::Brake, on: true })
            }
            "desactivar_freno" => {
                return Ok(Command::SetRelay { channel: RelayChannel::Brake, on: false })
            }
            "apagar_todo" => return Ok(Command::EmergencyAllOff),
            "estrategia_auto" => return Ok(Command::RunStrategy),
            other => return Err(CommandError::Unknown { name: truncated(other) }),
        };

        let on = parse_switch(relay, parameter.unwrap_or(""))?;
        Ok(Command::SetRelay { channel: relay, on })
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetRelay { channel, .. } => channel.name(),
            Command::EmergencyAllOff => "apagar_todo",
            Command::RunStrategy => "estrategia_auto",
        }
    }
}

fn parse_switch(channel: RelayChannel, parameter: &str) -> Result<bool, CommandError> {
    match parameter.trim() {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        other => Err(CommandError::InvalidParameter {
            command: channel.name(),
            parameter: truncated(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_commands() {
        assert_eq!(
            Command::parse("eolica", Some("on")),
            Ok(Command::SetRelay { channel: RelayChannel::Wind, on: true })
        );
        assert_eq!(
            Command::parse("carga", Some("0")),
            Ok(Command::SetRelay { channel: RelayChannel::Load, on: false })
        );
        assert_eq!(
            Command::parse("red", Some(" 1 ")),
            Ok(Command::SetRelay { channel: RelayChannel::Grid, on: true })
        );
    }

    #[test]
    fn brake_shortcuts() {
        assert_eq!(
            Command::parse("activar_freno", None),
            Ok(Command::SetRelay { channel: RelayChannel::Brake, on: true })
        );
        assert_eq!(
            Command::parse("desactivar_freno", Some("ignored")),
            Ok(Command::SetRelay { channel: RelayChannel::Brake, on: false })
        );
    }

    #[test]
    fn system_commands() {
        assert_eq!(Command::parse("apagar_todo", None), Ok(Command::EmergencyAllOff));
        assert_eq!(Command::parse("estrategia_auto", None), Ok(Command::RunStrategy));
    }

    #[test]
    fn unknown_reported_not_applied() {
        match Command::parse("reboot", None) {
            Err(CommandError::Unknown { name }) => assert_eq!(name.as_str(), "reboot"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_parameter_rejected() {
        match Command::parse("solar", Some("maybe")) {
            Err(CommandError::InvalidParameter { command, parameter }) => {
                assert_eq!(command, "solar");
                assert_eq!(parameter.as_str(), "maybe");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Command::parse("freno", None).is_err());
    }

    #[test]
    fn names_round_trip() {
        for name in ["solar", "eolica", "red", "carga", "freno"] {
            let command = Command::parse(name, Some("on")).unwrap();
            assert_eq!(command.name(), name);
        }
    }
}
