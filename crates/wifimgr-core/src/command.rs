//! Command data structures.
//!
//! A [`Command`] carries its fixed-shape payload; [`CommandId`] is the bare
//! tag used by the legality tables and the sender registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::WifiConfig;
use crate::types::{MacAddr, Role, ScanParams};

/// Identifier of every command the manager understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    SetStaConfig,
    SetApConfig,
    GetStaConfig,
    GetApConfig,
    GetStaStatus,
    GetApStatus,
    OpenSta,
    CloseSta,
    Scan,
    Connect,
    Disconnect,
    OpenAp,
    CloseAp,
    StartAp,
    StopAp,
    DelStation,
}

impl CommandId {
    /// Number of command ids, and therefore of sender registry slots.
    pub const COUNT: usize = 16;

    pub const ALL: [CommandId; Self::COUNT] = [
        CommandId::SetStaConfig,
        CommandId::SetApConfig,
        CommandId::GetStaConfig,
        CommandId::GetApConfig,
        CommandId::GetStaStatus,
        CommandId::GetApStatus,
        CommandId::OpenSta,
        CommandId::CloseSta,
        CommandId::Scan,
        CommandId::Connect,
        CommandId::Disconnect,
        CommandId::OpenAp,
        CommandId::CloseAp,
        CommandId::StartAp,
        CommandId::StopAp,
        CommandId::DelStation,
    ];

    /// Registry slot of this command.
    pub fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandId::SetStaConfig => "set_sta_config",
            CommandId::SetApConfig => "set_ap_config",
            CommandId::GetStaConfig => "get_sta_config",
            CommandId::GetApConfig => "get_ap_config",
            CommandId::GetStaStatus => "get_sta_status",
            CommandId::GetApStatus => "get_ap_status",
            CommandId::OpenSta => "open_sta",
            CommandId::CloseSta => "close_sta",
            CommandId::Scan => "scan",
            CommandId::Connect => "connect",
            CommandId::Disconnect => "disconnect",
            CommandId::OpenAp => "open_ap",
            CommandId::CloseAp => "close_ap",
            CommandId::StartAp => "start_ap",
            CommandId::StopAp => "stop_ap",
            CommandId::DelStation => "del_station",
        }
    }

    /// Role whose state machine owns this command.
    pub fn role(self) -> Role {
        match self {
            CommandId::SetStaConfig
            | CommandId::GetStaConfig
            | CommandId::GetStaStatus
            | CommandId::OpenSta
            | CommandId::CloseSta
            | CommandId::Scan
            | CommandId::Connect
            | CommandId::Disconnect => Role::Station,
            CommandId::SetApConfig
            | CommandId::GetApConfig
            | CommandId::GetApStatus
            | CommandId::OpenAp
            | CommandId::CloseAp
            | CommandId::StartAp
            | CommandId::StopAp
            | CommandId::DelStation => Role::AccessPoint,
        }
    }

    /// Config and status commands: legal in every state and never trigger
    /// role bring-up.
    pub fn is_common(self) -> bool {
        matches!(
            self,
            CommandId::SetStaConfig
                | CommandId::SetApConfig
                | CommandId::GetStaConfig
                | CommandId::GetApConfig
                | CommandId::GetStaStatus
                | CommandId::GetApStatus
        )
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CommandId {
    type Err = crate::WifiMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| crate::WifiMgrError::invalid(format!("unknown command: {s}")))
    }
}

/// A request submitted to the command processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    SetStaConfig(WifiConfig),
    SetApConfig(WifiConfig),
    GetStaConfig,
    GetApConfig,
    GetStaStatus,
    GetApStatus,
    OpenSta,
    CloseSta,
    Scan(ScanParams),
    Connect,
    Disconnect,
    OpenAp,
    CloseAp,
    StartAp,
    StopAp,
    DelStation(MacAddr),
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::SetStaConfig(_) => CommandId::SetStaConfig,
            Command::SetApConfig(_) => CommandId::SetApConfig,
            Command::GetStaConfig => CommandId::GetStaConfig,
            Command::GetApConfig => CommandId::GetApConfig,
            Command::GetStaStatus => CommandId::GetStaStatus,
            Command::GetApStatus => CommandId::GetApStatus,
            Command::OpenSta => CommandId::OpenSta,
            Command::CloseSta => CommandId::CloseSta,
            Command::Scan(_) => CommandId::Scan,
            Command::Connect => CommandId::Connect,
            Command::Disconnect => CommandId::Disconnect,
            Command::OpenAp => CommandId::OpenAp,
            Command::CloseAp => CommandId::CloseAp,
            Command::StartAp => CommandId::StartAp,
            Command::StopAp => CommandId::StopAp,
            Command::DelStation(_) => CommandId::DelStation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_dense() {
        for (i, id) in CommandId::ALL.iter().enumerate() {
            assert_eq!(id.slot(), i);
        }
    }

    #[test]
    fn test_name_round_trip() {
        for id in CommandId::ALL {
            assert_eq!(id.name().parse::<CommandId>().unwrap(), id);
        }
        assert!("warp_drive".parse::<CommandId>().is_err());
    }

    #[test]
    fn test_roles() {
        assert_eq!(CommandId::Scan.role(), Role::Station);
        assert_eq!(CommandId::DelStation.role(), Role::AccessPoint);
        assert!(CommandId::GetApStatus.is_common());
        assert!(!CommandId::OpenSta.is_common());
    }

    #[test]
    fn test_command_id() {
        assert_eq!(Command::Scan(ScanParams::default()).id(), CommandId::Scan);
        assert_eq!(
            Command::DelStation(MacAddr::BROADCAST).id(),
            CommandId::DelStation
        );
    }

    #[test]
    fn test_command_json_shape() {
        let cmd: Command = serde_json::from_str(r#"{"command": "set_sta_config", "args": {"ssid": "home"}}"#).unwrap();
        assert_eq!(cmd, Command::SetStaConfig(WifiConfig::new("home")));
        let cmd: Command = serde_json::from_str(r#"{"command": "open_sta"}"#).unwrap();
        assert_eq!(cmd, Command::OpenSta);
    }
}
