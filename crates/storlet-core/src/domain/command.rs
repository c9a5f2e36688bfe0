//! Command - wire 上のコマンド文字列
//!
//! 正式な wire 名は `SBUS_CMD_*` です。`HALT` や `Ping` のようにプレフィックス
//! なし・大文字小文字違いで来ても受け付けます。

use std::fmt;
use std::str::FromStr;

use super::errors::StorletError;

pub const COMMAND_PREFIX: &str = "SBUS_CMD_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Halt,
    Execute,
    Ping,
    Cancel,
    /// Legacy: delivers an output object to a pending container-handle request.
    Descriptor,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Halt => "SBUS_CMD_HALT",
            Command::Execute => "SBUS_CMD_EXECUTE",
            Command::Ping => "SBUS_CMD_PING",
            Command::Cancel => "SBUS_CMD_CANCEL",
            Command::Descriptor => "SBUS_CMD_DESCRIPTOR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = StorletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let name = upper.strip_prefix(COMMAND_PREFIX).unwrap_or(&upper);
        match name {
            "HALT" => Ok(Command::Halt),
            "EXECUTE" => Ok(Command::Execute),
            "PING" => Ok(Command::Ping),
            "CANCEL" => Ok(Command::Cancel),
            "DESCRIPTOR" => Ok(Command::Descriptor),
            _ => Err(StorletError::UnknownCommand(s.to_string())),
        }
    }
}
