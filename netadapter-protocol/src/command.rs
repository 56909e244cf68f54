//! Command and return codes carried over the stream connection.
//!
//! The numeric values are part of the wire contract and must never change.
//! What each command does to the bus is decided by the adapter host.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command codes sent by a client ahead of each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Command {
    // Connection control
    CloseConnection = 0x08,
    PingConnection = 0x09,

    // Raw data
    Reset = 0x10,
    PutBit = 0x11,
    PutByte = 0x12,
    GetBit = 0x13,
    GetByte = 0x14,
    GetBlock = 0x15,
    DataBlock = 0x16,

    // Power delivery
    SetPowerDuration = 0x17,
    StartPowerDelivery = 0x18,
    SetProgramPulseDuration = 0x19,
    StartProgramPulse = 0x1A,
    StartBreak = 0x1B,
    SetPowerNormal = 0x1C,

    // Speed
    SetSpeed = 0x1D,
    GetSpeed = 0x1E,

    // Exclusive access
    BeginExclusive = 0x1F,
    EndExclusive = 0x20,

    // Device search
    FindFirstDevice = 0x21,
    FindNextDevice = 0x22,
    GetAddress = 0x23,
    SetSearchOnlyAlarmingDevices = 0x24,
    SetNoResetSearch = 0x25,
    SetSearchAllDevices = 0x26,
    TargetAllFamilies = 0x27,
    TargetFamily = 0x28,
    ExcludeFamily = 0x29,

    // Capability queries
    CanBreak = 0x2A,
    CanDeliverPower = 0x2B,
    CanDeliverSmartPower = 0x2C,
    CanFlex = 0x2D,
    CanHyperdrive = 0x2E,
    CanOverdrive = 0x2F,
    CanProgram = 0x30,
}

/// Range of the command code space a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Connection,
    RawData,
    Power,
    Speed,
    Exclusive,
    Search,
    Capability,
}

impl Command {
    /// Every command, in code order.
    pub const ALL: [Command; 35] = [
        Command::CloseConnection,
        Command::PingConnection,
        Command::Reset,
        Command::PutBit,
        Command::PutByte,
        Command::GetBit,
        Command::GetByte,
        Command::GetBlock,
        Command::DataBlock,
        Command::SetPowerDuration,
        Command::StartPowerDelivery,
        Command::SetProgramPulseDuration,
        Command::StartProgramPulse,
        Command::StartBreak,
        Command::SetPowerNormal,
        Command::SetSpeed,
        Command::GetSpeed,
        Command::BeginExclusive,
        Command::EndExclusive,
        Command::FindFirstDevice,
        Command::FindNextDevice,
        Command::GetAddress,
        Command::SetSearchOnlyAlarmingDevices,
        Command::SetNoResetSearch,
        Command::SetSearchAllDevices,
        Command::TargetAllFamilies,
        Command::TargetFamily,
        Command::ExcludeFamily,
        Command::CanBreak,
        Command::CanDeliverPower,
        Command::CanDeliverSmartPower,
        Command::CanFlex,
        Command::CanHyperdrive,
        Command::CanOverdrive,
        Command::CanProgram,
    ];

    /// Returns the wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the range this command belongs to.
    pub fn category(self) -> CommandCategory {
        match self.code() {
            0x08..=0x09 => CommandCategory::Connection,
            0x10..=0x16 => CommandCategory::RawData,
            0x17..=0x1C => CommandCategory::Power,
            0x1D..=0x1E => CommandCategory::Speed,
            0x1F..=0x20 => CommandCategory::Exclusive,
            0x21..=0x29 => CommandCategory::Search,
            _ => CommandCategory::Capability,
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let command = match code {
            0x08 => Command::CloseConnection,
            0x09 => Command::PingConnection,
            0x10 => Command::Reset,
            0x11 => Command::PutBit,
            0x12 => Command::PutByte,
            0x13 => Command::GetBit,
            0x14 => Command::GetByte,
            0x15 => Command::GetBlock,
            0x16 => Command::DataBlock,
            0x17 => Command::SetPowerDuration,
            0x18 => Command::StartPowerDelivery,
            0x19 => Command::SetProgramPulseDuration,
            0x1A => Command::StartProgramPulse,
            0x1B => Command::StartBreak,
            0x1C => Command::SetPowerNormal,
            0x1D => Command::SetSpeed,
            0x1E => Command::GetSpeed,
            0x1F => Command::BeginExclusive,
            0x20 => Command::EndExclusive,
            0x21 => Command::FindFirstDevice,
            0x22 => Command::FindNextDevice,
            0x23 => Command::GetAddress,
            0x24 => Command::SetSearchOnlyAlarmingDevices,
            0x25 => Command::SetNoResetSearch,
            0x26 => Command::SetSearchAllDevices,
            0x27 => Command::TargetAllFamilies,
            0x28 => Command::TargetFamily,
            0x29 => Command::ExcludeFamily,
            0x2A => Command::CanBreak,
            0x2B => Command::CanDeliverPower,
            0x2C => Command::CanDeliverSmartPower,
            0x2D => Command::CanFlex,
            0x2E => Command::CanHyperdrive,
            0x2F => Command::CanOverdrive,
            0x30 => Command::CanProgram,
            other => return Err(ProtocolError::UnknownCommand(other)),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self, self.code())
    }
}

/// Return codes sent by the adapter host after each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ReturnCode {
    Success = 0xFF,
    Failure = 0xF0,
}

impl ReturnCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }
}

impl TryFrom<u8> for ReturnCode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0xFF => Ok(ReturnCode::Success),
            0xF0 => Ok(ReturnCode::Failure),
            other => Err(ProtocolError::UnknownReturnCode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_are_stable() {
        assert_eq!(Command::CloseConnection.code(), 0x08);
        assert_eq!(Command::PingConnection.code(), 0x09);
        assert_eq!(Command::Reset.code(), 0x10);
        assert_eq!(Command::DataBlock.code(), 0x16);
        assert_eq!(Command::SetPowerDuration.code(), 0x17);
        assert_eq!(Command::SetPowerNormal.code(), 0x1C);
        assert_eq!(Command::SetSpeed.code(), 0x1D);
        assert_eq!(Command::GetSpeed.code(), 0x1E);
        assert_eq!(Command::BeginExclusive.code(), 0x1F);
        assert_eq!(Command::EndExclusive.code(), 0x20);
        assert_eq!(Command::FindFirstDevice.code(), 0x21);
        assert_eq!(Command::ExcludeFamily.code(), 0x29);
        assert_eq!(Command::CanBreak.code(), 0x2A);
        assert_eq!(Command::CanProgram.code(), 0x30);
    }

    #[test]
    fn test_command_try_from_matches_code() {
        for command in Command::ALL {
            assert_eq!(Command::try_from(command.code()).unwrap(), command);
        }
    }

    #[test]
    fn test_unknown_command() {
        for code in [0x00, 0x07, 0x0A, 0x0F, 0x31, 0xFF] {
            assert!(matches!(
                Command::try_from(code),
                Err(ProtocolError::UnknownCommand(c)) if c == code
            ));
        }
    }

    #[test]
    fn test_command_categories() {
        assert_eq!(
            Command::PingConnection.category(),
            CommandCategory::Connection
        );
        assert_eq!(Command::GetBlock.category(), CommandCategory::RawData);
        assert_eq!(Command::StartBreak.category(), CommandCategory::Power);
        assert_eq!(Command::GetSpeed.category(), CommandCategory::Speed);
        assert_eq!(
            Command::EndExclusive.category(),
            CommandCategory::Exclusive
        );
        assert_eq!(Command::TargetFamily.category(), CommandCategory::Search);
        assert_eq!(Command::CanFlex.category(), CommandCategory::Capability);
    }

    #[test]
    fn test_return_codes() {
        assert_eq!(ReturnCode::Success.code(), 0xFF);
        assert_eq!(ReturnCode::Failure.code(), 0xF0);
        assert!(ReturnCode::try_from(0xFF).unwrap().is_success());
        assert!(!ReturnCode::try_from(0xF0).unwrap().is_success());
        assert!(matches!(
            ReturnCode::try_from(0x00),
            Err(ProtocolError::UnknownReturnCode(0x00))
        ));
    }

    #[test]
    fn test_command_serialization() {
        let json = serde_json::to_string(&Command::FindFirstDevice).unwrap();
        assert_eq!(json, "\"FIND_FIRST_DEVICE\"");
    }
}
