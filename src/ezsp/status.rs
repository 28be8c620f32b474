// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::Error;

/// Status byte returned by most Ember stack commands. Values the driver does
/// not recognise map to `Unknown` rather than failing the decode, since the
/// stack grows codes faster than hosts do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmberStatus {
    Success,
    ErrFatal,
    BadArgument,
    NoBuffers,
    DeliveryFailed,
    AddressTableIndexOutOfRange,
    InvalidCall,
    MaxMessageLimitReached,
    MessageTooLong,
    NetworkUp,
    NetworkDown,
    NotJoined,
    JoinFailed,
    InvalidSecurityLevel,
    MoveFailed,
    NodeIdChanged,
    NetworkBusy,
    SecurityStateNotSet,
    IndexOutOfRange,
    KeyInvalid,
    TableFull,
    TableEntryErased,
    OperationInProgress,
    Unknown(u8),
}

impl From<u8> for EmberStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::ErrFatal,
            0x02 => Self::BadArgument,
            0x18 => Self::NoBuffers,
            0x66 => Self::DeliveryFailed,
            0x6A => Self::AddressTableIndexOutOfRange,
            0x70 => Self::InvalidCall,
            0x72 => Self::MaxMessageLimitReached,
            0x74 => Self::MessageTooLong,
            0x90 => Self::NetworkUp,
            0x91 => Self::NetworkDown,
            0x93 => Self::NotJoined,
            0x94 => Self::JoinFailed,
            0x95 => Self::InvalidSecurityLevel,
            0x96 => Self::MoveFailed,
            0x9A => Self::NodeIdChanged,
            0xA1 => Self::NetworkBusy,
            0xA8 => Self::SecurityStateNotSet,
            0xB1 => Self::IndexOutOfRange,
            0xB2 => Self::KeyInvalid,
            0xB4 => Self::TableFull,
            0xB6 => Self::TableEntryErased,
            0xBA => Self::OperationInProgress,
            other => Self::Unknown(other),
        }
    }
}

impl EmberStatus {
    /// Maps a non-success status to an error, so command helpers can chain
    /// with `?`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(status))` for anything but `Success`
    pub fn check(self) -> Result<(), Error> {
        match self {
            Self::Success => Ok(()),
            other => Err(Error::Ember(other)),
        }
    }
}

/// Status byte of the EZSP layer itself, seen in `invalidCommand` responses
/// and the version handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EzspStatus {
    Success,
    VersionNotSet,
    InvalidFrame,
    Unknown(u8),
}

impl From<u8> for EzspStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x30 => Self::VersionNotSet,
            0x35 => Self::InvalidFrame,
            other => Self::Unknown(other),
        }
    }
}
