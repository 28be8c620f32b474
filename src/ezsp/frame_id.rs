// SPDX-License-Identifier: MIT OR Apache-2.0

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::Error;

/// EZSP frame identifiers understood by the driver: the commands it issues
/// and the unsolicited handler frames the NCP pushes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum FrameId {
    /// Protocol version negotiation; the only frame with a legacy header.
    Version = 0x00,
    AddEndpoint = 0x02,
    Callback = 0x06,
    NoCallbacks = 0x07,
    NetworkInit = 0x17,
    NetworkState = 0x18,
    StackStatusHandler = 0x19,
    FormNetwork = 0x1E,
    JoinNetwork = 0x1F,
    LeaveNetwork = 0x20,
    PermitJoining = 0x22,
    ChildJoinHandler = 0x23,
    GetEui64 = 0x26,
    GetNodeId = 0x27,
    GetNetworkParameters = 0x28,
    SendUnicast = 0x34,
    SendBroadcast = 0x36,
    MessageSentHandler = 0x3F,
    IncomingMessageHandler = 0x45,
    GetChildData = 0x4A,
    GetConfigurationValue = 0x52,
    SetConfigurationValue = 0x53,
    SetPolicy = 0x55,
    InvalidCommand = 0x58,
    SetInitialSecurityState = 0x68,
    GetKey = 0x6A,
    GpSinkTableInit = 0x70,
    GpepIncomingMessageHandler = 0xC5,
    DGpSend = 0xC6,
    DGpSentHandler = 0xC7,
    GpProxyTableGetEntry = 0xC8,
    GpProxyTableProcessGpPairing = 0xC9,
    GpSinkTableGetEntry = 0xDD,
    GpSinkTableLookup = 0xDE,
    GpSinkTableSetEntry = 0xDF,
    GpSinkTableRemoveEntry = 0xE0,
    GpSinkTableFindOrAllocateEntry = 0xE1,
    GpSinkTableClearAll = 0xE2,
}

impl FrameId {
    /// Whether the NCP sends this frame unsolicited rather than as the
    /// response to a command.
    #[must_use]
    pub const fn is_handler(self) -> bool {
        matches!(
            self,
            Self::StackStatusHandler
                | Self::ChildJoinHandler
                | Self::MessageSentHandler
                | Self::IncomingMessageHandler
                | Self::GpepIncomingMessageHandler
                | Self::DGpSentHandler
        )
    }
}

impl TryFrom<u8> for FrameId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        FrameId::iter().find(|id| value == *id as u8).ok_or(Error::MalformedFrame)
    }
}
