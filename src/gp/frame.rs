// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use log::warn;
use tinyvec::ArrayVec;

use crate::ezsp::EmberGpAddress;
use crate::{Error, HexSlice};

/// Largest GPD application payload carried in a report.
pub const MAX_GP_PAYLOAD: usize = 64;

/// Security applied by the GPD to its frames.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GpSecurityLevel {
    #[default]
    None = 0,
    /// One-byte frame counter and short MIC; deprecated, not authenticated
    /// by this driver.
    Reserved = 1,
    /// Full frame counter and four-byte MIC.
    FrameCounterMic = 2,
    /// Same, with an encrypted payload.
    EncryptedMic = 3,
}

impl From<u8> for GpSecurityLevel {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            1 => Self::Reserved,
            2 => Self::FrameCounterMic,
            3 => Self::EncryptedMic,
            _ => Self::None,
        }
    }
}

/// Key classes of the GP security model.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum GpKeyType {
    #[default]
    NoKey = 0,
    ZigbeeNetworkKey = 1,
    GpdGroupKey = 2,
    NetworkKeyDerivedGroupKey = 3,
    IndividualGpdKey = 4,
    DerivedIndividualGpdKey = 7,
}

impl From<u8> for GpKeyType {
    fn from(value: u8) -> Self {
        match value & 0x07 {
            1 => Self::ZigbeeNetworkKey,
            2 => Self::GpdGroupKey,
            3 => Self::NetworkKeyDerivedGroupKey,
            4 => Self::IndividualGpdKey,
            7 => Self::DerivedIndividualGpdKey,
            _ => Self::NoKey,
        }
    }
}

/// A Green Power frame as reported by the `gpepIncomingMessageHandler`,
/// source-id addressing mode only.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GpFrame {
    pub link_value: u8,
    pub sequence_number: u8,
    pub source_id: u32,
    pub security: GpSecurityLevel,
    pub key_type: GpKeyType,
    pub auto_commissioning: bool,
    pub rx_after_tx: bool,
    pub security_frame_counter: u32,
    pub command_id: u8,
    pub mic: u32,
    pub proxy_table_entry: u8,
    pub payload: ArrayVec<[u8; MAX_GP_PAYLOAD]>,
}

impl GpFrame {
    /// Parses the parameter block of a `gpepIncomingMessageHandler` frame.
    /// Reports for addressing modes other than source-id are not an error;
    /// they are logged and answered with `None`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when the block is shorter than its own
    ///   payload length claims
    pub fn parse(parameters: &[u8]) -> Result<Option<Self>, Error> {
        // Layout: status, link value, sequence number, GP address struct,
        // security level, key type, auto-commissioning, rx-after-tx, frame
        // counter, command id, MIC, proxy table index, payload.
        if parameters.len() < 28 {
            return Err(Error::MalformedFrame);
        }
        let addr = EmberGpAddress::parse(&parameters[3..13])?;
        if addr.application_id != 0 {
            warn!("unsupported GP application id {}, ignoring report", addr.application_id);
            return Ok(None);
        }
        let payload_len = parameters[27] as usize;
        let payload_bytes =
            parameters.get(28..28 + payload_len).ok_or(Error::MalformedFrame)?;
        if payload_len > MAX_GP_PAYLOAD {
            return Err(Error::MalformedFrame);
        }
        let mut payload = ArrayVec::new();
        payload.extend_from_slice(payload_bytes);
        Ok(Some(Self {
            link_value: parameters[1],
            sequence_number: parameters[2],
            source_id: addr.source_id,
            security: GpSecurityLevel::from(parameters[13]),
            key_type: GpKeyType::from(parameters[14]),
            auto_commissioning: parameters[15] != 0,
            rx_after_tx: parameters[16] != 0,
            security_frame_counter: u32::from_le_bytes([
                parameters[17],
                parameters[18],
                parameters[19],
                parameters[20],
            ]),
            command_id: parameters[21],
            mic: u32::from_le_bytes([
                parameters[22],
                parameters[23],
                parameters[24],
                parameters[25],
            ]),
            proxy_table_entry: parameters[26],
            payload,
        }))
    }

    /// Reconstitutes the over-the-air NWK frame-control byte: data frame
    /// type, GP protocol version 3, the auto-commissioning bit and the
    /// extension-present bit.
    #[must_use]
    pub fn nwk_frame_control(&self) -> u8 {
        let mut fc = 0x0C;
        if self.auto_commissioning {
            fc |= 0x40;
        }
        fc | 0x80
    }

    /// Reconstitutes the extended NWK frame-control byte: application id,
    /// security level, key-present bit, rx-after-tx bit; the direction bit
    /// stays clear for frames received from a GPD.
    #[must_use]
    pub fn extended_nwk_frame_control(&self) -> u8 {
        let mut fc = (self.security as u8 & 0x03) << 3;
        if self.key_type != GpKeyType::NoKey {
            fc |= 0x20;
        }
        if self.rx_after_tx {
            fc |= 0x40;
        }
        fc
    }
}

impl fmt::Display for GpFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GPD 0x{:08X} cmd 0x{:02X} seq 0x{:02X} sec {:?} fc {} payload [{}]",
            self.source_id,
            self.command_id,
            self.sequence_number,
            self.security,
            self.security_frame_counter,
            HexSlice(&self.payload)
        )
    }
}
