// SPDX-License-Identifier: MIT OR Apache-2.0

use bitflags::bitflags;
use tinyvec::ArrayVec;

use super::EmberStatus;
use crate::Error;

/// IEEE long address, little-endian on the wire.
pub type Eui64 = [u8; 8];

/// Zigbee short network address.
pub type NodeId = u16;

/// Size of the serialised [`EmberNetworkParameters`].
pub const NETWORK_PARAMETERS_SIZE: usize = 20;

/// A 128-bit Zigbee or Green Power key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyData(pub [u8; 16]);

impl KeyData {
    /// Parses a key from 32 hex digits, e.g. from a configuration file.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` for anything but 32 hex digits
    pub fn from_hex(digits: &str) -> Result<Self, Error> {
        let mut key = [0; 16];
        hex::decode_to_slice(digits, &mut key).map_err(|_| Error::MalformedFrame)?;
        Ok(Self(key))
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Role of a node on the network.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    UnknownDevice = 0x00,
    Coordinator = 0x01,
    Router = 0x02,
    EndDevice = 0x03,
    SleepyEndDevice = 0x04,
}

impl From<u8> for NodeType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::Coordinator,
            0x02 => Self::Router,
            0x03 => Self::EndDevice,
            0x04 => Self::SleepyEndDevice,
            _ => Self::UnknownDevice,
        }
    }
}

/// How a node gets onto a network.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethod {
    #[default]
    MacAssociation = 0x00,
    NwkRejoin = 0x01,
    NwkRejoinHaveNwkKey = 0x02,
    ConfiguredNwkState = 0x03,
}

/// Parameters of a network to form or join, in the Ember wire layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmberNetworkParameters {
    pub extended_pan_id: Eui64,
    pub pan_id: u16,
    pub radio_tx_power: u8,
    pub radio_channel: u8,
    pub join_method: JoinMethod,
    pub nwk_manager_id: NodeId,
    pub nwk_update_id: u8,
    pub channels: u32,
}

impl EmberNetworkParameters {
    /// Serialises into the 20-byte block the `formNetwork` and `joinNetwork`
    /// commands expect.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; NETWORK_PARAMETERS_SIZE] {
        let mut out = [0; NETWORK_PARAMETERS_SIZE];
        out[0..8].copy_from_slice(&self.extended_pan_id);
        out[8..10].copy_from_slice(&self.pan_id.to_le_bytes());
        out[10] = self.radio_tx_power;
        out[11] = self.radio_channel;
        out[12] = self.join_method as u8;
        out[13..15].copy_from_slice(&self.nwk_manager_id.to_le_bytes());
        out[15] = self.nwk_update_id;
        out[16..20].copy_from_slice(&self.channels.to_le_bytes());
        out
    }

    /// Parses the block out of a `getNetworkParameters` response.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when fewer than 20 bytes are left
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < NETWORK_PARAMETERS_SIZE {
            return Err(Error::MalformedFrame);
        }
        let mut extended_pan_id = Eui64::default();
        extended_pan_id.copy_from_slice(&bytes[0..8]);
        let join_method = match bytes[12] {
            0x01 => JoinMethod::NwkRejoin,
            0x02 => JoinMethod::NwkRejoinHaveNwkKey,
            0x03 => JoinMethod::ConfiguredNwkState,
            _ => JoinMethod::MacAssociation,
        };
        Ok(Self {
            extended_pan_id,
            pan_id: u16::from_le_bytes([bytes[8], bytes[9]]),
            radio_tx_power: bytes[10],
            radio_channel: bytes[11],
            join_method,
            nwk_manager_id: u16::from_le_bytes([bytes[13], bytes[14]]),
            nwk_update_id: bytes[15],
            channels: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// One row of the NCP's child table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmberChildData {
    pub eui64: Eui64,
    pub node_type: NodeType,
    pub id: NodeId,
    pub phy: u8,
    pub power: u8,
    pub timeout: u8,
}

impl EmberChildData {
    /// Parses a `getChildData` response body (after the status byte).
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when the block is shorter than a child
    ///   table row
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 14 {
            return Err(Error::MalformedFrame);
        }
        let mut eui64 = Eui64::default();
        eui64.copy_from_slice(&bytes[0..8]);
        Ok(Self {
            eui64,
            node_type: NodeType::from(bytes[8]),
            id: u16::from_le_bytes([bytes[9], bytes[10]]),
            phy: bytes[11],
            power: bytes[12],
            timeout: bytes[13],
        })
    }
}

/// Addressing info of a Green Power device. Only source-id addressing
/// (application id 0) is used by this driver, but the eight-byte union slot
/// is kept so the struct round-trips the Ember layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmberGpAddress {
    pub application_id: u8,
    pub source_id: u32,
    pub endpoint: u8,
}

impl EmberGpAddress {
    /// Size of the serialised struct.
    pub const SIZE: usize = 10;

    #[must_use]
    pub const fn from_source_id(source_id: u32) -> Self {
        Self { application_id: 0, source_id, endpoint: 0 }
    }

    /// Serialises into the ten-byte Ember struct: application id, the
    /// eight-byte address union (source id in the low four bytes), endpoint.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[0] = self.application_id;
        out[1..5].copy_from_slice(&self.source_id.to_le_bytes());
        out[9] = self.endpoint;
        out
    }

    /// Parses the ten-byte Ember struct.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when fewer than ten bytes are left
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < Self::SIZE {
            return Err(Error::MalformedFrame);
        }
        Ok(Self {
            application_id: bytes[0],
            source_id: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            endpoint: bytes[9],
        })
    }
}

/// One `setConfigurationValue` item of the stack startup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigValue {
    pub id: u8,
    pub value: u16,
}

/// One `setPolicy` item of the stack startup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyValue {
    pub id: u8,
    pub decision: u8,
}

/// Well-known configuration, policy and decision identifiers used by the
/// startup sequences.
pub mod ids {
    pub const CONFIG_PACKET_BUFFER_COUNT: u8 = 0x01;
    pub const CONFIG_STACK_PROFILE: u8 = 0x0C;
    pub const CONFIG_SECURITY_LEVEL: u8 = 0x0D;
    pub const CONFIG_MAX_END_DEVICE_CHILDREN: u8 = 0x11;
    pub const CONFIG_INDIRECT_TRANSMISSION_TIMEOUT: u8 = 0x12;
    pub const CONFIG_APPLICATION_ZDO_FLAGS: u8 = 0x2A;

    pub const POLICY_TRUST_CENTER: u8 = 0x00;
    pub const POLICY_TC_KEY_REQUEST: u8 = 0x05;

    pub const DECISION_ALLOW_JOINS: u8 = 0x01;
    pub const DECISION_DENY_TC_KEY_REQUESTS: u8 = 0x50;
    pub const DECISION_ALLOW_TC_KEY_REQUESTS_AND_SEND_CURRENT_KEY: u8 = 0x51;
}

bitflags! {
    /// `EmberInitialSecurityBitmask` of `setInitialSecurityState`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityBitmask: u16 {
        const TRUST_CENTER_GLOBAL_LINK_KEY = 0x0004;
        const HAVE_PRECONFIGURED_KEY = 0x0100;
        const HAVE_NETWORK_KEY = 0x0200;
        const GET_LINK_KEY_WHEN_JOINING = 0x0400;
        const REQUIRE_ENCRYPTED_KEY = 0x0800;
    }
}

/// Payload of `setInitialSecurityState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmberInitialSecurityState {
    pub bitmask: SecurityBitmask,
    pub preconfigured_key: KeyData,
    pub network_key: KeyData,
    pub network_key_sequence: u8,
    pub preconfigured_trust_center_eui64: Eui64,
}

impl EmberInitialSecurityState {
    /// Size of the serialised struct.
    pub const SIZE: usize = 43;

    /// Serialises in the Ember wire order: bitmask, both keys, key sequence
    /// number, trust-center EUI64.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out[0..2].copy_from_slice(&self.bitmask.bits().to_le_bytes());
        out[2..18].copy_from_slice(self.preconfigured_key.as_bytes());
        out[18..34].copy_from_slice(self.network_key.as_bytes());
        out[34] = self.network_key_sequence;
        out[35..43].copy_from_slice(&self.preconfigured_trust_center_eui64);
        out
    }
}

bitflags! {
    /// `EmberKeyStructBitmask`: which fields of a key struct hold data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyStructBitmask: u16 {
        const HAS_SEQUENCE_NUMBER = 0x0001;
        const HAS_OUTGOING_FRAME_COUNTER = 0x0002;
        const HAS_INCOMING_FRAME_COUNTER = 0x0004;
        const HAS_PARTNER_EUI64 = 0x0008;
    }
}

/// Key types accepted by `getKey`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmberKeyType {
    TrustCenterLinkKey = 0x01,
    CurrentNetworkKey = 0x03,
    NextNetworkKey = 0x04,
    ApplicationLinkKey = 0x05,
}

/// A key with its bookkeeping, as returned by `getKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmberKeyStruct {
    pub bitmask: KeyStructBitmask,
    pub key_type: u8,
    pub key: KeyData,
    pub outgoing_frame_counter: u32,
    pub incoming_frame_counter: u32,
    pub sequence_number: u8,
    pub partner_eui64: Eui64,
}

impl EmberKeyStruct {
    /// Size of the serialised struct.
    pub const SIZE: usize = 36;

    /// Parses a `getKey` response body (after the status byte).
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` on a truncated struct
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < Self::SIZE {
            return Err(Error::MalformedFrame);
        }
        let mut key = KeyData::default();
        key.0.copy_from_slice(&bytes[3..19]);
        let mut partner_eui64 = Eui64::default();
        partner_eui64.copy_from_slice(&bytes[28..36]);
        Ok(Self {
            bitmask: KeyStructBitmask::from_bits_retain(u16::from_le_bytes([bytes[0], bytes[1]])),
            key_type: bytes[2],
            key,
            outgoing_frame_counter: u32::from_le_bytes([
                bytes[19], bytes[20], bytes[21], bytes[22],
            ]),
            incoming_frame_counter: u32::from_le_bytes([
                bytes[23], bytes[24], bytes[25], bytes[26],
            ]),
            sequence_number: bytes[27],
            partner_eui64,
        })
    }
}

/// An endpoint registered on the NCP with `addEndpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub app_flags: u8,
    pub input_clusters: ArrayVec<[u16; 8]>,
    pub output_clusters: ArrayVec<[u16; 8]>,
}

/// Outcome of the `version` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub protocol_version: u8,
    pub stack_type: u8,
    pub stack_version: u16,
}

/// Parses the leading Ember status byte common to most responses.
///
/// # Errors
///
/// * `Err(Error::MalformedFrame)` on an empty parameter block
pub fn parse_status(parameters: &[u8]) -> Result<EmberStatus, Error> {
    parameters.first().map(|b| EmberStatus::from(*b)).ok_or(Error::MalformedFrame)
}
