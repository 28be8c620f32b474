// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Ember APS frame carried by the messaging commands, and the codecs for
//! `sendUnicast`, `sendBroadcast` and `incomingMessageHandler`.

use bitflags::bitflags;
use tinyvec::ArrayVec;

use super::NodeId;
use crate::Error;

/// Serialised size of an [`EmberApsFrame`].
pub const APS_FRAME_SIZE: usize = 11;

/// Broadcast to all routers and coordinators.
pub const BROADCAST_ROUTERS: NodeId = 0xFFFC;
/// Broadcast to all non-sleepy devices.
pub const BROADCAST_RX_ON_IDLE: NodeId = 0xFFFD;
/// Broadcast to every device, sleeping ones included.
pub const BROADCAST_ALL: NodeId = 0xFFFF;

bitflags! {
    /// The 16-bit APS option word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ApsOptions: u16 {
        /// Encrypt with the link key if one is shared with the destination.
        const ENCRYPTION = 0x0020;
        /// Resend the message on failure, up to three times.
        const RETRY = 0x0040;
        /// Discover the route if none is known.
        const ENABLE_ROUTE_DISCOVERY = 0x0100;
        /// Rediscover the route even if one is known.
        const FORCE_ROUTE_DISCOVERY = 0x0200;
        /// Include our EUI64 in the network frame.
        const SOURCE_EUI64 = 0x0400;
        /// Include the destination EUI64 in the network frame.
        const DESTINATION_EUI64 = 0x0800;
        /// Send a route record ahead of the message if needed.
        const ENABLE_ADDRESS_DISCOVERY = 0x1000;
        /// The message answers a data poll.
        const POLL_RESPONSE = 0x2000;
        /// The sender expects a ZDO response.
        const ZDO_RESPONSE_REQUIRED = 0x4000;
        /// Part of a fragmented message.
        const FRAGMENT = 0x8000;
    }
}

impl Default for ApsOptions {
    /// The profile used for ordinary application traffic: retried, with
    /// route and address discovery and the source EUI64 included.
    fn default() -> Self {
        Self::RETRY
            | Self::ENABLE_ROUTE_DISCOVERY
            | Self::ENABLE_ADDRESS_DISCOVERY
            | Self::SOURCE_EUI64
    }
}

/// APS-level addressing of one Zigbee message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmberApsFrame {
    pub profile_id: u16,
    pub cluster_id: u16,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    pub options: ApsOptions,
    pub group_id: u16,
    pub sequence: u8,
}

impl EmberApsFrame {
    /// A frame addressed from the gateway endpoint with default options.
    #[must_use]
    pub fn new(profile_id: u16, cluster_id: u16, destination_endpoint: u8) -> Self {
        Self {
            profile_id,
            cluster_id,
            source_endpoint: 1,
            destination_endpoint,
            options: ApsOptions::default(),
            group_id: 0,
            sequence: 0,
        }
    }

    /// Serialises in the Ember wire order: profile, cluster, endpoints,
    /// options, group, sequence.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; APS_FRAME_SIZE] {
        let mut out = [0; APS_FRAME_SIZE];
        out[0..2].copy_from_slice(&self.profile_id.to_le_bytes());
        out[2..4].copy_from_slice(&self.cluster_id.to_le_bytes());
        out[4] = self.source_endpoint;
        out[5] = self.destination_endpoint;
        out[6..8].copy_from_slice(&self.options.bits().to_le_bytes());
        out[8..10].copy_from_slice(&self.group_id.to_le_bytes());
        out[10] = self.sequence;
        out
    }

    /// Parses the eleven-byte wire form.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when fewer than eleven bytes are left
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < APS_FRAME_SIZE {
            return Err(Error::MalformedFrame);
        }
        Ok(Self {
            profile_id: u16::from_le_bytes([bytes[0], bytes[1]]),
            cluster_id: u16::from_le_bytes([bytes[2], bytes[3]]),
            source_endpoint: bytes[4],
            destination_endpoint: bytes[5],
            options: ApsOptions::from_bits_retain(u16::from_le_bytes([bytes[6], bytes[7]])),
            group_id: u16::from_le_bytes([bytes[8], bytes[9]]),
            sequence: bytes[10],
        })
    }
}

/// `sendUnicast` parameters for a directly-addressed message.
#[must_use]
pub fn send_unicast(
    destination: NodeId,
    aps: &EmberApsFrame,
    message_tag: u8,
    message: &[u8],
) -> ArrayVec<[u8; 123]> {
    let mut out = ArrayVec::new();
    out.push(0x00); // EMBER_OUTGOING_DIRECT
    out.extend_from_slice(&destination.to_le_bytes());
    out.extend_from_slice(&aps.to_bytes());
    out.push(message_tag);
    out.push(message.len() as u8);
    out.extend_from_slice(message);
    out
}

/// `sendBroadcast` parameters.
#[must_use]
pub fn send_broadcast(
    destination: NodeId,
    aps: &EmberApsFrame,
    radius: u8,
    message_tag: u8,
    message: &[u8],
) -> ArrayVec<[u8; 123]> {
    let mut out = ArrayVec::new();
    out.extend_from_slice(&destination.to_le_bytes());
    out.extend_from_slice(&aps.to_bytes());
    out.push(radius);
    out.push(message_tag);
    out.push(message.len() as u8);
    out.extend_from_slice(message);
    out
}

/// One message delivered by `incomingMessageHandler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_type: u8,
    pub aps: EmberApsFrame,
    pub last_hop_lqi: u8,
    pub last_hop_rssi: i8,
    pub sender: NodeId,
    pub binding_index: u8,
    pub address_index: u8,
    pub contents: ArrayVec<[u8; 96]>,
}

impl IncomingMessage {
    /// Parses the parameter block of an `incomingMessageHandler` frame.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when the block is shorter than its own
    ///   length byte claims
    pub fn parse(parameters: &[u8]) -> Result<Self, Error> {
        if parameters.len() < 19 {
            return Err(Error::MalformedFrame);
        }
        let aps = EmberApsFrame::parse(&parameters[1..12])?;
        let length = parameters[18] as usize;
        let bytes = parameters.get(19..19 + length).ok_or(Error::MalformedFrame)?;
        if length > 96 {
            return Err(Error::MalformedFrame);
        }
        let mut contents = ArrayVec::new();
        contents.extend_from_slice(bytes);
        Ok(Self {
            message_type: parameters[0],
            aps,
            last_hop_lqi: parameters[12],
            last_hop_rssi: parameters[13] as i8,
            sender: u16::from_le_bytes([parameters[14], parameters[15]]),
            binding_index: parameters[16],
            address_index: parameters[17],
            contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        send_broadcast, send_unicast, ApsOptions, EmberApsFrame, IncomingMessage,
        BROADCAST_RX_ON_IDLE,
    };
    use crate::Error;

    #[test]
    fn aps_frame_round_trips() {
        let aps = EmberApsFrame {
            profile_id: 0x0104,
            cluster_id: 0x0006,
            source_endpoint: 1,
            destination_endpoint: 3,
            options: ApsOptions::default(),
            group_id: 0,
            sequence: 0x21,
        };
        let bytes = aps.to_bytes();
        assert_eq!(bytes[0..2], [0x04, 0x01]);
        assert_eq!(EmberApsFrame::parse(&bytes), Ok(aps));
        assert_eq!(EmberApsFrame::parse(&bytes[..10]), Err(Error::MalformedFrame));
    }

    #[test]
    fn default_options_match_messaging_profile() {
        let bits = ApsOptions::default().bits();
        assert_eq!(bits, 0x0040 | 0x0100 | 0x1000 | 0x0400);
    }

    #[test]
    fn unicast_block_leads_with_direct_mode() {
        let aps = EmberApsFrame::new(0x0104, 0x0006, 1);
        let block = send_unicast(0x1234, &aps, 0x00, &[0xAA, 0xBB]);
        assert_eq!(block[0], 0x00);
        assert_eq!(block[1..3], [0x34, 0x12]);
        assert_eq!(block[3..14], aps.to_bytes());
        assert_eq!(block[14], 0x00);
        assert_eq!(block[15], 2);
        assert_eq!(block[16..18], [0xAA, 0xBB]);
    }

    #[test]
    fn broadcast_block_carries_radius() {
        let aps = EmberApsFrame::new(0x0000, 0x0036, 0);
        let block = send_broadcast(BROADCAST_RX_ON_IDLE, &aps, 0, 0x01, &[0x05]);
        assert_eq!(block[0..2], [0xFD, 0xFF]);
        assert_eq!(block[13], 0);
        assert_eq!(block[14], 0x01);
        assert_eq!(block[15], 1);
        assert_eq!(block[16], 0x05);
    }

    #[test]
    fn incoming_message_parses_wire_layout() {
        let aps = EmberApsFrame::new(0x0104, 0x0006, 1);
        let mut block = vec![0x00];
        block.extend_from_slice(&aps.to_bytes());
        block.extend_from_slice(&[0xB0, 0xC5]); // lqi, rssi (-59)
        block.extend_from_slice(&[0x34, 0x12]); // sender
        block.extend_from_slice(&[0xFF, 0xFF]); // binding, address index
        block.push(3);
        block.extend_from_slice(&[0x01, 0x02, 0x03]);
        let message = IncomingMessage::parse(&block).unwrap();
        assert_eq!(message.sender, 0x1234);
        assert_eq!(message.last_hop_rssi, -59);
        assert_eq!(message.contents.as_slice(), [0x01, 0x02, 0x03]);
        assert_eq!(IncomingMessage::parse(&block[..block.len() - 1]), Err(Error::MalformedFrame));
    }
}
