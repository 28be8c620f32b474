// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sink-table wire structures and the `gpProxyTableProcessGpPairing`
//! parameter block (GP specification §A.3.3.2.2 and §A.3.3.5.2).

use tinyvec::ArrayVec;

use crate::ezsp::{EmberGpAddress, Eui64, KeyData, NodeId};
use crate::Error;

/// Serialised size of one sink-table entry.
pub const SINK_TABLE_ENTRY_SIZE: usize = 60;

/// Serialised size of the `gpProxyTableProcessGpPairing` parameters.
pub const PROCESS_GP_PAIRING_SIZE: usize = 50;

/// Lifecycle state of a sink-table slot.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkTableEntryStatus {
    Active = 0x01,
    Unused = 0xFF,
}

impl From<u8> for SinkTableEntryStatus {
    fn from(value: u8) -> Self {
        if value == 0x01 {
            Self::Active
        } else {
            Self::Unused
        }
    }
}

/// The 16-bit options word of a sink-table entry:
///
/// ```norust
/// bits 0..2  application id
/// bits 3..4  communication mode
/// bit  5     MAC sequence number capability
/// bit  6     rx-on capability
/// bit  7     fixed location
/// bit  8     assigned alias in use
/// bit  9     security parameters present
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkTableOptions(u16);

impl SinkTableOptions {
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Options for a groupcast-forwarded, sequence-number-capable,
    /// stationary device with security parameters present; the profile of a
    /// typical commissioned GPD.
    #[must_use]
    pub const fn secured_groupcast() -> Self {
        Self(0x02A8)
    }

    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn application_id(self) -> u8 {
        (self.0 & 0x07) as u8
    }

    #[must_use]
    pub const fn communication_mode(self) -> u8 {
        ((self.0 >> 3) & 0x03) as u8
    }

    #[must_use]
    pub const fn sequence_number_capability(self) -> bool {
        self.0 & 0x0020 != 0
    }

    #[must_use]
    pub const fn rx_on_capability(self) -> bool {
        self.0 & 0x0040 != 0
    }

    #[must_use]
    pub const fn fixed_location(self) -> bool {
        self.0 & 0x0080 != 0
    }

    #[must_use]
    pub const fn assigned_alias(self) -> bool {
        self.0 & 0x0100 != 0
    }

    #[must_use]
    pub const fn security_use(self) -> bool {
        self.0 & 0x0200 != 0
    }
}

/// One slot of the entry's sink list; `0xFF` in the type byte marks it
/// unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkListEntry(pub [u8; 11]);

impl Default for SinkListEntry {
    fn default() -> Self {
        let mut bytes = [0; 11];
        bytes[0] = 0xFF;
        Self(bytes)
    }
}

/// One sink-table entry in the Ember wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTableEntry {
    pub status: SinkTableEntryStatus,
    pub options: SinkTableOptions,
    pub gpd: EmberGpAddress,
    pub device_id: u8,
    pub sink_list: [SinkListEntry; 2],
    pub assigned_alias: u16,
    pub groupcast_radius: u8,
    /// Bits 0..1 security level, bits 2..4 key type.
    pub security_options: u8,
    pub frame_counter: u32,
    pub key: KeyData,
}

impl SinkTableEntry {
    /// A fresh active entry for a newly commissioned source-id device.
    #[must_use]
    pub fn new(source_id: u32, security_options: u8, frame_counter: u32, key: KeyData) -> Self {
        Self {
            status: SinkTableEntryStatus::Active,
            options: SinkTableOptions::secured_groupcast(),
            gpd: EmberGpAddress::from_source_id(source_id),
            device_id: 0,
            sink_list: [SinkListEntry::default(); 2],
            assigned_alias: (source_id & 0xFFFF) as u16,
            groupcast_radius: 0,
            security_options,
            frame_counter,
            key,
        }
    }

    /// Serialises for `gpSinkTableSetEntry`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SINK_TABLE_ENTRY_SIZE] {
        let mut out = [0; SINK_TABLE_ENTRY_SIZE];
        out[0] = self.status as u8;
        out[1..3].copy_from_slice(&self.options.raw().to_le_bytes());
        out[3..13].copy_from_slice(&self.gpd.to_bytes());
        out[13] = self.device_id;
        out[14..25].copy_from_slice(&self.sink_list[0].0);
        out[25..36].copy_from_slice(&self.sink_list[1].0);
        out[36..38].copy_from_slice(&self.assigned_alias.to_le_bytes());
        out[38] = self.groupcast_radius;
        out[39] = self.security_options;
        out[40..44].copy_from_slice(&self.frame_counter.to_le_bytes());
        out[44..60].copy_from_slice(self.key.as_bytes());
        out
    }

    /// Parses a `gpSinkTableGetEntry` response body (after the status byte).
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` on a truncated entry
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < SINK_TABLE_ENTRY_SIZE {
            return Err(Error::MalformedFrame);
        }
        let mut sink_list = [SinkListEntry::default(); 2];
        sink_list[0].0.copy_from_slice(&bytes[14..25]);
        sink_list[1].0.copy_from_slice(&bytes[25..36]);
        let mut key = KeyData::default();
        key.0.copy_from_slice(&bytes[44..60]);
        Ok(Self {
            status: SinkTableEntryStatus::from(bytes[0]),
            options: SinkTableOptions::from_raw(u16::from_le_bytes([bytes[1], bytes[2]])),
            gpd: EmberGpAddress::parse(&bytes[3..13])?,
            device_id: bytes[13],
            sink_list,
            assigned_alias: u16::from_le_bytes([bytes[36], bytes[37]]),
            groupcast_radius: bytes[38],
            security_options: bytes[39],
            frame_counter: u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]),
            key,
        })
    }

    #[must_use]
    pub const fn security_level(&self) -> u8 {
        self.security_options & 0x03
    }

    #[must_use]
    pub const fn security_key_type(&self) -> u8 {
        (self.security_options >> 2) & 0x07
    }
}

/// The options field of the GP Pairing command. A pairing that removes a GPD
/// carries no sink or security fields, so removal and addition are built
/// through separate constructors and cannot be combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpPairingOptions(u32);

impl GpPairingOptions {
    /// Options announcing the removal of a GPD from the network. Only the
    /// application id accompanies the remove bit.
    #[must_use]
    pub const fn for_removal(application_id: u8) -> Self {
        Self(((application_id & 0x07) as u32) | (1 << 4))
    }

    /// Options for adding (or dropping) a sink pairing, populated from the
    /// sink-table entry being advertised.
    #[must_use]
    pub fn for_pairing(entry: &SinkTableEntry, add_sink: bool) -> Self {
        let options = entry.options;
        let mut raw = u32::from(options.application_id());
        raw |= u32::from(add_sink) << 3;
        raw |= u32::from(options.communication_mode()) << 5;
        raw |= u32::from(options.fixed_location()) << 7;
        raw |= u32::from(options.sequence_number_capability()) << 8;
        raw |= u32::from(entry.security_level()) << 9;
        raw |= u32::from(entry.security_key_type()) << 11;
        raw |= 1 << 14; // frame counter present
        raw |= 1 << 15; // key present
        raw |= u32::from(options.assigned_alias()) << 16;
        raw |= 1 << 17; // forwarding radius present
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn removes_gpd(self) -> bool {
        self.0 & (1 << 4) != 0
    }

    #[must_use]
    pub const fn adds_sink(self) -> bool {
        self.0 & (1 << 3) != 0
    }
}

/// Parameters of the `gpProxyTableProcessGpPairing` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGpPairing {
    options: GpPairingOptions,
    addr: EmberGpAddress,
    communication_mode: u8,
    sink_network_address: NodeId,
    sink_group_id: u16,
    assigned_alias: u16,
    sink_ieee_address: Eui64,
    key: KeyData,
    frame_counter: u32,
    forwarding_radius: u8,
}

impl ProcessGpPairing {
    /// A pairing that removes the GPD from the proxy table. Every field the
    /// options mark absent stays zeroed.
    #[must_use]
    pub fn removal(source_id: u32) -> Self {
        Self {
            options: GpPairingOptions::for_removal(0),
            addr: EmberGpAddress::from_source_id(source_id),
            communication_mode: 0,
            sink_network_address: 0,
            sink_group_id: 0,
            assigned_alias: 0,
            sink_ieee_address: Eui64::default(),
            key: KeyData::default(),
            frame_counter: 0,
            forwarding_radius: 0,
        }
    }

    /// A pairing built from a sink-table entry, advertising this host's sink.
    #[must_use]
    pub fn new(
        entry: &SinkTableEntry,
        add_sink: bool,
        sink_network_address: NodeId,
        sink_ieee_address: Eui64,
    ) -> Self {
        Self {
            options: GpPairingOptions::for_pairing(entry, add_sink),
            addr: entry.gpd,
            communication_mode: entry.options.communication_mode(),
            sink_network_address,
            sink_group_id: (entry.gpd.source_id & 0xFFFF) as u16,
            assigned_alias: entry.assigned_alias,
            sink_ieee_address,
            key: entry.key,
            frame_counter: entry.frame_counter,
            forwarding_radius: entry.groupcast_radius,
        }
    }

    /// Serialises the EZSP parameter block.
    #[must_use]
    pub fn to_parameters(&self) -> ArrayVec<[u8; PROCESS_GP_PAIRING_SIZE]> {
        let mut out = ArrayVec::new();
        out.extend_from_slice(&self.options.raw().to_le_bytes());
        out.extend_from_slice(&self.addr.to_bytes());
        out.push(self.communication_mode);
        out.extend_from_slice(&self.sink_network_address.to_le_bytes());
        out.extend_from_slice(&self.sink_group_id.to_le_bytes());
        out.extend_from_slice(&self.assigned_alias.to_le_bytes());
        out.extend_from_slice(&self.sink_ieee_address);
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.frame_counter.to_le_bytes());
        out.push(self.forwarding_radius);
        out
    }
}
