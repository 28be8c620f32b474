// SPDX-License-Identifier: MIT OR Apache-2.0
//! The GPD Commissioning command payload (GP specification §A.4.2.1.1),
//! carried by command `0xE0` of an unsecured commissioning frame. Its
//! contents seed the sink-table entry for the device.

use super::frame::GpKeyType;
use crate::ezsp::KeyData;
use crate::Error;

/// GPD command id of a Commissioning frame.
pub const GPD_COMMAND_COMMISSIONING: u8 = 0xE0;
/// GPD command id of the Commissioning Reply sent back via `dGpSend`.
pub const GPD_COMMAND_COMMISSIONING_REPLY: u8 = 0xF0;

/// Parsed Commissioning payload: the device id, its capabilities and,
/// when present, the security parameters the GPD proposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissioningPayload {
    pub device_id: u8,
    pub mac_sequence_number_capability: bool,
    pub rx_on_capability: bool,
    pub application_information: bool,
    pub pan_id_request: bool,
    pub security_key_request: bool,
    pub fixed_location: bool,
    /// Security level the GPD will use (2-bit field of the extended
    /// options).
    pub security_level: u8,
    pub key_type: GpKeyType,
    pub key: Option<KeyData>,
    /// MIC over the (possibly encrypted) key; present with the key when the
    /// key is delivered protected.
    pub key_mic: Option<u32>,
    pub outgoing_counter: Option<u32>,
}

impl CommissioningPayload {
    /// Parses the payload of a Commissioning command.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when the options announce fields the
    ///   payload does not carry
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let [device_id, options, rest @ ..] = payload else {
            return Err(Error::MalformedFrame);
        };
        let mut out = Self {
            device_id: *device_id,
            mac_sequence_number_capability: options & 0x01 != 0,
            rx_on_capability: options & 0x02 != 0,
            application_information: options & 0x04 != 0,
            pan_id_request: options & 0x10 != 0,
            security_key_request: options & 0x20 != 0,
            fixed_location: options & 0x40 != 0,
            security_level: 0,
            key_type: GpKeyType::NoKey,
            key: None,
            key_mic: None,
            outgoing_counter: None,
        };
        if options & 0x80 == 0 {
            // No extended options field.
            return Ok(out);
        }
        let (&extended, mut rest) = rest.split_first().ok_or(Error::MalformedFrame)?;
        out.security_level = extended & 0x03;
        out.key_type = GpKeyType::from((extended >> 2) & 0x07);
        if extended & 0x20 != 0 {
            let key_bytes = rest.get(..16).ok_or(Error::MalformedFrame)?;
            let mut key = KeyData::default();
            key.0.copy_from_slice(key_bytes);
            out.key = Some(key);
            rest = &rest[16..];
            // An encrypted key travels with its own MIC.
            if extended & 0x40 != 0 {
                let mic = rest.get(..4).ok_or(Error::MalformedFrame)?;
                out.key_mic = Some(u32::from_le_bytes([mic[0], mic[1], mic[2], mic[3]]));
                rest = &rest[4..];
            }
        }
        if extended & 0x80 != 0 {
            let counter = rest.get(..4).ok_or(Error::MalformedFrame)?;
            out.outgoing_counter =
                Some(u32::from_le_bytes([counter[0], counter[1], counter[2], counter[3]]));
        }
        Ok(out)
    }
}
