// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed ASH frames and their control-byte encoding.
//!
//! A frame on the wire is `control byte | data field | CRC16` followed by the
//! flag byte. The control byte selects the variant:
//!
//! ```norust
//! 0fff raaa  DATA    fff = frame number, r = retransmit, aaa = ack number
//! 1000 0aaa  ACK
//! 1010 0aaa  NAK
//! 1100 0000  RST
//! 1100 0001  RSTACK  data field: version, reset code
//! 1100 0010  ERROR   data field: version, error code
//! ```

use core::fmt;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tinyvec::ArrayVec;

use crate::codec;
use crate::{crc, Error};

/// Longest wire frame before stuffing: control byte, 128 data bytes, CRC.
pub const MAX_FRAME_LENGTH: usize = 131;

/// Longest DATA frame data field.
pub const MAX_DATA_LENGTH: usize = 128;

/// ASH protocol version announced in RSTACK and ERROR frames.
pub const PROTOCOL_VERSION: u8 = 0x02;

/// A raw unstuffed wire frame: control byte, data field and CRC.
pub type FrameBuffer = ArrayVec<[u8; MAX_FRAME_LENGTH]>;

/// A DATA frame data field, i.e. one EZSP frame.
pub type Payload = ArrayVec<[u8; MAX_DATA_LENGTH]>;

const CONTROL_RST: u8 = 0xC0;
const CONTROL_RSTACK: u8 = 0xC1;
const CONTROL_ERROR: u8 = 0xC2;
const ACK_NUM_MASK: u8 = 0x07;
const FRAME_NUM_SHIFT: u8 = 4;
const RETRANSMIT_BIT: u8 = 0x08;

/// Three-bit wrapping sequence number used for `frmNum` and `ackNum`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Wrap3(u8);

impl Wrap3 {
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value & ACK_NUM_MASK)
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// The successor modulo 8.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::new(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Wrap3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Codes carried by RSTACK frames, naming the cause of the NCP reset, and by
/// ERROR frames, naming the fault that took the link down.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ResetCode {
    UnknownReason = 0x00,
    External = 0x01,
    PowerOn = 0x02,
    Watchdog = 0x03,
    AssertFault = 0x06,
    Bootloader = 0x09,
    Software = 0x0B,
    ExceededMaximumAckTimeoutCount = 0x51,
    ChipSpecific = 0x80,
}

impl TryFrom<u8> for ResetCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        ResetCode::iter().find(|c| value == *c as u8).ok_or(value)
    }
}

/// One ASH frame, parsed from or ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { frame_num: Wrap3, ack_num: Wrap3, retransmitted: bool, payload: Payload },
    Ack { ack_num: Wrap3 },
    Nak { ack_num: Wrap3 },
    Rst,
    RstAck { version: u8, code: u8 },
    Error { version: u8, code: u8 },
}

impl Frame {
    /// Parses an unstuffed frame whose CRC has already been verified and
    /// stripped. DATA payloads come out de-randomized.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` for unknown control bytes or a data
    ///   field that does not fit the variant
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let (&control, data) = bytes.split_first().ok_or(Error::MalformedFrame)?;
        if control & 0x80 == 0 {
            if data.is_empty() || data.len() > MAX_DATA_LENGTH {
                return Err(Error::MalformedFrame);
            }
            let mut payload = Payload::new();
            payload.extend_from_slice(data);
            codec::randomize(&mut payload);
            return Ok(Self::Data {
                frame_num: Wrap3::new(control >> FRAME_NUM_SHIFT),
                ack_num: Wrap3::new(control),
                retransmitted: control & RETRANSMIT_BIT != 0,
                payload,
            });
        }
        match control & 0xE0 {
            0x80 if data.is_empty() => Ok(Self::Ack { ack_num: Wrap3::new(control) }),
            0xA0 if data.is_empty() => Ok(Self::Nak { ack_num: Wrap3::new(control) }),
            _ => match (control, data) {
                (CONTROL_RST, []) => Ok(Self::Rst),
                (CONTROL_RSTACK, [version, code]) => {
                    Ok(Self::RstAck { version: *version, code: *code })
                }
                (CONTROL_ERROR, [version, code]) => {
                    Ok(Self::Error { version: *version, code: *code })
                }
                _ => Err(Error::MalformedFrame),
            },
        }
    }

    /// Serializes the frame body: control byte, (randomized) data field and
    /// CRC. Stuffing and the closing flag are applied on the way out by
    /// [`codec::write_frame`].
    #[must_use]
    pub fn encode(&self) -> FrameBuffer {
        let mut out = FrameBuffer::new();
        match self {
            Self::Data { frame_num, ack_num, retransmitted, payload } => {
                let mut control = (frame_num.get() << FRAME_NUM_SHIFT) | ack_num.get();
                if *retransmitted {
                    control |= RETRANSMIT_BIT;
                }
                out.push(control);
                out.extend_from_slice(payload);
                codec::randomize(&mut out[1..]);
            }
            Self::Ack { ack_num } => out.push(0x80 | ack_num.get()),
            Self::Nak { ack_num } => out.push(0xA0 | ack_num.get()),
            Self::Rst => out.push(CONTROL_RST),
            Self::RstAck { version, code } => {
                out.extend_from_slice(&[CONTROL_RSTACK, *version, *code]);
            }
            Self::Error { version, code } => {
                out.extend_from_slice(&[CONTROL_ERROR, *version, *code]);
            }
        }
        let crc = crc::checksum(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data { frame_num, ack_num, retransmitted, payload } => write!(
                f,
                "DATA({frame_num}, {ack_num}){} [{} bytes]",
                if *retransmitted { " retx" } else { "" },
                payload.len()
            ),
            Self::Ack { ack_num } => write!(f, "ACK({ack_num})"),
            Self::Nak { ack_num } => write!(f, "NAK({ack_num})"),
            Self::Rst => write!(f, "RST"),
            Self::RstAck { version, code } => write!(f, "RSTACK(v{version}, 0x{code:02X})"),
            Self::Error { version, code } => write!(f, "ERROR(v{version}, 0x{code:02X})"),
        }
    }
}
