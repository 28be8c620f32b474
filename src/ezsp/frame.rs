// SPDX-License-Identifier: MIT OR Apache-2.0

use bitflags::bitflags;

use super::FrameId;
use crate::frame::Payload;
use crate::Error;

/// Marker that introduces the extended frame-control bytes.
const EXTENDED_MARKER: u8 = 0xFF;
/// Extended frame-control byte sent by the host; no flags apply outbound.
const EXTENDED_CONTROL: u8 = 0x00;

bitflags! {
    /// Frame-control bits of an EZSP response.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameControl: u8 {
        /// Set on every NCP-to-host frame.
        const RESPONSE = 0x80;
        /// The NCP holds at least one more callback for us.
        const CALLBACK_PENDING = 0x04;
        /// The frame was truncated to fit the NCP's buffers.
        const TRUNCATED = 0x02;
        /// The NCP ran out of memory since the last frame.
        const OVERFLOW = 0x01;
    }
}

/// Decoded EZSP frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub sequence: u8,
    pub control: FrameControl,
    pub frame_id: FrameId,
}

impl Header {
    /// Encodes a command frame: sequence, frame control, then the frame id
    /// behind the `FF 00` extended prefix — except for `version`, which must
    /// stay in the legacy single-byte layout so that it can be parsed before
    /// the protocol level is negotiated.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Capacity)` when the parameters do not fit a DATA frame
    pub fn encode_command(
        sequence: u8,
        frame_id: FrameId,
        parameters: &[u8],
    ) -> Result<Payload, Error> {
        let mut out = Payload::new();
        let header_len = if frame_id == FrameId::Version { 3 } else { 5 };
        if header_len + parameters.len() > out.capacity() {
            return Err(Error::Capacity);
        }
        out.push(sequence);
        out.push(0x00);
        if frame_id != FrameId::Version {
            out.push(EXTENDED_MARKER);
            out.push(EXTENDED_CONTROL);
        }
        out.push(frame_id as u8);
        out.extend_from_slice(parameters);
        Ok(out)
    }

    /// Decodes a frame received from the NCP, stripping the extended prefix
    /// when present. Returns the header and the parameter bytes.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` when the payload is shorter than the
    ///   header demands or carries an unknown frame id
    pub fn decode(payload: &[u8]) -> Result<(Self, &[u8]), Error> {
        let [sequence, control, rest @ ..] = payload else {
            return Err(Error::MalformedFrame);
        };
        let (raw_id, parameters) = match rest {
            [EXTENDED_MARKER, _ext, id, parameters @ ..] => (*id, parameters),
            [id, parameters @ ..] => (*id, parameters),
            [] => return Err(Error::MalformedFrame),
        };
        Ok((
            Self {
                sequence: *sequence,
                control: FrameControl::from_bits_retain(*control),
                frame_id: FrameId::try_from(raw_id)?,
            },
            parameters,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameControl, Header};
    use crate::ezsp::FrameId;
    use crate::Error;

    #[test]
    fn version_command_keeps_legacy_header() {
        let frame = Header::encode_command(0x00, FrameId::Version, &[0x08]).unwrap();
        assert_eq!(frame.as_slice(), [0x00, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn other_commands_carry_extended_prefix() {
        let frame = Header::encode_command(0x2A, FrameId::PermitJoining, &[0x3C]).unwrap();
        assert_eq!(frame.as_slice(), [0x2A, 0x00, 0xFF, 0x00, 0x22, 0x3C]);
    }

    #[rstest::rstest]
    #[case(&[0x2A, 0x80, 0xFF, 0x00, 0x22, 0x00], 0x2A, FrameId::PermitJoining, &[0x00])]
    #[case(&[0x01, 0x80, 0x00, 0x08, 0x02, 0x80, 0x58], 0x01, FrameId::Version, &[0x08, 0x02, 0x80, 0x58])]
    #[case(&[0x07, 0x84, 0xFF, 0x00, 0xC5, 0x00], 0x07, FrameId::GpepIncomingMessageHandler, &[0x00])]
    fn test_decode(
        #[case] payload: &[u8],
        #[case] sequence: u8,
        #[case] frame_id: FrameId,
        #[case] parameters: &[u8],
    ) {
        let (header, params) = Header::decode(payload).unwrap();
        assert_eq!(header.sequence, sequence);
        assert_eq!(header.frame_id, frame_id);
        assert!(header.control.contains(FrameControl::RESPONSE));
        assert_eq!(params, parameters);
    }

    #[rstest::rstest]
    #[case(&[])]
    #[case(&[0x01])]
    #[case(&[0x01, 0x80])]
    #[case(&[0x01, 0x80, 0xFF, 0x00])]
    fn test_decode_rejects_short_frames(#[case] payload: &[u8]) {
        assert_eq!(Header::decode(payload), Err(Error::MalformedFrame));
    }

    #[test]
    fn callback_pending_bit_is_exposed() {
        let (header, _) = Header::decode(&[0x00, 0x84, 0xFF, 0x00, 0x22, 0x00]).unwrap();
        assert!(header.control.contains(FrameControl::CALLBACK_PENDING));
    }

    #[test]
    fn encode_rejects_oversized_parameters() {
        let params = [0u8; 200];
        assert_eq!(
            Header::encode_command(0, FrameId::SendUnicast, &params),
            Err(Error::Capacity)
        );
    }
}
