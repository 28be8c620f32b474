// SPDX-License-Identifier: MIT OR Apache-2.0
//! ASH frame checksum.

use crc::{Crc, CRC_16_IBM_3740};

/// CRC algorithm for ASH frames: CRC-16/CCITT with polynomial `0x1021`,
/// initial value `0xFFFF`, unreflected, no final XOR. The checksum covers the
/// control byte and the data field exactly as they appear on the wire after
/// unstuffing, and is appended most-significant byte first.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Computes the checksum over the control byte and data field.
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Validates a received frame with its two CRC bytes still attached.
/// Feeding the appended big-endian CRC back through the polynomial leaves a
/// zero remainder exactly when the frame arrived intact.
#[must_use]
pub fn is_valid(frame: &[u8]) -> bool {
    frame.len() > 2 && CRC16.checksum(frame) == 0
}
