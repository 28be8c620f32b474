// SPDX-License-Identifier: MIT OR Apache-2.0
//! Byte-level transformations of the ASH wire format: stuffing of the
//! reserved bytes, the flag-delimited receive accumulator and the data
//! randomization applied to DATA frame payloads.

use crate::frame::FrameBuffer;
use crate::{Error, Write};

/// Marks the end of a frame.
pub const FLAG: u8 = 0x7E;
/// Escapes a following reserved byte.
pub const ESCAPE: u8 = 0x7D;
/// Resume transmission; part of XON/XOFF flow control, never frame data.
pub const X_ON: u8 = 0x11;
/// Stop transmission; part of XON/XOFF flow control, never frame data.
pub const X_OFF: u8 = 0x13;
/// Replaces a byte received with a low-level communication error.
pub const SUBSTITUTE: u8 = 0x18;
/// Discards the frame in progress; sent ahead of RST to flush link noise.
pub const CANCEL: u8 = 0x1A;

/// Flipped on a byte following [`ESCAPE`].
const ESCAPE_FLIP: u8 = 0x20;

/// Bytes that must not appear unescaped inside a frame.
const RESERVED: [u8; 6] = [FLAG, ESCAPE, X_ON, X_OFF, SUBSTITUTE, CANCEL];

/// Writes a frame body with reserved bytes stuffed, then the closing flag.
///
/// # Errors
///
/// * `Err(Error::Write)` when the write I/O fails with the serial port
pub fn write_frame<P>(port: &mut P, buf: &[u8]) -> Result<(), Error>
where
    P: Write,
{
    for value in buf {
        write_byte_stuffed(port, *value)?;
    }
    port.write_byte(FLAG)
}

fn write_byte_stuffed<P>(port: &mut P, value: u8) -> Result<(), Error>
where
    P: Write,
{
    if RESERVED.contains(&value) {
        port.write_byte(ESCAPE)?;
        port.write_byte(value ^ ESCAPE_FLIP)
    } else {
        port.write_byte(value)
    }
}

/// The pseudo-random sequence XORed over DATA frame payloads, seeded with
/// `0x42` and clocked as an 8-bit LFSR with taps `0xB8`.
pub struct Scrambler(u8);

impl Scrambler {
    #[must_use]
    pub const fn new() -> Self {
        Self(0x42)
    }
}

impl Default for Scrambler {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Scrambler {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let out = self.0;
        self.0 = if self.0 & 0x01 == 0 { self.0 >> 1 } else { (self.0 >> 1) ^ 0xB8 };
        Some(out)
    }
}

/// XORs the pseudo-random sequence over a payload in place. The sequence is
/// its own inverse, so the same call encodes and decodes.
pub fn randomize(payload: &mut [u8]) {
    for (byte, mask) in payload.iter_mut().zip(Scrambler::new()) {
        *byte ^= mask;
    }
}

/// Reassembles frames from the incoming byte stream. Bytes are unstuffed on
/// the fly; a completed frame (control byte, data field and CRC, flag
/// stripped) is handed out when the closing flag arrives.
#[derive(Default)]
pub struct Accumulator {
    buf: FrameBuffer,
    escape: bool,
    errored: bool,
}

impl Accumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one received byte; returns a completed frame on the closing
    /// flag. Frames marked by a substitute byte, cancelled frames and
    /// sub-minimum-length runts are dropped silently, as are XON/XOFF.
    pub fn push(&mut self, value: u8) -> Option<FrameBuffer> {
        match value {
            CANCEL => {
                self.restart();
                None
            }
            FLAG => {
                let complete = if self.errored || self.buf.len() < 3 {
                    None
                } else {
                    Some(core::mem::take(&mut self.buf))
                };
                self.restart();
                complete
            }
            SUBSTITUTE => {
                self.errored = true;
                None
            }
            X_ON | X_OFF => None,
            ESCAPE if !self.escape => {
                self.escape = true;
                None
            }
            _ => {
                let value = if self.escape { value ^ ESCAPE_FLIP } else { value };
                self.escape = false;
                if self.buf.len() < self.buf.capacity() {
                    self.buf.push(value);
                } else {
                    // Oversized frame; poison it so the flag drops the rest.
                    self.errored = true;
                }
                None
            }
        }
    }

    fn restart(&mut self) {
        self.buf.clear();
        self.escape = false;
        self.errored = false;
    }
}
