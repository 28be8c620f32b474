// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-side driver for Silicon Labs Zigbee network co-processors. The crate
//! speaks EZSP (Ember Serial Protocol) framed by ASH (Asynchronous Serial
//! Host) over a UART, and authenticates incoming Green Power frames.
//!
//! The layering mirrors the wire protocol:
//!
//! 1. [`codec`] and [`frame`] turn raw UART bytes into typed ASH frames and
//!    back: byte stuffing, data randomization and CRC-16 checksums.
//! 2. [`link`] runs the ASH connection state machine: the RST/RSTACK
//!    handshake, the one-frame send window and the retransmission timer.
//! 3. [`ezsp`] encodes EZSP command frames and decodes responses and
//!    unsolicited handler frames.
//! 4. [`gp`] parses Green Power frames out of the GP endpoint handler and
//!    validates their MIC against a per-device key directory.
//! 5. [`host`] (with the default `std` feature) owns the serial port, runs
//!    the transceiver thread and exposes the asynchronous command API.
//!
//! A minimal session looks like:
//!
//! 1. Open the adapter with `host::EzspHost::open`.
//! 2. Register observers for handler frames and Green Power traffic.
//! 3. Submit commands; each returns a `CompletionHandle` that resolves with
//!    the matching response.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod codec;
pub mod crc;
pub mod crypto;
pub mod ezsp;
pub mod frame;
pub mod gp;
#[cfg(feature = "std")]
pub mod host;
pub mod link;

use core::fmt;

/// Error codes surfaced by the driver core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// I/O error during read
    Read,
    /// I/O error during write
    Write,
    /// The serial port could not be opened
    Open,
    /// A received frame failed its CRC check
    CrcMismatch,
    /// A frame or parameter block was too short or had an unknown layout
    MalformedFrame,
    /// A buffer or table ran out of capacity
    Capacity,
    /// The RST/RSTACK handshake did not complete within the retry budget
    ResetFailed,
    /// The retransmission budget was exhausted mid-session
    LinkLost,
    /// The link was reset while commands were pending
    LinkReset,
    /// The send window is occupied
    Busy,
    /// No response arrived before the per-command deadline
    CommandTimeout,
    /// The command was cancelled by the caller
    Cancelled,
    /// The NCP answered with a non-success Ember status
    Ember(ezsp::EmberStatus),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read failed"),
            Self::Write => write!(f, "write failed"),
            Self::Open => write!(f, "serial port could not be opened"),
            Self::CrcMismatch => write!(f, "frame CRC mismatch"),
            Self::MalformedFrame => write!(f, "malformed frame"),
            Self::Capacity => write!(f, "capacity exceeded"),
            Self::ResetFailed => write!(f, "reset handshake failed"),
            Self::LinkLost => write!(f, "link lost"),
            Self::LinkReset => write!(f, "link reset"),
            Self::Busy => write!(f, "send window occupied"),
            Self::CommandTimeout => write!(f, "command timed out"),
            Self::Cancelled => write!(f, "command cancelled"),
            Self::Ember(status) => write!(f, "NCP returned {status:?}"),
        }
    }
}

/// Write half of a port consumed by the link layer.
pub trait Write {
    /// Attempts to write the entire buffer
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Attempts to write a single byte
    ///
    /// # Errors
    ///
    /// * `Err(Error::Write)` when the write I/O fails with the serial port
    fn write_byte(&mut self, value: u8) -> Result<(), Error> {
        self.write_all(&[value])
    }
}

/// Read half of a port consumed by the host loop.
pub trait Read {
    /// Reads some bytes into the buffer, returning how many arrived. A
    /// return value of zero means no data within the port's timeout, not
    /// end-of-stream.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Read)` when the read I/O fails with the serial port
    fn read(&mut self, buf: &mut [u8]) -> Result<u32, Error>;
}

/// Uppercase-hex rendering of a byte slice for trace logging.
pub struct HexSlice<'a>(pub &'a [u8]);

impl fmt::Display for HexSlice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
