// SPDX-License-Identifier: MIT OR Apache-2.0
//! EZSP framing: command and response headers, frame identifiers, Ember
//! status codes, wire structs and the parameter builders for every command
//! the driver issues.

pub mod aps;
mod commands;
mod frame;
mod frame_id;
mod status;
mod types;

pub use commands::*;
pub use frame::{FrameControl, Header};
pub use frame_id::FrameId;
pub use status::{EmberStatus, EzspStatus};
pub use types::*;
