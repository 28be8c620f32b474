// SPDX-License-Identifier: MIT OR Apache-2.0
//! Green Power support: decoding of GPDF reports relayed through the GP
//! endpoint handler, MIC authentication against the device key directory,
//! commissioning payloads, and the sink- and proxy-table structures used
//! for pairing.

mod auth;
mod commissioning;
mod device_db;
mod frame;
mod proxy_table;
mod sink_table;

pub use auth::{authenticate, expected_mic, nonce, validate_mic, KeyStatus, NONCE_SIZE};
pub use commissioning::{
    CommissioningPayload, GPD_COMMAND_COMMISSIONING, GPD_COMMAND_COMMISSIONING_REPLY,
};
pub use device_db::{GpDevice, GpDeviceDb};
pub use frame::{GpFrame, GpKeyType, GpSecurityLevel};
pub use proxy_table::ProxyTableEntry;
pub use sink_table::{
    GpPairingOptions, ProcessGpPairing, SinkListEntry, SinkTableEntry, SinkTableEntryStatus,
    SinkTableOptions,
};
