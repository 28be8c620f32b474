// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parameter builders for the commands the driver issues, and parsers for
//! their responses. Builders are pure functions producing the parameter
//! block only; the header is added by the dispatcher.

use tinyvec::ArrayVec;

use super::types::{
    parse_status, EmberChildData, EmberGpAddress, EmberInitialSecurityState, EmberKeyStruct,
    EmberKeyType, EmberNetworkParameters, Endpoint, NodeType, VersionInfo,
};
use super::EmberStatus;
use crate::Error;

/// A command parameter block; bounded by what fits one ASH DATA frame after
/// the five header bytes.
pub type Parameters = ArrayVec<[u8; 123]>;

/// EZSP protocol level requested during the `version` handshake.
pub const PREFERRED_PROTOCOL_VERSION: u8 = 0x08;

fn collect(bytes: &[u8]) -> Parameters {
    let mut out = Parameters::new();
    out.extend_from_slice(bytes);
    out
}

#[must_use]
pub fn version(desired_protocol_version: u8) -> Parameters {
    collect(&[desired_protocol_version])
}

/// Parses the `version` response: protocol version, stack type, stack
/// version word.
///
/// # Errors
///
/// * `Err(Error::MalformedFrame)` when the response is shorter than 4 bytes
pub fn parse_version(parameters: &[u8]) -> Result<VersionInfo, Error> {
    let [protocol_version, stack_type, lo, hi, ..] = parameters else {
        return Err(Error::MalformedFrame);
    };
    Ok(VersionInfo {
        protocol_version: *protocol_version,
        stack_type: *stack_type,
        stack_version: u16::from_le_bytes([*lo, *hi]),
    })
}

#[must_use]
pub fn set_configuration_value(id: u8, value: u16) -> Parameters {
    let v = value.to_le_bytes();
    collect(&[id, v[0], v[1]])
}

#[must_use]
pub fn set_policy(id: u8, decision: u8) -> Parameters {
    collect(&[id, decision])
}

#[must_use]
pub fn add_endpoint(endpoint: &Endpoint) -> Parameters {
    let mut out = Parameters::new();
    out.push(endpoint.endpoint);
    out.extend_from_slice(&endpoint.profile_id.to_le_bytes());
    out.extend_from_slice(&endpoint.device_id.to_le_bytes());
    out.push(endpoint.app_flags);
    out.push(endpoint.input_clusters.len() as u8);
    out.push(endpoint.output_clusters.len() as u8);
    for cluster in &endpoint.input_clusters {
        out.extend_from_slice(&cluster.to_le_bytes());
    }
    for cluster in &endpoint.output_clusters {
        out.extend_from_slice(&cluster.to_le_bytes());
    }
    out
}

#[must_use]
pub fn network_init() -> Parameters {
    Parameters::new()
}

#[must_use]
pub fn network_state() -> Parameters {
    Parameters::new()
}

#[must_use]
pub fn form_network(parameters: &EmberNetworkParameters) -> Parameters {
    collect(&parameters.to_bytes())
}

#[must_use]
pub fn join_network(node_type: NodeType, parameters: &EmberNetworkParameters) -> Parameters {
    let mut out = Parameters::new();
    out.push(node_type as u8);
    out.extend_from_slice(&parameters.to_bytes());
    out
}

#[must_use]
pub fn leave_network() -> Parameters {
    Parameters::new()
}

/// `permitJoining` with a duration in seconds; `0xFF` leaves the network
/// open until closed explicitly, `0` closes it.
#[must_use]
pub fn permit_joining(duration: u8) -> Parameters {
    collect(&[duration])
}

#[must_use]
pub fn get_child_data(index: u8) -> Parameters {
    collect(&[index])
}

/// Parses a `getChildData` response into one child table row.
///
/// # Errors
///
/// * `Err(Error::Ember(_))` when the index holds no child
/// * `Err(Error::MalformedFrame)` on a truncated row
pub fn parse_child_data(parameters: &[u8]) -> Result<EmberChildData, Error> {
    parse_status(parameters)?.check()?;
    EmberChildData::parse(&parameters[1..])
}

#[must_use]
pub fn set_initial_security_state(state: &EmberInitialSecurityState) -> Parameters {
    collect(&state.to_bytes())
}

#[must_use]
pub fn get_network_parameters() -> Parameters {
    Parameters::new()
}

/// Parses a `getNetworkParameters` response: status, node type, parameters.
///
/// # Errors
///
/// * `Err(Error::Ember(_))` on a non-success status
/// * `Err(Error::MalformedFrame)` on a truncated block
pub fn parse_network_parameters(
    parameters: &[u8],
) -> Result<(NodeType, EmberNetworkParameters), Error> {
    parse_status(parameters)?.check()?;
    if parameters.len() < 2 {
        return Err(Error::MalformedFrame);
    }
    Ok((NodeType::from(parameters[1]), EmberNetworkParameters::parse(&parameters[2..])?))
}

#[must_use]
pub fn get_key(key_type: EmberKeyType) -> Parameters {
    collect(&[key_type as u8])
}

/// Parses a `getKey` response into the key struct.
///
/// # Errors
///
/// * `Err(Error::Ember(_))` on a non-success status
/// * `Err(Error::MalformedFrame)` on a truncated struct
pub fn parse_key_struct(parameters: &[u8]) -> Result<EmberKeyStruct, Error> {
    parse_status(parameters)?.check()?;
    EmberKeyStruct::parse(&parameters[1..])
}

#[must_use]
pub fn gp_sink_table_init() -> Parameters {
    Parameters::new()
}

#[must_use]
pub fn gp_proxy_table_get_entry(index: u8) -> Parameters {
    collect(&[index])
}

#[must_use]
pub fn gp_sink_table_lookup(addr: &EmberGpAddress) -> Parameters {
    collect(&addr.to_bytes())
}

#[must_use]
pub fn gp_sink_table_find_or_allocate_entry(addr: &EmberGpAddress) -> Parameters {
    collect(&addr.to_bytes())
}

#[must_use]
pub fn gp_sink_table_get_entry(index: u8) -> Parameters {
    collect(&[index])
}

#[must_use]
pub fn gp_sink_table_remove_entry(index: u8) -> Parameters {
    collect(&[index])
}

#[must_use]
pub fn gp_sink_table_clear_all() -> Parameters {
    Parameters::new()
}

/// Parses the index byte returned by the sink-table lookup and allocation
/// commands; `0xFF` means no entry.
///
/// # Errors
///
/// * `Err(Error::MalformedFrame)` on an empty response
pub fn parse_sink_table_index(parameters: &[u8]) -> Result<Option<u8>, Error> {
    match parameters.first() {
        Some(0xFF) => Ok(None),
        Some(index) => Ok(Some(*index)),
        None => Err(Error::MalformedFrame),
    }
}

/// `dGpSend`: queues (or cancels) an outgoing GPDF.
#[must_use]
pub fn d_gp_send(
    action: bool,
    use_cca: bool,
    addr: &EmberGpAddress,
    gpd_command_id: u8,
    gpd_asdu: &[u8],
    gpep_handle: u8,
    gp_tx_queue_entry_lifetime_ms: u16,
) -> Parameters {
    let mut out = Parameters::new();
    out.push(u8::from(action));
    out.push(u8::from(use_cca));
    out.extend_from_slice(&addr.to_bytes());
    out.push(gpd_command_id);
    out.push(gpd_asdu.len() as u8);
    out.extend_from_slice(gpd_asdu);
    out.push(gpep_handle);
    out.extend_from_slice(&gp_tx_queue_entry_lifetime_ms.to_le_bytes());
    out
}

/// Re-exported for command helpers that only need the leading status.
///
/// # Errors
///
/// * `Err(Error::MalformedFrame)` on an empty parameter block
pub fn parse_status_response(parameters: &[u8]) -> Result<EmberStatus, Error> {
    parse_status(parameters)
}
