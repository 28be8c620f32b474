// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network management on top of the command pipeline: stack startup,
//! Home-Automation network formation, join/leave, permit-join, child-table
//! enumeration and the sink-table operations behind Green Power pairing.

use log::{info, warn};
use rand::Rng;

use super::{EzspHost, Response};
use crate::ezsp::aps::{self, EmberApsFrame};
use crate::ezsp::{
    self, ids, ConfigValue, EmberChildData, EmberGpAddress, EmberInitialSecurityState,
    EmberKeyStruct, EmberKeyType, EmberNetworkParameters, EmberStatus, Endpoint, Eui64, FrameId,
    JoinMethod, KeyData, NodeId, NodeType, PolicyValue, SecurityBitmask,
};
use crate::gp::{ProcessGpPairing, ProxyTableEntry, SinkTableEntry};
use crate::Error;

/// Well-known Home Automation trust-center link key.
const HA_LINK_KEY: &[u8; 16] = b"ZigBeeAlliance09";

/// Answer of the `networkState` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    NoNetwork,
    JoiningNetwork,
    JoinedNetwork,
    JoinedNetworkNoParent,
    LeavingNetwork,
    Unknown(u8),
}

impl From<u8> for NetworkState {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::NoNetwork,
            0x01 => Self::JoiningNetwork,
            0x02 => Self::JoinedNetwork,
            0x03 => Self::JoinedNetworkNoParent,
            0x04 => Self::LeavingNetwork,
            other => Self::Unknown(other),
        }
    }
}

impl EzspHost {
    fn call_status(&self, frame_id: FrameId, parameters: &[u8]) -> Result<EmberStatus, Error> {
        let response = self.call(frame_id, parameters)?;
        ezsp::parse_status_response(&response.parameters)
    }

    fn set_configuration_value(&self, id: u8, value: u16) -> Result<EmberStatus, Error> {
        self.call_status(
            FrameId::SetConfigurationValue,
            &ezsp::set_configuration_value(id, value),
        )
    }

    fn set_policy(&self, id: u8, decision: u8) -> Result<EmberStatus, Error> {
        self.call_status(FrameId::SetPolicy, &ezsp::set_policy(id, decision))
    }

    fn add_endpoint(&self, endpoint: &Endpoint) -> Result<Response, Error> {
        self.call(FrameId::AddEndpoint, &ezsp::add_endpoint(endpoint))
    }

    /// Writes the startup configuration and policy tables, registers the
    /// gateway and Green Power endpoints and (re-)initialises the stack.
    /// Returns the resulting network state.
    ///
    /// # Errors
    ///
    /// Command pipeline errors; individual non-success configuration writes
    /// are logged and skipped, matching NCP behaviour on locked-down values.
    pub fn stack_init(
        &self,
        configs: &[ConfigValue],
        policies: &[PolicyValue],
    ) -> Result<NetworkState, Error> {
        for config in configs {
            let status = self.set_configuration_value(config.id, config.value)?;
            if status != EmberStatus::Success {
                warn!("configuration 0x{:02X} rejected: {status:?}", config.id);
            }
        }
        for policy in policies {
            let status = self.set_policy(policy.id, policy.decision)?;
            if status != EmberStatus::Success {
                warn!("policy 0x{:02X} rejected: {status:?}", policy.id);
            }
        }

        // Endpoint 1: the gateway application.
        let mut gateway = Endpoint {
            endpoint: 1,
            profile_id: 0x0104,
            device_id: 0x0007,
            app_flags: 0,
            input_clusters: tinyvec::array_vec!([u16; 8]),
            output_clusters: tinyvec::array_vec!([u16; 8]),
        };
        gateway.input_clusters.push(0x0000);
        gateway.output_clusters.push(0x0000);
        self.add_endpoint(&gateway)?;

        // Endpoint 242: Green Power, with the GP cluster both ways.
        let mut green_power = Endpoint {
            endpoint: 242,
            profile_id: 0xA10E,
            device_id: 0x0064,
            app_flags: 0,
            input_clusters: tinyvec::array_vec!([u16; 8]),
            output_clusters: tinyvec::array_vec!([u16; 8]),
        };
        green_power.input_clusters.push(0x0021);
        green_power.output_clusters.push(0x0021);
        self.add_endpoint(&green_power)?;

        let status = self.call_status(FrameId::NetworkInit, &ezsp::network_init())?;
        if status != EmberStatus::Success {
            // NOT_JOINED just means there is no network to resume.
            warn!("networkInit: {status:?}");
        }
        let response = self.call(FrameId::NetworkState, &ezsp::network_state())?;
        let state = response
            .parameters
            .first()
            .map(|b| NetworkState::from(*b))
            .ok_or(Error::MalformedFrame)?;
        info!("stack initialised, network state {state:?}");
        Ok(state)
    }

    /// Forms a Home Automation network on the given channel: trust-center
    /// policies, the well-known HA link key, a random network key and a
    /// random PAN id.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the security state or
    ///   the formation
    pub fn form_ha_network(&self, channel: u8) -> Result<(), Error> {
        self.set_policy(ids::POLICY_TRUST_CENTER, ids::DECISION_ALLOW_JOINS)?.check()?;
        self.set_policy(ids::POLICY_TC_KEY_REQUEST, ids::DECISION_DENY_TC_KEY_REQUESTS)?
            .check()?;

        let mut rng = rand::thread_rng();
        let mut network_key = [0u8; 16];
        rng.fill(&mut network_key[..]);
        let security = EmberInitialSecurityState {
            bitmask: SecurityBitmask::TRUST_CENTER_GLOBAL_LINK_KEY
                | SecurityBitmask::HAVE_PRECONFIGURED_KEY
                | SecurityBitmask::HAVE_NETWORK_KEY
                | SecurityBitmask::REQUIRE_ENCRYPTED_KEY,
            preconfigured_key: KeyData(*HA_LINK_KEY),
            network_key: KeyData(network_key),
            network_key_sequence: 0,
            preconfigured_trust_center_eui64: Eui64::default(),
        };
        self.call_status(
            FrameId::SetInitialSecurityState,
            &ezsp::set_initial_security_state(&security),
        )?
        .check()?;

        let parameters = EmberNetworkParameters {
            pan_id: rng.gen(),
            radio_tx_power: 3,
            radio_channel: channel,
            join_method: JoinMethod::MacAssociation,
            ..EmberNetworkParameters::default()
        };
        self.call_status(FrameId::FormNetwork, &ezsp::form_network(&parameters))?.check()?;
        info!("forming HA network on channel {channel}, PAN id 0x{:04X}", parameters.pan_id);
        Ok(())
    }

    /// Joins an existing network as a router.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the request
    pub fn join_network(&self, parameters: &EmberNetworkParameters) -> Result<(), Error> {
        self.call_status(
            FrameId::JoinNetwork,
            &ezsp::join_network(NodeType::Router, parameters),
        )?
        .check()
    }

    /// Leaves the current network.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the request
    pub fn leave_network(&self) -> Result<(), Error> {
        self.call_status(FrameId::LeaveNetwork, &ezsp::leave_network())?.check()
    }

    /// Opens the network for joining devices, handing out the current key
    /// on request.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the request
    pub fn open_network(&self, seconds: u8) -> Result<(), Error> {
        self.set_policy(
            ids::POLICY_TC_KEY_REQUEST,
            ids::DECISION_ALLOW_TC_KEY_REQUESTS_AND_SEND_CURRENT_KEY,
        )?
        .check()?;
        self.call_status(FrameId::PermitJoining, &ezsp::permit_joining(seconds))?.check()
    }

    /// Closes the network for joining.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the request
    pub fn close_network(&self) -> Result<(), Error> {
        self.set_policy(ids::POLICY_TC_KEY_REQUEST, ids::DECISION_DENY_TC_KEY_REQUESTS)?
            .check()?;
        self.call_status(FrameId::PermitJoining, &ezsp::permit_joining(0))?.check()
    }

    /// Walks the NCP's child table from index zero until the first empty
    /// slot.
    ///
    /// # Errors
    ///
    /// Command pipeline errors; an out-of-range index simply ends the walk.
    pub fn children(&self) -> Result<Vec<EmberChildData>, Error> {
        let mut children = Vec::new();
        for index in 0..=u8::MAX {
            let response = self.call(FrameId::GetChildData, &ezsp::get_child_data(index))?;
            match ezsp::parse_child_data(&response.parameters) {
                Ok(child) => children.push(child),
                Err(Error::Ember(_)) => break,
                Err(error) => return Err(error),
            }
        }
        Ok(children)
    }

    /// Reads the current network parameters and this node's role.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when no network is up
    pub fn get_network_parameters(&self) -> Result<(NodeType, EmberNetworkParameters), Error> {
        let response =
            self.call(FrameId::GetNetworkParameters, &ezsp::get_network_parameters())?;
        ezsp::parse_network_parameters(&response.parameters)
    }

    /// Reads the NCP's IEEE address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` on a short response
    pub fn get_eui64(&self) -> Result<Eui64, Error> {
        let response = self.call(FrameId::GetEui64, &[])?;
        let mut eui64 = Eui64::default();
        let bytes = response.parameters.get(0..8).ok_or(Error::MalformedFrame)?;
        eui64.copy_from_slice(bytes);
        Ok(eui64)
    }

    /// Reads the NCP's short network address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` on a short response
    pub fn get_node_id(&self) -> Result<NodeId, Error> {
        let response = self.call(FrameId::GetNodeId, &[])?;
        let bytes = response.parameters.get(0..2).ok_or(Error::MalformedFrame)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads one of the stack's keys.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the key is not set
    pub fn get_key(&self, key_type: EmberKeyType) -> Result<EmberKeyStruct, Error> {
        let response = self.call(FrameId::GetKey, &ezsp::get_key(key_type))?;
        ezsp::parse_key_struct(&response.parameters)
    }

    /// Sends an APS message straight to a short address.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses to queue the message
    pub fn send_unicast(
        &self,
        destination: NodeId,
        aps_frame: &EmberApsFrame,
        message_tag: u8,
        message: &[u8],
    ) -> Result<(), Error> {
        self.call_status(
            FrameId::SendUnicast,
            &aps::send_unicast(destination, aps_frame, message_tag, message),
        )?
        .check()
    }

    /// Broadcasts an APS message.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses to queue the message
    pub fn send_broadcast(
        &self,
        destination: NodeId,
        aps_frame: &EmberApsFrame,
        radius: u8,
        message_tag: u8,
        message: &[u8],
    ) -> Result<(), Error> {
        self.call_status(
            FrameId::SendBroadcast,
            &aps::send_broadcast(destination, aps_frame, radius, message_tag, message),
        )?
        .check()
    }

    /// Reads one proxy-table entry.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the index holds no entry
    pub fn proxy_table_get_entry(&self, index: u8) -> Result<ProxyTableEntry, Error> {
        let response =
            self.call(FrameId::GpProxyTableGetEntry, &ezsp::gp_proxy_table_get_entry(index))?;
        ezsp::parse_status_response(&response.parameters)?.check()?;
        ProxyTableEntry::parse(&response.parameters[1..])
    }

    /// Clears and re-initialises the NCP's sink table.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_init(&self) -> Result<(), Error> {
        self.call(FrameId::GpSinkTableInit, &ezsp::gp_sink_table_init())?;
        Ok(())
    }

    /// Looks up the sink-table index of a source id, if one is allocated.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_lookup(&self, source_id: u32) -> Result<Option<u8>, Error> {
        let addr = EmberGpAddress::from_source_id(source_id);
        let response = self.call(FrameId::GpSinkTableLookup, &ezsp::gp_sink_table_lookup(&addr))?;
        ezsp::parse_sink_table_index(&response.parameters)
    }

    /// Finds or allocates the sink-table slot for a source id; `None` when
    /// the table is full.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_find_or_allocate(&self, source_id: u32) -> Result<Option<u8>, Error> {
        let addr = EmberGpAddress::from_source_id(source_id);
        let response = self.call(
            FrameId::GpSinkTableFindOrAllocateEntry,
            &ezsp::gp_sink_table_find_or_allocate_entry(&addr),
        )?;
        ezsp::parse_sink_table_index(&response.parameters)
    }

    /// Reads one sink-table entry.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the index holds no entry
    pub fn sink_table_get_entry(&self, index: u8) -> Result<SinkTableEntry, Error> {
        let response =
            self.call(FrameId::GpSinkTableGetEntry, &ezsp::gp_sink_table_get_entry(index))?;
        ezsp::parse_status_response(&response.parameters)?.check()?;
        SinkTableEntry::parse(&response.parameters[1..])
    }

    /// Writes one sink-table entry.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_set_entry(&self, index: u8, entry: &SinkTableEntry) -> Result<(), Error> {
        let mut parameters = Vec::with_capacity(61);
        parameters.push(index);
        parameters.extend_from_slice(&entry.to_bytes());
        self.call(FrameId::GpSinkTableSetEntry, &parameters)?;
        Ok(())
    }

    /// Frees one sink-table entry.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_remove_entry(&self, index: u8) -> Result<(), Error> {
        self.call(FrameId::GpSinkTableRemoveEntry, &ezsp::gp_sink_table_remove_entry(index))?;
        Ok(())
    }

    /// Empties the sink table.
    ///
    /// # Errors
    ///
    /// Command pipeline errors.
    pub fn sink_table_clear_all(&self) -> Result<(), Error> {
        self.call(FrameId::GpSinkTableClearAll, &ezsp::gp_sink_table_clear_all())?;
        Ok(())
    }

    /// Sends a GP Pairing through the proxy table; returns whether a
    /// pairing was added.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` on a short response
    pub fn process_gp_pairing(&self, pairing: &ProcessGpPairing) -> Result<bool, Error> {
        let response =
            self.call(FrameId::GpProxyTableProcessGpPairing, &pairing.to_parameters())?;
        response.parameters.first().map(|b| *b != 0).ok_or(Error::MalformedFrame)
    }

    /// Queues an outgoing GPDF, e.g. a commissioning or channel reply.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Ember(_))` when the NCP refuses the request
    #[allow(clippy::too_many_arguments)]
    pub fn d_gp_send(
        &self,
        action: bool,
        use_cca: bool,
        source_id: u32,
        gpd_command_id: u8,
        payload: &[u8],
        handle: u8,
        lifetime_ms: u16,
    ) -> Result<(), Error> {
        let addr = EmberGpAddress::from_source_id(source_id);
        self.call_status(
            FrameId::DGpSend,
            &ezsp::d_gp_send(action, use_cca, &addr, gpd_command_id, payload, handle, lifetime_ms),
        )?
        .check()
    }
}
