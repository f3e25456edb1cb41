//! Persistent infrastructure state (C5): the gateway identities, firmware
//! versions, and per-gateway node tables the parser has learned so far, plus
//! the snapshot view built from them.
//!
//! Grounded on `pytap/core/state.py::PersistentState` and
//! `parser.py::{infrastructure, _emit_infrastructure_event}`.

use crate::barcode;
use crate::types::{GatewayId, LongAddress, NodeAddress};
use serde::Serialize;
use std::collections::HashMap;

/// Everything the parser has learned about one gateway.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GatewayInfo {
    pub address: Option<String>,
    pub version: Option<String>,
}

/// Everything the parser has learned about one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub address: String,
    pub barcode: Option<String>,
}

/// A complete, point-in-time view of the mesh's gateways and nodes.
///
/// Always the full picture — never a delta — per the data model's
/// invariant that consumers never have to reconcile partial updates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InfrastructureSnapshot {
    pub gateways: HashMap<GatewayId, GatewayInfo>,
    pub nodes: HashMap<NodeAddress, NodeInfo>,
}

impl InfrastructureSnapshot {
    pub fn is_empty_nodes(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Gateway identities, versions, and node tables accumulated across the
/// life of a [`crate::parser::Parser`].
#[derive(Debug, Clone, Default)]
pub struct PersistentState {
    pub gateway_identities: HashMap<GatewayId, LongAddress>,
    pub gateway_versions: HashMap<GatewayId, String>,
    pub gateway_node_tables: HashMap<GatewayId, HashMap<NodeAddress, LongAddress>>,
}

impl PersistentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the current [`InfrastructureSnapshot`] from this state.
    pub fn snapshot(&self) -> InfrastructureSnapshot {
        let mut gateways: HashMap<GatewayId, GatewayInfo> = HashMap::new();
        for (&gw, addr) in &self.gateway_identities {
            gateways.entry(gw).or_default().address = Some(addr.to_string());
        }
        for (&gw, ver) in &self.gateway_versions {
            gateways.entry(gw).or_default().version = Some(ver.clone());
        }

        let mut nodes: HashMap<NodeAddress, NodeInfo> = HashMap::new();
        for table in self.gateway_node_tables.values() {
            for (&node_addr, long_addr) in table {
                nodes.insert(
                    node_addr,
                    NodeInfo {
                        address: long_addr.to_string(),
                        barcode: barcode::encode(long_addr),
                    },
                );
            }
        }

        InfrastructureSnapshot { gateways, nodes }
    }
}
