//! Event variants emitted by [`crate::parser::Parser::feed`].
//!
//! Grounded on `pytap/core/events.py`. Represented here as a tagged enum
//! rather than a class hierarchy with a shared base — the idiomatic
//! re-expression the design notes in `SPEC_FULL.md` §9 call for.

use crate::state::InfrastructureSnapshot;
use crate::types::{GatewayId, NodeAddress, Rssi};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Request/response direction for a [`Event::String`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringDirection {
    Request,
    Response,
}

/// A decoded power measurement from one node.
#[derive(Debug, Clone, Serialize)]
pub struct PowerReportEvent {
    pub gateway_id: GatewayId,
    pub node_id: NodeAddress,
    pub barcode: Option<String>,
    pub voltage_in: f64,
    pub voltage_out: f64,
    pub current_in: f64,
    pub current_out: f64,
    pub power: f64,
    pub temperature: f64,
    pub dc_dc_duty_cycle: f64,
    pub rssi: Rssi,
}

impl PowerReportEvent {
    /// Derives `current_out` and `power` per the reference implementation:
    /// `current_out = (voltage_in * current_in) / voltage_out` (0 when
    /// `voltage_out` is 0), `power = current_out * voltage_out`, both
    /// rounded to 4 decimal places.
    pub fn new(
        gateway_id: GatewayId,
        node_id: NodeAddress,
        barcode: Option<String>,
        voltage_in: f64,
        voltage_out: f64,
        current_in: f64,
        temperature: f64,
        dc_dc_duty_cycle: f64,
        rssi: Rssi,
    ) -> Self {
        let current_out = if voltage_out != 0.0 {
            round4((voltage_in * current_in) / voltage_out)
        } else {
            0.0
        };
        let power = round4(current_out * voltage_out);
        PowerReportEvent {
            gateway_id,
            node_id,
            barcode,
            voltage_in,
            voltage_out,
            current_in,
            current_out,
            power,
            temperature,
            dc_dc_duty_cycle,
            rssi,
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// A change in gateway identities, versions, or node tables.
///
/// Always the complete current snapshot — never a delta.
#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureEvent {
    #[serde(flatten)]
    pub snapshot: InfrastructureSnapshot,
}

/// A raw topology report from a node.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyEvent {
    pub gateway_id: GatewayId,
    pub node_id: NodeAddress,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
}

fn serialize_hex<S: serde::Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(data))
}

/// A diagnostic string request or response.
#[derive(Debug, Clone, Serialize)]
pub struct StringEvent {
    pub gateway_id: GatewayId,
    pub node_id: NodeAddress,
    pub direction: StringDirection,
    pub content: String,
}

/// The tagged union of every event [`crate::parser::Parser::feed`] can
/// produce. Each variant carries its own timestamp: for [`Event::PowerReport`]
/// this is the gateway's slot-clock rendering of the report's slot counter,
/// not wall time.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    PowerReport {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        event: PowerReportEvent,
    },
    Infrastructure {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        event: InfrastructureEvent,
    },
    Topology {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        event: TopologyEvent,
    },
    String {
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        event: StringEvent,
    },
}
