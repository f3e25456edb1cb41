//! Parser façade (C9): the single `feed(bytes) -> events` entry point that
//! owns frame extraction, transport correlation, the slot clock, the
//! enumeration state machine, and the application decoder.
//!
//! Grounded on `parser.py::Parser`, restructured so each concern lives in
//! its own module (`frame`, `transport`, `slot_clock`, `enumeration`,
//! `decoder`) and `Parser` is the orchestrator threading state between
//! them — the role the teacher's own `NetflowParser` plays over its
//! static/variable version parsers.

use crate::decoder::{decode_power_report, decode_string_request, iter_received_packets};
use crate::enumeration::EnumerationState;
use crate::events::{Event, InfrastructureEvent, PowerReportEvent, StringDirection, StringEvent, TopologyEvent};
use crate::frame::{Frame, FrameCounters, FrameExtractor};
use crate::node_table::NodeTableBuilder;
use crate::state::{InfrastructureSnapshot, PersistentState};
use crate::transport::parse_receive_response_header;
use crate::types::{Direction, FrameType, GatewayId, LongAddress, NodeAddress, PacketType};
use chrono::Utc;
use log::warn;
use std::collections::HashMap;

/// An outstanding command request, keyed by `(GatewayId, sequence_number)`.
type CommandKey = (GatewayId, u8);

/// Core protocol parser.
///
/// Owns every byte of mutable state the data model describes. `feed` is
/// synchronous and total: it never blocks and never returns an error —
/// malformed input is counted by [`Parser::counters`], not propagated.
pub struct Parser {
    extractor: FrameExtractor,

    rx_packet_numbers: HashMap<GatewayId, u16>,
    captured_slot_times: HashMap<GatewayId, chrono::DateTime<Utc>>,
    slot_clocks: HashMap<GatewayId, crate::slot_clock::SlotClock>,

    commands_awaiting: HashMap<CommandKey, (u8, Vec<u8>)>,
    command_sequence_numbers: HashMap<GatewayId, u8>,

    enum_state: Option<EnumerationState>,
    node_table_builders: HashMap<GatewayId, NodeTableBuilder>,

    persistent_state: PersistentState,
}

impl Default for Parser {
    fn default() -> Self {
        Parser {
            extractor: FrameExtractor::new(),
            rx_packet_numbers: HashMap::new(),
            captured_slot_times: HashMap::new(),
            slot_clocks: HashMap::new(),
            commands_awaiting: HashMap::new(),
            command_sequence_numbers: HashMap::new(),
            enum_state: None,
            node_table_builders: HashMap::new(),
            persistent_state: PersistentState::new(),
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a parser that already knows the given infrastructure (e.g.
    /// from a previously persisted document), so a restarted process does
    /// not forget gateway identities and node tables it already learned.
    pub fn with_persistent_state(persistent_state: PersistentState) -> Self {
        Parser { persistent_state, ..Self::default() }
    }

    /// Feeds raw bytes into the parser, returning every event produced.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        for &byte in data {
            if let Some(frame) = self.extractor.push_byte(byte) {
                events.extend(self.dispatch_frame(frame));
            }
        }
        events
    }

    /// Clears in-progress frame accumulation. Infrastructure and transport
    /// state survive a reset.
    pub fn reset(&mut self) {
        self.extractor.reset();
    }

    pub fn infrastructure(&self) -> InfrastructureSnapshot {
        self.persistent_state.snapshot()
    }

    pub fn persistent_state(&self) -> &PersistentState {
        &self.persistent_state
    }

    pub fn counters(&self) -> FrameCounters {
        self.extractor.counters()
    }

    fn dispatch_frame(&mut self, frame: Frame) -> Vec<Event> {
        match frame.frame_type() {
            FrameType::ReceiveRequest => self.handle_receive_request(&frame),
            FrameType::ReceiveResponse => self.handle_receive_response(&frame),
            FrameType::CommandRequest => self.handle_command_request(&frame),
            FrameType::CommandResponse => self.handle_command_response(&frame),
            FrameType::EnumerationStartRequest => self.handle_enumeration_start(&frame),
            FrameType::EnumerationResponse | FrameType::IdentifyResponse => self.handle_identity_observation(&frame),
            FrameType::VersionResponse => self.handle_version_response(&frame),
            FrameType::EnumerationEndResponse => self.handle_enumeration_end(&frame),
            _ => Vec::new(),
        }
    }

    fn handle_receive_request(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::HostToGateway {
            return Vec::new();
        }
        if frame.payload.len() < 4 {
            return Vec::new();
        }
        let gw_id = frame.address.gateway_id;
        let packet_number = u16::from_be_bytes([frame.payload[2], frame.payload[3]]);
        self.rx_packet_numbers.insert(gw_id, packet_number);
        self.captured_slot_times.insert(gw_id, Utc::now());
        Vec::new()
    }

    fn handle_receive_response(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::GatewayToHost {
            return Vec::new();
        }
        let gw_id = frame.address.gateway_id;
        let Some(&old_packet_number) = self.rx_packet_numbers.get(&gw_id) else {
            return Vec::new();
        };

        let Some(header) = parse_receive_response_header(&frame.payload, old_packet_number) else {
            return Vec::new();
        };
        self.rx_packet_numbers.insert(gw_id, header.packet_number);

        if let Some(capture_time) = self.captured_slot_times.remove(&gw_id) {
            self.slot_clocks
                .entry(gw_id)
                .and_modify(|clock| clock.set(header.slot, capture_time))
                .or_insert_with(|| crate::slot_clock::SlotClock::new(header.slot, capture_time));
        }

        let Some(pv_data) = frame.payload.get(header.data_offset..) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for (pv_header, pv_payload) in iter_received_packets(pv_data) {
            if pv_header.node_address == 0 {
                continue;
            }
            events.extend(self.parse_pv_packet(gw_id, pv_header.node_address, pv_header.packet_type, pv_payload));
        }
        events
    }

    fn parse_pv_packet(&mut self, gw_id: GatewayId, node_addr: NodeAddress, packet_type: PacketType, data: &[u8]) -> Vec<Event> {
        match packet_type {
            PacketType::PowerReport => self.handle_power_report(gw_id, node_addr, data),
            PacketType::StringResponse => vec![Event::String {
                timestamp: Utc::now(),
                event: StringEvent {
                    gateway_id: gw_id,
                    node_id: node_addr,
                    direction: StringDirection::Response,
                    content: String::from_utf8_lossy(data).into_owned(),
                },
            }],
            PacketType::TopologyReport => vec![Event::Topology {
                timestamp: Utc::now(),
                event: TopologyEvent { gateway_id: gw_id, node_id: node_addr, data: data.to_vec() },
            }],
            _ => Vec::new(),
        }
    }

    fn handle_power_report(&mut self, gw_id: GatewayId, node_id: NodeAddress, data: &[u8]) -> Vec<Event> {
        let Some(report) = decode_power_report(data) else {
            return Vec::new();
        };
        let Some(slot_clock) = self.slot_clocks.get(&gw_id) else {
            warn!("no slot clock for gateway {gw_id}, discarding power report");
            return Vec::new();
        };
        let timestamp = slot_clock.get(report.slot);

        let barcode = self
            .persistent_state
            .gateway_node_tables
            .get(&gw_id)
            .and_then(|table| table.get(&node_id))
            .and_then(crate::barcode::encode);

        let event = PowerReportEvent::new(
            gw_id,
            node_id,
            barcode,
            report.voltage_in(),
            report.voltage_out(),
            report.current_in(),
            report.temperature(),
            report.duty_cycle(),
            report.rssi,
        );
        vec![Event::PowerReport { timestamp, event }]
    }

    fn handle_command_request(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::HostToGateway {
            return Vec::new();
        }
        if frame.payload.len() < 5 {
            return Vec::new();
        }
        let gw_id = frame.address.gateway_id;
        let packet_type = frame.payload[3];
        let sequence_number = frame.payload[4];
        self.command_sequence_numbers.insert(gw_id, sequence_number);
        self.commands_awaiting
            .insert((gw_id, sequence_number), (packet_type, frame.payload[5..].to_vec()));
        Vec::new()
    }

    fn handle_command_response(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::GatewayToHost {
            return Vec::new();
        }
        if frame.payload.len() < 5 {
            return Vec::new();
        }
        let gw_id = frame.address.gateway_id;
        let resp_packet_type = frame.payload[3];
        let resp_seq = frame.payload[4];

        let Some((req_type, req_payload)) = self.commands_awaiting.remove(&(gw_id, resp_seq)) else {
            return Vec::new();
        };
        let resp_payload = &frame.payload[5..];
        self.handle_command_pair(gw_id, req_type, &req_payload, resp_packet_type, resp_payload)
    }

    fn handle_command_pair(&mut self, gw_id: GatewayId, req_type: u8, req_payload: &[u8], resp_type: u8, resp_payload: &[u8]) -> Vec<Event> {
        match (PacketType::from_u8(req_type), PacketType::from_u8(resp_type)) {
            (PacketType::NodeTableRequest, PacketType::NodeTableResponse) => {
                self.handle_node_table_command(gw_id, resp_payload)
            }
            (PacketType::StringRequest, PacketType::StringResponse) => {
                self.handle_string_command(gw_id, req_payload)
            }
            _ => Vec::new(),
        }
    }

    fn handle_node_table_command(&mut self, gw_id: GatewayId, resp_payload: &[u8]) -> Vec<Event> {
        if resp_payload.is_empty() {
            return Vec::new();
        }
        let entries_count = resp_payload[0] as usize;
        let entries_data = &resp_payload[1..];
        if entries_data.len() != entries_count * 10 {
            return Vec::new();
        }
        let mut entries = Vec::with_capacity(entries_count);
        for i in 0..entries_count {
            let off = i * 10;
            let node_addr = u16::from_be_bytes([entries_data[off], entries_data[off + 1]]);
            let mut long_addr_bytes = [0u8; 8];
            long_addr_bytes.copy_from_slice(&entries_data[off + 2..off + 10]);
            entries.push((node_addr, LongAddress(long_addr_bytes)));
        }

        let builder = self.node_table_builders.entry(gw_id).or_default();
        let Some(table) = builder.push(&entries) else {
            return Vec::new();
        };
        self.persistent_state.gateway_node_tables.insert(gw_id, table);
        self.emit_infrastructure_event()
    }

    fn handle_string_command(&mut self, gw_id: GatewayId, req_payload: &[u8]) -> Vec<Event> {
        let Some((node_addr, content)) = decode_string_request(req_payload) else {
            return Vec::new();
        };
        vec![Event::String {
            timestamp: Utc::now(),
            event: StringEvent { gateway_id: gw_id, node_id: node_addr, direction: StringDirection::Request, content },
        }]
    }

    fn handle_enumeration_start(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::HostToGateway {
            return Vec::new();
        }
        if frame.address.gateway_id != 0 {
            return Vec::new();
        }
        if frame.payload.len() < 6 {
            return Vec::new();
        }
        let enum_gw = u16::from_be_bytes([frame.payload[4], frame.payload[5]]) & 0x7FFF;
        self.enum_state = Some(EnumerationState::new(enum_gw));
        Vec::new()
    }

    fn handle_identity_observation(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::GatewayToHost {
            return Vec::new();
        }
        if frame.payload.len() < 8 {
            return Vec::new();
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&frame.payload[0..8]);
        let long_address = LongAddress(bytes);
        let gw_id = frame.address.gateway_id;

        if let Some(enum_state) = self.enum_state.as_mut() {
            enum_state.observe_identity(gw_id, long_address);
            Vec::new()
        } else {
            self.persistent_state.gateway_identities.insert(gw_id, long_address);
            self.emit_infrastructure_event()
        }
    }

    fn handle_version_response(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::GatewayToHost {
            return Vec::new();
        }
        if frame.payload.is_empty() {
            return Vec::new();
        }
        let version = String::from_utf8_lossy(&frame.payload).into_owned();
        let gw_id = frame.address.gateway_id;

        if let Some(enum_state) = self.enum_state.as_mut() {
            enum_state.observe_version(gw_id, version);
            Vec::new()
        } else {
            self.persistent_state.gateway_versions.insert(gw_id, version);
            self.emit_infrastructure_event()
        }
    }

    fn handle_enumeration_end(&mut self, frame: &Frame) -> Vec<Event> {
        if frame.address.direction != Direction::GatewayToHost {
            return Vec::new();
        }
        let Some(enum_state) = self.enum_state.take() else {
            return Vec::new();
        };
        self.persistent_state.gateway_identities = enum_state.gateway_identities;
        self.persistent_state.gateway_versions = enum_state.gateway_versions;
        self.emit_infrastructure_event()
    }

    fn emit_infrastructure_event(&self) -> Vec<Event> {
        vec![Event::Infrastructure {
            timestamp: Utc::now(),
            event: InfrastructureEvent { snapshot: self.persistent_state.snapshot() },
        }]
    }
}
