//! Host coordinator (C11) and its configuration (C15).
//!
//! Bridges a [`crate::source::ByteSource`] into a [`crate::parser::Parser`],
//! applying a barcode allow-list and debounced persistence. Grounded on
//! `coordinator.py::PyTapDataUpdateCoordinator`, re-expressed as a pair of
//! cooperating `tokio` tasks (reader + persistence) rather than a single
//! blocking executor thread, per the concurrency model design notes.

use crate::energy::{EnergyAccumulator, EnergyThresholds};
use crate::error::{PersistenceError, SourceError};
use crate::events::Event;
use crate::parser::Parser;
use crate::source::ByteSource;
use crate::state::{InfrastructureSnapshot, PersistentState};
use crate::types::{GatewayId, LongAddress, NodeAddress};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_RETRIES: u32 = 0; // 0 = unlimited
const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_secs(30);
const READ_BUFFER_SIZE: usize = 4096;

/// Configuration for a [`HostCoordinator`], built with [`CoordinatorBuilder`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub configured_barcodes: HashSet<String>,
    pub reconnect_delay: Duration,
    /// `0` means retry forever.
    pub reconnect_retries: u32,
    pub persist_debounce: Duration,
    pub persist_path: Option<PathBuf>,
    pub energy_thresholds: EnergyThresholds,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            configured_barcodes: HashSet::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            reconnect_retries: DEFAULT_RECONNECT_RETRIES,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
            persist_path: None,
            energy_thresholds: EnergyThresholds::default(),
        }
    }
}

/// Builder for [`CoordinatorConfig`], mirroring the chainable,
/// `#[must_use]`-annotated style of this crate's parser-configuration API.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_configured_barcodes(mut self, barcodes: impl IntoIterator<Item = String>) -> Self {
        self.config.configured_barcodes = barcodes.into_iter().collect();
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_reconnect_retries(mut self, retries: u32) -> Self {
        self.config.reconnect_retries = retries;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_persist_debounce(mut self, delay: Duration) -> Self {
        self.config.persist_debounce = delay;
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persist_path = Some(path.into());
        self
    }

    #[must_use = "builder methods consume self and return a new builder; the return value must be used"]
    pub fn with_energy_thresholds(mut self, thresholds: EnergyThresholds) -> Self {
        self.config.energy_thresholds = thresholds;
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}

/// One tracked module's latest reading, keyed by barcode in [`CoordinatorData`].
#[derive(Debug, Clone, Serialize)]
pub struct TrackedNode {
    pub gateway_id: u16,
    pub node_id: u16,
    pub barcode: String,
    pub voltage_in: f64,
    pub voltage_out: f64,
    pub current_in: f64,
    pub current_out: f64,
    pub power: f64,
    pub temperature: f64,
    pub dc_dc_duty_cycle: f64,
    pub rssi: u8,
    pub daily_wh: f64,
    pub total_wh: f64,
    pub last_update: chrono::DateTime<chrono::Utc>,
}

/// The coordinator's externally-visible data, pushed after every batch of
/// events the reader task processes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorData {
    pub infrastructure: InfrastructureSnapshot,
    pub nodes: HashMap<String, TrackedNode>,
    pub discovered_barcodes: Vec<String>,
}

/// On-disk persistence document shape. Mirrors `coordinator.py`'s saved
/// state plus the parser's own [`PersistentState`] and per-barcode energy
/// accumulators, per the data model's persistence contract.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub barcode_to_node: HashMap<String, u16>,
    pub discovered_barcodes: Vec<String>,
    pub parser_state: PersistedParserState,
    pub energy_data: HashMap<String, EnergyAccumulator>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedParserState {
    pub gateway_identities: HashMap<String, String>,
    pub gateway_versions: HashMap<u16, String>,
    pub gateway_node_tables: HashMap<String, HashMap<String, String>>,
}

impl PersistedParserState {
    fn from_persistent_state(state: &PersistentState) -> Self {
        PersistedParserState {
            gateway_identities: state.gateway_identities.iter().map(|(gw, addr)| (gw.to_string(), addr.to_string())).collect(),
            gateway_versions: state.gateway_versions.clone(),
            gateway_node_tables: state
                .gateway_node_tables
                .iter()
                .map(|(gw, table)| {
                    let table = table.iter().map(|(node, addr)| (node.to_string(), addr.to_string())).collect();
                    (gw.to_string(), table)
                })
                .collect(),
        }
    }

    /// Inverse of [`Self::from_persistent_state`]. Malformed keys or values
    /// (a hand-edited or corrupted persisted document) are skipped and
    /// logged rather than failing the whole restore.
    fn to_persistent_state(&self) -> PersistentState {
        let mut state = PersistentState::new();

        for (gw, addr) in &self.gateway_identities {
            match (gw.parse::<GatewayId>(), LongAddress::from_str(addr)) {
                (Ok(gw), Ok(addr)) => {
                    state.gateway_identities.insert(gw, addr);
                }
                _ => warn!("skipping malformed persisted gateway identity: {gw}={addr}"),
            }
        }

        state.gateway_versions = self.gateway_versions.clone();

        for (gw, table) in &self.gateway_node_tables {
            let Ok(gw) = gw.parse::<GatewayId>() else {
                warn!("skipping malformed persisted node table for gateway {gw}");
                continue;
            };
            let mut parsed: HashMap<NodeAddress, LongAddress> = HashMap::new();
            for (node, addr) in table {
                match (node.parse::<NodeAddress>(), LongAddress::from_str(addr)) {
                    (Ok(node), Ok(addr)) => {
                        parsed.insert(node, addr);
                    }
                    _ => warn!("skipping malformed persisted node table entry for gateway {gw}: {node}={addr}"),
                }
            }
            state.gateway_node_tables.insert(gw, parsed);
        }

        state
    }
}

/// Bridges a [`ByteSource`] into a [`Parser`], applying the barcode
/// allow-list and tracking per-node energy accumulation.
///
/// Concurrency model: [`HostCoordinator::run`] owns the parser and the
/// source exclusively on one task (the parser is not `Send`-constrained
/// but is never shared); persistence happens on an independent task that
/// receives debounced save requests over a bounded channel, so a slow disk
/// never blocks the reader.
pub struct HostCoordinator {
    config: CoordinatorConfig,
    parser: Parser,
    node_to_barcode: HashMap<u16, String>,
    discovered_barcodes: HashSet<String>,
    energy: HashMap<String, EnergyAccumulator>,
    infrastructure_received: bool,
    data: CoordinatorData,
}

impl HostCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        HostCoordinator {
            config,
            parser: Parser::new(),
            node_to_barcode: HashMap::new(),
            discovered_barcodes: HashSet::new(),
            energy: HashMap::new(),
            infrastructure_received: false,
            data: CoordinatorData::default(),
        }
    }

    /// Restores a coordinator from a previously persisted document,
    /// rebuilding the parser's learned infrastructure and the barcode
    /// lookup map rather than starting either from scratch.
    pub fn from_persisted(config: CoordinatorConfig, doc: PersistedDocument) -> Self {
        let mut coordinator = Self::new(config);
        coordinator.parser = Parser::with_persistent_state(doc.parser_state.to_persistent_state());
        coordinator.node_to_barcode = doc.barcode_to_node.into_iter().map(|(barcode, node_id)| (node_id, barcode)).collect();
        coordinator.discovered_barcodes = doc.discovered_barcodes.into_iter().collect();
        coordinator.energy = doc.energy_data;
        if !coordinator.node_to_barcode.is_empty() {
            coordinator.infrastructure_received = true;
        }
        coordinator
    }

    pub fn data(&self) -> &CoordinatorData {
        &self.data
    }

    /// Drives `source` until it is closed or the reconnect-retry budget is
    /// exhausted, spawning an independent persistence task fed by `persist_tx`.
    ///
    /// `cancel` allows an external caller to interrupt the read loop between
    /// reads; a closed source or cancellation both end `run` cleanly.
    pub async fn run(
        &mut self,
        mut source: Box<dyn ByteSource>,
        persist_tx: mpsc::Sender<PersistedDocument>,
        cancel: &Notify,
    ) {
        let mut retries: u32 = 0;
        loop {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            tokio::select! {
                _ = cancel.notified() => {
                    info!("coordinator cancelled");
                    break;
                }
                result = source.read(&mut buf) => {
                    match result {
                        Ok(0) => continue,
                        Ok(n) => {
                            retries = 0;
                            let events = self.parser.feed(&buf[..n]);
                            let mut dirty = false;
                            for event in events {
                                dirty |= self.process_event(event);
                            }
                            if dirty {
                                let _ = persist_tx.try_send(self.snapshot_document());
                            }
                        }
                        Err(SourceError::Closed) => {
                            warn!("byte source closed, reconnecting");
                            source.close().await;
                            retries += 1;
                            if self.config.reconnect_retries != 0 && retries > self.config.reconnect_retries {
                                error!("max reconnect retries ({}) exceeded", self.config.reconnect_retries);
                                break;
                            }
                            tokio::time::sleep(self.config.reconnect_delay).await;
                            if let Err(e) = source.reconnect().await {
                                error!("reconnect failed: {e}");
                            }
                        }
                        Err(SourceError::Io(e)) => {
                            error!("source read error: {e}");
                            source.close().await;
                            retries += 1;
                            if self.config.reconnect_retries != 0 && retries > self.config.reconnect_retries {
                                break;
                            }
                            tokio::time::sleep(self.config.reconnect_delay).await;
                            if let Err(e) = source.reconnect().await {
                                error!("reconnect failed: {e}");
                            }
                        }
                    }
                }
            }
        }
        source.close().await;
    }

    /// Applies one parsed event to the coordinator's filtered view.
    /// Returns whether persisted state changed.
    fn process_event(&mut self, event: Event) -> bool {
        match event {
            Event::PowerReport { timestamp, event } => self.handle_power_report(timestamp, event),
            Event::Infrastructure { event, .. } => self.handle_infrastructure(event.snapshot),
            Event::Topology { .. } => false,
            Event::String { event, .. } => {
                debug!("string event gw={} node={} dir={:?}: {}", event.gateway_id, event.node_id, event.direction, event.content);
                false
            }
        }
    }

    fn handle_power_report(&mut self, timestamp: chrono::DateTime<chrono::Utc>, event: crate::events::PowerReportEvent) -> bool {
        let barcode = match &event.barcode {
            Some(barcode) => Some(barcode.clone()),
            None if self.infrastructure_received => self.node_to_barcode.get(&event.node_id).cloned(),
            None => {
                debug!("deferring power report for node {}: infrastructure not yet received", event.node_id);
                None
            }
        };
        let Some(barcode) = barcode else {
            debug!("power report for node {} with no barcode yet", event.node_id);
            return false;
        };

        if !self.config.configured_barcodes.is_empty() && !self.config.configured_barcodes.contains(&barcode) {
            return self.note_discovered(barcode);
        }

        let accumulator = self.energy.entry(barcode.clone()).or_default();
        let update = crate::energy::accumulate(accumulator, event.power, timestamp, self.config.energy_thresholds);
        if update.discarded_gap_during_production {
            warn!("discarded energy integration gap during production for {barcode}");
        }

        self.data.nodes.insert(
            barcode.clone(),
            TrackedNode {
                gateway_id: event.gateway_id,
                node_id: event.node_id,
                barcode,
                voltage_in: event.voltage_in,
                voltage_out: event.voltage_out,
                current_in: event.current_in,
                current_out: event.current_out,
                power: event.power,
                temperature: event.temperature,
                dc_dc_duty_cycle: event.dc_dc_duty_cycle,
                rssi: event.rssi,
                daily_wh: accumulator.daily_wh,
                total_wh: accumulator.total_wh,
                last_update: timestamp,
            },
        );
        true
    }

    fn handle_infrastructure(&mut self, snapshot: InfrastructureSnapshot) -> bool {
        self.data.infrastructure = snapshot.clone();
        if !snapshot.is_empty_nodes() {
            self.infrastructure_received = true;
            self.node_to_barcode.clear();
            for (&node_id, info) in &snapshot.nodes {
                if let Some(barcode) = &info.barcode {
                    self.node_to_barcode.insert(node_id, barcode.clone());
                    if !self.config.configured_barcodes.is_empty() && !self.config.configured_barcodes.contains(barcode) {
                        self.note_discovered(barcode.clone());
                    }
                }
            }
        }
        true
    }

    fn note_discovered(&mut self, barcode: String) -> bool {
        if self.discovered_barcodes.insert(barcode.clone()) {
            info!("discovered unconfigured barcode: {barcode}");
            let mut sorted: Vec<_> = self.discovered_barcodes.iter().cloned().collect();
            sorted.sort();
            self.data.discovered_barcodes = sorted;
            true
        } else {
            false
        }
    }

    fn snapshot_document(&self) -> PersistedDocument {
        PersistedDocument {
            barcode_to_node: self.node_to_barcode.iter().map(|(&n, b)| (b.clone(), n)).collect(),
            discovered_barcodes: self.data.discovered_barcodes.clone(),
            parser_state: PersistedParserState::from_persistent_state(self.parser.persistent_state()),
            energy_data: self.energy.clone(),
        }
    }
}

/// Atomically writes `doc` to `path` via a temp file plus rename, matching
/// `PersistentState.save`'s write-then-rename discipline.
pub async fn save_document(path: &std::path::Path, doc: &PersistedDocument) -> Result<(), PersistenceError> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec_pretty(doc)?;
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Loads a persisted document. Any error (missing file, corrupt JSON) is
/// logged once and treated as an empty document, never propagated as fatal.
pub async fn load_document(path: &std::path::Path) -> PersistedDocument {
    match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("corrupt persisted document at {}: {e}, starting fresh", path.display());
                PersistedDocument::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedDocument::default(),
        Err(e) => {
            warn!("could not read persisted document at {}: {e}, starting fresh", path.display());
            PersistedDocument::default()
        }
    }
}

/// The independent persistence task: drains debounced save requests and
/// writes the most recent one after `debounce` of inactivity, so a burst of
/// events produces one write instead of one per event.
pub async fn run_persistence_task(path: PathBuf, debounce: Duration, mut rx: mpsc::Receiver<PersistedDocument>) {
    loop {
        let Some(mut latest) = rx.recv().await else { break };

        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                maybe_doc = rx.recv() => {
                    match maybe_doc {
                        Some(doc) => latest = doc,
                        None => {
                            if let Err(e) = save_document(&path, &latest).await {
                                error!("failed to persist coordinator state: {e}");
                            }
                            return;
                        }
                    }
                }
            }
        }

        if let Err(e) = save_document(&path, &latest).await {
            error!("failed to persist coordinator state: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_overrides() {
        let config = CoordinatorBuilder::new()
            .with_configured_barcodes(["G-1234567H".to_string()])
            .with_reconnect_retries(3)
            .build();
        assert_eq!(config.reconnect_retries, 3);
        assert!(config.configured_barcodes.contains("G-1234567H"));
    }

    #[test]
    fn unconfigured_barcode_is_discovered_not_tracked() {
        let config = CoordinatorBuilder::new().with_configured_barcodes(["G-1234567H".to_string()]).build();
        let mut coordinator = HostCoordinator::new(config);
        let event = crate::events::PowerReportEvent::new(1, 10, Some("Z-9999999Z".to_string()), 30.0, 29.0, 1.0, 20.0, 0.5, 200);
        let dirty = coordinator.handle_power_report(chrono::Utc::now(), event);
        assert!(dirty);
        assert!(coordinator.data.nodes.is_empty());
        assert_eq!(coordinator.data.discovered_barcodes, vec!["Z-9999999Z".to_string()]);
    }

    #[test]
    fn configured_barcode_is_tracked_with_energy() {
        let config = CoordinatorBuilder::new().with_configured_barcodes(["G-1234567H".to_string()]).build();
        let mut coordinator = HostCoordinator::new(config);
        let event = crate::events::PowerReportEvent::new(1, 10, Some("G-1234567H".to_string()), 30.0, 29.0, 1.0, 20.0, 0.5, 200);
        coordinator.handle_power_report(chrono::Utc::now(), event);
        assert!(coordinator.data.nodes.contains_key("G-1234567H"));
    }

    fn sample_document() -> PersistedDocument {
        let mut barcode_to_node = HashMap::new();
        barcode_to_node.insert("A-002BE16L".to_string(), 16u16);

        let mut node_table = HashMap::new();
        node_table.insert("16".to_string(), "04:C0:5B:30:00:02:BE:16".to_string());
        let mut gateway_node_tables = HashMap::new();
        gateway_node_tables.insert("2".to_string(), node_table);

        let mut gateway_identities = HashMap::new();
        gateway_identities.insert("2".to_string(), "04:C0:00:00:00:00:00:01".to_string());
        let mut gateway_versions = HashMap::new();
        gateway_versions.insert(2u16, "1.2.3".to_string());

        let mut energy_data = HashMap::new();
        energy_data.insert("A-002BE16L".to_string(), EnergyAccumulator { total_wh: 42.0, ..EnergyAccumulator::default() });

        PersistedDocument {
            barcode_to_node,
            discovered_barcodes: vec!["Z-9999999Z".to_string()],
            parser_state: PersistedParserState { gateway_identities, gateway_versions, gateway_node_tables },
            energy_data,
        }
    }

    #[test]
    fn from_persisted_restores_barcode_mappings() {
        let coordinator = HostCoordinator::from_persisted(CoordinatorConfig::default(), sample_document());
        assert_eq!(coordinator.node_to_barcode.get(&16), Some(&"A-002BE16L".to_string()));
        assert!(coordinator.infrastructure_received);
    }

    #[test]
    fn from_persisted_restores_parser_state() {
        let coordinator = HostCoordinator::from_persisted(CoordinatorConfig::default(), sample_document());
        let snapshot = coordinator.parser.infrastructure();
        assert!(snapshot.gateways.contains_key(&2));
        assert_eq!(snapshot.gateways[&2].version.as_deref(), Some("1.2.3"));
        assert!(snapshot.nodes.contains_key(&16));
    }

    #[test]
    fn from_persisted_restores_energy_data() {
        let coordinator = HostCoordinator::from_persisted(CoordinatorConfig::default(), sample_document());
        assert_eq!(coordinator.energy.get("A-002BE16L").map(|e| e.total_wh), Some(42.0));
    }
}
