//! Accumulates paginated `NODE_TABLE_REQUEST`/`RESPONSE` pairs into a
//! complete `NodeID -> LongAddress` table.
//!
//! Grounded on `pytap/core/state.py::NodeTableBuilder`.

use crate::types::{LongAddress, NodeAddress};
use std::collections::HashMap;

/// Per-gateway paginated node-table accumulator.
#[derive(Debug, Clone, Default)]
pub struct NodeTableBuilder {
    entries: HashMap<NodeAddress, LongAddress>,
}

impl NodeTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes one page of `(NodeAddress, LongAddress)` entries.
    ///
    /// An empty page finalizes the accumulation: the builder is cleared and
    /// the union of all pushed entries is returned, unless nothing had been
    /// accumulated yet, in which case `None` is returned (there is nothing
    /// to install).
    pub fn push(&mut self, entries: &[(NodeAddress, LongAddress)]) -> Option<HashMap<NodeAddress, LongAddress>> {
        if entries.is_empty() {
            if self.entries.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.entries));
        }
        for &(addr, long_addr) in entries {
            self.entries.insert(addr, long_addr);
        }
        None
    }
}
