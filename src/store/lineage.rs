//! Undirected lineage adjacency between packets.
//!
//! Query-only bookkeeping derived from parent references; ownership of
//! packets stays with the store.

use std::collections::{BTreeSet, HashMap};

use crate::packet::PacketId;

#[derive(Debug, Default, Clone)]
pub struct LineageGraph {
    adjacency: HashMap<PacketId, BTreeSet<PacketId>>,
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a child to each of its parents in both directions.
    pub fn link<'a>(&mut self, child: &PacketId, parents: impl IntoIterator<Item = &'a PacketId>) {
        for parent in parents {
            self.adjacency
                .entry(parent.clone())
                .or_default()
                .insert(child.clone());
            self.adjacency
                .entry(child.clone())
                .or_default()
                .insert(parent.clone());
        }
    }

    /// Direct neighbours (parents and children) of a packet.
    pub fn neighbors(&self, id: &PacketId) -> Vec<PacketId> {
        self.adjacency
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn degree(&self, id: &PacketId) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    /// Packets with at least one lineage edge.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Sum of adjacency list lengths (each undirected edge counted twice).
    pub fn adjacency_entries(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum()
    }

    /// Mean degree over packets that have any lineage edge.
    pub fn average_degree(&self) -> f64 {
        if self.adjacency.is_empty() {
            return 0.0;
        }
        self.adjacency_entries() as f64 / self.adjacency.len() as f64
    }
}
