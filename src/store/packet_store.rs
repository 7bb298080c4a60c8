//! The packet store, the only shared mutable state in the ocean.
//!
//! Packets, fields, the lineage graph and the emergence counter sit behind
//! a single mutex. Writers go through [`PacketStore::submit_async`] (or the
//! blocking [`PacketStore::submit`] outside a runtime), which takes the lock
//! with a bounded timeout and exponential backoff; readers take it
//! unconditionally and clone out what they need.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use super::field::{field_key, Field, FieldSummary};
use super::lineage::LineageGraph;
use crate::config::OceanConfig;
use crate::errors::{OceanError, Result};
use crate::metrics::OceanMetrics;
use crate::packet::{Domain, Packet, PacketId};

/// Poll interval while waiting for the lock on the async path.
const LOCK_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub(crate) struct StoreInner {
    packets: HashMap<PacketId, Packet>,
    /// Submission order across all domains.
    order: Vec<PacketId>,
    by_domain: HashMap<Domain, Vec<PacketId>>,
    fields: HashMap<String, Field>,
    field_order: Vec<String>,
    lineage: LineageGraph,
    emergence_events: u64,
}

/// Process-lifetime packet store and field index.
#[derive(Debug)]
pub struct PacketStore {
    inner: Mutex<StoreInner>,
    bucket_width: f64,
    lock_timeout: Duration,
    lock_retries: u32,
}

impl Default for PacketStore {
    fn default() -> Self {
        Self::new(300.0)
    }
}

impl PacketStore {
    /// Create a store with the given field bucket width in seconds.
    pub fn new(bucket_width: f64) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            bucket_width,
            lock_timeout: Duration::from_millis(50),
            lock_retries: 5,
        }
    }

    pub fn from_config(config: &OceanConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            bucket_width: config.bucket_width_secs,
            lock_timeout: config.store_lock_timeout(),
            lock_retries: config.store_lock_retries,
        }
    }

    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Acquire the writer lock, retrying with doubling backoff.
    ///
    /// Blocks the calling thread for at most
    /// `retries * lock_timeout + (2^retries - 1)` milliseconds.
    fn lock_for_write(&self) -> Result<MutexGuard<'_, StoreInner>> {
        let mut backoff = Duration::from_millis(1);
        for attempt in 1..=self.lock_retries {
            if let Some(guard) = self.inner.try_lock_for(self.lock_timeout) {
                return Ok(guard);
            }
            log::warn!(
                "Packet store lock busy (attempt {}/{}), backing off {:?}",
                attempt,
                self.lock_retries,
                backoff
            );
            thread::sleep(backoff);
            backoff = backoff.saturating_mul(2);
        }
        Err(OceanError::StoreContention {
            attempts: self.lock_retries,
        })
    }

    /// [`lock_for_write`](Self::lock_for_write) that yields to the runtime
    /// while waiting instead of parking the worker thread.
    async fn lock_for_write_async(&self) -> Result<MutexGuard<'_, StoreInner>> {
        let mut backoff = Duration::from_millis(1);
        for attempt in 1..=self.lock_retries {
            let deadline = Instant::now() + self.lock_timeout;
            loop {
                if let Some(guard) = self.inner.try_lock() {
                    return Ok(guard);
                }
                if Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(LOCK_POLL).await;
            }
            log::warn!(
                "Packet store lock busy (attempt {}/{}), backing off {:?}",
                attempt,
                self.lock_retries,
                backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
        Err(OceanError::StoreContention {
            attempts: self.lock_retries,
        })
    }

    #[cfg(test)]
    pub(crate) fn hold_write_lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock()
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Store a packet and return the stored copy.
    ///
    /// Resubmitting an id already present is a no-op that returns the
    /// existing packet. Parents must already be stored.
    pub fn submit(&self, packet: Packet) -> Result<Packet> {
        Self::check(&packet)?;
        let mut inner = self.lock_for_write()?;
        self.insert(&mut inner, packet)
    }

    /// Async form of [`submit`](Self::submit), used on the event path.
    pub async fn submit_async(&self, packet: Packet) -> Result<Packet> {
        Self::check(&packet)?;
        let mut inner = self.lock_for_write_async().await?;
        self.insert(&mut inner, packet)
    }

    fn check(packet: &Packet) -> Result<()> {
        packet.validate().map_err(|e| {
            log::warn!("Rejected packet from {}: {}", packet.source_agent, e);
            e
        })
    }

    fn insert(&self, inner: &mut StoreInner, packet: Packet) -> Result<Packet> {
        if let Some(existing) = inner.packets.get(&packet.id) {
            log::debug!("Packet {} already stored, ignoring resubmission", packet.id);
            return Ok(existing.clone());
        }

        if let Some(missing) = packet
            .parent_ids
            .iter()
            .find(|id| !inner.packets.contains_key(*id))
        {
            let err = OceanError::UnknownParent {
                packet_id: packet.id.to_string(),
                parent_id: missing.to_string(),
            };
            log::warn!("Rejected packet from {}: {}", packet.source_agent, err);
            return Err(err);
        }

        let key = field_key(packet.domain, packet.timestamp, self.bucket_width);
        if !inner.fields.contains_key(&key) {
            log::debug!("Created field {}", key);
            inner.field_order.push(key.clone());
        }
        inner
            .fields
            .entry(key.clone())
            .or_insert_with(|| Field::new(key.clone(), packet.domain, packet.timestamp))
            .add(&packet);

        for parent_id in &packet.parent_ids {
            if let Some(parent) = inner.packets.get_mut(parent_id) {
                parent.child_ids.insert(packet.id.clone());
            }
        }
        inner.lineage.link(&packet.id, packet.parent_ids.iter());

        inner.order.push(packet.id.clone());
        inner
            .by_domain
            .entry(packet.domain)
            .or_default()
            .push(packet.id.clone());
        inner.packets.insert(packet.id.clone(), packet.clone());

        Ok(packet)
    }

    /// Bump the ocean-wide emergence counter.
    pub fn record_emergence(&self, count: u64) {
        self.inner.lock().emergence_events += count;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &PacketId) -> Option<Packet> {
        self.inner.lock().packets.get(id).cloned()
    }

    /// The newest `limit` packets of a domain, oldest first.
    pub fn recent(&self, domain: Domain, limit: usize) -> Vec<Packet> {
        let inner = self.inner.lock();
        let Some(ids) = inner.by_domain.get(&domain) else {
            return Vec::new();
        };
        let start = ids.len().saturating_sub(limit);
        ids[start..]
            .iter()
            .filter_map(|id| inner.packets.get(id).cloned())
            .collect()
    }

    /// Every packet in submission order.
    pub fn all(&self) -> Vec<Packet> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.packets.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn field_count(&self) -> usize {
        self.inner.lock().fields.len()
    }

    pub fn field(&self, id: &str) -> Option<FieldSummary> {
        self.inner.lock().fields.get(id).map(Field::summary)
    }

    /// Packet ids of a field in append order.
    pub fn field_packet_ids(&self, id: &str) -> Option<Vec<PacketId>> {
        self.inner
            .lock()
            .fields
            .get(id)
            .map(|f| f.packet_ids().to_vec())
    }

    /// Summaries of every field in creation order.
    pub fn fields(&self) -> Vec<FieldSummary> {
        let inner = self.inner.lock();
        inner
            .field_order
            .iter()
            .filter_map(|id| inner.fields.get(id).map(Field::summary))
            .collect()
    }

    /// Id of the field a packet was assigned to.
    pub fn field_of(&self, id: &PacketId) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .packets
            .get(id)
            .map(|p| field_key(p.domain, p.timestamp, self.bucket_width))
    }

    /// Direct lineage neighbours (parents and children).
    pub fn lineage_neighbors(&self, id: &PacketId) -> Vec<PacketId> {
        self.inner.lock().lineage.neighbors(id)
    }

    /// Transitive parents of a packet, nearest generation first.
    pub fn ancestors(&self, id: &PacketId) -> Vec<PacketId> {
        let inner = self.inner.lock();
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        let mut frontier: Vec<PacketId> = inner
            .packets
            .get(id)
            .map(|p| p.parent_ids.iter().cloned().collect())
            .unwrap_or_default();
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for parent in frontier {
                if !seen.insert(parent.clone()) {
                    continue;
                }
                if let Some(p) = inner.packets.get(&parent) {
                    next.extend(p.parent_ids.iter().cloned());
                }
                out.push(parent);
            }
            frontier = next;
        }
        out
    }

    /// Aggregate metrics over the current store contents.
    pub fn metrics(&self) -> OceanMetrics {
        let inner = self.inner.lock();
        let packet_count = inner.packets.len();
        let field_count = inner.fields.len();
        let average_coherence = if field_count == 0 {
            0.0
        } else {
            inner.fields.values().map(Field::coherence).sum::<f64>() / field_count as f64
        };
        let graph_density = if packet_count == 0 {
            0.0
        } else {
            inner.lineage.adjacency_entries() as f64 / (packet_count as f64).powi(2)
        };

        OceanMetrics {
            packet_count,
            field_count,
            average_coherence,
            average_lineage_degree: inner.lineage.average_degree(),
            graph_density,
            emergence_event_count: inner.emergence_events,
        }
    }
}
