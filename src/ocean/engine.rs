//! Pairwise cross-domain correlation waves.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use super::insight::{correlation_type, insight};
use crate::errors::{OceanError, Result};
use crate::packet::{payload, Domain, Packet, PacketId};
use crate::pool::{join_all, WorkerPool};
use crate::store::PacketStore;

/// `source_agent` of every correlation packet.
pub const CORRELATOR_ID: &str = "ocean_correlator";

/// Correlate one pair of packets.
///
/// Returns a Correlation packet when the domains differ and the product of
/// confidences exceeds `threshold`. The id is derived from the pair, so the
/// same ordered pair always yields the same packet id.
pub fn correlate_pair(left: &Packet, right: &Packet, threshold: f64) -> Option<Packet> {
    if left.domain == right.domain {
        return None;
    }
    let strength = left.confidence * right.confidence;
    if strength <= threshold {
        return None;
    }

    let packet = Packet::derived(
        CORRELATOR_ID,
        Domain::Correlation,
        strength,
        payload(json!({
            "correlation_type": correlation_type(left.domain, right.domain),
            "insight": insight(left.domain, right.domain),
            "strength": strength,
        })),
        [left.id.clone(), right.id.clone()],
    )
    .with_id(PacketId::for_pair(&left.id, &right.id));
    Some(packet)
}

/// Runs correlation waves on a shared [`WorkerPool`].
#[derive(Debug)]
pub struct CorrelationEngine {
    threshold: f64,
    pool: WorkerPool,
    unit_failures: AtomicU64,
}

impl CorrelationEngine {
    pub fn new(threshold: f64, pool: WorkerPool) -> Self {
        Self {
            threshold,
            pool,
            unit_failures: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Correlation units that panicked since the engine was created.
    pub fn unit_failures(&self) -> u64 {
        self.unit_failures.load(Ordering::Relaxed)
    }

    /// Correlate every cross-domain pair in `batch` and submit the results.
    ///
    /// Each pair is an independent unit on the pool. A unit that panics, or
    /// whose packet the store rejects, is logged and skipped. Only a fatal
    /// store error aborts the wave.
    pub async fn wave(&self, batch: &[Packet], store: &PacketStore) -> Result<Vec<Packet>> {
        let mut pairs = Vec::new();
        let mut handles = Vec::new();
        for (i, left) in batch.iter().enumerate() {
            for right in &batch[i + 1..] {
                if left.domain == right.domain {
                    continue;
                }
                let (l, r, threshold) = (left.clone(), right.clone(), self.threshold);
                pairs.push((left.id.clone(), right.id.clone()));
                handles.push(self.pool.spawn(async move { correlate_pair(&l, &r, threshold) }));
            }
        }
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Correlation wave over {} packets, {} units", batch.len(), handles.len());

        let mut accepted = Vec::new();
        for ((left, right), joined) in pairs.into_iter().zip(join_all(handles).await) {
            let candidate = match joined {
                Ok(candidate) => candidate,
                Err(e) => {
                    self.unit_failures.fetch_add(1, Ordering::Relaxed);
                    let err = OceanError::CorrelationUnitFailure {
                        left: left.to_string(),
                        right: right.to_string(),
                        message: e.to_string(),
                    };
                    log::error!("{}", err);
                    continue;
                }
            };
            let Some(packet) = candidate else { continue };
            match store.submit_async(packet).await {
                Ok(stored) => accepted.push(stored),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::warn!("Dropped correlation {} x {}: {}", left, right, e),
            }
        }
        if !accepted.is_empty() {
            log::info!("Correlation wave produced {} packets", accepted.len());
        }
        Ok(accepted)
    }
}
