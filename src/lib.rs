//! # intel-ocean
//!
//! Streaming intelligence aggregation. Events are fanned out to analyzer
//! agents, which emit domain-tagged packets. Packets are bucketed into
//! time/domain fields with a coherence score, strongly-confident packets
//! from different domains are correlated in parallel waves, and fields that
//! become coherent and pattern-bearing are reported as emergent.
//!
//! ```text
//! Event -> agents -> Packets -> PacketStore -> CorrelationEngine -> PacketStore
//!                                   |
//!                                   +-> EmergenceDetector -> EmergenceReporter
//! ```

pub mod analyzers;
pub mod config;
pub mod emergence;
pub mod errors;
pub mod event;
pub mod metrics;
pub mod ocean;
pub mod orchestrator;
pub mod packet;
pub mod pool;
pub mod store;

pub use analyzers::{build_roster, AnalyzerAgent};
pub use config::OceanConfig;
pub use emergence::{
    ChannelReporter, CollectingReporter, EmergenceDetector, EmergenceEvent, EmergenceReporter,
    LogReporter,
};
pub use errors::{OceanError, Result};
pub use event::{ChannelSource, Event, EventSource, JsonLinesSource, SourceItem, VecSource};
pub use metrics::{MetricsReport, OceanMetrics, SessionStats};
pub use ocean::CorrelationEngine;
pub use orchestrator::{Orchestrator, OrchestratorState, StopHandle};
pub use packet::{Domain, Packet, PacketId, Payload};
pub use pool::WorkerPool;
pub use store::{FieldSummary, PacketStore};
