//! Packet store and field index.
//!
//! The store owns every submitted packet for the lifetime of the process,
//! buckets packets into [`Field`]s by `(domain, time bucket)`, keeps the
//! undirected [`LineageGraph`] and scores field coherence on every append.
//!
//! All mutation is serialised through [`PacketStore::submit`]; everything
//! else is a read-only query that returns owned snapshots.

pub mod field;
pub mod lineage;
pub mod packet_store;

pub use field::{field_key, Field, FieldSummary};
pub use lineage::LineageGraph;
pub use packet_store::PacketStore;
