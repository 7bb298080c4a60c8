//! The correlation engine ("ocean").
//!
//! Given a batch of fresh packets, every unordered pair from different
//! domains is correlated as an independent unit. Strong pairs become
//! Correlation packets whose parents are the two inputs.

pub mod engine;
pub mod insight;

pub use engine::{correlate_pair, CorrelationEngine, CORRELATOR_ID};
pub use insight::{correlation_type, insight, DEFAULT_INSIGHT};
