//! Network connection-pattern analysis: beaconing, port scanning, and
//! data-exfiltration detection (spec.md §4.6).

pub mod analyzer;
pub mod port_extractor;

pub use analyzer::{ConnectionAnalyzer, ConnectionAnalyzerConfig, PatternVerdict};
pub use port_extractor::SyntheticPortExtractor;
