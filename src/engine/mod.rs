//! Aggregation engine: normalize → select → margin → report.

pub mod cycle;
pub mod margin;
pub mod normalizer;
pub mod orchestrator;
pub mod report;
pub mod selector;
