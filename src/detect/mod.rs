//! Detector wire contract.
//!
//! The remote detector answers every binary frame with one UTF-8 JSON
//! document. Results are transient: each one replaces the last wholesale.

mod result;

pub use result::{DetectionItem, DetectionResult};
