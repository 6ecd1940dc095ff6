//! Utility library for the MPBench project

pub mod other;
pub mod serde;
