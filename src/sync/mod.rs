//! Desired-state reconciliation against the tracker.

pub mod differ;
pub mod engine;
pub mod prune;
pub mod resolver;
