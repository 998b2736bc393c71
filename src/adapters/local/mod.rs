//! Adapters for single-host runs.

pub mod fs;

pub use fs::LocalObjectStore;
