//! Ports - Trait definitions for the external collaborators.

pub mod object_store;
pub mod table_store;
pub mod transcoder;
