//! Domain layer - Pure business logic.

pub mod plan;
pub mod records;
pub mod segments;
