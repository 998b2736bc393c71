//! Application layer - Generic services that use ports.

pub mod dispatcher;
pub mod fetcher;
pub mod pipeline;
pub mod processor;
pub mod retry;
pub mod scratch;
pub mod transfer;
