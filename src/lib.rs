//! Reelsplit - batch video splitting pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (segment plan, records, segment naming)
//! - ports/: Trait definitions (table store, object store, transcoder)
//! - adapters/: Concrete implementations (Airtable, Drive, local fs, ffmpeg)
//! - application/: Generic services (fetcher, dispatcher, processor, pipeline)
//! - config: Environment configuration
//! - server: HTTP trigger

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod server;

pub use application::pipeline::{Pipeline, RunReport};
pub use config::AppConfig;
pub use error::PipelineError;
