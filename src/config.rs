//! Configuration loaded from the environment.
//!
//! Each section is handed to the collaborator that needs it; nothing reads
//! the environment after startup.

use crate::error::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// HTTP trigger server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
}

/// Column names used in the source and destination tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMap {
    pub source_url: String,
    pub display_name: String,
    pub destination_folder: String,
    pub processed: String,
    pub segment_name: String,
    pub segment_url: String,
    /// Linked-record column pointing back at the source row
    pub segment_source: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            source_url: String::from("Google Drive URL"),
            display_name: String::from("Name"),
            destination_folder: String::from("Drive Folder ID"),
            processed: String::from("Video Processed"),
            segment_name: String::from("Name"),
            segment_url: String::from("File URL"),
            segment_source: String::from("Source Video"),
        }
    }
}

/// Airtable-style table store.
#[derive(Clone, Debug)]
pub struct TableStoreConfig {
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    /// Table holding the videos to split
    pub source_table: String,
    /// Table receiving one row per uploaded segment
    pub destination_table: String,
    pub view: Option<String>,
    pub fields: FieldMap,
    pub http: HttpTimeouts,
}

/// Per-connection limits of the HTTP clients.
///
/// There is no total request deadline here; a large body may stream for as
/// long as it keeps making progress. `PipelineConfig::call_timeout` bounds
/// the whole call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    /// Longest wait for the next chunk of a response
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(120),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectStoreBackend {
    Drive,
    Local,
}

impl FromStr for ObjectStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drive" => Ok(Self::Drive),
            "local" => Ok(Self::Local),
            _ => Err(()),
        }
    }
}

/// Object store receiving the segments.
#[derive(Clone, Debug)]
pub struct ObjectStoreConfig {
    pub backend: ObjectStoreBackend,
    pub access_token: String,
    /// Folder used when a record does not name one
    pub default_folder: String,
    /// Prefix turning an object id into a public download URL
    pub download_base_url: String,
    /// Endpoint opening a resumable upload session
    pub upload_url: String,
    /// Root directory of the local backend
    pub local_root: PathBuf,
    pub http: HttpTimeouts,
}

/// Knobs of the pipeline run itself.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub scratch_dir: PathBuf,
    pub segment_length_secs: f64,
    pub segment_extension: String,
    /// Number of records processed at the same time
    pub workers: usize,
    /// Records waiting for a free worker before pagination pauses
    pub queue_capacity: usize,
    /// Pause after a rate-limited page request
    pub rate_limit_backoff: Duration,
    /// Pause before retrying a transient remote failure
    pub retry_backoff: Duration,
    /// Upper bound for any single external call
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("ProcessedVideos"),
            segment_length_secs: 60.0,
            segment_extension: String::from("mp4"),
            workers: 4,
            queue_capacity: 32,
            rate_limit_backoff: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub table: TableStoreConfig,
    pub objects: ObjectStoreConfig,
    pub pipeline: PipelineConfig,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| String::from(default))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = FieldMap::default();
        let fields = FieldMap {
            source_url: var_or("FIELD_SOURCE_URL", &defaults.source_url),
            display_name: var_or("FIELD_DISPLAY_NAME", &defaults.display_name),
            destination_folder: var_or("FIELD_DESTINATION_FOLDER", &defaults.destination_folder),
            processed: var_or("FIELD_PROCESSED", &defaults.processed),
            segment_name: var_or("FIELD_SEGMENT_NAME", &defaults.segment_name),
            segment_url: var_or("FIELD_SEGMENT_URL", &defaults.segment_url),
            segment_source: var_or("FIELD_SEGMENT_SOURCE", &defaults.segment_source),
        };

        let http_defaults = HttpTimeouts::default();
        let http = HttpTimeouts {
            connect: Duration::from_secs(parsed(
                "HTTP_CONNECT_TIMEOUT_SECS",
                http_defaults.connect.as_secs(),
            )?),
            read: Duration::from_secs(parsed("HTTP_READ_TIMEOUT_SECS", http_defaults.read.as_secs())?),
        };

        let table = TableStoreConfig {
            api_url: var_or("AIRTABLE_API_URL", "https://api.airtable.com/v0"),
            api_key: required("AIRTABLE_API_KEY")?,
            base_id: required("AIRTABLE_BASE_ID")?,
            source_table: required("AIRTABLE_SOURCE_TABLE_ID")?,
            destination_table: required("AIRTABLE_DESTINATION_TABLE_ID")?,
            view: env::var("AIRTABLE_VIEW_ID").ok().filter(|v| !v.is_empty()),
            fields,
            http,
        };

        let backend_raw = var_or("OBJECT_STORE", "drive");
        let backend = backend_raw
            .parse::<ObjectStoreBackend>()
            .map_err(|_| ConfigError::Invalid {
                name: "OBJECT_STORE",
                value: backend_raw.clone(),
            })?;
        let access_token = match backend {
            ObjectStoreBackend::Drive => required("DRIVE_ACCESS_TOKEN")?,
            ObjectStoreBackend::Local => var_or("DRIVE_ACCESS_TOKEN", ""),
        };

        let objects = ObjectStoreConfig {
            backend,
            access_token,
            default_folder: var_or("DRIVE_FOLDER_ID", ""),
            download_base_url: var_or(
                "DRIVE_DOWNLOAD_BASE_URL",
                "https://drive.google.com/uc?export=download&id=",
            ),
            upload_url: var_or(
                "DRIVE_UPLOAD_URL",
                "https://www.googleapis.com/upload/drive/v3/files?uploadType=resumable",
            ),
            local_root: PathBuf::from(var_or("LOCAL_STORE_DIR", "./store")),
            http,
        };

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            scratch_dir: PathBuf::from(var_or("SCRATCH_DIR", "ProcessedVideos")),
            segment_length_secs: parsed("SEGMENT_LENGTH_SECS", pipeline_defaults.segment_length_secs)?,
            segment_extension: var_or("SEGMENT_EXTENSION", &pipeline_defaults.segment_extension),
            workers: parsed("WORKERS", pipeline_defaults.workers)?.max(1),
            queue_capacity: parsed("QUEUE_CAPACITY", pipeline_defaults.queue_capacity)?.max(1),
            rate_limit_backoff: Duration::from_secs(parsed("RATE_LIMIT_BACKOFF_SECS", 30u64)?),
            retry_backoff: Duration::from_millis(parsed("RETRY_BACKOFF_MS", 1000u64)?),
            call_timeout: Duration::from_secs(parsed("CALL_TIMEOUT_SECS", 600u64)?),
        };
        if !(pipeline.segment_length_secs > 0.0) {
            return Err(ConfigError::Invalid {
                name: "SEGMENT_LENGTH_SECS",
                value: pipeline.segment_length_secs.to_string(),
            });
        }

        Ok(Self {
            server: ServerConfig {
                addr: var_or("ADDR", "127.0.0.1"),
                port: var_or("PORT", "8080"),
            },
            table,
            objects,
            pipeline,
        })
    }
}
