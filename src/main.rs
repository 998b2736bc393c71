use reelsplit::adapters::airtable::AirtableStore;
use reelsplit::adapters::drive::DriveStore;
use reelsplit::adapters::ffmpeg::{cmd::RealTranscodeExecutor, FfmpegTranscoder};
use reelsplit::adapters::local::LocalObjectStore;
use reelsplit::application::pipeline::RunTrigger;
use reelsplit::config::{AppConfig, ObjectStoreBackend};
use reelsplit::ports::object_store::ObjectStore;
use reelsplit::ports::table_store::TableStore;
use reelsplit::{server, Pipeline};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reelsplit=info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let tables = match AirtableStore::new(&config.table) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to build table store client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let trigger = match config.objects.backend {
        ObjectStoreBackend::Drive => match DriveStore::new(&config.objects) {
            Ok(store) => build(&config, tables, Arc::new(store)),
            Err(e) => {
                error!("Failed to build object store client: {}", e);
                return ExitCode::FAILURE;
            }
        },
        ObjectStoreBackend::Local => build(
            &config,
            tables,
            Arc::new(LocalObjectStore::new(&config.objects.local_root)),
        ),
    };
    info!(
        backend = ?config.objects.backend,
        workers = config.pipeline.workers,
        scratch = ?config.pipeline.scratch_dir,
        "Pipeline ready"
    );

    if let Err(e) = server::serve(&config.server, trigger).await {
        error!("Server failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn build<T, S>(config: &AppConfig, tables: Arc<T>, objects: Arc<S>) -> Arc<dyn RunTrigger>
where
    T: TableStore + 'static,
    S: ObjectStore + 'static,
{
    let transcoder = Arc::new(FfmpegTranscoder::new(RealTranscodeExecutor));
    Arc::new(Pipeline::from_config(config, tables, objects, transcoder))
}
