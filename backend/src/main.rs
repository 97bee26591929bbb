use actix_web::{web, App, HttpServer};
use anyhow::Context;
use env_logger::Env;
use log::{info, warn};
use rowpipe::config::AppConfig;
use rowpipe::job_controller::registry::JobRegistry;
use rowpipe::job_controller::runner::{JobRunner, RunnerConfig};
use rowpipe::services::{self, AppState};
use rowpipe::storage::FileStorage;
use rowpipe::store::SqliteStore;
use tokio::runtime::Handle;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let config = AppConfig::load()?;

    let storage = FileStorage::new(&config.storage_dir);
    storage
        .init()
        .with_context(|| format!("cannot create {}", config.storage_dir.display()))?;

    // Create the schema up front so report queries work before the first load.
    SqliteStore::open(&config.database_path)
        .with_context(|| format!("cannot open {}", config.database_path.display()))?;

    let registry = JobRegistry::new();
    let runner = JobRunner::new(
        registry.clone(),
        RunnerConfig {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        },
        Handle::current(),
    );
    let state = AppState {
        registry,
        runner: runner.clone(),
        storage,
        config: config.clone(),
    };

    info!(
        "Server running at http://{}:{} ({} workers, queue of {})",
        config.host, config.port, config.workers, config.queue_capacity
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(services::students::configure_routes())
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    info!("HTTP server stopped, draining jobs");
    if !runner.shutdown(config.shutdown_grace).await {
        // Dropping the runtime would wait for the blocking pool without limit.
        warn!("Exiting with unfinished jobs");
        std::process::exit(1);
    }
    Ok(())
}
