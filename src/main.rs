use std::{process, sync::Arc};

use chrono::Utc;
use conteggio::{
    application::{
        error::AppError,
        pipeline::RollupPipeline,
        repos::{EventStore, ObjectStore},
    },
    config,
    infra::{
        db::PostgresEventStore,
        error::InfraError,
        object_store::{FsObjectStore, HttpObjectStore},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Run(_) => run_publish(settings).await,
        config::Command::Export(args) => run_export(settings, args).await,
        config::Command::Diff(_) => run_diff(settings).await,
    }
}

async fn run_publish(settings: config::Settings) -> Result<(), AppError> {
    let store = build_object_store(&settings)?;
    let pipeline = build_pipeline(&settings).await?;

    let report = pipeline.publish(store, Utc::now()).await?;
    info!(
        artifacts = report.artifact_count,
        uploaded = report.uploaded.len(),
        unchanged = report.unchanged,
        bytes = report.bytes_uploaded,
        "run complete"
    );
    Ok(())
}

async fn run_export(settings: config::Settings, args: config::ExportArgs) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings).await?;
    let written = pipeline.export(&args.out, Utc::now()).await?;
    info!(artifacts = written, dir = %args.out.display(), "export complete");
    Ok(())
}

async fn run_diff(settings: config::Settings) -> Result<(), AppError> {
    let store = build_object_store(&settings)?;
    let pipeline = build_pipeline(&settings).await?;

    let changed = pipeline.plan(store, Utc::now()).await?;
    if changed.is_empty() {
        info!("remote artifacts are up to date, nothing would upload");
    } else {
        for name in &changed {
            info!(artifact = %name, "would upload");
        }
        info!(count = changed.len(), "artifacts pending upload");
    }
    Ok(())
}

async fn build_pipeline(settings: &config::Settings) -> Result<RollupPipeline, AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database.url is required"))?;

    let store = PostgresEventStore::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    let events: Arc<dyn EventStore> = Arc::new(store);

    Ok(RollupPipeline::new(events, settings.source.clone()))
}

fn build_object_store(settings: &config::Settings) -> Result<Arc<dyn ObjectStore>, AppError> {
    let store = settings
        .store
        .as_ref()
        .ok_or_else(|| InfraError::configuration("store backend is not configured"))?;

    match &store.backend {
        config::StoreBackend::Http { base } => Ok(Arc::new(HttpObjectStore::new(
            base.clone(),
            store.request_timeout,
        )?)),
        config::StoreBackend::Filesystem { directory } => {
            Ok(Arc::new(FsObjectStore::new(directory.clone())?))
        }
    }
}
