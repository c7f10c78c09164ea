use batchpipe::schedule::execute_run;
use batchpipe::sink::{JsonLinesStore, MemoryStore};
use batchpipe::source::CsvSource;
use batchpipe::{
    AppConfig, ChunkExecutor, EMPLOYEE_COLUMNS, EmployeeMapper, JobParams, JobRegistry, RecordSink,
    Scheduler,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    info!(?config, "starting batchpipe");

    let source = Arc::new(
        CsvSource::new(&config.input_path)
            .with_lines_to_skip(config.lines_to_skip)
            .with_expected_fields(EMPLOYEE_COLUMNS.len())
            .with_strict(config.strict),
    );

    let sink: Arc<dyn RecordSink> = if config.store_path.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(JsonLinesStore::new(&config.store_path))
    };

    let registry = if config.journal_path.is_empty() {
        Arc::new(JobRegistry::new())
    } else {
        Arc::new(JobRegistry::with_journal(&config.journal_path))
    };

    let executor = Arc::new(ChunkExecutor::new(
        Arc::new(EmployeeMapper),
        sink,
        config.chunk_config(),
    ));

    let abandoned = registry.recover()?;
    if !abandoned.is_empty() {
        warn!(count = abandoned.len(), "abandoned runs found in journal");
        if config.restart_abandoned {
            let run = registry.start(&config.job_name, JobParams::now())?;
            info!(run_id = run.id, "launching catch-up run for abandoned work");
            tokio::spawn(execute_run(
                run.id,
                registry.clone(),
                executor.clone(),
                source.clone(),
            ));
        }
    }

    // Fails here, at startup, on a bad expression.
    let scheduler = Scheduler::new(
        config.job_name.as_str(),
        &config.schedule,
        registry,
        executor,
        source,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    Ok(())
}
