//! End-to-end import runs against real files.

use batchpipe::schedule::execute_run;
use batchpipe::sink::MemoryStore;
use batchpipe::source::CsvSource;
use batchpipe::{
    ChunkConfig, ChunkExecutor, EMPLOYEE_COLUMNS, EmployeeMapper, JobParams, JobRegistry, JobState,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn employee_csv(lines: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,name,company,email,email2,profession").unwrap();
    for i in 0..lines {
        writeln!(file, "{i},name-{i},acme,e{i}@acme.test,alt{i}@acme.test,clerk").unwrap();
    }
    file
}

fn wiring(
    file: &NamedTempFile,
    config: ChunkConfig,
) -> (Arc<JobRegistry>, Arc<ChunkExecutor>, Arc<CsvSource>, Arc<MemoryStore>) {
    let registry = Arc::new(JobRegistry::new());
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ChunkExecutor::new(Arc::new(EmployeeMapper), store.clone(), config));
    let source = Arc::new(
        CsvSource::new(file.path()).with_expected_fields(EMPLOYEE_COLUMNS.len()),
    );
    (registry, executor, source, store)
}

#[tokio::test]
async fn imports_every_data_line_of_the_file() {
    let file = employee_csv(25);
    let (registry, executor, source, store) = wiring(&file, ChunkConfig::default());

    let run = registry.start("import-employees", JobParams::now()).unwrap();
    execute_run(run.id, registry.clone(), executor, source).await;

    let run = registry.get(run.id).unwrap();
    assert_eq!(run.state, JobState::Completed);

    let report = run.report.unwrap();
    assert_eq!(report.lines_read, 25);
    assert_eq!(report.chunks_submitted, 3);
    assert_eq!(report.records_written, 25);
    assert_eq!(store.len(), 25);

    // every row got a unique identifier from the store
    let mut ids: Vec<u64> = store.snapshot().iter().map(|e| e.id.unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 25);
}

#[tokio::test]
async fn short_lines_are_padded_in_non_strict_mode() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,name,company,email,email2,profession").unwrap();
    writeln!(file, "1,Ada,Initech,ada@initech.test").unwrap();

    let (registry, executor, source, store) = wiring(&file, ChunkConfig::default());
    let run = registry.start("import-employees", JobParams::now()).unwrap();
    execute_run(run.id, registry.clone(), executor, source).await;

    let rows = store.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Ada");
    assert_eq!(rows[0].email, "ada@initech.test");
    assert_eq!(rows[0].email2, "");
    assert_eq!(rows[0].profession, "");
}

#[tokio::test]
async fn strict_mode_drops_malformed_lines_and_completes() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "id,name,company,email,email2,profession").unwrap();
    for i in 0..12 {
        if i == 4 {
            writeln!(file, "{i},short-{i}").unwrap();
        } else {
            writeln!(file, "{i},name-{i},acme,e{i}@acme.test,,clerk").unwrap();
        }
    }

    let registry = Arc::new(JobRegistry::new());
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ChunkExecutor::new(
        Arc::new(EmployeeMapper),
        store.clone(),
        ChunkConfig::default(),
    ));
    let source = Arc::new(
        CsvSource::new(file.path())
            .with_expected_fields(EMPLOYEE_COLUMNS.len())
            .with_strict(true),
    );

    let run = registry.start("import-employees", JobParams::now()).unwrap();
    execute_run(run.id, registry.clone(), executor, source).await;

    let run = registry.get(run.id).unwrap();
    assert_eq!(run.state, JobState::Completed);

    let report = run.report.unwrap();
    assert_eq!(report.parse_errors, 1);
    assert_eq!(report.records_written, 11);
    assert_eq!(store.len(), 11);
}

#[tokio::test]
async fn second_run_of_the_same_job_waits_for_the_first() {
    let file = employee_csv(5);
    let (registry, executor, source, _) = wiring(&file, ChunkConfig::default());

    let first = registry.start("import-employees", JobParams::at(1)).unwrap();
    registry.dispatch(first.id).unwrap();

    // identical params and fresh params are both rejected while live
    assert!(registry.start("import-employees", JobParams::at(1)).is_err());
    assert!(registry.start("import-employees", JobParams::at(2)).is_err());

    registry
        .complete(
            first.id,
            batchpipe::RunOutcome::Failed { report: None, error: "interrupted".to_string() },
        )
        .unwrap();

    let second = registry.start("import-employees", JobParams::at(2)).unwrap();
    execute_run(second.id, registry.clone(), executor, source).await;
    assert_eq!(registry.get(second.id).unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn journal_survives_a_simulated_restart() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("runs.json");
    let file = employee_csv(3);

    {
        let registry = Arc::new(JobRegistry::with_journal(&journal));
        let run = registry.start("import-employees", JobParams::at(1000)).unwrap();
        registry.dispatch(run.id).unwrap();
        // process dies mid-run
    }

    let registry = Arc::new(JobRegistry::with_journal(&journal));
    let abandoned = registry.recover().unwrap();
    assert_eq!(abandoned.len(), 1);

    // catch-up run starts from scratch and completes
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(ChunkExecutor::new(
        Arc::new(EmployeeMapper),
        store.clone(),
        ChunkConfig::default(),
    ));
    let source = Arc::new(
        CsvSource::new(file.path()).with_expected_fields(EMPLOYEE_COLUMNS.len()),
    );
    let run = registry.start("import-employees", JobParams::at(2000)).unwrap();
    execute_run(run.id, registry.clone(), executor, source).await;

    assert_eq!(registry.get(run.id).unwrap().state, JobState::Completed);
    assert_eq!(store.len(), 3);
    assert_eq!(
        registry
            .runs()
            .iter()
            .filter(|r| r.state == JobState::Abandoned)
            .count(),
        1
    );
}
