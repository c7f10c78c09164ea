use crate::core::{Employee, RecordSink, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// File-backed store appending each persisted chunk as JSON lines.
///
/// The whole chunk is serialized into one buffer before anything touches
/// the file, and the id sequence advances only after a successful
/// write+flush, so a failed chunk assigns no identifiers.
pub struct JsonLinesStore {
    file_path: String,
    inner: Mutex<Inner>,
}

struct Inner {
    writer: Option<BufWriter<tokio::fs::File>>,
    next_id: u64,
}

impl JsonLinesStore {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().into_owned(),
            inner: Mutex::new(Inner { writer: None, next_id: 0 }),
        }
    }

    async fn ensure_writer(&self, inner: &mut Inner) -> Result<()> {
        if inner.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .await?;
            inner.writer = Some(BufWriter::new(file));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonLinesStore {
    async fn write_chunk(&self, records: Vec<Employee>) -> Result<Vec<Employee>> {
        let mut inner = self.inner.lock().await;
        self.ensure_writer(&mut inner).await?;

        let base = inner.next_id;
        let persisted: Vec<Employee> = records
            .into_iter()
            .enumerate()
            .map(|(offset, record)| record.with_id(base + offset as u64 + 1))
            .collect();

        let mut buffer = String::new();
        for record in &persisted {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        if let Some(writer) = inner.writer.as_mut() {
            writer.write_all(buffer.as_bytes()).await?;
            writer.flush().await?;
        }

        inner.next_id += persisted.len() as u64;
        Ok(persisted)
    }
}
