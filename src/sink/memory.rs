use crate::core::{BatchError, Employee, RecordSink, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory store with a monotonic id sequence. A chunk is inserted
/// under one lock acquisition, so it is persisted all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    rows: Vec<Employee>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Employee> {
        self.inner.lock().expect("store lock poisoned").rows.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryStore {
    async fn write_chunk(&self, records: Vec<Employee>) -> Result<Vec<Employee>> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| BatchError::Write("store lock poisoned".to_string()))?;
        let persisted: Vec<Employee> = records
            .into_iter()
            .map(|record| {
                inner.next_id += 1;
                record.with_id(inner.next_id)
            })
            .collect();
        inner.rows.extend(persisted.iter().cloned());
        Ok(persisted)
    }
}
