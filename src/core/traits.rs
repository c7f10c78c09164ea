use crate::core::{Employee, RawRecord, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

pub type RawRecordStream = Pin<Box<dyn Stream<Item = Result<RawRecord>> + Send>>;

/// Produces a lazy, finite sequence of raw records. Not safe for
/// concurrent readers: exactly one consumer drives the stream.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn open(&self) -> Result<RawRecordStream>;
}

/// Pure per-record mapping. `Ok(None)` filters the record out; `Err`
/// is a per-record transform failure. Synchronous on purpose: no I/O,
/// no shared mutable state.
pub trait Transform: Send + Sync {
    fn transform(&self, record: RawRecord) -> Result<Option<Employee>>;
}

/// Persists exactly one chunk per call, all-or-nothing. On success the
/// returned records carry sink-assigned identifiers; on error the caller
/// treats the whole chunk as not persisted.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write_chunk(&self, records: Vec<Employee>) -> Result<Vec<Employee>>;
}
