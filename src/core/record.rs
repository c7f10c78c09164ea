use crate::core::{Result, Transform};
use serde::{Deserialize, Serialize};

/// Column order of the input file. The transformer consumes this table
/// positionally instead of mapping header names at runtime.
pub const EMPLOYEE_COLUMNS: [&str; 6] = ["id", "name", "company", "email", "email2", "profession"];

/// One tokenized input line. Carries no identity beyond field position;
/// the line number is kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(line: usize, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The persisted entity. `id` stays `None` until the sink assigns it;
/// the remaining fields are plain strings, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Employee {
    pub id: Option<u64>,
    pub name: String,
    pub company: String,
    pub email: String,
    pub email2: String,
    pub profession: String,
}

impl Employee {
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Default transform: positional copy per `EMPLOYEE_COLUMNS`. The input
/// `id` column is ignored; identifiers are owned by the sink.
#[derive(Debug, Clone, Default)]
pub struct EmployeeMapper;

impl Transform for EmployeeMapper {
    fn transform(&self, record: RawRecord) -> Result<Option<Employee>> {
        Ok(Some(Employee {
            id: None,
            name: record.field(1).to_string(),
            company: record.field(2).to_string(),
            email: record.field(3).to_string(),
            email2: record.field(4).to_string(),
            profession: record.field(5).to_string(),
        }))
    }
}
