pub mod file;
pub mod memory;

pub use self::file::JsonLinesStore;
pub use self::memory::MemoryStore;
