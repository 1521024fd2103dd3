mod in_memory;
mod log;
mod log_entry;
mod storage;

pub use in_memory::InMemoryStore;
pub use log::Log;
pub use log::LogStore;
pub use log::LogStoreError;
pub use log_entry::Epoch;
pub use log_entry::LogEntry;
pub use log_entry::Offset;
pub use storage::JsonFileStore;
