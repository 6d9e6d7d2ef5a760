pub mod git;
pub mod lock;
pub mod persistence;

pub use git::Git2Adapter;
pub use lock::OwnerLock;
pub use persistence::{
    FileConfigStore, FileRecordStore, FileTraceStore, MemoryRecordStore, MemoryTraceStore,
};
