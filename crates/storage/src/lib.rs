//! Storage - backend implementations for the scan orchestrator

mod memory;

pub use memory::MemoryBackend;
