// # Cache Store Implementations
//
// This module provides implementations of the CacheStore trait for
// different persistence strategies. Both share the table logic in `tables`.

pub mod file;
pub mod memory;
mod tables;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
