//! Adapters implementing the domain ports: stores, processor drivers, event sinks.

pub mod events;
pub mod in_memory;
pub mod processors;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
