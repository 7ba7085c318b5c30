//! Time Series Store Adapters
//!
//! Implementations of the snapshot history port.

pub mod in_memory;

pub use in_memory::InMemoryTimeSeriesStore;
