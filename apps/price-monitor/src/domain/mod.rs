//! Domain Layer - Core price and connection types.
//!
//! Pure types with serialization support and no I/O: quotes, order books,
//! aggregated snapshots, and the connection state machine vocabulary.

/// Quotes, order books and aggregated snapshots.
pub mod market;

/// Render session connection states and transitions.
pub mod connection;
