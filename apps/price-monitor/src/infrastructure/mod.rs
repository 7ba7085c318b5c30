//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Exchange WebSocket feeds (Binance, Backpack).
pub mod exchange;

/// Headless browser render sessions.
pub mod browser;

/// Broadcast channels for update fan-out to async subscribers.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Snapshot history stores.
pub mod store;

/// OpenTelemetry tracing integration.
pub mod telemetry;
