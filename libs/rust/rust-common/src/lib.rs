//! Shared library for cross-cutting concerns in TokenShield's Rust services.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building
//! - Retry policies with exponential backoff
//! - Circuit breaker pattern for resilience
//! - OpenTelemetry tracing integration
//! - Prometheus-style metrics helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod circuit_breaker;
pub mod tracing_config;
pub mod metrics;

pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use retry::{RetryPolicy, RetryConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
