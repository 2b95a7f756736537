//! Generative-service boundary for the Hive pipeline.
//!
//! Provides the `GenerativeService` trait consumed by the pipeline core, the
//! `ProviderAdapter` trait with an Anthropic Messages implementation,
//! `LlmClient` with a middleware chain, and `TransportConfig` for per-client
//! HTTP settings.

mod anthropic;
mod client;
mod provider;
mod service;
mod transport;
mod types;

pub use anthropic::AnthropicAdapter;
pub use client::*;
pub use provider::*;
pub use service::GenerativeService;
pub use transport::TransportConfig;
pub use types::*;
