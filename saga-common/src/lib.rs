//! Saga Common - Shared types, utilities, and configuration for the SagaCrush services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration error types
//! - Logging setup and trace ID helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    BotConfig, Config, GatewayConfig, LlmConfig, ModerationConfig, NetworkConfig,
    ObservabilityConfig, RedisConfig, SecretsConfig, SessionConfig,
};
pub use error::{Error, Result};
