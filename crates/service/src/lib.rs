//! AgentPay Service - application context and CLI orchestration
//!
//! This crate provides the `agentpay` binary, the `AppContext` that wires
//! every component together, and the platform configuration.

pub mod commands;
pub mod config;
pub mod context;

pub use config::PlatformConfig;
pub use context::AppContext;
