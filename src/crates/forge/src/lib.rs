//! Template-driven LLM generation service
//!
//! Users keep parameterized prompt [templates](templates::Template), submit
//! generation jobs against a pluggable set of LLM providers, follow job
//! progress and export completed results.
//!
//! - [`services`]: template, provider and generation operations
//! - [`execution`]: the job processor and the worker pool that runs it
//! - [`export`]: result exporter and binary encoders
//! - [`db`]: storage traits with in-memory and SQLite backends
//! - [`api`]: axum HTTP surface
//! - [`app`]: assembly from a [`config::ServerConfig`]

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod export;
pub mod services;

pub use error::{ForgeError, Result};
