//! Demo server selling API calls through the x402 payment gate.
//!
//! Four paid endpoints are served, two settled on an EIP-155 chain and two on
//! Solana, each through its own facilitator. Free endpoints (`/`, `/health`)
//! pass through the gate untouched.
//!
//! # Modules
//!
//! - [`config`] - Command line and environment configuration
//! - [`error`] - Startup and handler errors
//! - [`handlers`] - The business handlers behind the gate
//! - [`routes`] - Price catalog, gate assembly and router

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::ServerConfig;
pub use routes::{app, build_gate};
