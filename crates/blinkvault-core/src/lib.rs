//! Core library for the BlinkVault client.
//!
//! - `auth`: session lifecycle (`SessionManager`), token persistence, view guards
//! - `api`: request pipeline with refresh-on-401 and the typed `BlinkVaultClient`
//! - `models`: users, posts, notifications and admin records
//! - `config`: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
mod testing;

pub use api::{ApiError, BlinkVaultClient, RequestPipeline};
pub use auth::{SessionEvent, SessionManager, SessionSnapshot, SignOutReason};
pub use config::Config;
