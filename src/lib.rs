//! prchat: pull request chat relay (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod augment;
pub mod chat;
pub mod config;
pub mod constants;
pub mod diffs;
pub mod env;
pub mod history;
pub mod models;
pub mod providers;
pub mod secrets;
pub mod server;
