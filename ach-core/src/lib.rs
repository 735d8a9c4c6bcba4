#![doc = "ach-core: session bootstrap, bulk export/import and migration scripts for ach."]

//! This crate holds everything ach does against a document platform, expressed
//! over the [`contract::Connector`] and [`contract::Platform`] traits. The HTTP
//! client for a real instance and the command line live in the `ach` crate.
//!
//! # Modules
//! - [`session`]: stored token or interactive authorization, then revocation
//! - [`export`] / [`import`]: the bulk data pipeline in both directions
//! - [`script`]: registry and harness for migration scripts

pub mod authorize;
pub mod callback;
pub mod config;
pub mod contract;
pub mod diff;
pub mod error;
pub mod export;
pub mod import;
pub mod revoke;
pub mod script;
pub mod session;
pub mod token_store;

pub use error::AchError;
pub use session::{create_session, Session};
