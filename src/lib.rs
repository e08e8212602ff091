//! Library crate for portscan-rs: probe, scan executor, scan cache and the
//! discovery-driven background scanner behind the query interface.
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod orchestrator;
pub mod ports;
pub mod probe;
pub mod query;
pub mod scanner;
pub mod server;
pub mod service;
pub mod types;
pub mod workqueue;

pub use error::{Error, Result};
