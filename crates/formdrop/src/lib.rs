//! `formdrop` - A minimal local web form collector
//!
//! An HTTP front end serves a small site and forwards every form POST, still
//! URL-encoded, over a local UDP channel. A collector receives those
//! datagrams, decodes them into flat records and appends each one, keyed by
//! timestamp, to a JSON file.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod channel;
pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod record;
pub mod service;
pub mod store;

pub use app::{RunMode, Running};
pub use channel::{IngestReceiver, IngestSender};
pub use collector::{Collector, CollectorState, CollectorStats};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::Record;
pub use store::{Store, StoreStats};
