#![doc = include_str!("../README.md")]
#![deny(missing_docs, rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]

pub mod auth;
pub mod client;
pub mod config;
pub mod gate;
pub mod interceptor;
pub mod legacy;
pub mod native;
pub mod record;
pub mod schema;
pub mod server;
pub mod store;

pub use self::config::{ConfigError, PluginSettings};
pub use self::gate::{GateError, MigrationGate, NoActionReason, Outcome};
pub use self::legacy::{LegacyScheme, LegacyVerifier, WordPressVerifier};
pub use self::server::{build_router, LoginState};
pub use self::store::{InMemoryRecordStore, RecordStore, StoreError};
