//! WeChat Exporter Library
//!
//! Rebuilds chat histories from an unencrypted iOS device backup: the
//! backup manifest is indexed, account settings and contacts are decoded,
//! sessions are enumerated across message shards and every stored message
//! is normalized into a render-ready record.

pub mod accounts;
pub mod backup;
pub mod config;
pub mod contacts;
mod db;
pub mod error;
pub mod export;
pub mod mmkv;
pub mod model;
pub mod normalizer;
pub mod services;
pub mod sessions;
pub mod wire;

pub use accounts::Account;
pub use backup::{BackupError, BackupIndex, PathFilter};
pub use config::Config;
pub use contacts::ContactExtractor;
pub use error::ExtractError;
pub use export::Exporter;
pub use model::{ContactBook, MessageKind, NormalizedMessage, Profile, RawMessageRow, Session};
pub use normalizer::{MessageNormalizer, MessageSink, NormalizeOutcome, ParseOptions, SinkControl};
pub use sessions::SessionExtractor;
