//! Discovery and sync core for the docsync project-documentation manager.
//!
//! This crate owns the hard reconciliation problem: keeping a markdown
//! Epic/Feature/Task hierarchy on disk in sync with a SQLite-backed
//! relational store. It has no opinion about command-line argument
//! parsing or terminal output — see the `docsync` binary crate for that.

pub mod cancel;
pub mod config;
pub mod conflict;
pub mod db;
pub mod discovery;
pub mod error;
pub mod frontmatter;
pub mod index_parser;
pub mod keygen;
pub mod metadata;
pub mod pattern;
pub mod path_resolver;
pub mod scanner;
pub mod sync;
pub mod types;

pub use cancel::CancellationToken;
pub use config::Config;
pub use error::{DocSyncError, ParseWarning};
pub use sync::{SyncEngine, SyncOptions, SyncReport};
pub use types::{Epic, Feature, Priority, Task, TaskHistory, Workflow};
