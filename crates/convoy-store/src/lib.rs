//! # convoy-store
//!
//! The shared real-time document store a convoy session is coordinated
//! through, backed by SQLite.
//!
//! Each session owns two collections: participant documents keyed by
//! participant id and annotation documents keyed by a store-generated id.
//! Every write is atomic per document; session teardown is one
//! multi-document transaction.  After each committed write the store
//! publishes a [`StoreEvent`] on a broadcast feed so that subscribers observe
//! live change-sets.
//!
//! Rows are decoded into strict records on read.  A row whose fields do not
//! fit the record (bad colour, out-of-range coordinate, impossible timestamp)
//! is reported as [`StoreError::Decode`] instead of being silently defaulted.

pub mod annotations;
pub mod changes;
pub mod database;
pub mod migrations;
pub mod models;
pub mod participants;
pub mod sessions;
pub mod traits;

mod error;

pub use changes::{Change, ChangeFeed, StoreEvent};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use traits::ConvoyStore;
