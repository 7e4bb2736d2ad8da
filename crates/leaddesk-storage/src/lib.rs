//! LeadDesk storage abstractions.
//!
//! Every multi-record change (intake, status move, quote issue, acceptance)
//! is one storage call so that backends can run it in a single transaction:
//! - PostgreSQL is the transactional source of truth (`postgres` feature).
//! - The in-memory backend serializes writers behind one lock and is meant
//!   for development and tests.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod records;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryStorage;
pub use model::{
    AcceptQuote, AcceptedQuote, AuditFilter, CreatedQuote, LeadFilter, LeadTransition,
    NewQuoteVersion, QueryWindow,
};
pub use traits::{
    AcceptanceStore, ActivityStore, AuditStore, LeadDeskStorage, LeadStore, QuoteStore,
};
