//! Business operations behind the REST handlers
//!
//! Each operation validates its input, runs one storage transaction and
//! publishes the resulting domain events once the transaction has committed.

pub mod acceptance;
pub mod leads;
pub mod quotes;
pub mod reporting;
