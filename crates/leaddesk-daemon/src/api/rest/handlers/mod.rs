//! API request handlers

mod activities;
mod audit;
mod health;
mod leads;
mod public;
mod quotes;
mod reports;

pub use activities::*;
pub use audit::*;
pub use health::*;
pub use leads::*;
pub use public::*;
pub use quotes::*;
pub use reports::*;
