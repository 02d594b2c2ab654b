//! Status model and reconciliation.
//!
//! Raw codes reported by a driver are classified by severity
//! ([`StatusCollection`]), cleaned up and debounced ([`StatusTracker`]),
//! recorded in a bounded history ([`HistoryList`]) and finally turned into
//! a [`StatusSignal`] for the host.

mod bitmap;
pub mod codes;
mod collection;
mod history;
mod tracker;

pub use bitmap::BitmapCodeSpecification;
pub use codes::{StatusCode, StatusSpecification, StatusSpecifications};
pub use collection::{StatusCodes, StatusCollection, describe_codes, translate_codes};
pub use history::HistoryList;
pub use tracker::{CleanContext, Publication, StatusPolicy, StatusSignal, StatusTracker};
