//! Reference-data service client module.
//!
//! Read-only lookup lists (grades, classes, subjects) used to populate
//! selection fields.

mod client;
mod error;

pub use client::ReferenceClient;
pub use error::{ReferenceError, ReferenceResult};
