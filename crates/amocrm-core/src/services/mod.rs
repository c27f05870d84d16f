//! Business logic on top of the API client

pub mod import;
pub mod matcher;

pub use import::{ImportOutcome, LeadImport, LeadImporter};
