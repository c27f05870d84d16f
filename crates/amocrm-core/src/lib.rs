//! AmoCRM Integration Core
//!
//! CRM API client and contact-matching engine: OAuth token lifecycle,
//! account metadata caching, typed search/create operations, and the
//! grading heuristic that decides create-vs-reuse for incoming leads.

pub mod clients;
pub mod config;
pub mod constants;
pub mod error;
pub mod services;
pub mod store;

// Re-export main types for easy access
pub use config::AmoConfig;
pub use error::{AmoError, Result};

// Re-export all client types
pub use clients::{AccountCache, AccountInfo, AmoClient, AuthState, SearchQuery, TokenManager};

// Re-export service types
pub use services::{ImportOutcome, LeadImport, LeadImporter};

// Re-export the shared domain types
pub use amocrm_types::{
    Contact, CustomFieldDef, CustomFieldValues, Deal, FieldKind, FieldValue, Lead, MatchResult,
    NewDeal, Pipeline, PipelineStatus, SearchKind,
};
