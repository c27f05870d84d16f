//! Client modules for the AmoCRM API

pub mod account;
pub mod amocrm;
pub mod token;
pub mod transport;

// Re-export all client types
pub use account::{AccountCache, AccountInfo};
pub use amocrm::{AmoClient, SearchQuery};
pub use token::{AuthState, TokenManager};
pub use transport::Transport;
