//! Authentication
//!
//! Token storage shared by every channel of a session.

mod token_store;

pub use token_store::TokenStore;
