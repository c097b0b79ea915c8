//! Application Layer
//!
//! Contains the connection manager, its subscribers and the wire
//! envelopes. This layer drives the domain types and consumes the
//! collaborator traits that the infrastructure layer implements.

pub mod services;
pub mod dto;
