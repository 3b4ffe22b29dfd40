//! Core domain types and utilities for wg-portal.
//!
//! This crate provides the identifier types and the error handling
//! foundation shared by the access-control library and the web server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ProviderId, SessionId, UserIdentifier};
