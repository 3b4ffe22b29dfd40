//! wg-portal web server.
//!
//! This crate provides the HTTP front door of the portal: session handling,
//! the login flows for the configured identity providers and the route
//! guard protecting the admin pages.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
