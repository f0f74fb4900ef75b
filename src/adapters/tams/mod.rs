//! Outbound adapter for the TAMS REST API.

pub mod auth;
pub mod http;

pub use auth::{Credentials, TokenProvider};
pub use http::TamsClient;
