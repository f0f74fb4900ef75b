//! Adapters - Concrete implementations of ports.

#[cfg(feature = "aws")]
pub mod aws;

pub mod ffmpeg;

#[cfg(feature = "api")]
pub mod http;

pub mod tams;
