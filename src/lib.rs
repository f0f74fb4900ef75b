//! tams-tools - Time-addressable media store toolkit
//!
//! Hexagonal Architecture:
//! - domain/: Pure types and algorithms (timerange, entities, jobs, graph, form)
//! - ports/: Trait definitions for storage, queues, the transcoder and the TAMS API
//! - adapters/: Concrete implementations (S3, SQS, Lambda, ffmpeg, reqwest, axum)
//! - application/: Generic services (transform worker, catalog, diagram)
//! - config: Environment configuration
//!
//! # Features
//! - `aws`: S3/SQS adapters and the transform worker binary
//! - `api`: axum diagram service

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::timerange::{TimeMoment, Timerange, TimerangeError};

#[cfg(feature = "aws")]
pub use config::WorkerConfig;

#[cfg(feature = "api")]
pub use config::ApiConfig;

pub use config::{FeatureFlags, TamsConfig};
