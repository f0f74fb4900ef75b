//! Configuration for the worker and the diagram service.
//!
//! Everything is read from the environment after loading an optional
//! `.env` file. AWS region and credentials come from `aws-config` defaults.

use crate::adapters::tams::Credentials;
use serde::Serialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} env var required")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Empty values count as unset.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::Missing(name))
}

/// Configuration for the transform worker.
#[cfg(feature = "aws")]
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Queue receiving one completion message per transcoded segment
    pub ingest_queue_url: String,
    /// Queue polled for transform requests when not running under Lambda
    pub ffmpeg_queue_url: Option<String>,
    /// ffmpeg executable
    pub ffmpeg_bin: String,
    pub failure_policy: crate::application::worker::TranscodeFailurePolicy,
}

#[cfg(feature = "aws")]
impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let failure_policy = match var("TRANSCODE_FAILURE_POLICY") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "TRANSCODE_FAILURE_POLICY",
                value,
            })?,
            None => Default::default(),
        };

        Ok(Self {
            ingest_queue_url: required("INGEST_QUEUE_URL")?,
            ffmpeg_queue_url: var("FFMPEG_QUEUE_URL"),
            ffmpeg_bin: var("FFMPEG_BIN").unwrap_or_else(|| String::from("ffmpeg")),
            failure_policy,
        })
    }
}

/// How to reach and authenticate against the TAMS API.
#[derive(Clone, Debug)]
pub struct TamsConfig {
    pub endpoint: String,
    pub credentials: Credentials,
}

impl TamsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let credentials = if let Some(token) = var("TAMS_TOKEN") {
            Credentials::Static(token)
        } else if let Some(token_url) = var("TOKEN_URL") {
            Credentials::ClientCredentials {
                token_url,
                client_id: required("CLIENT_ID")?,
                client_secret: required("CLIENT_SECRET")?,
                scopes: parse_scopes(
                    &var("TAMS_SCOPES").unwrap_or_else(|| String::from("tams-api/read")),
                ),
            }
        } else {
            Credentials::Anonymous
        };

        Ok(Self {
            endpoint: required("TAMS_ENDPOINT")?,
            credentials,
        })
    }
}

/// Scopes may be separated by spaces or commas.
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration for the diagram service.
#[cfg(feature = "api")]
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
}

#[cfg(feature = "api")]
impl ApiConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: var("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: var("PORT").unwrap_or_else(|| String::from("3000")),
        }
    }
}

/// Optional components of a deployment. A component is enabled when the
/// variable naming its endpoint or ARN is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FeatureFlags {
    pub hls_ingest: bool,
    pub ffmpeg: bool,
    pub ffmpeg_batch: bool,
    pub ffmpeg_export: bool,
    pub mediaconvert: bool,
    pub replication: bool,
    pub omakase_export: bool,
}

impl FeatureFlags {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| var(name).is_some())
    }

    pub fn from_lookup(is_set: impl Fn(&str) -> bool) -> Self {
        Self {
            hls_ingest: is_set("HLS_INGEST_ENDPOINT"),
            ffmpeg: is_set("FFMPEG_ENDPOINT"),
            ffmpeg_batch: is_set("FFMPEG_BATCH_ARN"),
            ffmpeg_export: is_set("FFMPEG_EXPORT_ARN"),
            mediaconvert: is_set("MEDIACONVERT_ROLE_ARN") && is_set("MEDIACONVERT_BUCKET"),
            replication: is_set("REPLICATION_BATCH_ARN"),
            omakase_export: is_set("OMAKASE_EXPORT_EVENT_BUS"),
        }
    }
}
