use crate::domain::entities::GetUrl;
use crate::domain::timerange::{Timerange, TimerangeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Label fragment marking the object-storage access point among `get_urls`.
const STORAGE_URL_LABEL: &str = ":s3:";

/// A queued request to transcode segments into a destination flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(default)]
    pub segments: Vec<SegmentRef>,
    pub output_prefix: String,
    pub output_bucket: String,
    #[serde(alias = "outputFlow")]
    pub destination_flow: String,
    pub ffmpeg: FfmpegSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub object_id: String,
    #[serde(default)]
    pub get_urls: Vec<GetUrl>,
    pub timerange: String,
    /// Explicit location; takes precedence over `get_urls`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageLocation>,
}

impl SegmentRef {
    pub fn parsed_timerange(&self) -> Result<Timerange, TimerangeError> {
        self.timerange.parse()
    }

    pub fn location(&self) -> Result<StorageLocation, LocationError> {
        match &self.storage {
            Some(location) => Ok(location.clone()),
            None => StorageLocation::from_get_urls(&self.get_urls, &self.object_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegSpec {
    pub command: FfmpegCommand,
    pub output_format: String,
}

impl FfmpegSpec {
    /// Full argument list for a stdin-to-stdout run.
    pub fn pipe_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-i", "pipe:0"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.command.args());
        args.push("-f".to_string());
        args.push(self.output_format.clone());
        args.push("pipe:1".to_string());
        args
    }
}

/// Output options, either as a flat list or as a flag to value map.
/// Map entries keep their document order, since later ffmpeg options
/// override earlier ones. Entries with an empty or null value contribute
/// only the flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FfmpegCommand {
    Args(Vec<String>),
    Options(Map<String, Value>),
}

impl FfmpegCommand {
    pub fn args(&self) -> Vec<String> {
        match self {
            FfmpegCommand::Args(args) => args.clone(),
            FfmpegCommand::Options(options) => options
                .iter()
                .flat_map(|(flag, value)| [flag.clone(), option_text(value)])
                .filter(|arg| !arg.is_empty())
                .collect(),
        }
    }

    /// Value given for `flag`, e.g. the container passed with `-f`.
    pub fn option(&self, flag: &str) -> Option<String> {
        match self {
            FfmpegCommand::Args(args) => args
                .iter()
                .position(|arg| arg == flag)
                .and_then(|at| args.get(at + 1))
                .cloned(),
            FfmpegCommand::Options(options) => options.get(flag).map(option_text),
        }
    }
}

fn option_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Export step invoked directly on the worker, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum ExportAction {
    /// Join objects end to end into one `concat/` object.
    Concat(ExportRequest),
    /// Combine objects as separate inputs into one `export/` object.
    Merge(ExportRequest),
}

impl ExportAction {
    pub fn name(&self) -> &'static str {
        match self {
            ExportAction::Concat(_) => "CONCAT",
            ExportAction::Merge(_) => "MERGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub s3_objects: Vec<StorageLocation>,
    pub output_bucket: String,
    /// MIME type of the flow container, e.g. `video/mp2t`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_container: Option<String>,
    pub ffmpeg: ExportFfmpeg,
}

impl ExportRequest {
    /// MPEG-TS can be joined by appending bytes.
    pub fn is_mpegts_container(&self) -> bool {
        self.flow_container
            .as_deref()
            .is_some_and(|container| container.ends_with("/mp2t"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFfmpeg {
    pub command: FfmpegCommand,
}

impl ExportFfmpeg {
    /// Argument list for a file-to-file run: `inputs`, then the options,
    /// then `output`, overwritten if present.
    pub fn file_args(&self, inputs: Vec<String>, output: &str) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];
        args.extend(inputs);
        args.extend(self.command.args());
        args.push(output.to_string());
        args.push("-y".to_string());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutput {
    pub s3_object: StorageLocation,
}

/// Published once per transcoded segment for the ingest consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMessage {
    pub flow_id: String,
    pub timerange: String,
    pub uri: String,
    pub delete_source: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("segment {0} has no object storage url")]
    NoStorageUrl(String),
    #[error("cannot derive a bucket from {0}")]
    UnrecognisedUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub key: String,
}

impl StorageLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Picks the object-storage entry and reads the bucket from a
    /// virtual-hosted style host (`{bucket}.s3.{region}.amazonaws.com`).
    pub fn from_get_urls(get_urls: &[GetUrl], object_id: &str) -> Result<Self, LocationError> {
        let get_url = get_urls
            .iter()
            .find(|get_url| get_url.label.contains(STORAGE_URL_LABEL))
            .ok_or_else(|| LocationError::NoStorageUrl(object_id.to_string()))?;
        let unrecognised = || LocationError::UnrecognisedUrl(get_url.url.clone());

        let url = Url::parse(&get_url.url).map_err(|_| unrecognised())?;
        let host = url.host_str().ok_or_else(unrecognised)?;
        let bucket = host
            .find(".s3.")
            .or_else(|| host.find(".s3-"))
            .map(|at| &host[..at])
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(unrecognised)?;

        Ok(Self::new(bucket, object_id))
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
