//! TAMS Source, Flow and Segment records.
//!
//! Only the fields this crate reads are typed; everything else the store
//! returns is kept in `extra` so a record can be written back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const FORMAT_MULTI: &str = "urn:x-nmos:format:multi";
pub const FORMAT_VIDEO: &str = "urn:x-nmos:format:video";
pub const FORMAT_AUDIO: &str = "urn:x-nmos:format:audio";
pub const FORMAT_DATA: &str = "urn:x-nmos:format:data";

/// Record field the store bumps on every segment write.
pub const SEGMENTS_UPDATED: &str = "segments_updated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, TagValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collected_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_collection: Vec<CollectionItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub source_id: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, TagValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collected_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_collection: Vec<CollectionItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUrl {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub object_id: String,
    pub timerange: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub get_urls: Vec<GetUrl>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Source,
    Flow,
}

impl EntityKind {
    /// Collection segment of the REST path.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Source => "sources",
            EntityKind::Flow => "flows",
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        match collection {
            "sources" => Some(EntityKind::Source),
            "flows" => Some(EntityKind::Flow),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Source => "source",
            EntityKind::Flow => "flow",
        })
    }
}

/// Identity of a Source or Flow, rendered as its REST path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Source,
            id: id.into(),
        }
    }

    pub fn flow(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Flow,
            id: id.into(),
        }
    }

    /// Accepts `/flows/{id}`, `flows/{id}`, `/sources/{id}` or `sources/{id}`.
    pub fn from_path(path: &str) -> Option<Self> {
        let mut parts = path.trim_start_matches('/').splitn(2, '/');
        let kind = EntityKind::from_collection(parts.next()?)?;
        let id = parts.next().filter(|id| !id.is_empty() && !id.contains('/'))?;
        Some(Self {
            kind,
            id: id.to_string(),
        })
    }

    pub fn path(&self) -> String {
        format!("/{}/{}", self.kind.collection(), self.id)
    }

    /// Node identifier used by the diagram views (`flows/{id}`).
    pub fn node_id(&self) -> String {
        format!("{}/{}", self.kind.collection(), self.id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Source(Source),
    Flow(Flow),
}

impl Entity {
    pub fn id(&self) -> &str {
        match self {
            Entity::Source(source) => &source.id,
            Entity::Flow(flow) => &flow.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Source(_) => EntityKind::Source,
            Entity::Flow(_) => EntityKind::Flow,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind(),
            id: self.id().to_string(),
        }
    }

    pub fn format(&self) -> &str {
        match self {
            Entity::Source(source) => &source.format,
            Entity::Flow(flow) => &flow.format,
        }
    }

    /// Last component of the format URN (`video`, `audio`, ...).
    pub fn format_name(&self) -> &str {
        self.format().rsplit(':').next().unwrap_or_default()
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Entity::Source(source) => source.label.as_deref(),
            Entity::Flow(flow) => flow.label.as_deref(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Entity::Source(source) => source.description.as_deref(),
            Entity::Flow(flow) => flow.description.as_deref(),
        }
    }

    /// Who last changed the record, as reported by the store.
    pub fn updated_by(&self) -> Option<&str> {
        let extra = match self {
            Entity::Source(source) => &source.extra,
            Entity::Flow(flow) => &flow.extra,
        };
        extra.get("updated_by").and_then(Value::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, TagValue> {
        match self {
            Entity::Source(source) => &source.tags,
            Entity::Flow(flow) => &flow.tags,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            Entity::Source(_) => None,
            Entity::Flow(flow) => Some(&flow.source_id),
        }
    }
}
