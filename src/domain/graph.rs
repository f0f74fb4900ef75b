//! Source/Flow relationship graph for the diagram views.

use crate::domain::entities::{
    Entity, EntityKind, EntityRef, TagValue, FORMAT_AUDIO, FORMAT_DATA, FORMAT_MULTI,
    FORMAT_VIDEO,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const NODE_WIDTH: f64 = 120.0;
pub const NODE_HEIGHT: f64 = 60.0;
const HORIZONTAL_SPACING: f64 = 30.0;
const VERTICAL_SPACING: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub classes: Vec<String>,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Represents,
    Collects,
    /// Source-level collection mirrored from a flow collection.
    Implied,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Lays out `entities` and derives their edges. `root` is marked selected.
    pub fn build(root: &EntityRef, entities: &BTreeMap<EntityRef, Entity>) -> Self {
        let positions = positions(entities.values());
        let nodes = entities
            .values()
            .map(|entity| {
                let entity_ref = entity.entity_ref();
                Node {
                    id: entity_ref.node_id(),
                    label: node_label(entity),
                    classes: vec![entity.kind().to_string(), entity.format_name().to_string()],
                    selected: &entity_ref == root,
                    position: positions.get(&entity_ref).copied(),
                }
            })
            .collect();

        Self {
            nodes,
            edges: edges(entities),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Renders a bottom-to-top Mermaid flowchart of the graph.
    pub fn to_mermaid(&self, entities: &BTreeMap<EntityRef, Entity>) -> String {
        let mut lines = vec!["flowchart BT".to_string()];
        let mut sources = Vec::new();
        let mut flows = Vec::new();
        let mut highlighted = Vec::new();

        for entity in entities.values() {
            let mut details = vec![
                format!("id: {}", entity.id()),
                format!("type: {}", entity.format_name()),
                format!("desc: {}", entity.description().unwrap_or_default()),
                format!("label: {}", entity.label().unwrap_or_default()),
                format!("updBy: {}", entity.updated_by().unwrap_or_default()),
            ];
            details.extend(
                entity
                    .tags()
                    .iter()
                    .map(|(name, value)| format!("tag: {} = {}", name, tag_text(value))),
            );
            let title = match entity.kind() {
                EntityKind::Source => "Source",
                EntityKind::Flow => "Flow",
            };
            lines.push(format!(
                "  {}(\"<center><b>&lt;&lt;{}&gt;&gt;</b></center><br>{}\")",
                entity.id(),
                title,
                mermaid_escape(&details.join("<br>"))
            ));
            match entity.kind() {
                EntityKind::Source => sources.push(entity.id()),
                EntityKind::Flow => flows.push(entity.id()),
            }
            if self
                .node(&entity.entity_ref().node_id())
                .is_some_and(|node| node.selected)
            {
                highlighted.push(entity.id());
            }
        }

        // Mermaid arrows point from the member towards its owner. Source
        // collections get a finer dash than Flow collections.
        let links: Vec<(&str, &str, &str, u8)> = self
            .edges
            .iter()
            .filter(|edge| edge.kind != EdgeKind::Implied)
            .map(|edge| {
                let from = node_entity_id(&edge.source);
                let to = node_entity_id(&edge.target);
                let role = edge.role.as_deref().unwrap_or(" ");
                match edge.kind {
                    EdgeKind::Represents => (from, " ", to, 0),
                    _ if edge.source.starts_with(EntityKind::Source.collection()) => (to, role, from, 2),
                    _ => (to, role, from, 10),
                }
            })
            .collect();
        for (from, label, to, _) in &links {
            lines.push(format!("  {} --> |{}| {}", from, label, to));
        }
        for (index, (_, _, _, dash)) in links.iter().enumerate() {
            lines.push(format!("  linkStyle {} stroke-dasharray:{}", index, dash));
        }

        let classes = [
            ("source", "color:#000000,fill:#daa520,stroke:#FFFFFF,text-align:left", sources),
            ("flow", "color:#000000,fill:#f08080,stroke:#FFFFFF,text-align:left", flows),
            ("highlight", "stroke:#FF0000,stroke-width:5px", highlighted),
        ];
        for (name, style, _) in &classes {
            lines.push(format!("  classDef {} {}", name, style));
        }
        for (name, _, members) in &classes {
            if !members.is_empty() {
                lines.push(format!("  class {} {}", members.join(","), name));
            }
        }
        lines.join("\n")
    }
}

fn node_label(entity: &Entity) -> String {
    format!(
        "{} ({})\n\nid: {}\n\ndesc: {}\n\nlabel: {}",
        entity.kind().to_string().to_uppercase(),
        entity.format_name(),
        entity.id(),
        entity.description().unwrap_or_default(),
        entity.label().unwrap_or_default()
    )
}

fn node_entity_id(node_id: &str) -> &str {
    node_id.split_once('/').map_or(node_id, |(_, id)| id)
}

fn tag_text(value: &TagValue) -> String {
    match value {
        TagValue::Single(value) => value.clone(),
        TagValue::Multiple(values) => values.join(", "),
    }
}

fn mermaid_escape(text: &str) -> String {
    text.replace('"', "#quot;")
}

/// Rows: multi sources, elementary sources, multi flows, elementary flows.
/// Each row is centred on the widest one. Other formats are left unplaced.
fn positions<'a>(entities: impl Iterator<Item = &'a Entity>) -> HashMap<EntityRef, Position> {
    let mut rows: [Vec<(u8, EntityRef)>; 4] = Default::default();
    for entity in entities {
        let base = match entity.kind() {
            EntityKind::Source => 0,
            EntityKind::Flow => 2,
        };
        let (row, order) = match entity.format() {
            FORMAT_MULTI => (base, 0),
            FORMAT_VIDEO => (base + 1, 0),
            FORMAT_AUDIO => (base + 1, 1),
            FORMAT_DATA => (base + 1, 2),
            _ => continue,
        };
        rows[row].push((order, entity.entity_ref()));
    }

    let widest = rows.iter().map(Vec::len).max().unwrap_or(0) as f64;
    let mut positions = HashMap::new();
    for (y, row) in rows.iter_mut().enumerate() {
        row.sort_by_key(|(order, _)| *order);
        let offset = (widest - row.len() as f64) / 2.0;
        for (x, (_, entity_ref)) in row.iter().enumerate() {
            positions.insert(
                entity_ref.clone(),
                Position {
                    x: (NODE_WIDTH + HORIZONTAL_SPACING) * (offset + x as f64),
                    y: (NODE_HEIGHT + VERTICAL_SPACING) * y as f64,
                },
            );
        }
    }
    positions
}

fn edges(entities: &BTreeMap<EntityRef, Entity>) -> Vec<Edge> {
    let flow_sources: HashMap<&str, &str> = entities
        .values()
        .filter_map(|entity| match entity {
            Entity::Flow(flow) => Some((flow.id.as_str(), flow.source_id.as_str())),
            Entity::Source(_) => None,
        })
        .collect();

    let mut edges = Vec::new();
    for entity in entities.values() {
        match entity {
            Entity::Flow(flow) => {
                for member in &flow.flow_collection {
                    edges.push(edge(
                        EdgeKind::Collects,
                        EntityRef::flow(&flow.id),
                        EntityRef::flow(&member.id),
                        member.role.clone(),
                    ));
                    if let Some(member_source) = flow_sources.get(member.id.as_str()) {
                        edges.push(edge(
                            EdgeKind::Implied,
                            EntityRef::source(&flow.source_id),
                            EntityRef::source(*member_source),
                            None,
                        ));
                    }
                }
                edges.push(edge(
                    EdgeKind::Represents,
                    EntityRef::flow(&flow.id),
                    EntityRef::source(&flow.source_id),
                    None,
                ));
            }
            Entity::Source(source) => {
                for member in &source.source_collection {
                    edges.push(edge(
                        EdgeKind::Collects,
                        EntityRef::source(&source.id),
                        EntityRef::source(&member.id),
                        member.role.clone(),
                    ));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    edges.retain(|edge| seen.insert(edge.id.clone()));
    edges
}

fn edge(kind: EdgeKind, from: EntityRef, to: EntityRef, role: Option<String>) -> Edge {
    Edge {
        id: format!("{}|{}", from.id, to.id),
        source: from.node_id(),
        target: to.node_id(),
        kind,
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Flow, Source};
    use serde_json::json;

    fn source(id: &str, format: &str) -> Entity {
        Entity::Source(serde_json::from_value(json!({"id": id, "format": format})).unwrap())
    }

    fn flow(id: &str, source_id: &str, format: &str, members: &[&str]) -> Entity {
        let members: Vec<_> = members.iter().map(|m| json!({"id": m, "role": "track"})).collect();
        Entity::Flow(
            serde_json::from_value(json!({
                "id": id,
                "source_id": source_id,
                "format": format,
                "flow_collection": members
            }))
            .unwrap(),
        )
    }

    fn index(entities: Vec<Entity>) -> BTreeMap<EntityRef, Entity> {
        entities.into_iter().map(|e| (e.entity_ref(), e)).collect()
    }

    fn multiplex() -> BTreeMap<EntityRef, Entity> {
        index(vec![
            source("s-mux", FORMAT_MULTI),
            source("s-v", FORMAT_VIDEO),
            source("s-a", FORMAT_AUDIO),
            flow("f-mux", "s-mux", FORMAT_MULTI, &["f-v", "f-a"]),
            flow("f-v", "s-v", FORMAT_VIDEO, &[]),
            flow("f-a", "s-a", FORMAT_AUDIO, &[]),
        ])
    }

    #[test]
    fn test_layout_rows_are_centred() {
        let graph = Graph::build(&EntityRef::flow("f-mux"), &multiplex());
        let pos = |id: &str| graph.node(id).unwrap().position.unwrap();

        assert_eq!(pos("sources/s-mux"), Position { x: 75.0, y: 0.0 });
        assert_eq!(pos("sources/s-v"), Position { x: 0.0, y: 75.0 });
        assert_eq!(pos("sources/s-a"), Position { x: 150.0, y: 75.0 });
        assert_eq!(pos("flows/f-mux"), Position { x: 75.0, y: 150.0 });
        assert_eq!(pos("flows/f-a").y, 225.0);
        assert!(graph.node("flows/f-mux").unwrap().selected);
        assert!(!graph.node("flows/f-v").unwrap().selected);
    }

    #[test]
    fn test_edges_are_derived_and_deduplicated() {
        let mut entities = multiplex();
        // A second multiplex over the same elementary flows repeats the implied edges.
        let extra = flow("f-mux2", "s-mux", FORMAT_MULTI, &["f-v"]);
        entities.insert(extra.entity_ref(), extra);

        let graph = Graph::build(&EntityRef::flow("f-mux"), &entities);
        let count = |kind| graph.edges.iter().filter(|e| e.kind == kind).count();
        assert_eq!(count(EdgeKind::Represents), 4);
        assert_eq!(count(EdgeKind::Collects), 3);
        assert_eq!(count(EdgeKind::Implied), 2);

        let implied = graph.edges.iter().find(|e| e.id == "s-mux|s-v").unwrap();
        assert_eq!(implied.kind, EdgeKind::Implied);
        assert_eq!(implied.source, "sources/s-mux");
        assert_eq!(implied.target, "sources/s-v");
    }

    #[test]
    fn test_unknown_format_is_unplaced() {
        let entities = index(vec![source("s-img", "urn:x-tam:format:image")]);
        let graph = Graph::build(&EntityRef::source("s-img"), &entities);
        assert_eq!(graph.nodes[0].position, None);
        assert_eq!(graph.nodes[0].classes, vec!["source", "image"]);
    }

    #[test]
    fn test_node_label() {
        let mut entities = BTreeMap::new();
        let source: Source = serde_json::from_value(json!({
            "id": "s1", "format": FORMAT_VIDEO, "label": "cam 1", "description": "studio"
        }))
        .unwrap();
        entities.insert(EntityRef::source("s1"), Entity::Source(source));
        let graph = Graph::build(&EntityRef::source("s1"), &entities);
        assert_eq!(
            graph.nodes[0].label,
            "SOURCE (video)\n\nid: s1\n\ndesc: studio\n\nlabel: cam 1"
        );
    }

    #[test]
    fn test_mermaid_output() {
        let entities = multiplex();
        let graph = Graph::build(&EntityRef::flow("f-mux"), &entities);
        let mermaid = graph.to_mermaid(&entities);

        assert!(mermaid.starts_with("flowchart BT\n"));
        assert!(mermaid.contains("  f-v --> |track| f-mux"));
        assert!(mermaid.contains("  f-mux --> | | s-mux"));
        assert!(mermaid.contains("  class f-mux highlight"));
        assert!(mermaid.contains("linkStyle 0 stroke-dasharray:"));
        let flow_ids: Vec<_> = entities
            .values()
            .filter_map(|e| matches!(e, Entity::Flow(Flow { .. })).then(|| e.id()))
            .collect();
        assert!(mermaid.contains(&format!("  class {} flow", flow_ids.join(","))));
    }

    #[test]
    fn test_mermaid_link_dashes_and_details() {
        let mut entities = multiplex();
        let collection: Source = serde_json::from_value(json!({
            "id": "s-set", "format": FORMAT_MULTI, "updated_by": "editor@example.com",
            "source_collection": [{"id": "s-v", "role": "angle"}]
        }))
        .unwrap();
        entities.insert(EntityRef::source("s-set"), Entity::Source(collection));

        let graph = Graph::build(&EntityRef::source("s-set"), &entities);
        let mermaid = graph.to_mermaid(&entities);
        let lines: Vec<&str> = mermaid.lines().collect();
        let dash = |link: &str| {
            let index = lines
                .iter()
                .filter(|line| line.contains(" --> |"))
                .position(|line| line.trim() == link)
                .unwrap();
            lines
                .iter()
                .find(|line| line.trim().starts_with(&format!("linkStyle {} ", index)))
                .unwrap()
                .rsplit(':')
                .next()
                .unwrap()
                .to_string()
        };

        assert_eq!(dash("s-v --> |angle| s-set"), "2");
        assert_eq!(dash("f-v --> |track| f-mux"), "10");
        assert_eq!(dash("f-mux --> | | s-mux"), "0");
        assert!(mermaid.contains("updBy: editor@example.com"));
        assert!(mermaid.contains("label: <br>updBy: \")"));
    }
}
