//! Assembles the relationship graph around one Source or Flow.

use crate::application::catalog::CatalogService;
use crate::domain::entities::{Entity, EntityRef, Flow};
use crate::domain::graph::Graph;
use crate::ports::tams::{TamsApi, TamsError};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Every entity reachable from `root` plus the graph laid out over them.
#[derive(Debug, Clone)]
pub struct Diagram {
    pub root: EntityRef,
    pub entities: BTreeMap<EntityRef, Entity>,
    pub graph: Graph,
}

impl Diagram {
    pub fn to_mermaid(&self) -> String {
        self.graph.to_mermaid(&self.entities)
    }
}

/// How far a Source's own Flows are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// A Source's Flows become nodes but are not expanded.
    Shallow,
    /// A Source's Flows are fetched and expanded like any other reference,
    /// so their collections are reached too.
    Expanded,
}

/// A fetched entity and, for a Source, the Flows that represent it.
struct Visit {
    entity: Entity,
    flows: Vec<Flow>,
}

impl<A: TamsApi> CatalogService<A> {
    /// Neighbourhood of `root` for the interactive diagram. A Source's own
    /// Flows are included but not expanded further.
    pub async fn build_graph(&self, root: &EntityRef) -> Result<Diagram, TamsError> {
        self.assemble(root, Traversal::Shallow).await
    }

    /// Everything reachable from `root`, including what a Source's Flows
    /// collect. Used for the Mermaid view.
    pub async fn build_tree(&self, root: &EntityRef) -> Result<Diagram, TamsError> {
        self.assemble(root, Traversal::Expanded).await
    }

    /// Walks relationships outwards from `root` one level at a time.
    ///
    /// Each discovered entity is reserved in the visited set before it is
    /// fetched, so collection cycles terminate and nothing is fetched twice.
    pub async fn assemble(&self, root: &EntityRef, traversal: Traversal) -> Result<Diagram, TamsError> {
        debug!(entity = %root, ?traversal, "assembling graph");
        let mut visited = HashSet::from([root.clone()]);
        let mut entities = BTreeMap::new();
        let mut level = vec![root.clone()];

        while !level.is_empty() {
            debug!(count = level.len(), "fetching graph level");
            let visits = try_join_all(level.iter().map(|target| self.visit(target, root))).await?;

            let mut next = Vec::new();
            for Visit { entity, flows } in visits.into_iter().flatten() {
                for flow in flows {
                    let flow_ref = EntityRef::flow(&flow.id);
                    if !visited.insert(flow_ref.clone()) {
                        continue;
                    }
                    match traversal {
                        Traversal::Shallow => {
                            entities.insert(flow_ref, Entity::Flow(flow));
                        }
                        Traversal::Expanded => next.push(flow_ref),
                    }
                }
                for related in related(&entity) {
                    if visited.insert(related.clone()) {
                        next.push(related);
                    }
                }
                entities.insert(entity.entity_ref(), entity);
            }
            level = next;
        }

        Ok(Diagram {
            graph: Graph::build(root, &entities),
            root: root.clone(),
            entities,
        })
    }

    /// Dangling references are skipped; only a missing root is an error.
    async fn visit(&self, target: &EntityRef, root: &EntityRef) -> Result<Option<Visit>, TamsError> {
        let entity = match self.get_entity(target).await {
            Ok(entity) => entity,
            Err(err) if err.is_not_found() && target != root => {
                warn!(entity = %target, "referenced entity not found");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let flows = match &entity {
            Entity::Source(source) => self.list_flows_for_source(&source.id).await?,
            Entity::Flow(_) => Vec::new(),
        };
        Ok(Some(Visit { entity, flows }))
    }
}

fn related(entity: &Entity) -> Vec<EntityRef> {
    match entity {
        Entity::Flow(flow) => std::iter::once(EntityRef::source(&flow.source_id))
            .chain(flow.collected_by.iter().map(EntityRef::flow))
            .chain(flow.flow_collection.iter().map(|item| EntityRef::flow(&item.id)))
            .collect(),
        Entity::Source(source) => source
            .collected_by
            .iter()
            .map(EntityRef::source)
            .chain(source.source_collection.iter().map(|item| EntityRef::source(&item.id)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakeTams;
    use crate::domain::entities::{FORMAT_AUDIO, FORMAT_MULTI, FORMAT_VIDEO};
    use crate::domain::graph::EdgeKind;
    use serde_json::json;

    fn store() -> FakeTams {
        let tams = FakeTams::default();
        tams.record(
            "/flows/a",
            json!({"id": "a", "source_id": "s", "format": FORMAT_MULTI,
                   "flow_collection": [{"id": "b", "role": "video"}]}),
        );
        tams.record(
            "/flows/b",
            json!({"id": "b", "source_id": "s", "format": FORMAT_VIDEO,
                   "flow_collection": [{"id": "a", "role": "parent"}]}),
        );
        tams.record("/sources/s", json!({"id": "s", "format": FORMAT_MULTI}));
        tams.page(
            "/flows?source_id=s",
            vec![
                json!({"id": "a", "source_id": "s", "format": FORMAT_MULTI}),
                json!({"id": "b", "source_id": "s", "format": FORMAT_VIDEO}),
                json!({"id": "c", "source_id": "s", "format": FORMAT_AUDIO}),
            ],
            None,
        );
        tams
    }

    #[tokio::test]
    async fn test_collection_cycle_terminates() {
        let catalog = CatalogService::new(store());
        let diagram = catalog.build_graph(&EntityRef::flow("a")).await.unwrap();

        let ids: Vec<_> = diagram.graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["sources/s", "flows/a", "flows/b", "flows/c"]);

        let requests = catalog.api().requests();
        assert_eq!(requests.iter().filter(|r| *r == "GET /flows/a").count(), 1);
        assert_eq!(requests.iter().filter(|r| *r == "GET /flows/b").count(), 1);
        // Flows listed under the Source are shown but not fetched individually.
        assert!(!requests.contains(&"GET /flows/c".to_string()));
    }

    #[tokio::test]
    async fn test_traversed_flows_keep_their_collections() {
        let catalog = CatalogService::new(store());
        let diagram = catalog.build_graph(&EntityRef::flow("a")).await.unwrap();

        let collects: Vec<_> = diagram
            .graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Collects)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(collects, vec!["a|b", "b|a"]);
        assert!(diagram.graph.node("flows/a").unwrap().selected);
        assert!(diagram.to_mermaid().contains("  b --> |video| a"));
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error_but_dangling_refs_are_not() {
        let catalog = CatalogService::new(store());
        let err = catalog.build_graph(&EntityRef::flow("zzz")).await.unwrap_err();
        assert!(err.is_not_found());

        let tams = FakeTams::default();
        tams.record(
            "/flows/x",
            json!({"id": "x", "source_id": "gone", "format": FORMAT_VIDEO}),
        );
        let diagram = CatalogService::new(tams)
            .build_graph(&EntityRef::flow("x"))
            .await
            .unwrap();
        assert_eq!(diagram.entities.len(), 1);
    }

    #[tokio::test]
    async fn test_tree_expands_flows_listed_under_a_source() {
        let tams = store();
        tams.record(
            "/flows/c",
            json!({"id": "c", "source_id": "s", "format": FORMAT_AUDIO,
                   "flow_collection": [{"id": "d", "role": "commentary"}]}),
        );
        tams.record(
            "/flows/d",
            json!({"id": "d", "source_id": "t", "format": FORMAT_AUDIO}),
        );
        tams.record("/sources/t", json!({"id": "t", "format": FORMAT_AUDIO}));
        tams.page("/flows?source_id=t", vec![], None);
        let catalog = CatalogService::new(tams);

        let shallow = catalog.build_graph(&EntityRef::source("s")).await.unwrap();
        assert!(!shallow.entities.contains_key(&EntityRef::flow("d")));

        let tree = catalog.build_tree(&EntityRef::source("s")).await.unwrap();
        let ids: Vec<_> = tree.graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["sources/s", "sources/t", "flows/a", "flows/b", "flows/c", "flows/d"]
        );
        assert!(tree.to_mermaid().contains("  d --> |commentary| c"));
        // Each flow is fetched once even though it is both listed and collected.
        let requests = catalog.api().requests();
        assert_eq!(requests.iter().filter(|r| *r == "GET /flows/b").count(), 1);
    }
}
