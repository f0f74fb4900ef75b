//! Read and mutate the store's Sources, Flows and Segments.

use crate::domain::entities::{
    Entity, EntityKind, EntityRef, Flow, Segment, Source, TagValue, SEGMENTS_UPDATED,
};
use crate::domain::timerange::Timerange;
use crate::ports::tams::{TamsApi, TamsError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

/// Follows continuation links from `path`, concatenating every page's
/// records until the server stops paging or `max_results` is reached.
pub async fn fetch_all<A: TamsApi + ?Sized>(
    api: &A,
    path: &str,
    max_results: Option<usize>,
) -> Result<Vec<Value>, TamsError> {
    let mut records = Vec::new();
    let mut next = Some(path.to_string());

    while let Some(page_path) = next.take() {
        let page = api.get(&page_path).await?;
        let Value::Array(items) = page.body else {
            return Err(TamsError::Decode {
                path: page_path,
                reason: "expected a JSON array".to_string(),
            });
        };
        debug!(path = %page_path, count = items.len(), "fetched page");
        records.extend(items.into_iter().map(strip_segments_updated));

        if max_results.is_some_and(|max| records.len() >= max) {
            break;
        }
        next = page.next;
    }

    if let Some(max) = max_results {
        records.truncate(max);
    }
    Ok(records)
}

/// The store bumps this on every segment write, so it would make
/// otherwise identical listings compare unequal.
fn strip_segments_updated(mut record: Value) -> Value {
    if let Some(fields) = record.as_object_mut() {
        fields.remove(SEGMENTS_UPDATED);
    }
    record
}

fn with_query(path: &str, params: &[(&str, &str)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}?{}", path, query)
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, TamsError> {
    serde_json::from_value(value).map_err(|err| TamsError::Decode {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

#[derive(Clone)]
pub struct CatalogService<A> {
    api: A,
}

impl<A: TamsApi> CatalogService<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<T>, TamsError> {
        fetch_all(&self.api, path, max_results)
            .await?
            .into_iter()
            .map(|record| decode(path, record))
            .collect()
    }

    async fn get_one<T: DeserializeOwned>(&self, path: &str) -> Result<T, TamsError> {
        let page = self.api.get(path).await?;
        decode(path, strip_segments_updated(page.body))
    }

    pub async fn list_sources(&self, max_results: Option<usize>) -> Result<Vec<Source>, TamsError> {
        self.list("/sources", max_results).await
    }

    pub async fn list_flows(&self, max_results: Option<usize>) -> Result<Vec<Flow>, TamsError> {
        self.list("/flows", max_results).await
    }

    pub async fn list_flows_for_source(&self, source_id: &str) -> Result<Vec<Flow>, TamsError> {
        self.list(&with_query("/flows", &[("source_id", source_id)]), None)
            .await
    }

    pub async fn list_segments(
        &self,
        flow_id: &str,
        timerange: Option<&Timerange>,
        max_results: Option<usize>,
    ) -> Result<Vec<Segment>, TamsError> {
        let path = format!("/flows/{}/segments", flow_id);
        let path = match timerange {
            Some(timerange) => with_query(&path, &[("timerange", timerange.to_string().as_str())]),
            None => path,
        };
        self.list(&path, max_results).await
    }

    pub async fn get_source(&self, id: &str) -> Result<Source, TamsError> {
        self.get_one(&EntityRef::source(id).path()).await
    }

    pub async fn get_flow(&self, id: &str) -> Result<Flow, TamsError> {
        self.get_one(&EntityRef::flow(id).path()).await
    }

    pub async fn get_entity(&self, entity: &EntityRef) -> Result<Entity, TamsError> {
        match entity.kind {
            EntityKind::Source => self.get_source(&entity.id).await.map(Entity::Source),
            EntityKind::Flow => self.get_flow(&entity.id).await.map(Entity::Flow),
        }
    }

    pub async fn put_tag(
        &self,
        entity: &EntityRef,
        name: &str,
        value: &TagValue,
    ) -> Result<(), TamsError> {
        let body = serde_json::to_value(value).map_err(|err| TamsError::Decode {
            path: entity.path(),
            reason: err.to_string(),
        })?;
        self.api
            .put(&format!("{}/tags/{}", entity.path(), name), &body)
            .await
    }

    pub async fn delete_tag(&self, entity: &EntityRef, name: &str) -> Result<(), TamsError> {
        self.api
            .delete(&format!("{}/tags/{}", entity.path(), name))
            .await
    }

    /// Removes the segments of `flow_id` that fall inside `timerange`.
    pub async fn delete_segments(
        &self,
        flow_id: &str,
        timerange: &Timerange,
    ) -> Result<(), TamsError> {
        let path = with_query(
            &format!("/flows/{}/segments", flow_id),
            &[("timerange", timerange.to_string().as_str())],
        );
        self.api.delete(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakeTams;
    use crate::domain::entities::FORMAT_VIDEO;
    use serde_json::json;

    fn paged_flows(tams: &FakeTams) {
        let page = |start: usize| -> Vec<Value> {
            (start..start + 5)
                .map(|n| json!({"id": format!("f{}", n), "source_id": "s", "format": FORMAT_VIDEO}))
                .collect()
        };
        tams.page("/flows", page(0), Some("https://tams.example.com/flows?page=2"));
        tams.page(
            "https://tams.example.com/flows?page=2",
            page(5),
            Some("https://tams.example.com/flows?page=3"),
        );
        tams.page("https://tams.example.com/flows?page=3", page(10), None);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_at_max_results() {
        let tams = FakeTams::default();
        paged_flows(&tams);

        let records = fetch_all(&tams, "/flows", Some(12)).await.unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[11]["id"], "f11");
        assert_eq!(tams.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_follows_every_page() {
        let tams = FakeTams::default();
        paged_flows(&tams);

        let records = fetch_all(&tams, "/flows", None).await.unwrap();
        assert_eq!(records.len(), 15);

        let records = fetch_all(&tams, "/flows", Some(3)).await.unwrap();
        assert_eq!(records.len(), 3);
        // A limit inside the first page does not follow the link.
        assert_eq!(tams.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_all_strips_segments_updated() {
        let tams = FakeTams::default();
        tams.page(
            "/sources",
            vec![json!({"id": "s1", "format": FORMAT_VIDEO, "segments_updated": "2025-01-01"})],
            None,
        );
        let records = fetch_all(&tams, "/sources", None).await.unwrap();
        assert_eq!(records, vec![json!({"id": "s1", "format": FORMAT_VIDEO})]);
    }

    #[tokio::test]
    async fn test_fetch_all_propagates_errors() {
        let tams = FakeTams::default();
        tams.page("/flows", vec![json!({"id": "f"})], Some("/flows?page=2"));

        let err = fetch_all(&tams, "/flows", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_typed_listing_and_queries() {
        let tams = FakeTams::default();
        tams.page(
            "/flows?source_id=s+1",
            vec![json!({"id": "f1", "source_id": "s 1", "format": FORMAT_VIDEO})],
            None,
        );
        tams.page(
            "/flows/f1/segments?timerange=%5B0%3A0_10%3A0%29",
            vec![json!({"object_id": "o1", "timerange": "[0:0_5:0)"})],
            None,
        );
        let catalog = CatalogService::new(tams);

        let flows = catalog.list_flows_for_source("s 1").await.unwrap();
        assert_eq!(flows[0].source_id, "s 1");

        let timerange: Timerange = "[0:0_10:0)".parse().unwrap();
        let segments = catalog.list_segments("f1", Some(&timerange), None).await.unwrap();
        assert_eq!(segments[0].object_id, "o1");
    }

    #[tokio::test]
    async fn test_mutations() {
        let catalog = CatalogService::new(FakeTams::default());
        let flow = EntityRef::flow("f1");

        catalog
            .put_tag(&flow, "genre", &TagValue::Single("news".into()))
            .await
            .unwrap();
        catalog.delete_tag(&flow, "genre").await.unwrap();
        catalog
            .delete_segments("f1", &"[0:0_10:0)".parse().unwrap())
            .await
            .unwrap();

        assert_eq!(
            catalog.api().requests(),
            vec![
                "PUT /flows/f1/tags/genre \"news\"",
                "DELETE /flows/f1/tags/genre",
                "DELETE /flows/f1/segments?timerange=%5B0%3A0_10%3A0%29",
            ]
        );
    }
}
