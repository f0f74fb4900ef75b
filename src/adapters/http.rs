//! HTTP inbound adapter for the diagram views.

use crate::application::catalog::CatalogService;
use crate::config::FeatureFlags;
use crate::domain::entities::{EntityKind, EntityRef};
use crate::domain::form::{FormError, FormSchema};
use crate::domain::graph::Graph;
use crate::ports::tams::{TamsApi, TamsError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub type SharedCatalog = CatalogService<Arc<dyn TamsApi>>;

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<SharedCatalog>,
    features: FeatureFlags,
}

impl AppState {
    pub fn new(catalog: SharedCatalog, features: FeatureFlags) -> Self {
        Self {
            catalog: Arc::new(catalog),
            features,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/features", get(features))
        .route("/diagram/:collection/:id", get(diagram))
        .route("/mermaid/:collection/:id", get(mermaid))
        .route("/forms/validate", post(validate_form))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

enum ApiError {
    UnknownCollection(String),
    Upstream(TamsError),
    InvalidForm(FormError),
}

impl From<TamsError> for ApiError {
    fn from(err: TamsError) -> Self {
        ApiError::Upstream(err)
    }
}

impl From<FormError> for ApiError {
    fn from(err: FormError) -> Self {
        ApiError::InvalidForm(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::UnknownCollection(collection) => (
                StatusCode::BAD_REQUEST,
                format!("unknown entity type {:?}", collection),
            )
                .into_response(),
            ApiError::Upstream(err) if err.is_not_found() => {
                (StatusCode::NOT_FOUND, err.to_string()).into_response()
            }
            ApiError::Upstream(err) => {
                warn!(error = %err, "TAMS request failed");
                (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
            }
            ApiError::InvalidForm(err) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
            }
        }
    }
}

fn entity_ref(collection: String, id: String) -> Result<EntityRef, ApiError> {
    let kind = EntityKind::from_collection(&collection)
        .ok_or(ApiError::UnknownCollection(collection))?;
    Ok(EntityRef { kind, id })
}

async fn healthz() -> &'static str {
    "ok"
}

async fn features(State(state): State<AppState>) -> Json<FeatureFlags> {
    Json(state.features.clone())
}

async fn diagram(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Graph>, ApiError> {
    let root = entity_ref(collection, id)?;
    let diagram = state.catalog.build_graph(&root).await?;
    Ok(Json(diagram.graph))
}

async fn mermaid(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let root = entity_ref(collection, id)?;
    let diagram = state.catalog.build_tree(&root).await?;
    Ok(diagram.to_mermaid())
}

/// A form schema together with the values submitted against it.
#[derive(Deserialize)]
struct FormSubmission {
    schema: Value,
    #[serde(default)]
    data: Map<String, Value>,
}

/// Returns the submitted values coerced to the types the schema asks for.
async fn validate_form(Json(submission): Json<FormSubmission>) -> Result<Json<Value>, ApiError> {
    let schema = FormSchema::from_json(&submission.schema)?;
    Ok(Json(Value::Object(schema.apply(&submission.data)?)))
}
