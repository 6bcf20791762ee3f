//! # junction: JSON:API on top of axum
//!
//! `junction` is a thin microframework that adds
//! [JSON:API](https://jsonapi.org/format/)-compliant request and response
//! handling on top of [axum](https://github.com/tokio-rs/axum) and
//! [serde](https://serde.rs). It deliberately brings no data layer, no
//! storage engine and no concurrency machinery of its own: routing and
//! async execution belong to axum and tokio, serialization to serde. What
//! the crate adds is the glue between the two ecosystems:
//!
//! - **Route conventions** — registering a [`Resource`] mounts the standard
//!   JSON:API route table (`/{type}`, `/{type}/{id}`, related and
//!   relationship routes) on an axum [`Router`](axum::Router).
//! - **Schema-to-resource binding** — a [`ResourceSchema`] maps a domain
//!   value to a resource object (type/id/attributes/relationships/links)
//!   and validates inbound documents back into typed attribute structs.
//! - **Error translation** — every [`Error`] renders as a JSON:API error
//!   document with the right status code, including the router's own 404
//!   and 405 answers.
//!
//! Sparse fieldsets (`fields[type]=...`), compound documents (`include=`),
//! and `page[...]` pagination are handled in the dispatch layer, so
//! handlers mostly just load entities and call the serialization helpers.
//!
//! ## Quick start
//!
//! A read-only resource needs a schema, a handler implementation and a
//! mount:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use junction::{
//!     Error, JsonApi, JsonApiConfig, JsonApiResponse, RequestContext, Resource, ResourceSchema, Result,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone)]
//! struct Status {
//!     id: u64,
//!     healthy: bool,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct StatusAttributes {
//!     healthy: bool,
//! }
//!
//! struct StatusSchema;
//!
//! impl ResourceSchema for StatusSchema {
//!     type Entity = Status;
//!     type Attributes = StatusAttributes;
//!
//!     fn resource_type() -> &'static str {
//!         "statuses"
//!     }
//!
//!     fn id(entity: &Status) -> String {
//!         entity.id.to_string()
//!     }
//!
//!     fn attributes(entity: &Status) -> StatusAttributes {
//!         StatusAttributes { healthy: entity.healthy }
//!     }
//! }
//!
//! struct StatusResource {
//!     statuses: Arc<Vec<Status>>,
//! }
//!
//! #[async_trait]
//! impl Resource for StatusResource {
//!     type Schema = StatusSchema;
//!
//!     async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
//!         let status = self
//!             .statuses
//!             .iter()
//!             .find(|s| s.id.to_string() == id)
//!             .cloned()
//!             .ok_or_else(Error::not_found)?;
//!         let document = self.serialize(ctx, &status).await?;
//!         Ok(self.to_response(document))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let statuses = Arc::new(vec![Status { id: 1, healthy: true }]);
//!     let app = JsonApi::new(JsonApiConfig::default())
//!         .register(StatusResource { statuses })
//!         .into_router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.expect("bind");
//!     axum::serve(listener, app).await.expect("serve");
//! }
//! ```
//!
//! Every verb a resource does not implement answers with a 405 error
//! document, so the example above serves `GET /statuses/1` and correctly
//! rejects everything else.
//!
//! ## Configuration
//!
//! [`JsonApiConfig`] controls the base path, absolute-link prefix,
//! content-type enforcement and pagination bounds. It deserializes with
//! serde and can also be loaded standalone from YAML + `JUNCTION_`
//! environment variables; see the [`config`] module.
//!
//! ## OpenAPI
//!
//! The [`openapi`] module generates a `utoipa` OpenAPI document for
//! registered resources, wrapping each schema's attributes into the
//! JSON:API `{"data": ...}` envelope.

pub mod config;
pub mod document;
pub mod errors;
pub mod openapi;
pub mod pagination;
pub mod query;
pub mod registry;
pub mod relationship;
pub mod resource;
pub mod response;
pub mod schema;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::sync::Arc;

use axum::Router;
use axum::response::IntoResponse;

pub use crate::config::JsonApiConfig;
pub use crate::document::{Document, ErrorObject, Linkage, Links, MEDIA_TYPE, ResourceIdentifier, ResourceObject};
pub use crate::errors::{Error, Result};
pub use crate::pagination::{Page, PageNumberPaginator, Paginator};
pub use crate::registry::{IdKind, ResourceRegistry};
pub use crate::relationship::RelationshipResource;
pub use crate::resource::{RequestContext, Resource};
pub use crate::response::JsonApiResponse;
pub use crate::schema::{Inbound, RelationshipDef, ResourceSchema};

use crate::registry::{RegisteredResource, RelationshipInfo};

/// Shared state handed to every dispatched request: the configuration and
/// the registry of mounted resources.
#[derive(Debug, Clone)]
pub struct JsonApiState {
    pub config: Arc<JsonApiConfig>,
    pub registry: Arc<ResourceRegistry>,
}

type MountFn = Box<dyn FnOnce(&JsonApiState) -> Router + Send>;

/// Builder that mounts resources and relationship resources under the
/// configured base path and produces the final [`Router`].
///
/// Route construction is deferred until [`into_router`](Self::into_router)
/// so that link generation sees the complete registry, regardless of
/// registration order.
pub struct JsonApi {
    config: JsonApiConfig,
    registry: ResourceRegistry,
    mounts: Vec<(String, MountFn)>,
}

impl JsonApi {
    pub fn new(config: JsonApiConfig) -> Self {
        let registry = ResourceRegistry::new(&config);
        Self {
            config,
            registry,
            mounts: Vec::new(),
        }
    }

    /// Mount a resource at `{base_path}/{type}`, registering its type, id
    /// kind and declared relationships.
    pub fn register<R: Resource>(mut self, resource: R) -> Self {
        let type_ = R::Schema::resource_type();
        let path = format!("{}/{}", self.config.base_path, type_);
        let relationships = R::Schema::relationships()
            .iter()
            .map(|def| RelationshipInfo {
                name: def.name().to_string(),
                related_type: def.related_type().to_string(),
                many: def.many(),
            })
            .collect();
        self.registry.insert(RegisteredResource {
            type_: type_.to_string(),
            path: path.clone(),
            id_kind: R::id_kind(),
            relationships,
        });
        self.mounts
            .push((path, Box::new(move |state| resource::routes(resource, state.clone()))));
        self
    }

    /// Mount a relationship resource at
    /// `{base_path}/{parent_type}/{id}/relationships/{name}`. The parent
    /// resource should be registered as well; its id kind guards the id
    /// segment.
    pub fn register_relationship<R: RelationshipResource>(mut self, resource: R) -> Self {
        let path = format!("{}/{}", self.config.base_path, R::Parent::resource_type());
        self.mounts
            .push((path, Box::new(move |state| relationship::routes(resource, state.clone()))));
        self
    }

    /// The registry built so far. Useful for
    /// [`ApiDocBuilder`](crate::openapi::ApiDocBuilder) before the router
    /// is finalized.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &JsonApiConfig {
        &self.config
    }

    /// Finalize: build all mounted routers against the completed registry.
    /// Unmatched paths answer 404 and known paths with wrong methods 405,
    /// both as JSON:API error documents.
    pub fn into_router(self) -> Router {
        let state = JsonApiState {
            config: Arc::new(self.config),
            registry: Arc::new(self.registry),
        };
        let mut router = Router::new();
        for (path, mount) in self.mounts {
            router = router.nest(&path, mount(&state));
        }
        router
            .fallback(|| async { Error::not_found().into_response() })
            .method_not_allowed_fallback(|| async { Error::MethodNotAllowed.into_response() })
    }
}
