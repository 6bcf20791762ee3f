//! Resource handler trait and HTTP dispatch.
//!
//! A [`Resource`] is the unit of registration: one implementation handles
//! every route of one JSON:API resource type. Handlers default to a 405
//! error document, so an implementation only fills in the verbs it
//! supports; anything narrower goes through
//! [`allowed_methods`](Resource::allowed_methods).
//!
//! Dispatch is uniform for every route: parse the JSON:API query
//! parameters, enforce the content type on POST/PATCH, run the
//! [`before_request`](Resource::before_request) hook, check the id against
//! the declared [`IdKind`], run the handler, then the
//! [`after_request`](Resource::after_request) hook. Any error on the way is
//! translated into a JSON:API error document. Handler errors do not skip
//! the after hook; a failing before hook skips everything else.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, Request};
use axum::http::{HeaderMap, Method, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::JsonApiState;
use crate::config::JsonApiConfig;
use crate::document::{Document, Links, MEDIA_TYPE, ResourceObject};
use crate::errors::{Error, Result};
use crate::pagination::{Page, PageNumberPaginator, Paginator, paginate_slice};
use crate::query::{JsonApiQuery, apply_sparse_fields};
use crate::registry::{IdKind, ResourceRegistry};
use crate::response::JsonApiResponse;
use crate::schema::{self, Inbound, ResourceSchema};

/// Everything a handler may need from the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    state: JsonApiState,
    resource_type: &'static str,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: JsonApiQuery,
    body: Bytes,
}

impl RequestContext {
    pub fn config(&self) -> &JsonApiConfig {
        &self.state.config
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.state.registry
    }

    /// The resource type this request was dispatched for. For relationship
    /// routes this is the parent resource type.
    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &JsonApiQuery {
        &self.query
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Paginate with the configured [`PageNumberPaginator`].
    pub fn paginate<T: Clone>(&self, items: &[T]) -> Result<Page<T>> {
        let paginator = PageNumberPaginator::from_config(&self.config().pagination);
        self.paginate_with(&paginator, items)
    }

    /// Paginate with a custom strategy.
    pub fn paginate_with<T: Clone>(&self, paginator: &dyn Paginator, items: &[T]) -> Result<Page<T>> {
        paginate_slice(paginator, &self.uri, &self.query.page, items)
    }

    /// Serialize a related to-one entity for a `get_related` handler, using
    /// the related resource's schema.
    pub fn related_one<S: ResourceSchema>(
        &self,
        entity: Option<&S::Entity>,
        parent_id: &str,
        relationship: &str,
    ) -> Result<Document> {
        let mut doc = schema::related_one_document::<S>(entity, self.registry(), self.resource_type, parent_id, relationship)?;
        if let Some(fields) = self.query.sparse_fields() {
            apply_sparse_fields(&mut doc, fields);
        }
        Ok(doc)
    }

    /// Serialize related to-many entities for a `get_related` handler.
    pub fn related_many<S: ResourceSchema>(
        &self,
        entities: &[S::Entity],
        parent_id: &str,
        relationship: &str,
    ) -> Result<Document> {
        let mut doc = schema::related_many_document::<S>(entities, self.registry(), self.resource_type, parent_id, relationship)?;
        if let Some(fields) = self.query.sparse_fields() {
            apply_sparse_fields(&mut doc, fields);
        }
        Ok(doc)
    }
}

/// A JSON:API resource: one handler per HTTP route of one resource type.
#[async_trait]
pub trait Resource: Send + Sync + Sized + 'static {
    type Schema: ResourceSchema;

    /// Path-segment format of this resource's ids. Requests whose id
    /// segment does not match are answered 404 before any handler runs.
    fn id_kind() -> IdKind {
        IdKind::Str
    }

    /// Methods this resource accepts; anything else is a 405 error
    /// document. Narrow this to make a resource read-only.
    fn allowed_methods() -> Vec<Method> {
        vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE]
    }

    /// Runs before the handler. An error here skips the handler and the
    /// after hook.
    async fn before_request(&self, ctx: &RequestContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Runs after the handler, including when the handler failed (the
    /// response then carries the error document).
    async fn after_request(&self, ctx: &RequestContext, response: &mut JsonApiResponse) -> Result<()> {
        let _ = (ctx, response);
        Ok(())
    }

    /// `GET /{type}/{id}`
    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, id);
        Err(Error::MethodNotAllowed)
    }

    /// `GET /{type}`
    async fn get_many(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let _ = ctx;
        Err(Error::MethodNotAllowed)
    }

    /// `POST /{type}`
    async fn create(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let _ = ctx;
        Err(Error::MethodNotAllowed)
    }

    /// `PATCH /{type}/{id}`
    async fn update(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, id);
        Err(Error::MethodNotAllowed)
    }

    /// `DELETE /{type}/{id}`
    async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, id);
        Err(Error::MethodNotAllowed)
    }

    /// `GET /{type}/{id}/{relationship}` and, for to-many relationships,
    /// `GET /{type}/{id}/{relationship}/{related_id}`. Serialize the result
    /// with [`RequestContext::related_one`] / [`RequestContext::related_many`].
    async fn get_related(
        &self,
        ctx: &RequestContext,
        id: &str,
        relationship: &str,
        related_id: Option<&str>,
    ) -> Result<JsonApiResponse> {
        let _ = (ctx, id, relationship, related_id);
        Err(Error::MethodNotAllowed)
    }

    /// Compound-document hook. Implementations load the requested relations
    /// of `entity` and return them serialized; the dispatcher merges them
    /// into `included`, deduplicated. The default rejects `include`
    /// requests with a 400, as the specification requires for unsupported
    /// includes.
    async fn include_relations(
        &self,
        ctx: &RequestContext,
        entity: &<Self::Schema as ResourceSchema>::Entity,
        relations: &[String],
    ) -> Result<Vec<ResourceObject>> {
        let _ = (ctx, entity, relations);
        Err(Error::bad_request("Invalid `include` parameter."))
    }

    /// Deserialize the request body for a create: envelope validation plus
    /// `attributes` into `A`.
    fn deserialize_create<A: DeserializeOwned>(&self, ctx: &RequestContext) -> Result<Inbound<A>> {
        let document = schema::parse_document(ctx.body())?;
        schema::extract_inbound::<Self::Schema, A>(&document, false)
    }

    /// Deserialize the request body for an update; the document must carry
    /// an `id`.
    fn deserialize_update<A: DeserializeOwned>(&self, ctx: &RequestContext) -> Result<Inbound<A>> {
        let document = schema::parse_document(ctx.body())?;
        schema::extract_inbound::<Self::Schema, A>(&document, true)
    }

    /// Serialize one entity, honoring `include` and sparse fieldsets.
    async fn serialize(
        &self,
        ctx: &RequestContext,
        entity: &<Self::Schema as ResourceSchema>::Entity,
    ) -> Result<Document> {
        let mut doc = schema::document::<Self::Schema>(entity, ctx.registry())?;
        if let Some(relations) = ctx.query().include_list() {
            let included = self.include_relations(ctx, entity, relations).await?;
            doc.extend_included(included);
        }
        if let Some(fields) = ctx.query().sparse_fields() {
            apply_sparse_fields(&mut doc, fields);
        }
        Ok(doc)
    }

    /// Serialize a collection, honoring `include` and sparse fieldsets.
    /// Pagination links from [`RequestContext::paginate`] are merged in when
    /// given.
    async fn serialize_many(
        &self,
        ctx: &RequestContext,
        entities: &[<Self::Schema as ResourceSchema>::Entity],
        pagination: Option<Links>,
    ) -> Result<Document> {
        let mut doc = schema::collection_document::<Self::Schema>(entities, ctx.registry())?;
        if let Some(relations) = ctx.query().include_list() {
            for entity in entities {
                let included = self.include_relations(ctx, entity, relations).await?;
                doc.extend_included(included);
            }
        }
        if let Some(fields) = ctx.query().sparse_fields() {
            apply_sparse_fields(&mut doc, fields);
        }
        if let Some(links) = pagination {
            doc.merge_links(links);
        }
        Ok(doc)
    }

    /// Wrap a document in a 200 response.
    fn to_response(&self, document: Document) -> JsonApiResponse {
        JsonApiResponse::ok(document)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RequestContext {
    /// Construct a context directly, for tests that exercise helpers
    /// without going through HTTP dispatch.
    pub fn for_tests(state: JsonApiState, resource_type: &'static str, body: Vec<u8>) -> Self {
        Self {
            state,
            resource_type,
            method: Method::POST,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            query: JsonApiQuery::default(),
            body: Bytes::from(body),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Handler {
    Get,
    GetMany,
    Create,
    Update,
    Delete,
    GetRelated(&'static str),
}

/// Reject POST/PATCH requests without the JSON:API media type. Media type
/// parameters are ignored when comparing.
pub(crate) fn check_content_type(config: &JsonApiConfig, method: &Method, headers: &HeaderMap) -> Result<()> {
    if !config.enforce_content_type {
        return Ok(());
    }
    if *method != Method::POST && *method != Method::PATCH {
        return Ok(());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or("").trim().to_string());
    if content_type.as_deref() != Some(MEDIA_TYPE) {
        return Err(Error::unsupported_content_type());
    }
    Ok(())
}

pub(crate) async fn build_context(
    state: JsonApiState,
    resource_type: &'static str,
    request: Request,
) -> Result<RequestContext> {
    let (parts, body) = request.into_parts();
    let query = JsonApiQuery::parse(parts.uri.query())?;
    check_content_type(&state.config, &parts.method, &parts.headers)?;
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| Error::unreadable_body())?;
    Ok(RequestContext {
        state,
        resource_type,
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        query,
        body,
    })
}

async fn run<R: Resource>(
    resource: Arc<R>,
    state: JsonApiState,
    handler: Handler,
    id: Option<String>,
    related_id: Option<String>,
    request: Request,
) -> Response {
    match handle(resource, state, handler, id, related_id, request).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response(),
    }
}

#[tracing::instrument(skip_all, fields(resource = R::Schema::resource_type(), handler = ?handler))]
async fn handle<R: Resource>(
    resource: Arc<R>,
    state: JsonApiState,
    handler: Handler,
    id: Option<String>,
    related_id: Option<String>,
    request: Request,
) -> Result<JsonApiResponse> {
    let ctx = build_context(state, R::Schema::resource_type(), request).await?;

    resource.before_request(&ctx).await?;

    let result = dispatch(&resource, &ctx, handler, id.as_deref(), related_id.as_deref()).await;

    // handler errors become the response the after hook sees
    let mut response = result.unwrap_or_else(|error| error.to_response());
    resource.after_request(&ctx, &mut response).await?;
    Ok(response)
}

async fn dispatch<R: Resource>(
    resource: &Arc<R>,
    ctx: &RequestContext,
    handler: Handler,
    id: Option<&str>,
    related_id: Option<&str>,
) -> Result<JsonApiResponse> {
    if !R::allowed_methods().contains(ctx.method()) {
        return Err(Error::MethodNotAllowed);
    }
    if let Some(id) = id
        && !R::id_kind().matches(id)
    {
        return Err(Error::not_found());
    }

    let id = id.unwrap_or_default();
    match handler {
        Handler::Get => resource.get(ctx, id).await,
        Handler::GetMany => resource.get_many(ctx).await,
        Handler::Create => resource.create(ctx).await,
        Handler::Update => resource.update(ctx, id).await,
        Handler::Delete => resource.delete(ctx, id).await,
        Handler::GetRelated(relationship) => resource.get_related(ctx, id, relationship, related_id).await,
    }
}

/// Build the router for one resource, to be nested under
/// `{base_path}/{type}` by the [`JsonApi`](crate::JsonApi) builder.
pub(crate) fn routes<R: Resource>(resource: R, state: JsonApiState) -> Router {
    let resource = Arc::new(resource);
    let mut router = Router::new();

    let collection = {
        let (get_r, get_s) = (resource.clone(), state.clone());
        let (post_r, post_s) = (resource.clone(), state.clone());
        get(move |request: Request| run(get_r, get_s, Handler::GetMany, None, None, request)).post(
            move |request: Request| run(post_r, post_s, Handler::Create, None, None, request),
        )
    };
    router = router.route("/", collection);

    let item = {
        let (get_r, get_s) = (resource.clone(), state.clone());
        let (patch_r, patch_s) = (resource.clone(), state.clone());
        let (delete_r, delete_s) = (resource.clone(), state.clone());
        get(move |Path(id): Path<String>, request: Request| run(get_r, get_s, Handler::Get, Some(id), None, request))
            .patch(move |Path(id): Path<String>, request: Request| {
                run(patch_r, patch_s, Handler::Update, Some(id), None, request)
            })
            .delete(move |Path(id): Path<String>, request: Request| {
                run(delete_r, delete_s, Handler::Delete, Some(id), None, request)
            })
    };
    router = router.route("/{id}", item);

    for def in R::Schema::relationships() {
        let name = def.name();
        let (rel_r, rel_s) = (resource.clone(), state.clone());
        router = router.route(
            &format!("/{{id}}/{name}"),
            get(move |Path(id): Path<String>, request: Request| {
                run(rel_r, rel_s, Handler::GetRelated(name), Some(id), None, request)
            }),
        );
        if def.many() {
            let (rel_r, rel_s) = (resource.clone(), state.clone());
            router = router.route(
                &format!("/{{id}}/{name}/{{related_id}}"),
                get(move |Path((id, related_id)): Path<(String, String)>, request: Request| {
                    run(rel_r, rel_s, Handler::GetRelated(name), Some(id), Some(related_id), request)
                }),
            );
        }
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        id: u64,
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct WidgetAttributes {}

    struct WidgetSchema;

    impl ResourceSchema for WidgetSchema {
        type Entity = Widget;
        type Attributes = WidgetAttributes;

        fn resource_type() -> &'static str {
            "widgets"
        }

        fn id(entity: &Widget) -> String {
            entity.id.to_string()
        }

        fn attributes(_: &Widget) -> WidgetAttributes {
            WidgetAttributes {}
        }
    }

    struct WidgetResource;

    #[async_trait]
    impl Resource for WidgetResource {
        type Schema = WidgetSchema;
    }

    fn bare_ctx() -> RequestContext {
        let state = JsonApiState::for_tests(JsonApiConfig::default(), ResourceRegistry::default());
        RequestContext::for_tests(state, "widgets", Vec::new())
    }

    #[test]
    fn unimplemented_handlers_answer_405() {
        let ctx = bare_ctx();
        let resource = WidgetResource;
        assert!(matches!(
            tokio_test::block_on(resource.get(&ctx, "1")),
            Err(Error::MethodNotAllowed)
        ));
        assert!(matches!(
            tokio_test::block_on(resource.get_many(&ctx)),
            Err(Error::MethodNotAllowed)
        ));
        assert!(matches!(
            tokio_test::block_on(resource.get_related(&ctx, "1", "parts", None)),
            Err(Error::MethodNotAllowed)
        ));
    }

    #[test]
    fn include_is_rejected_without_a_hook() {
        let ctx = bare_ctx();
        let widget = Widget { id: 1 };
        let result = tokio_test::block_on(WidgetResource.include_relations(&ctx, &widget, &["parts".to_string()]));
        assert!(matches!(result, Err(Error::BadRequest { .. })));
    }

    #[test]
    fn content_type_is_only_checked_on_writes() {
        let config = JsonApiConfig::default();
        let mut headers = HeaderMap::new();
        assert!(check_content_type(&config, &Method::GET, &headers).is_ok());
        assert!(check_content_type(&config, &Method::POST, &headers).is_err());

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(check_content_type(&config, &Method::PATCH, &headers).is_err());

        headers.insert(header::CONTENT_TYPE, MEDIA_TYPE.parse().unwrap());
        assert!(check_content_type(&config, &Method::POST, &headers).is_ok());
    }

    #[test]
    fn media_type_parameters_are_ignored() {
        let config = JsonApiConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/vnd.api+json; charset=utf-8".parse().unwrap(),
        );
        assert!(check_content_type(&config, &Method::POST, &headers).is_ok());
    }

    #[test]
    fn enforcement_can_be_disabled() {
        let config = JsonApiConfig {
            enforce_content_type: false,
            ..JsonApiConfig::default()
        };
        let headers = HeaderMap::new();
        assert!(check_content_type(&config, &Method::POST, &headers).is_ok());
    }
}
