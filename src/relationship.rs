//! Relationship resources.
//!
//! A [`RelationshipResource`] owns the
//! `/{parent}/{id}/relationships/{name}` route of one relationship declared
//! on a parent schema: fetching the linkage, and replacing/adding/removing
//! members per <https://jsonapi.org/format/#crud-updating-relationships>.
//! The parent resource must be registered first; its id kind (taken from
//! the registry) guards the parent id segment.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, Request};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::JsonApiState;
use crate::document::{Document, ErrorObject, Linkage, Links, PrimaryData, ResourceIdentifier};
use crate::errors::{Error, Result};
use crate::resource::{RequestContext, build_context};
use crate::response::JsonApiResponse;
use crate::schema::{self, RelationshipDef, ResourceSchema};

/// Handlers for one relationship of one parent resource type.
#[async_trait]
pub trait RelationshipResource: Send + Sync + Sized + 'static {
    /// Schema of the parent resource; the relationship must appear in its
    /// [`relationships`](ResourceSchema::relationships).
    type Parent: ResourceSchema;

    /// Name of the relationship, as declared on the parent schema.
    fn relationship_name() -> &'static str;

    fn allowed_methods() -> Vec<Method> {
        vec![Method::GET, Method::POST, Method::PATCH, Method::DELETE]
    }

    async fn before_request(&self, ctx: &RequestContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    async fn after_request(&self, ctx: &RequestContext, response: &mut JsonApiResponse) -> Result<()> {
        let _ = (ctx, response);
        Ok(())
    }

    /// `GET .../relationships/{name}`
    async fn get(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, parent_id);
        Err(Error::MethodNotAllowed)
    }

    /// `POST .../relationships/{name}` — add members to a to-many
    /// relationship.
    async fn post(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, parent_id);
        Err(Error::MethodNotAllowed)
    }

    /// `PATCH .../relationships/{name}` — replace the relationship;
    /// `data: null` empties a to-one.
    async fn patch(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, parent_id);
        Err(Error::MethodNotAllowed)
    }

    /// `DELETE .../relationships/{name}` — remove members from a to-many
    /// relationship.
    async fn delete(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let _ = (ctx, parent_id);
        Err(Error::MethodNotAllowed)
    }

    /// The descriptor of this relationship on the parent schema. Missing
    /// declarations are a server bug, answered with a 500.
    fn definition() -> Result<RelationshipDef<<Self::Parent as ResourceSchema>::Entity>> {
        Self::Parent::relationships()
            .into_iter()
            .find(|def| def.name() == Self::relationship_name())
            .ok_or_else(|| {
                Error::internal(format!(
                    "resolve relationship `{}` on `{}`",
                    Self::relationship_name(),
                    Self::Parent::resource_type()
                ))
            })
    }

    /// Parse the request body into validated [`Linkage`] for this
    /// relationship. Identifier `type`s must match the declared related
    /// type; the linkage shape must match the declared cardinality.
    fn deserialize_ids(&self, ctx: &RequestContext) -> Result<Linkage> {
        let def = Self::definition()?;
        let document = schema::parse_document(ctx.body())?;
        let Some(data) = &document.data else {
            return Err(Error::Validation {
                errors: vec![ErrorObject::detail("Object must include `data` key.").with_pointer("/data")],
            });
        };

        match data {
            PrimaryData::Null if !def.many() => Ok(Linkage::Empty),
            PrimaryData::One(resource) if !def.many() => {
                let identifier = validate_identifier(resource.type_.as_str(), resource.id.as_deref(), def.related_type(), "/data")?;
                Ok(Linkage::One(identifier))
            }
            PrimaryData::Many(resources) if def.many() => {
                let mut identifiers = Vec::with_capacity(resources.len());
                let mut errors = Vec::new();
                for (index, resource) in resources.iter().enumerate() {
                    match validate_identifier(
                        resource.type_.as_str(),
                        resource.id.as_deref(),
                        def.related_type(),
                        &format!("/data/{index}"),
                    ) {
                        Ok(identifier) => identifiers.push(identifier),
                        Err(Error::Validation { errors: mut item_errors }) => errors.append(&mut item_errors),
                        Err(other) => return Err(other),
                    }
                }
                if errors.is_empty() {
                    Ok(Linkage::Many(identifiers))
                } else {
                    Err(Error::Validation { errors })
                }
            }
            _ if def.many() => Err(Error::Validation {
                errors: vec![ErrorObject::detail("Relationship is list-like").with_pointer("/data")],
            }),
            _ => Err(Error::Validation {
                errors: vec![ErrorObject::detail("Relationship is not list-like").with_pointer("/data")],
            }),
        }
    }

    /// Relationship document with `self`/`related` links.
    fn serialize_linkage(&self, ctx: &RequestContext, parent_id: &str, linkage: Linkage) -> Document {
        let parent_type = Self::Parent::resource_type();
        let name = Self::relationship_name();
        let mut links = Links::new();
        if let Some(url) = ctx.registry().relationship_url(parent_type, parent_id, name) {
            links.insert("self", Some(url));
        }
        if let Some(url) = ctx.registry().related_url(parent_type, parent_id, name) {
            links.insert("related", Some(url));
        }
        Document::linkage(linkage, links)
    }
}

fn validate_identifier(type_: &str, id: Option<&str>, expected_type: &str, pointer: &str) -> Result<ResourceIdentifier> {
    let mut errors = Vec::new();
    if type_.is_empty() {
        errors.push(ErrorObject::detail("`data` object must include `type` key.").with_pointer(pointer.to_string()));
    } else if type_ != expected_type {
        errors.push(ErrorObject::detail("Invalid `type` specified").with_pointer(format!("{pointer}/type")));
    }
    match id {
        Some(id) if !id.is_empty() => {
            if errors.is_empty() {
                return Ok(ResourceIdentifier::new(expected_type, id));
            }
        }
        _ => {
            errors.push(ErrorObject::detail("Must include an `id` field").with_pointer(format!("{pointer}/id")));
        }
    }
    Err(Error::Validation { errors })
}

async fn run<R: RelationshipResource>(
    resource: Arc<R>,
    state: JsonApiState,
    parent_id: String,
    request: Request,
) -> Response {
    match handle(resource, state, parent_id, request).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into_response(),
    }
}

#[tracing::instrument(skip_all, fields(
    resource = R::Parent::resource_type(),
    relationship = R::relationship_name(),
))]
async fn handle<R: RelationshipResource>(
    resource: Arc<R>,
    state: JsonApiState,
    parent_id: String,
    request: Request,
) -> Result<JsonApiResponse> {
    let ctx = build_context(state, R::Parent::resource_type(), request).await?;

    resource.before_request(&ctx).await?;

    let result = dispatch(&resource, &ctx, &parent_id).await;
    let mut response = result.unwrap_or_else(|error| error.to_response());
    resource.after_request(&ctx, &mut response).await?;
    Ok(response)
}

async fn dispatch<R: RelationshipResource>(
    resource: &Arc<R>,
    ctx: &RequestContext,
    parent_id: &str,
) -> Result<JsonApiResponse> {
    if !R::allowed_methods().contains(ctx.method()) {
        return Err(Error::MethodNotAllowed);
    }
    // the parent resource's id kind guards the parent id segment
    if let Some(parent) = ctx.registry().get(ctx.resource_type())
        && !parent.id_kind.matches(parent_id)
    {
        return Err(Error::not_found());
    }

    let method = ctx.method();
    if *method == Method::GET {
        resource.get(ctx, parent_id).await
    } else if *method == Method::POST {
        resource.post(ctx, parent_id).await
    } else if *method == Method::PATCH {
        resource.patch(ctx, parent_id).await
    } else if *method == Method::DELETE {
        resource.delete(ctx, parent_id).await
    } else {
        Err(Error::MethodNotAllowed)
    }
}

/// Build the router for one relationship resource, nested at the parent's
/// mount path.
pub(crate) fn routes<R: RelationshipResource>(resource: R, state: JsonApiState) -> Router {
    let resource = Arc::new(resource);
    let path = format!("/{{id}}/relationships/{}", R::relationship_name());

    let (get_r, get_s) = (resource.clone(), state.clone());
    let (post_r, post_s) = (resource.clone(), state.clone());
    let (patch_r, patch_s) = (resource.clone(), state.clone());
    let (delete_r, delete_s) = (resource, state);

    let methods = get(move |Path(id): Path<String>, request: Request| run(get_r, get_s, id, request))
        .post(move |Path(id): Path<String>, request: Request| run(post_r, post_s, id, request))
        .patch(move |Path(id): Path<String>, request: Request| run(patch_r, patch_s, id, request))
        .delete(move |Path(id): Path<String>, request: Request| run(delete_r, delete_s, id, request));

    Router::new().route(&path, methods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonApiConfig;
    use crate::registry::ResourceRegistry;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug)]
    struct Article {
        id: u64,
        author_id: Option<String>,
        comment_ids: Vec<String>,
    }

    #[derive(Serialize, Deserialize)]
    struct ArticleAttributes {}

    struct ArticleSchema;

    impl ResourceSchema for ArticleSchema {
        type Entity = Article;
        type Attributes = ArticleAttributes;

        fn resource_type() -> &'static str {
            "articles"
        }

        fn id(entity: &Article) -> String {
            entity.id.to_string()
        }

        fn attributes(_: &Article) -> ArticleAttributes {
            ArticleAttributes {}
        }

        fn relationships() -> Vec<RelationshipDef<Article>> {
            vec![
                RelationshipDef::to_one("author", "people", |a: &Article| a.author_id.clone()),
                RelationshipDef::to_many("comments", "comments", |a: &Article| a.comment_ids.clone()),
            ]
        }
    }

    struct AuthorRelationship;

    impl RelationshipResource for AuthorRelationship {
        type Parent = ArticleSchema;

        fn relationship_name() -> &'static str {
            "author"
        }
    }

    struct CommentsRelationship;

    impl RelationshipResource for CommentsRelationship {
        type Parent = ArticleSchema;

        fn relationship_name() -> &'static str {
            "comments"
        }
    }

    struct DanglingRelationship;

    impl RelationshipResource for DanglingRelationship {
        type Parent = ArticleSchema;

        fn relationship_name() -> &'static str {
            "reviewers"
        }
    }

    fn ctx_with_body(body: serde_json::Value) -> RequestContext {
        let state = JsonApiState::for_tests(JsonApiConfig::default(), ResourceRegistry::default());
        RequestContext::for_tests(state, "articles", serde_json::to_vec(&body).unwrap())
    }

    #[test]
    fn definition_resolves_declared_relationships() {
        assert!(AuthorRelationship::definition().is_ok());
        assert!(CommentsRelationship::definition().unwrap().many());
        let err = DanglingRelationship::definition().unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn deserializes_to_one_linkage() {
        let ctx = ctx_with_body(json!({ "data": { "type": "people", "id": "9" } }));
        let linkage = AuthorRelationship.deserialize_ids(&ctx).unwrap();
        assert_eq!(linkage, Linkage::One(ResourceIdentifier::new("people", "9")));
    }

    #[test]
    fn null_data_empties_a_to_one() {
        let ctx = ctx_with_body(json!({ "data": null }));
        assert_eq!(AuthorRelationship.deserialize_ids(&ctx).unwrap(), Linkage::Empty);
    }

    #[test]
    fn deserializes_to_many_linkage() {
        let ctx = ctx_with_body(json!({ "data": [
            { "type": "comments", "id": "5" },
            { "type": "comments", "id": "12" }
        ]}));
        let linkage = CommentsRelationship.deserialize_ids(&ctx).unwrap();
        assert_eq!(linkage.ids(), vec!["5", "12"]);
    }

    #[test]
    fn rejects_wrong_identifier_type() {
        let ctx = ctx_with_body(json!({ "data": { "type": "robots", "id": "9" } }));
        let err = AuthorRelationship.deserialize_ids(&ctx).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Invalid `type` specified");
        assert_eq!(value["errors"][0]["source"]["pointer"], "/data/type");
    }

    #[test]
    fn rejects_cardinality_mismatch() {
        let ctx = ctx_with_body(json!({ "data": { "type": "comments", "id": "5" } }));
        let err = CommentsRelationship.deserialize_ids(&ctx).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Relationship is list-like");

        let ctx = ctx_with_body(json!({ "data": [{ "type": "people", "id": "9" }] }));
        let err = AuthorRelationship.deserialize_ids(&ctx).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Relationship is not list-like");
    }

    #[test]
    fn collects_errors_across_to_many_items() {
        let ctx = ctx_with_body(json!({ "data": [
            { "type": "comments", "id": "5" },
            { "type": "robots", "id": "6" },
            { "type": "comments" }
        ]}));
        let err = CommentsRelationship.deserialize_ids(&ctx).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        let errors = value["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["source"]["pointer"], "/data/1/type");
        assert_eq!(errors[1]["source"]["pointer"], "/data/2/id");
    }

    #[test]
    fn missing_data_member_is_a_validation_error() {
        let ctx = ctx_with_body(json!({ "meta": {} }));
        let err = AuthorRelationship.deserialize_ids(&ctx).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Object must include `data` key.");
    }
}
