//! OpenAPI generation for registered resources.
//!
//! [`ApiDocBuilder`] produces a `utoipa::openapi::OpenApi` describing the
//! CRUD and relationship routes of the resources it is given. Schemas are
//! assembled from the registry metadata plus each schema's
//! `Attributes: ToSchema` implementation, wrapped the JSON:API way: request
//! and response bodies are `{"data": <resource object>}` under the
//! `application/vnd.api+json` media type.
//!
//! ```ignore
//! let api = JsonApi::new(config)
//!     .register(ArticlesResource { store });
//! let doc = ApiDocBuilder::new("Articles API", "1.0")
//!     .resource::<ArticleSchema>(api.registry())
//!     .build();
//! let router = api.into_router();
//! ```

use serde::Serialize;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{KnownFormat, SchemaFormat, Type};
use utoipa::openapi::{
    ArrayBuilder, ComponentsBuilder, ContentBuilder, InfoBuilder, ObjectBuilder, OpenApi, OpenApiBuilder, PathsBuilder,
    Ref, RefOr, Required, ResponseBuilder, Schema,
};
use utoipa::{PartialSchema, ToSchema};

use crate::document::{ErrorObject, ErrorSource, MEDIA_TYPE};
use crate::registry::{IdKind, RegisteredResource, RelationshipInfo, ResourceRegistry};
use crate::schema::ResourceSchema;

/// The body shape of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

/// Per-operation overrides, the counterpart of decorating a handler with
/// extra OpenAPI information.
#[derive(Debug, Clone)]
pub struct OperationDocs {
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Set to `false` to leave the operation out of the document.
    pub include_in_schema: bool,
}

impl Default for OperationDocs {
    fn default() -> Self {
        Self {
            summary: None,
            description: None,
            include_in_schema: true,
        }
    }
}

impl OperationDocs {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Self::default()
        }
    }

    pub fn hidden() -> Self {
        Self {
            include_in_schema: false,
            ..Self::default()
        }
    }
}

/// Overrides for all operations of one resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceDocs {
    pub get: OperationDocs,
    pub get_many: OperationDocs,
    pub create: OperationDocs,
    pub update: OperationDocs,
    pub delete: OperationDocs,
    pub get_related: OperationDocs,
}

const GET_DESCRIPTION: &str = "Retrieve an item by its id. Details: https://jsonapi.org/format/#fetching-resources";
const GET_MANY_DESCRIPTION: &str = "Retrieve a list of items. Details: https://jsonapi.org/format/#fetching-resources";
const CREATE_DESCRIPTION: &str = "Create an item. Details: https://jsonapi.org/format/#crud-creating";
const UPDATE_DESCRIPTION: &str = "Update an item by its id. Details: https://jsonapi.org/format/#crud-updating";
const DELETE_DESCRIPTION: &str = "Delete an item by its id. Details: https://jsonapi.org/format/#crud-deleting";
const GET_RELATED_DESCRIPTION: &str = "Retrieve a related item. Details: https://jsonapi.org/format/#fetching-resources";

const REL_GET_DESCRIPTION: &str =
    "Retrieve a (list of) relationship(s). Details: https://jsonapi.org/format/#fetching-relationships";
const REL_POST_DESCRIPTION: &str = "Create a relationship. Details: https://jsonapi.org/format/#crud-updating-relationships";
const REL_PATCH_DESCRIPTION: &str = "Update a relationship. Details: https://jsonapi.org/format/#crud-updating-relationships";
const REL_DELETE_DESCRIPTION: &str = "Delete a relationship. Details: https://jsonapi.org/format/#crud-updating-relationships";

/// Builds an OpenAPI document for JSON:API resources.
pub struct ApiDocBuilder {
    title: String,
    version: String,
    description: Option<String>,
    paths: PathsBuilder,
    components: ComponentsBuilder,
}

impl ApiDocBuilder {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            description: None,
            paths: PathsBuilder::new(),
            components: ComponentsBuilder::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Document the CRUD and related routes of a registered resource.
    pub fn resource<S>(self, registry: &ResourceRegistry) -> Self
    where
        S: ResourceSchema,
        S::Attributes: ToSchema,
    {
        self.resource_with::<S>(registry, ResourceDocs::default())
    }

    /// Like [`resource`](Self::resource), with per-operation overrides.
    pub fn resource_with<S>(mut self, registry: &ResourceRegistry, docs: ResourceDocs) -> Self
    where
        S: ResourceSchema,
        S::Attributes: ToSchema,
    {
        let type_ = S::resource_type();
        let Some(info) = registry.get(type_) else {
            tracing::warn!("Resource type `{type_}` is not registered; skipping OpenAPI paths");
            return self;
        };

        self.components = self.components.schema(type_, resource_object_schema::<S>(info));

        // collection routes
        let mut collection = PathItemBuilder::new();
        if docs.get_many.include_in_schema {
            let operation = operation(type_, "get_many", GET_MANY_DESCRIPTION, &docs.get_many)
                .response("200", data_response(collection_data_schema(type_), "Resource collection"))
                .response("500", error_response("Internal server error"));
            collection = collection.operation(HttpMethod::Get, operation.build());
        }
        if docs.create.include_in_schema {
            let operation = operation(type_, "create", CREATE_DESCRIPTION, &docs.create)
                .request_body(Some(
                    RequestBodyBuilder::new()
                        .content(MEDIA_TYPE, ContentBuilder::new().schema(Some(single_data_schema(type_))).build())
                        .required(Some(Required::True))
                        .build(),
                ))
                .response("201", data_response(single_data_schema(type_), "Created resource"))
                .response("400", error_response("Invalid request document"))
                .response("500", error_response("Internal server error"));
            collection = collection.operation(HttpMethod::Post, operation.build());
        }
        self.paths = self.paths.path(info.path.clone(), collection.build());

        // item routes
        let item_path = format!("{}/{{id}}", info.path);
        let mut item = PathItemBuilder::new();
        if docs.get.include_in_schema {
            let operation = operation(type_, "get", GET_DESCRIPTION, &docs.get)
                .parameter(id_parameter(info.id_kind))
                .response("200", data_response(single_data_schema(type_), "A single resource"))
                .response("404", error_response("Resource object not found"))
                .response("500", error_response("Internal server error"));
            item = item.operation(HttpMethod::Get, operation.build());
        }
        if docs.update.include_in_schema {
            let operation = operation(type_, "update", UPDATE_DESCRIPTION, &docs.update)
                .parameter(id_parameter(info.id_kind))
                .request_body(Some(
                    RequestBodyBuilder::new()
                        .content(MEDIA_TYPE, ContentBuilder::new().schema(Some(single_data_schema(type_))).build())
                        .required(Some(Required::True))
                        .build(),
                ))
                .response("200", data_response(single_data_schema(type_), "Updated resource"))
                .response("400", error_response("Invalid request document"))
                .response("404", error_response("Resource object not found"))
                .response("500", error_response("Internal server error"));
            item = item.operation(HttpMethod::Patch, operation.build());
        }
        if docs.delete.include_in_schema {
            let operation = operation(type_, "delete", DELETE_DESCRIPTION, &docs.delete)
                .parameter(id_parameter(info.id_kind))
                .response("204", ResponseBuilder::new().description("Deleted").build())
                .response("404", error_response("Resource object not found"))
                .response("500", error_response("Internal server error"));
            item = item.operation(HttpMethod::Delete, operation.build());
        }
        self.paths = self.paths.path(item_path, item.build());

        // related-resource routes
        if docs.get_related.include_in_schema {
            for rel in &info.relationships {
                let related_path = format!("{}/{{id}}/{}", info.path, rel.name);
                let operation = operation(type_, &format!("related-{}", rel.name), GET_RELATED_DESCRIPTION, &docs.get_related)
                    .parameter(id_parameter(info.id_kind))
                    .response("200", data_response(related_data_schema(rel), "Related resource(s)"))
                    .response("404", error_response("Resource object not found"))
                    .response("500", error_response("Internal server error"));
                let path_item = PathItemBuilder::new().operation(HttpMethod::Get, operation.build()).build();
                self.paths = self.paths.path(related_path, path_item);
            }
        }

        self
    }

    /// Document a relationship route (`/{id}/relationships/{name}`) for the
    /// given methods.
    pub fn relationship<S>(mut self, registry: &ResourceRegistry, name: &str, methods: &[HttpMethod]) -> Self
    where
        S: ResourceSchema,
    {
        let type_ = S::resource_type();
        let Some(info) = registry.get(type_) else {
            tracing::warn!("Resource type `{type_}` is not registered; skipping OpenAPI relationship path");
            return self;
        };
        let Some(rel) = info.relationship(name) else {
            tracing::warn!("Relationship `{name}` is not declared on `{type_}`; skipping OpenAPI relationship path");
            return self;
        };

        let path = format!("{}/{{id}}/relationships/{}", info.path, rel.name);
        let mut path_item = PathItemBuilder::new();
        for method in methods {
            let (suffix, description) = match method {
                HttpMethod::Get => ("get", REL_GET_DESCRIPTION),
                HttpMethod::Post => ("post", REL_POST_DESCRIPTION),
                HttpMethod::Patch => ("patch", REL_PATCH_DESCRIPTION),
                HttpMethod::Delete => ("delete", REL_DELETE_DESCRIPTION),
                _ => continue,
            };
            let mut operation = OperationBuilder::new()
                .operation_id(Some(format!("{type_}-relationships-{}-{suffix}", rel.name)))
                .tag(type_)
                .description(Some(description))
                .parameter(id_parameter(info.id_kind))
                .response("200", data_response(relationship_response_schema(rel), "Relationship linkage"))
                .response("500", error_response("Internal server error"));
            if !matches!(method, HttpMethod::Get) {
                operation = operation
                    .request_body(Some(
                        RequestBodyBuilder::new()
                            .content(
                                MEDIA_TYPE,
                                ContentBuilder::new().schema(Some(relationship_request_schema(rel))).build(),
                            )
                            .required(Some(Required::True))
                            .build(),
                    ))
                    .response("400", error_response("Invalid request document"));
            }
            path_item = path_item.operation(method.clone(), operation.build());
        }
        self.paths = self.paths.path(path, path_item.build());
        self
    }

    pub fn build(self) -> OpenApi {
        let components = self
            .components
            .schema(ErrorDocument::name(), ErrorDocument::schema())
            .schema(ErrorObject::name(), ErrorObject::schema())
            .schema(ErrorSource::name(), ErrorSource::schema())
            .build();
        OpenApiBuilder::new()
            .info(
                InfoBuilder::new()
                    .title(self.title)
                    .version(self.version)
                    .description(self.description)
                    .build(),
            )
            .paths(self.paths.build())
            .components(Some(components))
            .build()
    }
}

fn operation<'a>(type_: &str, suffix: &str, default_description: &'a str, docs: &'a OperationDocs) -> OperationBuilder {
    OperationBuilder::new()
        .operation_id(Some(format!("{type_}-{suffix}")))
        .tag(type_)
        .summary(docs.summary.clone())
        .description(Some(
            docs.description.clone().unwrap_or_else(|| default_description.to_string()),
        ))
}

fn id_schema(kind: IdKind) -> RefOr<Schema> {
    match kind {
        IdKind::Str => ObjectBuilder::new().schema_type(Type::String).into(),
        IdKind::Int => ObjectBuilder::new().schema_type(Type::Integer).into(),
        IdKind::Uuid => ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid)))
            .into(),
    }
}

fn id_parameter(kind: IdKind) -> utoipa::openapi::path::Parameter {
    ParameterBuilder::new()
        .name("id")
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .schema(Some(id_schema(kind)))
        .build()
}

/// Resource identifier schema (`{type, id}`) for one relationship.
fn identifier_schema(rel: &RelationshipInfo) -> RefOr<Schema> {
    ObjectBuilder::new()
        .property("id", ObjectBuilder::new().schema_type(Type::String))
        .property(
            "type",
            ObjectBuilder::new()
                .schema_type(Type::String)
                .enum_values(Some([rel.related_type.as_str()])),
        )
        .into()
}

fn linkage_schema(rel: &RelationshipInfo) -> RefOr<Schema> {
    if rel.many {
        ArrayBuilder::new().items(identifier_schema(rel)).into()
    } else {
        identifier_schema(rel)
    }
}

/// `{"data": <linkage>}` — the relationship response document shape.
pub fn relationship_response_schema(rel: &RelationshipInfo) -> RefOr<Schema> {
    ObjectBuilder::new().property("data", linkage_schema(rel)).into()
}

/// `{"data": <linkage>}` — the relationship request document shape.
pub fn relationship_request_schema(rel: &RelationshipInfo) -> RefOr<Schema> {
    relationship_response_schema(rel)
}

/// The full resource object schema for `S`, attributes taken from
/// `S::Attributes`, relationships rendered as linkage objects.
fn resource_object_schema<S>(info: &RegisteredResource) -> RefOr<Schema>
where
    S: ResourceSchema,
    S::Attributes: ToSchema,
{
    let mut object = ObjectBuilder::new()
        .property(
            "type",
            ObjectBuilder::new()
                .schema_type(Type::String)
                .enum_values(Some([info.type_.as_str()])),
        )
        .required("type")
        .property("id", id_schema(IdKind::Str))
        .property("attributes", <S::Attributes as PartialSchema>::schema());

    if !info.relationships.is_empty() {
        let mut relationships = ObjectBuilder::new();
        for rel in &info.relationships {
            relationships = relationships.property(
                &rel.name,
                ObjectBuilder::new().property("data", linkage_schema(rel)).property(
                    "links",
                    ObjectBuilder::new()
                        .property("self", ObjectBuilder::new().schema_type(Type::String))
                        .property("related", ObjectBuilder::new().schema_type(Type::String)),
                ),
            );
        }
        object = object.property("relationships", relationships);
    }

    object
        .property(
            "links",
            ObjectBuilder::new().property("self", ObjectBuilder::new().schema_type(Type::String)),
        )
        .into()
}

/// `{"data": {$ref}}`
fn single_data_schema(type_: &str) -> RefOr<Schema> {
    ObjectBuilder::new()
        .property("data", Ref::from_schema_name(type_))
        .into()
}

/// `{"data": [{$ref}]}`
fn collection_data_schema(type_: &str) -> RefOr<Schema> {
    ObjectBuilder::new()
        .property("data", ArrayBuilder::new().items(Ref::from_schema_name(type_)))
        .into()
}

/// `{"data": ...}` shape for a related-resource response. Kept generic:
/// the related resource's component may not be part of this document.
fn related_data_schema(rel: &RelationshipInfo) -> RefOr<Schema> {
    let related = ObjectBuilder::new()
        .property(
            "type",
            ObjectBuilder::new()
                .schema_type(Type::String)
                .enum_values(Some([rel.related_type.as_str()])),
        )
        .property("id", ObjectBuilder::new().schema_type(Type::String))
        .property("attributes", ObjectBuilder::new());
    if rel.many {
        ObjectBuilder::new()
            .property("data", ArrayBuilder::new().items(related))
            .into()
    } else {
        ObjectBuilder::new().property("data", related).into()
    }
}

fn data_response(schema: RefOr<Schema>, description: &str) -> utoipa::openapi::Response {
    ResponseBuilder::new()
        .description(description)
        .content(MEDIA_TYPE, ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn error_response(description: &str) -> utoipa::openapi::Response {
    ResponseBuilder::new()
        .description(description)
        .content(
            MEDIA_TYPE,
            ContentBuilder::new()
                .schema(Some(Ref::from_schema_name(ErrorDocument::name())))
                .build(),
        )
        .build()
}
