//! A small articles/people API demonstrating resource registration,
//! relationship routes and OpenAPI generation.
//!
//! Run with `cargo run --example articles`, then try:
//!
//! ```bash
//! curl -s localhost:8080/api/articles | jq
//! curl -s localhost:8080/api/articles/1?include=author | jq
//! curl -s localhost:8080/api/articles/1/relationships/author | jq
//! curl -s -X POST localhost:8080/api/articles \
//!   -H 'content-type: application/vnd.api+json' \
//!   -d '{"data": {"type": "articles", "attributes": {"title": "New"}}}' | jq
//! curl -s localhost:8080/openapi.json | jq
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::Json;
use axum::routing::get;
use junction::openapi::ApiDocBuilder;
use junction::{
    Error, IdKind, JsonApi, JsonApiConfig, JsonApiResponse, Linkage, RelationshipDef, RelationshipResource,
    RequestContext, Resource, ResourceObject, ResourceSchema, Result,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use utoipa::ToSchema;

#[derive(Debug, Clone)]
struct Article {
    id: u64,
    title: String,
    author_id: Option<u64>,
}

#[derive(Debug, Clone)]
struct Person {
    id: u64,
    name: String,
}

#[derive(Debug, Default)]
struct Store {
    articles: RwLock<BTreeMap<u64, Article>>,
    people: RwLock<BTreeMap<u64, Person>>,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
struct ArticleAttributes {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ArticlePatch {
    title: Option<String>,
}

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

    fn attributes(entity: &Article) -> ArticleAttributes {
        ArticleAttributes {
            title: entity.title.clone(),
        }
    }

    fn relationships() -> Vec<RelationshipDef<Article>> {
        vec![RelationshipDef::to_one("author", "people", |a: &Article| {
            a.author_id.map(|id| id.to_string())
        })]
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
struct PersonAttributes {
    name: String,
}

struct PersonSchema;

impl ResourceSchema for PersonSchema {
    type Entity = Person;
    type Attributes = PersonAttributes;

    fn resource_type() -> &'static str {
        "people"
    }

    fn id(entity: &Person) -> String {
        entity.id.to_string()
    }

    fn attributes(entity: &Person) -> PersonAttributes {
        PersonAttributes {
            name: entity.name.clone(),
        }
    }
}

struct ArticlesResource {
    store: Arc<Store>,
}

impl ArticlesResource {
    fn load(&self, id: &str) -> Result<Article> {
        let id: u64 = id.parse().map_err(|_| Error::not_found())?;
        self.store
            .articles
            .read()
            .expect("store lock")
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)
    }
}

#[async_trait]
impl Resource for ArticlesResource {
    type Schema = ArticleSchema;

    fn id_kind() -> IdKind {
        IdKind::Int
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let article = self.load(id)?;
        let document = self.serialize(ctx, &article).await?;
        Ok(self.to_response(document))
    }

    async fn get_many(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let articles: Vec<Article> = self.store.articles.read().expect("store lock").values().cloned().collect();
        let page = ctx.paginate(&articles)?;
        let document = self.serialize_many(ctx, &page.items, Some(page.links)).await?;
        Ok(self.to_response(document))
    }

    async fn create(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let inbound = self.deserialize_create::<ArticleAttributes>(ctx)?;
        let author_id = match inbound.relationships.get("author") {
            Some(Linkage::One(identifier)) => Some(identifier.id.parse().map_err(|_| Error::not_found())?),
            _ => None,
        };
        let article = Article {
            id: self.store.next_id.fetch_add(1, Ordering::SeqCst),
            title: inbound.attributes.title,
            author_id,
        };
        self.store
            .articles
            .write()
            .expect("store lock")
            .insert(article.id, article.clone());
        let document = self.serialize(ctx, &article).await?;
        Ok(JsonApiResponse::created(document))
    }

    async fn update(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let inbound = self.deserialize_update::<ArticlePatch>(ctx)?;
        let mut article = self.load(id)?;
        if let Some(title) = inbound.attributes.title {
            article.title = title;
        }
        self.store
            .articles
            .write()
            .expect("store lock")
            .insert(article.id, article.clone());
        let document = self.serialize(ctx, &article).await?;
        Ok(self.to_response(document))
    }

    async fn delete(&self, _ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let id: u64 = id.parse().map_err(|_| Error::not_found())?;
        match self.store.articles.write().expect("store lock").remove(&id) {
            Some(_) => Ok(JsonApiResponse::no_content()),
            None => Err(Error::not_found()),
        }
    }

    async fn get_related(
        &self,
        ctx: &RequestContext,
        id: &str,
        relationship: &str,
        _related_id: Option<&str>,
    ) -> Result<JsonApiResponse> {
        let article = self.load(id)?;
        let author = article
            .author_id
            .and_then(|author_id| self.store.people.read().expect("store lock").get(&author_id).cloned());
        let document = ctx.related_one::<PersonSchema>(author.as_ref(), id, relationship)?;
        Ok(self.to_response(document))
    }

    async fn include_relations(
        &self,
        ctx: &RequestContext,
        entity: &Article,
        relations: &[String],
    ) -> Result<Vec<ResourceObject>> {
        let mut included = Vec::new();
        for relation in relations {
            if relation != "author" {
                return Err(Error::bad_request("Invalid `include` parameter."));
            }
            if let Some(author_id) = entity.author_id
                && let Some(person) = self.store.people.read().expect("store lock").get(&author_id)
            {
                included.push(junction::schema::resource_object::<PersonSchema>(person, ctx.registry())?);
            }
        }
        Ok(included)
    }
}

struct PeopleResource {
    store: Arc<Store>,
}

#[async_trait]
impl Resource for PeopleResource {
    type Schema = PersonSchema;

    fn id_kind() -> IdKind {
        IdKind::Int
    }

    fn allowed_methods() -> Vec<axum::http::Method> {
        vec![axum::http::Method::GET]
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let id: u64 = id.parse().map_err(|_| Error::not_found())?;
        let person = self
            .store
            .people
            .read()
            .expect("store lock")
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)?;
        let document = self.serialize(ctx, &person).await?;
        Ok(self.to_response(document))
    }

    async fn get_many(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let people: Vec<Person> = self.store.people.read().expect("store lock").values().cloned().collect();
        let document = self.serialize_many(ctx, &people, None).await?;
        Ok(self.to_response(document))
    }
}

struct AuthorRelationship {
    store: Arc<Store>,
}

#[async_trait]
impl RelationshipResource for AuthorRelationship {
    type Parent = ArticleSchema;

    fn relationship_name() -> &'static str {
        "author"
    }

    fn allowed_methods() -> Vec<axum::http::Method> {
        vec![axum::http::Method::GET, axum::http::Method::PATCH]
    }

    async fn get(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let id: u64 = parent_id.parse().map_err(|_| Error::not_found())?;
        let article = self
            .store
            .articles
            .read()
            .expect("store lock")
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)?;
        let linkage = Self::definition()?.linkage(&article);
        Ok(JsonApiResponse::ok(self.serialize_linkage(ctx, parent_id, linkage)))
    }

    async fn patch(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let linkage = self.deserialize_ids(ctx)?;
        let id: u64 = parent_id.parse().map_err(|_| Error::not_found())?;
        let mut articles = self.store.articles.write().expect("store lock");
        let article = articles.get_mut(&id).ok_or_else(Error::not_found)?;
        article.author_id = match &linkage {
            Linkage::One(identifier) => Some(identifier.id.parse().map_err(|_| Error::not_found())?),
            _ => None,
        };
        let linkage = Self::definition()?.linkage(article);
        Ok(JsonApiResponse::ok(self.serialize_linkage(ctx, parent_id, linkage)))
    }
}

fn seeded_store() -> Arc<Store> {
    let store = Store::default();
    store.next_id.store(3, Ordering::SeqCst);
    store.people.write().expect("store lock").insert(
        1,
        Person {
            id: 1,
            name: "Ada".to_string(),
        },
    );
    store.articles.write().expect("store lock").insert(
        1,
        Article {
            id: 1,
            title: "JSON:API from Rust".to_string(),
            author_id: Some(1),
        },
    );
    Arc::new(store)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = seeded_store();
    let config = JsonApiConfig {
        base_path: "/api".to_string(),
        ..JsonApiConfig::default()
    };

    let api = JsonApi::new(config)
        .register(ArticlesResource { store: store.clone() })
        .register(PeopleResource { store: store.clone() })
        .register_relationship(AuthorRelationship { store });

    let openapi = ApiDocBuilder::new("Articles API", "1.0")
        .description("A demo JSON:API service")
        .resource::<ArticleSchema>(api.registry())
        .resource::<PersonSchema>(api.registry())
        .relationship::<ArticleSchema>(
            api.registry(),
            "author",
            &[
                utoipa::openapi::path::HttpMethod::Get,
                utoipa::openapi::path::HttpMethod::Patch,
            ],
        )
        .build();
    let spec = serde_json::to_value(openapi).expect("serialize OpenAPI document");

    let app = api
        .into_router()
        .route("/openapi.json", get(move || async move { Json(spec) }));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.expect("bind 0.0.0.0:8080");
    tracing::info!("Articles API listening on http://localhost:8080");
    axum::serve(listener, app).await.expect("serve");
}
