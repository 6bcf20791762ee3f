//! Shared fixtures: an in-memory articles/people/comments API.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so downstream
//! crates can reuse the fixture app in their own tests via the
//! `test-utils` feature.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::Router;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::JsonApiConfig;
use crate::document::{Linkage, ResourceObject};
use crate::errors::{Error, Result};
use crate::registry::IdKind;
use crate::relationship::RelationshipResource;
use crate::resource::{RequestContext, Resource};
use crate::response::JsonApiResponse;
use crate::schema::{self, RelationshipDef, ResourceSchema};
use crate::{JsonApi, JsonApiState};

#[derive(Debug, Clone)]
pub struct Person {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub article_id: u64,
}

#[derive(Debug, Clone)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub author_id: Option<u64>,
    pub comment_ids: Vec<u64>,
}

/// In-memory store shared by all fixture resources.
#[derive(Debug, Default)]
pub struct Store {
    pub articles: RwLock<BTreeMap<u64, Article>>,
    pub people: RwLock<BTreeMap<u64, Person>>,
    pub comments: RwLock<BTreeMap<u64, Comment>>,
    next_id: AtomicU64,
}

impl Store {
    /// Two people, two articles, three comments.
    pub fn seeded() -> Arc<Self> {
        let store = Self::default();
        store.next_id.store(100, Ordering::SeqCst);
        {
            let mut people = store.people.write().unwrap();
            people.insert(
                9,
                Person {
                    id: 9,
                    name: "Ada".to_string(),
                },
            );
            people.insert(
                10,
                Person {
                    id: 10,
                    name: "Grace".to_string(),
                },
            );
        }
        {
            let mut comments = store.comments.write().unwrap();
            for (id, body, article_id) in [(5, "First!", 1), (12, "Nice read", 1), (13, "Hm", 2)] {
                comments.insert(
                    id,
                    Comment {
                        id,
                        body: body.to_string(),
                        article_id,
                    },
                );
            }
        }
        {
            let mut articles = store.articles.write().unwrap();
            articles.insert(
                1,
                Article {
                    id: 1,
                    title: "JSON:API and you".to_string(),
                    author_id: Some(9),
                    comment_ids: vec![5, 12],
                },
            );
            articles.insert(
                2,
                Article {
                    id: 2,
                    title: "Second thoughts".to_string(),
                    author_id: None,
                    comment_ids: vec![13],
                },
            );
        }
        Arc::new(store)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| Error::not_found())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArticleAttributes {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ArticleCreate {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ArticleUpdate {
    pub title: Option<String>,
}

pub struct ArticleSchema;

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
        vec![
            RelationshipDef::to_one("author", "people", |a: &Article| a.author_id.map(|id| id.to_string())),
            RelationshipDef::to_many("comments", "comments", |a: &Article| {
                a.comment_ids.iter().map(u64::to_string).collect()
            }),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PersonAttributes {
    pub name: String,
}

pub struct PersonSchema;

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

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommentAttributes {
    pub body: String,
}

pub struct CommentSchema;

impl ResourceSchema for CommentSchema {
    type Entity = Comment;
    type Attributes = CommentAttributes;

    fn resource_type() -> &'static str {
        "comments"
    }

    fn id(entity: &Comment) -> String {
        entity.id.to_string()
    }

    fn attributes(entity: &Comment) -> CommentAttributes {
        CommentAttributes {
            body: entity.body.clone(),
        }
    }
}

pub struct ArticlesResource {
    pub store: Arc<Store>,
}

impl ArticlesResource {
    fn load(&self, id: &str) -> Result<Article> {
        let id = parse_id(id)?;
        self.store
            .articles
            .read()
            .unwrap()
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
        let articles: Vec<Article> = self.store.articles.read().unwrap().values().cloned().collect();
        let document = if ctx.query().page.is_empty() {
            self.serialize_many(ctx, &articles, None).await?
        } else {
            let page = ctx.paginate(&articles)?;
            self.serialize_many(ctx, &page.items, Some(page.links)).await?
        };
        Ok(self.to_response(document))
    }

    async fn create(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let inbound = self.deserialize_create::<ArticleCreate>(ctx)?;
        let author_id = match inbound.relationships.get("author") {
            Some(Linkage::One(identifier)) => Some(parse_id(&identifier.id)?),
            _ => None,
        };
        let article = Article {
            id: self.store.next_id(),
            title: inbound.attributes.title,
            author_id,
            comment_ids: Vec::new(),
        };
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        let document = self.serialize(ctx, &article).await?;
        Ok(JsonApiResponse::created(document))
    }

    async fn update(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let inbound = self.deserialize_update::<ArticleUpdate>(ctx)?;
        let mut article = self.load(id)?;
        if let Some(title) = inbound.attributes.title {
            article.title = title;
        }
        if let Some(linkage) = inbound.relationships.get("author") {
            article.author_id = match linkage {
                Linkage::One(identifier) => Some(parse_id(&identifier.id)?),
                _ => None,
            };
        }
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        let document = self.serialize(ctx, &article).await?;
        Ok(self.to_response(document))
    }

    async fn delete(&self, _ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let id = parse_id(id)?;
        match self.store.articles.write().unwrap().remove(&id) {
            Some(_) => Ok(JsonApiResponse::no_content()),
            None => Err(Error::not_found()),
        }
    }

    async fn get_related(
        &self,
        ctx: &RequestContext,
        id: &str,
        relationship: &str,
        related_id: Option<&str>,
    ) -> Result<JsonApiResponse> {
        let article = self.load(id)?;
        let document = match relationship {
            "author" => {
                let author = article
                    .author_id
                    .and_then(|author_id| self.store.people.read().unwrap().get(&author_id).cloned());
                ctx.related_one::<PersonSchema>(author.as_ref(), id, relationship)?
            }
            "comments" => {
                let comments = self.store.comments.read().unwrap();
                match related_id {
                    Some(related_id) => {
                        let related_id = parse_id(related_id)?;
                        let comment = article
                            .comment_ids
                            .contains(&related_id)
                            .then(|| comments.get(&related_id).cloned())
                            .flatten()
                            .ok_or_else(Error::not_found)?;
                        ctx.related_one::<CommentSchema>(Some(&comment), id, relationship)?
                    }
                    None => {
                        let related: Vec<Comment> = article
                            .comment_ids
                            .iter()
                            .filter_map(|comment_id| comments.get(comment_id).cloned())
                            .collect();
                        ctx.related_many::<CommentSchema>(&related, id, relationship)?
                    }
                }
            }
            _ => return Err(Error::not_found()),
        };
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
            match relation.as_str() {
                "author" => {
                    if let Some(author_id) = entity.author_id
                        && let Some(person) = self.store.people.read().unwrap().get(&author_id)
                    {
                        included.push(schema::resource_object::<PersonSchema>(person, ctx.registry())?);
                    }
                }
                "comments" => {
                    let comments = self.store.comments.read().unwrap();
                    for comment_id in &entity.comment_ids {
                        if let Some(comment) = comments.get(comment_id) {
                            included.push(schema::resource_object::<CommentSchema>(comment, ctx.registry())?);
                        }
                    }
                }
                _ => return Err(Error::bad_request("Invalid `include` parameter.")),
            }
        }
        Ok(included)
    }
}

/// Read-only resource: only GET is allowed.
pub struct PeopleResource {
    pub store: Arc<Store>,
}

#[async_trait]
impl Resource for PeopleResource {
    type Schema = PersonSchema;

    fn id_kind() -> IdKind {
        IdKind::Int
    }

    fn allowed_methods() -> Vec<Method> {
        vec![Method::GET]
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let id = parse_id(id)?;
        let person = self
            .store
            .people
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)?;
        let document = self.serialize(ctx, &person).await?;
        Ok(self.to_response(document))
    }

    async fn get_many(&self, ctx: &RequestContext) -> Result<JsonApiResponse> {
        let people: Vec<Person> = self.store.people.read().unwrap().values().cloned().collect();
        let document = self.serialize_many(ctx, &people, None).await?;
        Ok(self.to_response(document))
    }
}

pub struct CommentsResource {
    pub store: Arc<Store>,
}

#[async_trait]
impl Resource for CommentsResource {
    type Schema = CommentSchema;

    fn id_kind() -> IdKind {
        IdKind::Int
    }

    async fn get(&self, ctx: &RequestContext, id: &str) -> Result<JsonApiResponse> {
        let id = parse_id(id)?;
        let comment = self
            .store
            .comments
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)?;
        let document = self.serialize(ctx, &comment).await?;
        Ok(self.to_response(document))
    }
}

/// `/articles/{id}/relationships/author`
pub struct ArticleAuthorRelationship {
    pub store: Arc<Store>,
}

impl ArticleAuthorRelationship {
    fn load(&self, parent_id: &str) -> Result<Article> {
        let id = parse_id(parent_id)?;
        self.store
            .articles
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)
    }
}

#[async_trait]
impl RelationshipResource for ArticleAuthorRelationship {
    type Parent = ArticleSchema;

    fn relationship_name() -> &'static str {
        "author"
    }

    fn allowed_methods() -> Vec<Method> {
        vec![Method::GET, Method::PATCH]
    }

    async fn get(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let article = self.load(parent_id)?;
        let linkage = Self::definition()?.linkage(&article);
        Ok(JsonApiResponse::ok(self.serialize_linkage(ctx, parent_id, linkage)))
    }

    async fn patch(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let linkage = self.deserialize_ids(ctx)?;
        let mut article = self.load(parent_id)?;
        article.author_id = match &linkage {
            Linkage::One(identifier) => Some(parse_id(&identifier.id)?),
            _ => None,
        };
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        let linkage = Self::definition()?.linkage(&article);
        Ok(JsonApiResponse::ok(self.serialize_linkage(ctx, parent_id, linkage)))
    }
}

/// `/articles/{id}/relationships/comments`
pub struct ArticleCommentsRelationship {
    pub store: Arc<Store>,
}

impl ArticleCommentsRelationship {
    fn load(&self, parent_id: &str) -> Result<Article> {
        let id = parse_id(parent_id)?;
        self.store
            .articles
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(Error::not_found)
    }

    fn respond(&self, ctx: &RequestContext, parent_id: &str, article: &Article) -> Result<JsonApiResponse> {
        let linkage = Self::definition()?.linkage(article);
        Ok(JsonApiResponse::ok(self.serialize_linkage(ctx, parent_id, linkage)))
    }
}

#[async_trait]
impl RelationshipResource for ArticleCommentsRelationship {
    type Parent = ArticleSchema;

    fn relationship_name() -> &'static str {
        "comments"
    }

    async fn get(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let article = self.load(parent_id)?;
        self.respond(ctx, parent_id, &article)
    }

    async fn post(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let linkage = self.deserialize_ids(ctx)?;
        let mut article = self.load(parent_id)?;
        for id in linkage.ids() {
            let id = parse_id(id)?;
            if !article.comment_ids.contains(&id) {
                article.comment_ids.push(id);
            }
        }
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        self.respond(ctx, parent_id, &article)
    }

    async fn patch(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let linkage = self.deserialize_ids(ctx)?;
        let mut article = self.load(parent_id)?;
        article.comment_ids = linkage.ids().into_iter().map(parse_id).collect::<Result<_>>()?;
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        self.respond(ctx, parent_id, &article)
    }

    async fn delete(&self, ctx: &RequestContext, parent_id: &str) -> Result<JsonApiResponse> {
        let linkage = self.deserialize_ids(ctx)?;
        let mut article = self.load(parent_id)?;
        let remove: Vec<u64> = linkage.ids().into_iter().map(parse_id).collect::<Result<_>>()?;
        article.comment_ids.retain(|id| !remove.contains(id));
        self.store.articles.write().unwrap().insert(article.id, article.clone());
        self.respond(ctx, parent_id, &article)
    }
}

/// The fixture app: three resources and two relationship resources.
pub fn sample_app(store: Arc<Store>, config: JsonApiConfig) -> Router {
    JsonApi::new(config)
        .register(ArticlesResource { store: store.clone() })
        .register(PeopleResource { store: store.clone() })
        .register(CommentsResource { store: store.clone() })
        .register_relationship(ArticleAuthorRelationship { store: store.clone() })
        .register_relationship(ArticleCommentsRelationship { store })
        .into_router()
}

/// State construction for unit tests that bypass HTTP dispatch.
impl JsonApiState {
    pub fn for_tests(config: JsonApiConfig, registry: crate::registry::ResourceRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }
}
