//! Schema-to-resource binding.
//!
//! A [`ResourceSchema`] ties a domain entity to the wire format: its
//! JSON:API `type`, how to read its id, which struct its attributes
//! serialize through, and which relationships it declares. Relationship
//! descriptors work off id accessors, so linkage serializes even when the
//! related entities themselves were never loaded.
//!
//! Serialization assembles [`Document`]s with self/related links resolved
//! through the [`ResourceRegistry`]; schemas whose type is not registered
//! simply produce no links. Deserialization validates the JSON:API envelope
//! and hands the `attributes` member to a caller-chosen target type, so
//! create and update payloads can deserialize into different structs.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::document::{
    Document, ErrorObject, Linkage, Links, PrimaryData, Relationship, ResourceIdentifier, ResourceObject,
};
use crate::errors::{Error, Result};
use crate::registry::ResourceRegistry;

/// Binds a domain entity to its JSON:API representation.
pub trait ResourceSchema: Send + Sync + 'static {
    /// The domain type being serialized.
    type Entity: Send + Sync;
    /// Serialization target for the `attributes` member.
    type Attributes: Serialize + Send;

    /// The JSON:API resource type, also used as the mount path segment.
    fn resource_type() -> &'static str;

    fn id(entity: &Self::Entity) -> String;

    fn attributes(entity: &Self::Entity) -> Self::Attributes;

    /// Relationship descriptors. The default is no relationships.
    fn relationships() -> Vec<RelationshipDef<Self::Entity>> {
        Vec::new()
    }
}

#[derive(Debug)]
enum RelatedIds<E> {
    ToOne(fn(&E) -> Option<String>),
    ToMany(fn(&E) -> Vec<String>),
}

/// A declared relationship: name, related resource type, and an accessor
/// producing the related ids from the parent entity.
#[derive(Debug)]
pub struct RelationshipDef<E> {
    name: &'static str,
    related_type: &'static str,
    ids: RelatedIds<E>,
    links: bool,
}

impl<E> RelationshipDef<E> {
    /// A to-one relationship. The accessor returns `None` for an empty
    /// relation, which serializes as `data: null`.
    pub fn to_one(name: &'static str, related_type: &'static str, ids: fn(&E) -> Option<String>) -> Self {
        Self {
            name,
            related_type,
            ids: RelatedIds::ToOne(ids),
            links: true,
        }
    }

    /// A to-many relationship.
    pub fn to_many(name: &'static str, related_type: &'static str, ids: fn(&E) -> Vec<String>) -> Self {
        Self {
            name,
            related_type,
            ids: RelatedIds::ToMany(ids),
            links: true,
        }
    }

    /// Suppress the `self`/`related` links on the relationship object.
    pub fn without_links(mut self) -> Self {
        self.links = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn related_type(&self) -> &'static str {
        self.related_type
    }

    pub fn many(&self) -> bool {
        matches!(self.ids, RelatedIds::ToMany(_))
    }

    /// Resource linkage for the given entity.
    pub fn linkage(&self, entity: &E) -> Linkage {
        match &self.ids {
            RelatedIds::ToOne(ids) => match ids(entity) {
                Some(id) => Linkage::One(ResourceIdentifier::new(self.related_type, id)),
                None => Linkage::Empty,
            },
            RelatedIds::ToMany(ids) => Linkage::Many(
                ids(entity)
                    .into_iter()
                    .map(|id| ResourceIdentifier::new(self.related_type, id))
                    .collect(),
            ),
        }
    }
}

/// Serialize one entity into a [`ResourceObject`] with relationship objects
/// and a `self` link.
pub fn resource_object<S: ResourceSchema>(entity: &S::Entity, registry: &ResourceRegistry) -> Result<ResourceObject> {
    let type_ = S::resource_type();
    let id = S::id(entity);

    let attributes = match serde_json::to_value(S::attributes(entity)) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(Error::internal("serialize resource attributes")),
        Err(e) => return Err(Error::Other(anyhow::anyhow!(e).context("serializing resource attributes"))),
    };

    let mut resource = ResourceObject::new(type_, Some(id.clone()));
    if !attributes.is_empty() {
        resource.attributes = Some(attributes);
    }

    let defs = S::relationships();
    if !defs.is_empty() {
        let mut relationships = BTreeMap::new();
        for def in &defs {
            let mut links = Links::new();
            if def.links {
                if let Some(url) = registry.relationship_url(type_, &id, def.name) {
                    links.insert("self", Some(url));
                }
                if let Some(url) = registry.related_url(type_, &id, def.name) {
                    links.insert("related", Some(url));
                }
            }
            relationships.insert(
                def.name.to_string(),
                Relationship {
                    data: Some(def.linkage(entity)),
                    links: if links.is_empty() { None } else { Some(links) },
                    meta: None,
                },
            );
        }
        resource.relationships = Some(relationships);
    }

    if let Some(url) = registry.url_for(type_, &id) {
        resource.links = Some(Links::new().with("self", url));
    }

    Ok(resource)
}

/// Document for a single resource, with a top-level `self` link.
pub fn document<S: ResourceSchema>(entity: &S::Entity, registry: &ResourceRegistry) -> Result<Document> {
    let resource = resource_object::<S>(entity, registry)?;
    let self_link = registry.url_for(S::resource_type(), &S::id(entity));
    let mut doc = Document::one(resource);
    if let Some(url) = self_link {
        doc.merge_links(Links::new().with("self", url));
    }
    Ok(doc)
}

/// Document for a resource collection, with a top-level `self` link.
pub fn collection_document<S: ResourceSchema>(entities: &[S::Entity], registry: &ResourceRegistry) -> Result<Document> {
    let resources = entities
        .iter()
        .map(|entity| resource_object::<S>(entity, registry))
        .collect::<Result<Vec<_>>>()?;
    let mut doc = Document::collection(resources);
    if let Some(url) = registry.collection_url(S::resource_type()) {
        doc.merge_links(Links::new().with("self", url));
    }
    Ok(doc)
}

/// Document for a to-one related-resource request
/// (`GET /{parent}/{id}/{relationship}`). The top-level `self` link points
/// at the related route, not at the related resource itself.
pub fn related_one_document<S: ResourceSchema>(
    entity: Option<&S::Entity>,
    registry: &ResourceRegistry,
    parent_type: &str,
    parent_id: &str,
    relationship: &str,
) -> Result<Document> {
    let mut doc = match entity {
        Some(entity) => Document::one(resource_object::<S>(entity, registry)?),
        None => Document::null(),
    };
    if let Some(url) = registry.related_url(parent_type, parent_id, relationship) {
        doc.merge_links(Links::new().with("self", url));
    }
    Ok(doc)
}

/// Document for a to-many related-resource request.
pub fn related_many_document<S: ResourceSchema>(
    entities: &[S::Entity],
    registry: &ResourceRegistry,
    parent_type: &str,
    parent_id: &str,
    relationship: &str,
) -> Result<Document> {
    let resources = entities
        .iter()
        .map(|entity| resource_object::<S>(entity, registry))
        .collect::<Result<Vec<_>>>()?;
    let mut doc = Document::collection(resources);
    if let Some(url) = registry.related_url(parent_type, parent_id, relationship) {
        doc.merge_links(Links::new().with("self", url));
    }
    Ok(doc)
}

/// A validated request document, attributes already deserialized into `A`.
#[derive(Debug)]
pub struct Inbound<A> {
    /// The document's `data.id`, when present.
    pub id: Option<String>,
    pub attributes: A,
    /// Relationship linkage from the document, keyed by relationship name.
    /// Relationships without a `data` member are skipped.
    pub relationships: BTreeMap<String, Linkage>,
}

/// Parse a request body into a [`Document`].
pub fn parse_document(body: &[u8]) -> Result<Document> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Could not read request body: {e}");
        Error::unreadable_body()
    })
}

/// Validate the envelope of a request document against schema `S` and
/// deserialize `data.attributes` into `A`.
///
/// `require_id` is set for update requests, where the document must carry
/// the id of the resource being updated.
pub fn extract_inbound<S: ResourceSchema, A: DeserializeOwned>(document: &Document, require_id: bool) -> Result<Inbound<A>> {
    let resource = match &document.data {
        Some(PrimaryData::One(resource)) => resource,
        _ => {
            return Err(Error::Validation {
                errors: vec![ErrorObject::detail("Object must include `data` key.").with_pointer("/data")],
            });
        }
    };

    if resource.type_.is_empty() {
        return Err(Error::Validation {
            errors: vec![ErrorObject::detail("`data` object must include `type` key.").with_pointer("/data")],
        });
    }
    if resource.type_ != S::resource_type() {
        return Err(Error::Validation {
            errors: vec![ErrorObject::detail("Invalid `type` specified").with_pointer("/data/type")],
        });
    }
    if require_id && resource.id.is_none() {
        return Err(Error::Validation {
            errors: vec![ErrorObject::detail("Must include an `id` field").with_pointer("/data/id")],
        });
    }

    let attributes = Value::Object(resource.attributes.clone().unwrap_or_default());
    let attributes: A = serde_json::from_value(attributes).map_err(|e| Error::Validation {
        errors: vec![ErrorObject::detail(e.to_string()).with_pointer("/data/attributes")],
    })?;

    let relationships = resource
        .relationships
        .iter()
        .flatten()
        .filter_map(|(name, relationship)| relationship.data.clone().map(|linkage| (name.clone(), linkage)))
        .collect();

    Ok(Inbound {
        id: resource.id.clone(),
        attributes,
        relationships,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonApiConfig;
    use crate::registry::{IdKind, RegisteredResource, RelationshipInfo};
    use serde::Deserialize;
    use serde_json::json;

    struct Article {
        id: u64,
        title: String,
        author_id: Option<String>,
        comment_ids: Vec<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct ArticleAttributes {
        title: String,
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
            vec![
                RelationshipDef::to_one("author", "people", |a: &Article| a.author_id.clone()),
                RelationshipDef::to_many("comments", "comments", |a: &Article| a.comment_ids.clone()),
            ]
        }
    }

    fn article() -> Article {
        Article {
            id: 1,
            title: "Rust for snakes".to_string(),
            author_id: Some("9".to_string()),
            comment_ids: vec!["5".to_string(), "12".to_string()],
        }
    }

    fn registry() -> ResourceRegistry {
        let config = JsonApiConfig {
            base_path: "/api".to_string(),
            ..JsonApiConfig::default()
        };
        let mut registry = ResourceRegistry::new(&config);
        registry.insert(RegisteredResource {
            type_: "articles".to_string(),
            path: "/api/articles".to_string(),
            id_kind: IdKind::Int,
            relationships: vec![
                RelationshipInfo {
                    name: "author".to_string(),
                    related_type: "people".to_string(),
                    many: false,
                },
                RelationshipInfo {
                    name: "comments".to_string(),
                    related_type: "comments".to_string(),
                    many: true,
                },
            ],
        });
        registry
    }

    #[test]
    fn serializes_resource_with_relationships_and_links() {
        let doc = document::<ArticleSchema>(&article(), &registry()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["data"]["type"], "articles");
        assert_eq!(value["data"]["id"], "1");
        assert_eq!(value["data"]["attributes"]["title"], "Rust for snakes");
        assert_eq!(value["data"]["links"]["self"], "/api/articles/1");
        assert_eq!(value["links"]["self"], "/api/articles/1");

        let author = &value["data"]["relationships"]["author"];
        assert_eq!(author["data"], json!({ "type": "people", "id": "9" }));
        assert_eq!(author["links"]["self"], "/api/articles/1/relationships/author");
        assert_eq!(author["links"]["related"], "/api/articles/1/author");

        let comments = &value["data"]["relationships"]["comments"];
        assert_eq!(
            comments["data"],
            json!([{ "type": "comments", "id": "5" }, { "type": "comments", "id": "12" }])
        );
    }

    #[test]
    fn empty_to_one_serializes_null_linkage() {
        let mut entity = article();
        entity.author_id = None;
        let doc = document::<ArticleSchema>(&entity, &registry()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["data"]["relationships"]["author"]["data"], Value::Null);
    }

    #[test]
    fn unregistered_schema_produces_no_links() {
        let config = JsonApiConfig::default();
        let empty_registry = ResourceRegistry::new(&config);
        let doc = document::<ArticleSchema>(&article(), &empty_registry).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("links").is_none());
        assert!(value["data"].get("links").is_none());
        assert!(value["data"]["relationships"]["author"].get("links").is_none());
    }

    #[test]
    fn collection_document_carries_collection_self_link() {
        let entities = vec![article()];
        let doc = collection_document::<ArticleSchema>(&entities, &registry()).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["links"]["self"], "/api/articles");
        assert!(value["data"].is_array());
    }

    #[test]
    fn related_documents_link_to_the_related_route() {
        let doc = related_one_document::<ArticleSchema>(Some(&article()), &registry(), "articles", "1", "parent").unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["links"]["self"], "/api/articles/1/parent");

        let doc = related_one_document::<ArticleSchema>(None, &registry(), "articles", "1", "parent").unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["data"], Value::Null);
    }

    #[test]
    fn extract_inbound_happy_path() {
        let document: Document = serde_json::from_value(json!({
            "data": {
                "type": "articles",
                "attributes": { "title": "hello" },
                "relationships": {
                    "author": { "data": { "type": "people", "id": "9" } },
                    "untouched": {}
                }
            }
        }))
        .unwrap();
        let inbound: Inbound<ArticleAttributes> = extract_inbound::<ArticleSchema, _>(&document, false).unwrap();
        assert!(inbound.id.is_none());
        assert_eq!(inbound.attributes.title, "hello");
        assert_eq!(inbound.relationships["author"].ids(), vec!["9"]);
        assert!(!inbound.relationships.contains_key("untouched"));
    }

    #[test]
    fn extract_inbound_rejects_missing_data() {
        let document: Document = serde_json::from_value(json!({ "meta": {} })).unwrap();
        let err = extract_inbound::<ArticleSchema, ArticleAttributes>(&document, false).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Object must include `data` key.");
        assert_eq!(value["errors"][0]["source"]["pointer"], "/data");
    }

    #[test]
    fn extract_inbound_rejects_wrong_type() {
        let document: Document = serde_json::from_value(json!({
            "data": { "type": "people", "attributes": { "title": "x" } }
        }))
        .unwrap();
        let err = extract_inbound::<ArticleSchema, ArticleAttributes>(&document, false).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Invalid `type` specified");
        assert_eq!(value["errors"][0]["source"]["pointer"], "/data/type");
    }

    #[test]
    fn extract_inbound_requires_id_for_updates() {
        let document: Document = serde_json::from_value(json!({
            "data": { "type": "articles", "attributes": { "title": "x" } }
        }))
        .unwrap();
        let err = extract_inbound::<ArticleSchema, ArticleAttributes>(&document, true).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["detail"], "Must include an `id` field");
    }

    #[test]
    fn extract_inbound_reports_attribute_errors_with_pointer() {
        #[derive(Debug, Deserialize)]
        struct Strict {
            #[allow(dead_code)]
            title: String,
        }
        let document: Document = serde_json::from_value(json!({
            "data": { "type": "articles", "attributes": { "not_title": 1 } }
        }))
        .unwrap();
        let err = extract_inbound::<ArticleSchema, Strict>(&document, false).unwrap_err();
        let value = serde_json::to_value(err.to_document()).unwrap();
        assert_eq!(value["errors"][0]["source"]["pointer"], "/data/attributes");
        assert_eq!(value["errors"][0]["status"], "400");
    }

    #[test]
    fn parse_document_rejects_malformed_json() {
        let err = parse_document(b"{not json").unwrap_err();
        assert_eq!(err.user_message(), "Could not read request body as JSON.");
    }
}
