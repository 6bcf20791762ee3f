//! Registration conventions: which resources are mounted where.
//!
//! The [`ResourceRegistry`] records every resource type registered on a
//! [`JsonApi`](crate::JsonApi) mount together with its path, id kind and
//! declared relationships. Link generation for resources, relationships and
//! related routes all goes through it, so schemas can produce links for
//! resources other than their own without holding a reference to them.

use std::collections::BTreeMap;

use crate::config::JsonApiConfig;

/// Path-segment format of a resource id. Ids arriving in the URL are checked
/// against the declared kind before a handler runs; a mismatch is a 404, the
/// same answer a router with typed path convertors would give.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdKind {
    /// Any non-empty segment.
    #[default]
    Str,
    /// Base-10 integer.
    Int,
    /// Hyphenated UUID.
    Uuid,
}

impl IdKind {
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            IdKind::Str => !raw.is_empty(),
            IdKind::Int => !raw.is_empty() && raw.parse::<i64>().is_ok(),
            IdKind::Uuid => uuid::Uuid::parse_str(raw).is_ok(),
        }
    }
}

/// A relationship as declared by a schema, reduced to routing metadata.
#[derive(Debug, Clone)]
pub struct RelationshipInfo {
    pub name: String,
    pub related_type: String,
    pub many: bool,
}

/// Metadata for one mounted resource.
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    /// JSON:API resource type, also the final path segment of the mount.
    pub type_: String,
    /// Mount path relative to the router root, e.g. `/api/v1/articles`.
    pub path: String,
    pub id_kind: IdKind,
    pub relationships: Vec<RelationshipInfo>,
}

impl RegisteredResource {
    pub fn relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.iter().find(|rel| rel.name == name)
    }
}

/// Registry of mounted resources, shared with every request through
/// [`JsonApiState`](crate::JsonApiState).
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, RegisteredResource>,
    link_prefix: Option<String>,
}

impl ResourceRegistry {
    pub fn new(config: &JsonApiConfig) -> Self {
        Self {
            resources: BTreeMap::new(),
            link_prefix: config.link_prefix(),
        }
    }

    pub fn insert(&mut self, resource: RegisteredResource) {
        self.resources.insert(resource.type_.clone(), resource);
    }

    pub fn get(&self, type_: &str) -> Option<&RegisteredResource> {
        self.resources.get(type_)
    }

    pub fn contains(&self, type_: &str) -> bool {
        self.resources.contains_key(type_)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredResource> {
        self.resources.values()
    }

    fn prefixed(&self, path: String) -> String {
        match &self.link_prefix {
            Some(prefix) => format!("{prefix}{path}"),
            None => path,
        }
    }

    /// Link to the resource collection, e.g. `/api/articles`.
    pub fn collection_url(&self, type_: &str) -> Option<String> {
        self.get(type_).map(|resource| self.prefixed(resource.path.clone()))
    }

    /// Link to a single resource, e.g. `/api/articles/1`.
    pub fn url_for(&self, type_: &str, id: &str) -> Option<String> {
        self.get(type_)
            .map(|resource| self.prefixed(format!("{}/{id}", resource.path)))
    }

    /// Link to a related-resource route, e.g. `/api/articles/1/author`.
    pub fn related_url(&self, type_: &str, id: &str, relationship: &str) -> Option<String> {
        self.get(type_)
            .map(|resource| self.prefixed(format!("{}/{id}/{relationship}", resource.path)))
    }

    /// Link to a relationship route, e.g.
    /// `/api/articles/1/relationships/author`.
    pub fn relationship_url(&self, type_: &str, id: &str, relationship: &str) -> Option<String> {
        self.get(type_)
            .map(|resource| self.prefixed(format!("{}/{id}/relationships/{relationship}", resource.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(config: &JsonApiConfig) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new(config);
        registry.insert(RegisteredResource {
            type_: "articles".to_string(),
            path: format!("{}/articles", config.base_path),
            id_kind: IdKind::Int,
            relationships: vec![RelationshipInfo {
                name: "author".to_string(),
                related_type: "people".to_string(),
                many: false,
            }],
        });
        registry
    }

    #[test]
    fn id_kind_matching() {
        assert!(IdKind::Str.matches("anything"));
        assert!(!IdKind::Str.matches(""));
        assert!(IdKind::Int.matches("42"));
        assert!(!IdKind::Int.matches("4x2"));
        assert!(IdKind::Uuid.matches("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!IdKind::Uuid.matches("not-a-uuid"));
    }

    #[test]
    fn generates_relative_links() {
        let config = JsonApiConfig {
            base_path: "/api".to_string(),
            ..JsonApiConfig::default()
        };
        let registry = registry_with(&config);

        assert_eq!(registry.collection_url("articles").as_deref(), Some("/api/articles"));
        assert_eq!(registry.url_for("articles", "1").as_deref(), Some("/api/articles/1"));
        assert_eq!(
            registry.related_url("articles", "1", "author").as_deref(),
            Some("/api/articles/1/author")
        );
        assert_eq!(
            registry.relationship_url("articles", "1", "author").as_deref(),
            Some("/api/articles/1/relationships/author")
        );
        assert_eq!(registry.url_for("unknown", "1"), None);
    }

    #[test]
    fn url_prefix_makes_links_absolute() {
        let config = JsonApiConfig {
            base_path: "/api".to_string(),
            url_prefix: Some(url::Url::parse("https://api.example.com").unwrap()),
            ..JsonApiConfig::default()
        };
        let registry = registry_with(&config);
        assert_eq!(
            registry.url_for("articles", "1").as_deref(),
            Some("https://api.example.com/api/articles/1")
        );
    }

    #[test]
    fn relationship_lookup() {
        let config = JsonApiConfig::default();
        let registry = registry_with(&config);
        let resource = registry.get("articles").unwrap();
        let rel = resource.relationship("author").unwrap();
        assert_eq!(rel.related_type, "people");
        assert!(!rel.many);
        assert!(resource.relationship("missing").is_none());
    }
}
