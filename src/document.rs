//! JSON:API wire documents.
//!
//! The types in this module map one-to-one onto the document structure fixed
//! by the [JSON:API specification](https://jsonapi.org/format/#document-structure):
//! a top-level [`Document`] carrying primary `data`, `errors`, `meta`, `links`
//! and `included` members, built out of [`ResourceObject`]s and
//! [`ResourceIdentifier`]s.
//!
//! Two spots in the format need care that plain `Option` cannot give us:
//!
//! - a to-one relationship with `data: null` (empty relation) is different
//!   from a relationship without a `data` member at all
//! - a top-level `data: null` (missing to-one related resource) is different
//!   from an error document that has no `data` member
//!
//! Both are modeled with untagged enums ([`PrimaryData`], [`Linkage`]) whose
//! final variant serializes as an explicit `null`, wrapped in an outer
//! `Option` for the absent case.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// The JSON:API media type, used as the `Content-Type` of every response and
/// required on the `Content-Type` of POST/PATCH requests.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Top-level member `data`: a single resource, a collection, or an explicit
/// `null` (empty to-one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<ResourceObject>),
    One(Box<ResourceObject>),
    /// Serialized as a literal `null`.
    Null,
}

impl PrimaryData {
    /// The single primary resource, if this is a `One` document.
    pub fn as_one(&self) -> Option<&ResourceObject> {
        match self {
            PrimaryData::One(resource) => Some(resource),
            _ => None,
        }
    }
}

/// Resource linkage inside a relationship object: identifiers of the related
/// resources, or `null` for an emptied to-one relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceIdentifier>),
    One(ResourceIdentifier),
    /// Serialized as a literal `null`.
    Empty,
}

impl Linkage {
    /// Ids referenced by this linkage, in document order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Linkage::Many(identifiers) => identifiers.iter().map(|i| i.id.as_str()).collect(),
            Linkage::One(identifier) => vec![identifier.id.as_str()],
            Linkage::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Linkage::Empty) || matches!(self, Linkage::Many(ids) if ids.is_empty())
    }
}

/// A `{type, id}` pair identifying a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResourceIdentifier {
    // defaulted so identifier validation can report a missing member
    // instead of failing the whole document parse
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceIdentifier {
    pub fn new(type_: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            id: id.into(),
            meta: None,
        }
    }
}

impl From<ResourceIdentifier> for ResourceObject {
    fn from(identifier: ResourceIdentifier) -> Self {
        ResourceObject {
            type_: identifier.type_,
            id: Some(identifier.id),
            meta: identifier.meta,
            ..ResourceObject::default()
        }
    }
}

/// A full resource object: `type`, `id`, `attributes`, `relationships`,
/// `links` and `meta`. The `id` is optional so that client-generated POST
/// bodies without one can be represented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResourceObject {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub attributes: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<BTreeMap<String, Relationship>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Map<String, Value>>,
}

impl ResourceObject {
    pub fn new(type_: impl Into<String>, id: Option<String>) -> Self {
        Self {
            type_: type_.into(),
            id,
            ..Self::default()
        }
    }

    /// The `{type, id}` identifier of this resource, if it has an id.
    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        self.id
            .as_ref()
            .map(|id| ResourceIdentifier::new(self.type_.clone(), id.clone()))
    }
}

/// A present-but-null `data` member must deserialize as `Some(Null)`, not
/// `None`; plain `Option` folds the two cases together.
fn primary_data_or_null<'de, D>(deserializer: D) -> Result<Option<PrimaryData>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let data = Option::<PrimaryData>::deserialize(deserializer)?;
    Ok(Some(data.unwrap_or(PrimaryData::Null)))
}

/// See [`primary_data_or_null`]: `data: null` inside a relationship is an
/// emptied to-one, distinct from an absent `data` member.
fn linkage_or_empty<'de, D>(deserializer: D) -> Result<Option<Linkage>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let linkage = Option::<Linkage>::deserialize(deserializer)?;
    Ok(Some(linkage.unwrap_or(Linkage::Empty)))
}

/// A relationship object: optional `data` linkage plus `links` and `meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Relationship {
    #[serde(default, deserialize_with = "linkage_or_empty", skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Map<String, Value>>,
}

/// A links object. Values are nullable so pagination documents can carry
/// explicit `"next": null` members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Links(pub BTreeMap<String, Option<String>>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.0.insert(name.into(), Some(url.into()));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, url: Option<String>) {
        self.0.insert(name.into(), url);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, `other` winning on shared names.
    pub fn merge(&mut self, other: Links) {
        self.0.extend(other.0);
    }
}

/// An error object per <https://jsonapi.org/format/#error-objects>.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Map<String, Value>>,
}

impl ErrorObject {
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status.to_string());
        self
    }

    /// Attach a JSON pointer into the request document, e.g.
    /// `/data/attributes/title`.
    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            pointer: Some(pointer.into()),
            parameter: None,
        });
        self
    }

    /// Attach the name of the offending query parameter.
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            pointer: None,
            parameter: Some(parameter.into()),
        });
        self
    }
}

/// Reference to the source of an error: a document pointer or a query
/// parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// A top-level JSON:API document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Document {
    #[serde(default, deserialize_with = "primary_data_or_null", skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<ResourceObject>>,
}

impl Document {
    /// Document with a single primary resource.
    pub fn one(resource: ResourceObject) -> Self {
        Self {
            data: Some(PrimaryData::One(Box::new(resource))),
            ..Self::default()
        }
    }

    /// Document with `data: null` (missing to-one related resource).
    pub fn null() -> Self {
        Self {
            data: Some(PrimaryData::Null),
            ..Self::default()
        }
    }

    /// Document with a resource collection as primary data.
    pub fn collection(resources: Vec<ResourceObject>) -> Self {
        Self {
            data: Some(PrimaryData::Many(resources)),
            ..Self::default()
        }
    }

    /// Error document.
    pub fn from_errors(errors: Vec<ErrorObject>) -> Self {
        Self {
            errors: Some(errors),
            ..Self::default()
        }
    }

    /// Relationship document: linkage as primary data plus optional links.
    pub fn linkage(linkage: Linkage, links: Links) -> Self {
        let data = match linkage {
            Linkage::Many(identifiers) => PrimaryData::Many(identifiers.into_iter().map(Into::into).collect()),
            Linkage::One(identifier) => PrimaryData::One(Box::new(identifier.into())),
            Linkage::Empty => PrimaryData::Null,
        };
        Self {
            data: Some(data),
            links: if links.is_empty() { None } else { Some(links) },
            ..Self::default()
        }
    }

    /// The single primary resource, if any.
    pub fn primary_resource(&self) -> Option<&ResourceObject> {
        self.data.as_ref().and_then(PrimaryData::as_one)
    }

    /// Replace the top-level `meta` member.
    pub fn merge_meta(&mut self, meta: Map<String, Value>) {
        self.meta = Some(meta);
    }

    /// Merge top-level links, new entries winning.
    pub fn merge_links(&mut self, links: Links) {
        match &mut self.links {
            Some(existing) => existing.merge(links),
            None => self.links = Some(links),
        }
    }

    /// Append resources to `included`, deduplicating by `(type, id)`.
    /// Primary resources are not duplicated into `included`.
    pub fn extend_included(&mut self, resources: Vec<ResourceObject>) {
        if resources.is_empty() {
            return;
        }
        let mut seen: Vec<(String, Option<String>)> = self
            .included
            .iter()
            .flatten()
            .map(|r| (r.type_.clone(), r.id.clone()))
            .collect();
        match &self.data {
            Some(PrimaryData::One(resource)) => seen.push((resource.type_.clone(), resource.id.clone())),
            Some(PrimaryData::Many(items)) => {
                seen.extend(items.iter().map(|r| (r.type_.clone(), r.id.clone())));
            }
            _ => {}
        }
        let included = self.included.get_or_insert_with(Vec::new);
        for resource in resources {
            let key = (resource.type_.clone(), resource.id.clone());
            if !seen.contains(&key) {
                seen.push(key);
                included.push(resource);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_data_round_trips_distinct_from_absent_data() {
        let null_doc = Document::null();
        let serialized = serde_json::to_value(&null_doc).unwrap();
        assert_eq!(serialized, json!({ "data": null }));

        let error_doc = Document::from_errors(vec![ErrorObject::detail("boom")]);
        let serialized = serde_json::to_value(&error_doc).unwrap();
        assert!(serialized.get("data").is_none());

        let parsed: Document = serde_json::from_value(json!({ "data": null })).unwrap();
        assert_eq!(parsed.data, Some(PrimaryData::Null));

        let parsed: Document = serde_json::from_value(json!({ "errors": [{ "detail": "boom" }] })).unwrap();
        assert_eq!(parsed.data, None);
    }

    #[test]
    fn primary_data_deserializes_one_and_many() {
        let one: Document = serde_json::from_value(json!({
            "data": { "type": "articles", "id": "1", "attributes": { "title": "t" } }
        }))
        .unwrap();
        let resource = one.primary_resource().unwrap();
        assert_eq!(resource.type_, "articles");
        assert_eq!(resource.id.as_deref(), Some("1"));

        let many: Document = serde_json::from_value(json!({
            "data": [{ "type": "articles", "id": "1" }, { "type": "articles", "id": "2" }]
        }))
        .unwrap();
        match many.data {
            Some(PrimaryData::Many(items)) => assert_eq!(items.len(), 2),
            other => panic!("expected collection, got {other:?}"),
        }
    }

    #[test]
    fn linkage_null_round_trips() {
        let rel: Relationship = serde_json::from_value(json!({ "data": null })).unwrap();
        assert_eq!(rel.data, Some(Linkage::Empty));
        assert_eq!(serde_json::to_value(&rel).unwrap(), json!({ "data": null }));

        let rel: Relationship = serde_json::from_value(json!({})).unwrap();
        assert_eq!(rel.data, None);
        assert_eq!(serde_json::to_value(&rel).unwrap(), json!({}));
    }

    #[test]
    fn linkage_one_and_many_round_trip() {
        let one: Linkage = serde_json::from_value(json!({ "type": "people", "id": "9" })).unwrap();
        assert_eq!(one, Linkage::One(ResourceIdentifier::new("people", "9")));
        assert_eq!(one.ids(), vec!["9"]);

        let many: Linkage = serde_json::from_value(json!([{ "type": "comments", "id": "5" }])).unwrap();
        assert_eq!(many.ids(), vec!["5"]);
        assert!(!many.is_empty());
        assert!(Linkage::Many(vec![]).is_empty());
    }

    #[test]
    fn pagination_links_serialize_explicit_nulls() {
        let mut links = Links::new().with("first", "/articles?page[number]=1");
        links.insert("next", None);
        let serialized = serde_json::to_value(&links).unwrap();
        assert_eq!(
            serialized,
            json!({ "first": "/articles?page[number]=1", "next": null })
        );
    }

    #[test]
    fn extend_included_dedupes_and_skips_primary() {
        let mut doc = Document::one(ResourceObject::new("articles", Some("1".into())));
        doc.extend_included(vec![
            ResourceObject::new("people", Some("9".into())),
            ResourceObject::new("people", Some("9".into())),
            ResourceObject::new("articles", Some("1".into())),
            ResourceObject::new("comments", Some("5".into())),
        ]);
        let included = doc.included.unwrap();
        assert_eq!(included.len(), 2);
        assert_eq!(included[0].type_, "people");
        assert_eq!(included[1].type_, "comments");
    }

    #[test]
    fn linkage_document_for_emptied_to_one() {
        let doc = Document::linkage(Linkage::Empty, Links::new());
        assert_eq!(serde_json::to_value(&doc).unwrap(), json!({ "data": null }));
    }
}
