//! Parsing of the JSON:API query parameter families.
//!
//! Three parameter families are recognized:
//!
//! - `include=author,comments.author` — compound document requests
//! - `fields[articles]=title,author` — sparse fieldsets per resource type
//! - `page[number]=2&page[size]=10` — pagination, collected raw for the
//!   paginator to interpret
//!
//! Everything else is left alone for the handler to read itself.

use std::collections::BTreeMap;

use crate::document::{Document, PrimaryData, ResourceObject};
use crate::errors::{Error, Result};

/// Parsed JSON:API query parameters for one request.
#[derive(Debug, Clone, Default)]
pub struct JsonApiQuery {
    /// Relation paths from `include`, in request order, deduplicated.
    pub include: Vec<String>,
    /// Sparse fieldsets: resource type to requested field names.
    pub fields: BTreeMap<String, Vec<String>>,
    /// Raw `page[...]` parameters keyed by inner name.
    pub page: BTreeMap<String, String>,
}

impl JsonApiQuery {
    /// Parse a raw query string. Malformed `fields[...]` parameters are a
    /// 400 error; unknown parameters are ignored.
    pub fn parse(query: Option<&str>) -> Result<Self> {
        let mut parsed = Self::default();
        let Some(query) = query else {
            return Ok(parsed);
        };

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if name == "include" {
                for relation in value.split(',') {
                    let relation = relation.trim();
                    if !relation.is_empty() && !parsed.include.iter().any(|r| r == relation) {
                        parsed.include.push(relation.to_string());
                    }
                }
            } else if let Some(inner) = bracketed(&name, "fields") {
                let fields: Vec<String> = value.split(',').map(str::to_string).collect();
                if inner.is_empty() || value.is_empty() || fields.iter().any(String::is_empty) {
                    return Err(Error::bad_request("Incorrect sparse fields request."));
                }
                parsed.fields.insert(inner.to_string(), fields);
            } else if let Some(inner) = bracketed(&name, "page") {
                if !inner.is_empty() {
                    parsed.page.insert(inner.to_string(), value.to_string());
                }
            }
        }
        Ok(parsed)
    }

    /// The requested include paths, or `None` when the parameter is absent.
    pub fn include_list(&self) -> Option<&[String]> {
        if self.include.is_empty() { None } else { Some(&self.include) }
    }

    /// The sparse fieldset map, or `None` when no `fields[...]` was sent.
    pub fn sparse_fields(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        if self.fields.is_empty() { None } else { Some(&self.fields) }
    }
}

/// Extract `inner` from parameter names shaped like `family[inner]`.
fn bracketed<'a>(name: &'a str, family: &str) -> Option<&'a str> {
    name.strip_prefix(family)?.strip_prefix('[')?.strip_suffix(']')
}

/// Drop attributes and relationships not requested for their resource type,
/// in both `data` and `included`. Types without an entry in `fields` keep
/// all their members; member objects emptied by the filter are removed.
pub fn apply_sparse_fields(document: &mut Document, fields: &BTreeMap<String, Vec<String>>) {
    if fields.is_empty() {
        return;
    }
    match &mut document.data {
        Some(PrimaryData::One(resource)) => filter_resource(resource, fields),
        Some(PrimaryData::Many(resources)) => {
            for resource in resources {
                filter_resource(resource, fields);
            }
        }
        _ => {}
    }
    if let Some(included) = &mut document.included {
        for resource in included {
            filter_resource(resource, fields);
        }
    }
}

fn filter_resource(resource: &mut ResourceObject, fields: &BTreeMap<String, Vec<String>>) {
    let Some(allowed) = fields.get(&resource.type_) else {
        return;
    };
    if let Some(attributes) = &mut resource.attributes {
        attributes.retain(|name, _| allowed.iter().any(|f| f == name));
        if attributes.is_empty() {
            resource.attributes = None;
        }
    }
    if let Some(relationships) = &mut resource.relationships {
        relationships.retain(|name, _| allowed.iter().any(|f| f == name));
        if relationships.is_empty() {
            resource.relationships = None;
        }
    }
}
