//! Pagination helpers.
//!
//! [`Paginator`] is strategy-agnostic: given the request URI, the raw
//! `page[...]` parameters and the collection length, a paginator decides
//! which slice to return and which `first`/`prev`/`next`/`last` links to
//! advertise. [`PageNumberPaginator`] implements the common
//! `page[number]`/`page[size]` strategy and is what
//! [`RequestContext::paginate`](crate::resource::RequestContext::paginate)
//! uses by default.
//!
//! Links are produced by rewriting the request's query string, so any
//! filter or sort parameters the client sent survive into the pagination
//! links. All four link members are always present, absent pages carrying
//! an explicit `null`.

use std::collections::BTreeMap;
use std::ops::Range;

use axum::http::Uri;

use crate::config::PaginationConfig;
use crate::document::Links;
use crate::errors::{Error, Result};

/// A page of items plus the links describing its neighbors.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub links: Links,
}

/// The slice a paginator selected, before any items are cloned.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub range: Range<usize>,
    pub links: Links,
}

/// A pagination strategy.
pub trait Paginator: Send + Sync {
    /// Validate the `page[...]` parameters and compute the slice and links
    /// for a collection of `total` items.
    fn paginate(&self, uri: &Uri, page: &BTreeMap<String, String>, total: usize) -> Result<PageSpec>;
}

/// Apply a paginator to a slice, cloning only the selected page.
pub fn paginate_slice<T: Clone>(
    paginator: &dyn Paginator,
    uri: &Uri,
    page: &BTreeMap<String, String>,
    items: &[T],
) -> Result<Page<T>> {
    let spec = paginator.paginate(uri, page, items.len())?;
    let items = items.get(spec.range.clone()).unwrap_or(&[]).to_vec();
    Ok(Page { items, links: spec.links })
}

/// 1-based `page[number]` / `page[size]` pagination.
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    pub default_size: usize,
    pub max_size: usize,
}

impl PageNumberPaginator {
    pub fn from_config(config: &PaginationConfig) -> Self {
        Self {
            default_size: config.default_size,
            max_size: config.max_size,
        }
    }

    fn page_size(&self, raw: Option<&String>) -> Result<usize> {
        let Some(raw) = raw else {
            return Ok(self.default_size);
        };
        let size: usize = raw.parse().map_err(|_| Error::Pagination {
            detail: format!("page[size] must be a positive integer; got {raw}"),
        })?;
        if size < 1 {
            return Err(Error::Pagination {
                detail: format!("page[size] must be a positive integer; got {raw}"),
            });
        }
        // requests beyond the configured maximum are clamped, not rejected
        Ok(size.min(self.max_size))
    }

    fn page_number(&self, raw: Option<&String>) -> Result<usize> {
        let Some(raw) = raw else {
            return Ok(1);
        };
        let number: usize = raw.parse().map_err(|_| Error::Pagination {
            detail: format!("page[number] must be a positive integer; got {raw}"),
        })?;
        if number < 1 {
            return Err(Error::Pagination {
                detail: format!("page[number] must be a positive integer; got {raw}"),
            });
        }
        Ok(number)
    }

    /// Rebuild the request URL with the given page parameters, keeping every
    /// other query parameter. `number: None` produces the `first` link shape
    /// (size only).
    fn link(&self, uri: &Uri, number: Option<usize>, size: usize) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        if let Some(query) = uri.query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if name != "page[number]" && name != "page[size]" {
                    serializer.append_pair(&name, &value);
                }
            }
        }
        serializer.append_pair("page[size]", &size.to_string());
        if let Some(number) = number {
            serializer.append_pair("page[number]", &number.to_string());
        }
        format!("{}?{}", uri.path(), serializer.finish())
    }
}

impl Paginator for PageNumberPaginator {
    fn paginate(&self, uri: &Uri, page: &BTreeMap<String, String>, total: usize) -> Result<PageSpec> {
        let size = self.page_size(page.get("size"))?;
        let number = self.page_number(page.get("number"))?;

        // an empty collection still has one (empty) page
        let total_pages = if total == 0 { 1 } else { total.div_ceil(size) };

        let start = (number - 1).saturating_mul(size).min(total);
        let end = (start + size).min(total);

        let mut links = Links::new();
        links.insert("first", Some(self.link(uri, None, size)));
        links.insert("last", Some(self.link(uri, Some(total_pages), size)));
        links.insert(
            "next",
            (number < total_pages).then(|| self.link(uri, Some(number + 1), size)),
        );
        links.insert("prev", (number > 1).then(|| self.link(uri, Some(number - 1), size)));

        Ok(PageSpec {
            range: start..end,
            links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::JsonApiQuery;

    fn paginator() -> PageNumberPaginator {
        PageNumberPaginator {
            default_size: 10,
            max_size: 50,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn page_params_of(link: &str) -> BTreeMap<String, String> {
        let query = link.split_once('?').map(|(_, q)| q).unwrap_or("");
        JsonApiQuery::parse(Some(query)).unwrap().page
    }

    #[test]
    fn slices_the_middle_page() {
        let items: Vec<i32> = (0..25).collect();
        let uri: Uri = "/articles?page[number]=2&page[size]=10".parse().unwrap();
        let page = paginate_slice(&paginator(), &uri, &params(&[("number", "2"), ("size", "10")]), &items).unwrap();
        assert_eq!(page.items, (10..20).collect::<Vec<_>>());

        assert_eq!(page_params_of(page.links.get("next").unwrap())["number"], "3");
        assert_eq!(page_params_of(page.links.get("prev").unwrap())["number"], "1");
        assert_eq!(page_params_of(page.links.get("last").unwrap())["number"], "3");
        assert!(!page_params_of(page.links.get("first").unwrap()).contains_key("number"));
    }

    #[test]
    fn first_and_last_page_links_have_nulls() {
        let items: Vec<i32> = (0..15).collect();
        let uri: Uri = "/articles".parse().unwrap();

        let first = paginate_slice(&paginator(), &uri, &params(&[]), &items).unwrap();
        assert_eq!(first.items.len(), 10);
        assert!(first.links.get("prev").is_none());
        assert!(first.links.get("next").is_some());
        assert!(first.links.0.contains_key("prev"));

        let last = paginate_slice(&paginator(), &uri, &params(&[("number", "2")]), &items).unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(last.links.get("next").is_none());
        assert!(last.links.get("prev").is_some());
    }

    #[test]
    fn empty_collection_is_one_page() {
        let items: Vec<i32> = Vec::new();
        let uri: Uri = "/articles".parse().unwrap();
        let page = paginate_slice(&paginator(), &uri, &params(&[]), &items).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page_params_of(page.links.get("last").unwrap())["number"], "1");
        assert!(page.links.get("next").is_none());
    }

    #[test]
    fn size_is_clamped_to_max() {
        let items: Vec<i32> = (0..200).collect();
        let uri: Uri = "/articles".parse().unwrap();
        let page = paginate_slice(&paginator(), &uri, &params(&[("size", "500")]), &items).unwrap();
        assert_eq!(page.items.len(), 50);
    }

    #[test]
    fn invalid_parameters_are_pagination_errors() {
        let uri: Uri = "/articles".parse().unwrap();
        let err = paginator().paginate(&uri, &params(&[("size", "ten")]), 5).unwrap_err();
        assert_eq!(err.user_message(), "page[size] must be a positive integer; got ten");

        let err = paginator().paginate(&uri, &params(&[("size", "0")]), 5).unwrap_err();
        assert_eq!(err.user_message(), "page[size] must be a positive integer; got 0");

        let err = paginator().paginate(&uri, &params(&[("number", "-1")]), 5).unwrap_err();
        assert_eq!(err.user_message(), "page[number] must be a positive integer; got -1");
    }

    #[test]
    fn links_preserve_other_query_parameters() {
        let items: Vec<i32> = (0..30).collect();
        let uri: Uri = "/articles?filter=recent&page[number]=2&page[size]=10".parse().unwrap();
        let page = paginate_slice(&paginator(), &uri, &params(&[("number", "2"), ("size", "10")]), &items).unwrap();
        let next = page.links.get("next").unwrap();
        assert!(next.starts_with("/articles?"));
        assert!(next.contains("filter=recent"));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let items: Vec<i32> = (0..5).collect();
        let uri: Uri = "/articles".parse().unwrap();
        let page = paginate_slice(&paginator(), &uri, &params(&[("number", "9")]), &items).unwrap();
        assert!(page.items.is_empty());
    }
}
