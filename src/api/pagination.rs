// Copyright 2023 Remi Bernotavicius

use super::{ApiError, AppState};
use crate::store::{self, Page, Paginated};
use axum::extract::{FromRequestParts, OriginalUri, Query};
use axum::http::request::Parts;
use axum::http::Uri;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize, Debug, PartialEq)]
pub struct PageView<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// `page` and `limit` from the query string, plus what is needed to link to
/// the neighbouring pages.
#[derive(Debug)]
pub struct Pagination {
    pub page: Page,
    path: String,
    query: Vec<(String, String)>,
}

fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn parse_page(query: &[(String, String)], default_size: i64) -> store::Result<Page> {
    let number = match query_value(query, "page") {
        None => 1,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n >= 1 => n,
            _ => return Err(store::Error::NotFound("page")),
        },
    };
    let size = query_value(query, "limit")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|size| *size >= 1)
        .unwrap_or(default_size);
    Ok(Page::new(number, size))
}

impl Pagination {
    fn from_uri(uri: &Uri, default_size: i64) -> Result<Self, ApiError> {
        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(uri)?;
        Ok(Self {
            page: parse_page(&query, default_size)?,
            path: uri.path().to_owned(),
            query,
        })
    }

    /// The request's own link with `page` set to `number`.
    fn page_link(&self, number: i64) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.query.iter().filter(|(k, _)| k != "page"));
        serializer.append_pair("page", &number.to_string());
        format!("{}?{}", self.path, serializer.finish())
    }

    pub fn respond<T, V>(&self, paginated: Paginated<T>, f: impl FnMut(T) -> V) -> PageView<V> {
        let Paginated { count, items } = paginated.map(f);
        let Page { number, size } = self.page;
        PageView {
            count,
            next: (number.saturating_mul(size) < count).then(|| self.page_link(number + 1)),
            previous: (number > 1).then(|| self.page_link(number - 1)),
            results: items,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for Pagination {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        Self::from_uri(&uri, state.page_size)
    }
}

#[cfg(test)]
fn pairs(query: &str) -> Vec<(String, String)> {
    let uri: Uri = format!("/api/recipes?{query}").parse().unwrap();
    Query::try_from_uri(&uri).unwrap().0
}

#[test]
fn page_parameters() {
    assert_eq!(parse_page(&pairs(""), 6).unwrap(), Page::new(1, 6));
    assert_eq!(
        parse_page(&pairs("page=3&limit=10"), 6).unwrap(),
        Page::new(3, 10)
    );
    assert_eq!(
        parse_page(&pairs("page=%33&limit=%31%30"), 6).unwrap(),
        Page::new(3, 10)
    );
    assert_eq!(parse_page(&pairs("limit=abc"), 6).unwrap(), Page::new(1, 6));
    assert_eq!(parse_page(&pairs("limit=0"), 6).unwrap(), Page::new(1, 6));
    assert_eq!(
        parse_page(&pairs("limit=99999999999999999999"), 6).unwrap(),
        Page::new(1, 6)
    );
    assert_eq!(
        parse_page(&pairs("limit=500"), 6).unwrap().size,
        Page::MAX_SIZE
    );
    for bad in ["page=0", "page=-1", "page=last", "page=99999999999999999999"] {
        assert!(
            matches!(
                parse_page(&pairs(bad), 6),
                Err(store::Error::NotFound("page"))
            ),
            "{bad}"
        );
    }
    assert_eq!(
        parse_page(&pairs("page=9223372036854775807"), 6).unwrap(),
        Page::new(i64::MAX, 6)
    );
}

#[test]
fn links_replace_page() {
    let uri = "/api/recipes?tags=lunch&page=2&limit=2&tags=caf%C3%A9"
        .parse()
        .unwrap();
    let pagination = Pagination::from_uri(&uri, 6).unwrap();
    assert_eq!(pagination.page, Page::new(2, 2));
    let view = pagination.respond(
        Paginated {
            count: 5,
            items: vec![3, 4],
        },
        |n| n * 10,
    );
    assert_eq!(
        view,
        PageView {
            count: 5,
            next: Some("/api/recipes?tags=lunch&limit=2&tags=caf%C3%A9&page=3".into()),
            previous: Some("/api/recipes?tags=lunch&limit=2&tags=caf%C3%A9&page=1".into()),
            results: vec![30, 40],
        }
    );

    let last = Pagination::from_uri(&"/api/users?page=%33&limit=2".parse().unwrap(), 6).unwrap();
    let view = last.respond(
        Paginated {
            count: 5,
            items: vec![5],
        },
        |n| n,
    );
    assert_eq!(view.next, None);
    assert_eq!(view.previous.as_deref(), Some("/api/users?limit=2&page=2"));
}
