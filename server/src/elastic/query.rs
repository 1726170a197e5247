//! Search and scroll request bodies, and their responses.

use geolab_engine::search::TEXT_FIELDS;
use geolab_engine::{record::parse_document_key, PersonDocument, SearchHit, SearchQuery};
use serde::Deserialize;
use serde_json::{json, Value};

/// Documents fetched per scroll page when listing ids.
pub const SCROLL_PAGE_SIZE: usize = 1000;

/// How long the index keeps a scroll context alive between pages.
pub const SCROLL_KEEP_ALIVE: &str = "1m";

/// Build the `_search` body for `query`.
pub fn search_body(query: &SearchQuery, limit: usize) -> Value {
    let query = match query {
        SearchQuery::Text { term } => json!({
            "query_string": {
                "query": SearchQuery::wildcard_pattern(term),
                "fields": TEXT_FIELDS,
                "default_operator": "AND"
            }
        }),
        SearchQuery::Geo { center, radius_m } => json!({
            "geo_distance": {
                "distance": format!("{radius_m}m"),
                "location": {"lat": center.lat, "lon": center.lon}
            }
        }),
    };

    json!({ "size": limit, "query": query })
}

/// First page of an id-only scroll over the whole index.
pub fn scroll_start_body() -> Value {
    json!({
        "size": SCROLL_PAGE_SIZE,
        "_source": false,
        "sort": ["_doc"],
        "query": {"match_all": {}}
    })
}

/// Follow-up page request for `scroll_id`.
pub fn scroll_next_body(scroll_id: &str) -> Value {
    json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id })
}

/// `_search` response body; `_source` is absent on id-only pages.
#[derive(Debug, Deserialize)]
pub struct SearchResponse<T = Value> {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    pub hits: Hits<T>,
}

#[derive(Debug, Deserialize)]
pub struct Hits<T> {
    #[serde(default = "Vec::new")]
    pub hits: Vec<Hit<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Hit<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: Option<T>,
}

impl SearchResponse<PersonDocument> {
    /// Turn hits into search results, skipping any whose key is not a person
    /// id or that carry no source.
    pub fn into_search_hits(self) -> Vec<SearchHit> {
        self.hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let id = parse_document_key(&hit.id)?;
                Some(SearchHit {
                    id,
                    document: hit.source?,
                })
            })
            .collect()
    }
}

impl<T> SearchResponse<T> {
    /// Document keys on this page.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.hits.hits.iter().map(|hit| hit.id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.hits.hits.is_empty()
    }
}
