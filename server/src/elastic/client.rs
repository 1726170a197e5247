//! Elasticsearch-backed person index.

use super::{bulk, query};
use geolab_engine::error::Result;
use geolab_engine::store::parse_document_keys;
use geolab_engine::{
    BulkOperation, Error, OperationOutcome, PersonDocument, PersonId, SearchHit, SearchIndex,
    SearchQuery,
};
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Index settings and mappings applied when the index is created.
const PERSONS_MAPPING: &str = include_str!("../../mappings/persons.json");

/// Per-request timeout against the cluster.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cluster identity, as reported by the root endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub version: String,
}

#[derive(Deserialize)]
struct RootResponse {
    cluster_name: String,
    version: RootVersion,
}

#[derive(Deserialize)]
struct RootVersion {
    number: String,
}

/// A person index living in an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticIndex {
    client: Client,
    base_url: String,
    index: String,
    chunk_size: usize,
}

impl ElasticIndex {
    /// Create a handle; nothing is sent until the first call.
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        chunk_size: usize,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            index: index.into(),
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn index_url(&self, path: &str) -> String {
        self.url(&format!("{}/{}", self.index, path.trim_start_matches('/')))
    }

    /// Cluster name and version.
    pub async fn info(&self) -> Result<ClusterInfo> {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .map_err(Error::search_index)?;
        let root: RootResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(Error::search_index)?;

        Ok(ClusterInfo {
            cluster_name: root.cluster_name,
            version: root.version.number,
        })
    }

    /// Make sure the index exists with the person mapping.
    ///
    /// With `recreate`, an existing index is dropped first. Returns `true`
    /// when the index was created by this call, meaning it is empty.
    pub async fn ensure_index(&self, recreate: bool) -> Result<bool> {
        if recreate {
            let response = self
                .client
                .delete(self.index_url(""))
                .send()
                .await
                .map_err(Error::search_index)?;
            if response.status() != StatusCode::NOT_FOUND {
                expect_success(response).await?;
                tracing::info!(index = %self.index, "deleted existing index");
            }
        }

        let exists = self
            .client
            .head(self.index_url(""))
            .send()
            .await
            .map_err(Error::search_index)?;
        match exists.status() {
            StatusCode::OK => return Ok(false),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(Error::search_index(format!(
                    "unexpected status {status} checking index {}",
                    self.index
                )))
            }
        }

        let response = self
            .client
            .put(self.index_url(""))
            .header(CONTENT_TYPE, "application/json")
            .body(PERSONS_MAPPING)
            .send()
            .await
            .map_err(Error::search_index)?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains("resource_already_exists_exception") {
                return Ok(false);
            }
            return Err(Error::search_index(format!("400 Bad Request: {body}")));
        }

        expect_success(response).await?;
        tracing::info!(index = %self.index, "created index");
        Ok(true)
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .client
            .delete(self.url("/_search/scroll"))
            .json(&serde_json::json!({ "scroll_id": [scroll_id] }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!("failed to clear scroll: {}", e);
        }
    }
}

/// Pass successful responses through; turn anything else into an error
/// carrying the status and body.
async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::search_index(format!("{status}: {body}")))
}

impl SearchIndex for ElasticIndex {
    async fn indexed_ids(&self) -> Result<BTreeSet<PersonId>> {
        let response = self
            .client
            .post(self.index_url(&format!("_search?scroll={}", query::SCROLL_KEEP_ALIVE)))
            .json(&query::scroll_start_body())
            .send()
            .await
            .map_err(Error::search_index)?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(index = %self.index, "index missing, treating it as empty");
            return Ok(BTreeSet::new());
        }

        let mut page: query::SearchResponse = expect_success(response)
            .await?
            .json()
            .await
            .map_err(Error::search_index)?;
        let mut ids = BTreeSet::new();

        loop {
            let (page_ids, skipped) = parse_document_keys(page.keys());
            for key in skipped {
                tracing::warn!(key = %key, "skipping document with non-numeric id");
            }
            ids.extend(page_ids);

            let scroll_id = match page.scroll_id.take() {
                Some(scroll_id) if !page.is_empty() => scroll_id,
                Some(scroll_id) => {
                    self.clear_scroll(&scroll_id).await;
                    break;
                }
                None => break,
            };

            let next = self
                .client
                .post(self.url("/_search/scroll"))
                .json(&query::scroll_next_body(&scroll_id))
                .send()
                .await
                .map_err(Error::search_index)?;
            page = expect_success(next)
                .await?
                .json()
                .await
                .map_err(Error::search_index)?;
        }

        Ok(ids)
    }

    async fn bulk(&self, ops: &[BulkOperation]) -> Result<Vec<OperationOutcome>> {
        let mut outcomes = Vec::with_capacity(ops.len());

        for chunk in ops.chunks(self.chunk_size) {
            let request = bulk::encode(&self.index, chunk);

            let response = if request.is_empty() {
                bulk::BulkResponse {
                    errors: false,
                    items: Vec::new(),
                }
            } else {
                let response = self
                    .client
                    .post(self.url("/_bulk?refresh=wait_for"))
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(request.body.clone())
                    .send()
                    .await
                    .map_err(Error::search_index)?;
                expect_success(response)
                    .await?
                    .json()
                    .await
                    .map_err(Error::search_index)?
            };

            if response.errors {
                tracing::debug!(chunk = chunk.len(), "bulk chunk reported item errors");
            }
            outcomes.extend(bulk::decode(chunk, request, response));
        }

        Ok(outcomes)
    }

    async fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(self.index_url("_search"))
            .json(&query::search_body(query, limit))
            .send()
            .await
            .map_err(Error::search_index)?;

        let results: query::SearchResponse<PersonDocument> = expect_success(response)
            .await?
            .json()
            .await
            .map_err(Error::search_index)?;

        Ok(results.into_search_hits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use geolab_engine::clock::millis_to_timestamp;
    use geolab_engine::{GeoPoint, NewPerson};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    /// What the mock cluster saw.
    #[derive(Clone, Default)]
    struct Seen {
        bulk_sizes: Arc<Mutex<Vec<usize>>>,
        cleared: Arc<Mutex<Vec<String>>>,
    }

    async fn first_page() -> Json<Value> {
        Json(json!({
            "_scroll_id": "s1",
            "hits": {"hits": [{"_id": "1"}, {"_id": "legacy-doc"}, {"_id": "2"}]}
        }))
    }

    async fn next_page(Json(body): Json<Value>) -> Json<Value> {
        let page = match body["scroll_id"].as_str() {
            Some("s1") => json!({"_scroll_id": "s2", "hits": {"hits": [{"_id": "7"}]}}),
            _ => json!({"_scroll_id": "s3", "hits": {"hits": []}}),
        };
        Json(page)
    }

    async fn clear_scroll(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        if let Some(ids) = body["scroll_id"].as_array() {
            let mut cleared = seen.cleared.lock().unwrap();
            cleared.extend(ids.iter().filter_map(Value::as_str).map(String::from));
        }
        Json(json!({"succeeded": true}))
    }

    /// Answers every action in order; the document with id 3 is rejected.
    async fn bulk(State(seen): State<Seen>, body: String) -> Json<Value> {
        let mut items = Vec::new();
        let mut lines = body.lines();
        while let Some(line) = lines.next() {
            let action: Value = serde_json::from_str(line).unwrap();
            let (kind, id) = if let Some(meta) = action.get("index") {
                lines.next();
                ("index", meta["_id"].as_str().unwrap().to_string())
            } else {
                ("delete", action["delete"]["_id"].as_str().unwrap().to_string())
            };
            let item = if id == "3" {
                json!({"_id": id, "status": 400, "error": {
                    "type": "mapper_parsing_exception", "reason": "bad location"
                }})
            } else {
                json!({"_id": id, "status": 200, "result": "ok"})
            };
            let mut entry = serde_json::Map::new();
            entry.insert(kind.to_string(), item);
            items.push(Value::Object(entry));
        }
        seen.bulk_sizes.lock().unwrap().push(items.len());
        Json(json!({"errors": true, "items": items}))
    }

    async fn mock_cluster() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/persons/_search", post(first_page))
            .route("/_search/scroll", post(next_page).delete(clear_scroll))
            .route("/_bulk", post(bulk))
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        (format!("http://{addr}"), seen)
    }

    fn replace(id: PersonId) -> BulkOperation {
        let person = NewPerson {
            firstname: "Hélène".into(),
            lastname: "Paquette".into(),
            address: "9 rue Beaubien".into(),
            city: "Montréal".into(),
            postal_code: "H2S 1R4".into(),
            country: "Canada".into(),
            email: "helene@example.com".into(),
            phone: "514-555-0190".into(),
            location: GeoPoint::new(45.53, -73.6),
        }
        .into_person(id, millis_to_timestamp(1_706_745_600_000));
        BulkOperation::Replace {
            id,
            document: person.to_document(),
        }
    }

    #[tokio::test]
    async fn indexed_ids_walks_every_scroll_page() {
        let (url, seen) = mock_cluster().await;
        let index = ElasticIndex::new(url, "persons", 100).unwrap();

        let ids = index.indexed_ids().await.unwrap();

        assert_eq!(ids, BTreeSet::from([1, 2, 7]));
        assert_eq!(*seen.cleared.lock().unwrap(), vec!["s3".to_string()]);
    }

    #[tokio::test]
    async fn missing_index_lists_no_ids() {
        let (url, _) = mock_cluster().await;
        let index = ElasticIndex::new(url, "nowhere", 100).unwrap();

        assert!(index.indexed_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_outcomes_keep_submission_order_across_chunks() {
        let (url, seen) = mock_cluster().await;
        let index = ElasticIndex::new(url, "persons", 2).unwrap();
        let ops = vec![
            replace(1),
            replace(2),
            replace(3),
            BulkOperation::Delete { id: 4 },
            BulkOperation::Delete { id: 5 },
        ];

        let outcomes = index.bulk(&ops).await.unwrap();

        assert_eq!(*seen.bulk_sizes.lock().unwrap(), vec![2, 2, 1]);
        let ids: Vec<_> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, 3);
        assert_eq!(
            failed[0].error.as_deref(),
            Some("mapper_parsing_exception: bad location")
        );
    }

    #[tokio::test]
    async fn unreachable_bulk_is_a_connectivity_error() {
        let index = ElasticIndex::new("http://127.0.0.1:9", "persons", 2).unwrap();

        let err = index.bulk(&[BulkOperation::Delete { id: 1 }]).await.unwrap_err();

        assert!(err.is_connectivity());
    }

    #[test]
    fn urls() {
        let index = ElasticIndex::new("http://localhost:9200", "persons", 500).unwrap();
        assert_eq!(index.url("/"), "http://localhost:9200/");
        assert_eq!(index.url("/_bulk"), "http://localhost:9200/_bulk");
        assert_eq!(index.index_url(""), "http://localhost:9200/persons/");
        assert_eq!(
            index.index_url("_search"),
            "http://localhost:9200/persons/_search"
        );
    }

    #[test]
    fn mapping_declares_geo_point() {
        let mapping: serde_json::Value = serde_json::from_str(PERSONS_MAPPING).unwrap();
        assert_eq!(
            mapping["mappings"]["properties"]["location"]["type"],
            "geo_point"
        );
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let index = ElasticIndex::new("http://localhost:9200", "persons", 0).unwrap();
        assert_eq!(index.chunk_size, 1);
    }
}
