//! Search handler - text or proximity queries over the index.

use crate::error::Result;
use crate::Engine;
use geolab_engine::{SearchHit, SearchQuery};
use serde::{Deserialize, Serialize};

/// Query parameters for search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// Text matched against last name and address
    pub q: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Radius in meters around `lat`/`lon`
    pub radius: Option<u32>,
}

impl SearchParams {
    /// Validate the parameters into a query.
    pub fn to_query(&self) -> geolab_engine::error::Result<SearchQuery> {
        SearchQuery::from_params(self.q.as_deref(), self.lat, self.lon, self.radius)
    }
}

/// Response for search.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// Run a search against the index.
pub async fn handle_search(engine: &Engine, params: SearchParams) -> Result<SearchResponse> {
    let query = params.to_query()?;
    let results = engine.search(&query).await?;

    tracing::debug!(?query, hits = results.len(), "search");

    Ok(SearchResponse { results })
}
