//! The query surface over the person index.

use crate::{error::Result, Error, GeoPoint, PersonDocument, PersonId};
use serde::{Deserialize, Serialize};

/// Radius used by geo queries that do not name one, in meters.
pub const DEFAULT_RADIUS_METERS: u32 = 1000;

/// Upper bound on hits returned by a single search.
pub const MAX_SEARCH_RESULTS: usize = 20;

/// Fields a text query matches against.
pub const TEXT_FIELDS: [&str; 2] = ["lastname", "address"];

/// Characters with a meaning in the index's query-string syntax.
const RESERVED: &[char] = &[
    '\\', '+', '-', '=', '&', '|', '>', '<', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~',
    '*', '?', ':', '/',
];

/// A validated search request.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Case-insensitive infix match on last name or street address.
    Text { term: String },
    /// Every person within `radius_m` meters of `center`.
    Geo { center: GeoPoint, radius_m: u32 },
}

impl SearchQuery {
    /// Build a query from raw request parameters.
    ///
    /// A non-empty `q` wins over coordinates. Coordinates need both `lat` and
    /// `lon`; `radius` defaults to [`DEFAULT_RADIUS_METERS`].
    pub fn from_params(
        q: Option<&str>,
        lat: Option<f64>,
        lon: Option<f64>,
        radius: Option<u32>,
    ) -> Result<Self> {
        if let Some(term) = q.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(SearchQuery::Text {
                term: term.to_lowercase(),
            });
        }

        match (lat, lon) {
            (Some(lat), Some(lon)) => {
                let center = GeoPoint::new(lat, lon);
                if !center.is_valid() {
                    return Err(Error::InvalidQuery(format!(
                        "coordinates out of range: lat={lat}, lon={lon}"
                    )));
                }
                let radius_m = radius.unwrap_or(DEFAULT_RADIUS_METERS);
                if radius_m == 0 {
                    return Err(Error::InvalidQuery("radius must be positive".into()));
                }
                Ok(SearchQuery::Geo { center, radius_m })
            }
            _ => Err(Error::InvalidQuery("parameters q or lat/lon required".into())),
        }
    }

    /// The query-string pattern for a text query: the escaped term wrapped in
    /// wildcards.
    pub fn wildcard_pattern(term: &str) -> String {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('*');
        for c in term.chars() {
            if RESERVED.contains(&c) {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('*');
        pattern
    }

    /// Whether `doc` satisfies this query.
    pub fn matches(&self, doc: &PersonDocument) -> bool {
        match self {
            SearchQuery::Text { term } => {
                let term = term.to_lowercase();
                doc.lastname.to_lowercase().contains(&term)
                    || doc.address.to_lowercase().contains(&term)
            }
            SearchQuery::Geo { center, radius_m } => {
                center.distance_to(&doc.location) <= f64::from(*radius_m)
            }
        }
    }
}

/// A search result: the document plus its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PersonId,
    #[serde(flatten)]
    pub document: PersonDocument,
}
