//! Person records and their indexed projection.

use crate::{PersonId, Timestamp};
use serde::{Deserialize, Serialize};

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Mean Earth radius used for distance calculations, in meters.
    pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle (haversine) distance to `other`, in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_METERS * a.sqrt().asin()
    }
}

/// A person as stored in the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Identifier assigned by the store
    pub id: PersonId,
    pub firstname: String,
    pub lastname: String,
    /// Street address
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email: String,
    pub phone: String,
    pub location: GeoPoint,
    /// Set to "now" by the store on every insert and update
    pub last_modified: Timestamp,
}

/// Field values for a person that does not have an identifier yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPerson {
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email: String,
    pub phone: String,
    pub location: GeoPoint,
}

impl NewPerson {
    /// Attach the store-assigned id and modification stamp.
    pub fn into_person(self, id: PersonId, last_modified: Timestamp) -> Person {
        Person {
            id,
            firstname: self.firstname,
            lastname: self.lastname,
            address: self.address,
            city: self.city,
            postal_code: self.postal_code,
            country: self.country,
            email: self.email,
            phone: self.phone,
            location: self.location,
            last_modified,
        }
    }
}

/// The source of an indexed document.
///
/// Field names are the index's wire names. The person id is not part of the
/// source; it is the document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonDocument {
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email: String,
    pub phone: String,
    pub location: GeoPoint,
    pub last_modified: Timestamp,
}

impl Person {
    /// Project this person into the document the index stores for it.
    pub fn to_document(&self) -> PersonDocument {
        PersonDocument {
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            location: self.location,
            last_modified: self.last_modified,
        }
    }
}

/// Render a person id as the index document key.
pub fn document_key(id: PersonId) -> String {
    id.to_string()
}

/// Parse an index document key back into a person id.
pub fn parse_document_key(key: &str) -> Option<PersonId> {
    key.parse().ok()
}
