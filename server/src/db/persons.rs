//! Database operations for the persons table.

use chrono::{DateTime, Utc};
use geolab_engine::{EntitySource, Error, GeoPoint, NewPerson, Person, PersonId, Timestamp};
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;

/// A stored person row from the database.
#[derive(Debug)]
pub struct StoredPerson {
    pub id: i64,
    pub firstname: String,
    pub lastname: String,
    pub prsaddress: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub email: String,
    pub phone: String,
    pub lat: f64,
    pub lon: f64,
    pub last_modified: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredPerson {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredPerson {
            id: row.try_get("id")?,
            firstname: row.try_get("firstname")?,
            lastname: row.try_get("lastname")?,
            prsaddress: row.try_get("prsaddress")?,
            city: row.try_get("city")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            lat: row.try_get("lat")?,
            lon: row.try_get("lon")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

impl StoredPerson {
    /// Convert database row to an engine Person.
    pub fn into_person(self) -> Person {
        Person {
            id: self.id,
            firstname: self.firstname,
            lastname: self.lastname,
            address: self.prsaddress,
            city: self.city,
            postal_code: self.postal_code,
            country: self.country,
            email: self.email,
            phone: self.phone,
            location: GeoPoint::new(self.lat, self.lon),
            last_modified: self.last_modified,
        }
    }
}

/// Get persons modified strictly after `since`.
pub async fn get_persons_modified_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<StoredPerson>, sqlx::Error> {
    sqlx::query_as::<_, StoredPerson>(
        r#"
        SELECT id, firstname, lastname, prsaddress, city, postal_code, country,
               email, phone, ST_Y(geom) AS lat, ST_X(geom) AS lon, last_modified
        FROM persons
        WHERE last_modified > $1
        ORDER BY id ASC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
}

/// Get the ids of every stored person.
pub async fn get_person_ids(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    let rows: Vec<(i64,)> = sqlx::query_as(r#"SELECT id FROM persons"#)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Rows inserted per transaction by [`insert_persons`].
pub const INSERT_BATCH_SIZE: usize = 100;

/// Insert persons, returning their new ids.
///
/// Rows are committed in batches of [`INSERT_BATCH_SIZE`] so a large request
/// never holds one long transaction open against a running sync cycle.
/// `last_modified` is stamped by the table trigger.
pub async fn insert_persons(pool: &PgPool, persons: &[NewPerson]) -> Result<Vec<i64>, sqlx::Error> {
    let mut ids = Vec::with_capacity(persons.len());

    for batch in persons.chunks(INSERT_BATCH_SIZE) {
        let mut tx = pool.begin().await?;

        for person in batch {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO persons (
                    firstname, lastname, prsaddress, city, postal_code,
                    country, email, phone, geom
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, ST_SetSRID(ST_MakePoint($9, $10), 4326))
                RETURNING id
                "#,
            )
            .bind(&person.firstname)
            .bind(&person.lastname)
            .bind(&person.address)
            .bind(&person.city)
            .bind(&person.postal_code)
            .bind(&person.country)
            .bind(&person.email)
            .bind(&person.phone)
            .bind(person.location.lon)
            .bind(person.location.lat)
            .fetch_one(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
    }

    Ok(ids)
}

/// The PostgreSQL system of record as seen by the sync engine.
#[derive(Debug, Clone)]
pub struct PgEntitySource {
    pool: PgPool,
}

impl PgEntitySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EntitySource for PgEntitySource {
    async fn modified_since(&self, since: Timestamp) -> geolab_engine::error::Result<Vec<Person>> {
        let rows = get_persons_modified_since(&self.pool, since)
            .await
            .map_err(Error::entity_store)?;

        Ok(rows.into_iter().map(StoredPerson::into_person).collect())
    }

    async fn all_ids(&self) -> geolab_engine::error::Result<BTreeSet<PersonId>> {
        let ids = get_person_ids(&self.pool)
            .await
            .map_err(Error::entity_store)?;

        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    /// The trigger definition that wins is the one in the newest migration.
    fn latest_trigger_definition() -> &'static str {
        include_str!("../../migrations/20240301000000_stamp_with_clock_timestamp.sql")
    }

    #[test]
    fn rows_are_stamped_at_write_time() {
        let sql = latest_trigger_definition();
        assert!(sql.contains("persons_touch_last_modified()"));
        assert!(sql.contains("NEW.last_modified := clock_timestamp()"));
        assert!(!sql.contains(":= now()"));
    }
}
