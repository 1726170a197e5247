//! Generate handler - seeds the system of record with fake Montréal residents.

use crate::db;
use crate::error::Result;
use geolab_engine::{GeoPoint, NewPerson};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::ops::RangeInclusive;

/// Persons created when the request names no count.
pub const DEFAULT_GENERATE_COUNT: usize = 100;

/// Largest batch a single request may create.
pub const MAX_GENERATE_COUNT: usize = 10_000;

const LATITUDES: RangeInclusive<f64> = 45.4..=45.5;
const LONGITUDES: RangeInclusive<f64> = -73.6..=-73.5;

const FIRSTNAMES: &[&str] = &[
    "Marie", "Jean", "Sophie", "Luc", "Isabelle", "Mathieu", "Julie", "François", "Catherine",
    "Étienne", "Geneviève", "Olivier", "Nathalie", "Sébastien", "Chantal", "Alexandre",
    "Mélanie", "Philippe", "Valérie", "Gabriel",
];

const LASTNAMES: &[&str] = &[
    "Tremblay", "Gagnon", "Roy", "Côté", "Bouchard", "Gauthier", "Morin", "Lavoie", "Fortin",
    "Gagné", "Ouellet", "Pelletier", "Bélanger", "Lévesque", "Bergeron", "Leblanc", "Paquette",
    "Girard", "Simard", "Boucher",
];

const STREETS: &[&str] = &[
    "rue Saint-Denis", "boulevard Saint-Laurent", "rue Sherbrooke", "avenue du Parc",
    "rue Sainte-Catherine", "avenue Papineau", "rue Ontario", "avenue Laurier",
    "rue Masson", "boulevard Rosemont", "rue Wellington", "avenue Mont-Royal",
];

const POSTAL_LETTERS: &[u8] = b"ABCEGHJKLMNPRSTVWXYZ";

/// Request body for generate.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub count: Option<usize>,
}

impl GenerateRequest {
    /// Requested count, defaulted and clamped to what one request may create.
    pub fn count(&self) -> usize {
        self.count
            .unwrap_or(DEFAULT_GENERATE_COUNT)
            .clamp(1, MAX_GENERATE_COUNT)
    }
}

/// Response for generate.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub message: String,
    pub count: usize,
}

/// Insert `request.count()` random persons.
pub async fn handle_generate(pool: &PgPool, request: GenerateRequest) -> Result<GenerateResponse> {
    let count = request.count();
    let persons = {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| fake_person(&mut rng)).collect::<Vec<_>>()
    };

    let ids = db::insert_persons(pool, &persons).await?;
    tracing::info!(count = ids.len(), "generated persons");

    Ok(GenerateResponse {
        message: format!("{} persons generated", ids.len()),
        count: ids.len(),
    })
}

fn pick<'a, R: Rng>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

fn postal_code<R: Rng>(rng: &mut R) -> String {
    let letter = |rng: &mut R| char::from(*POSTAL_LETTERS.choose(rng).unwrap_or(&b'H'));
    let (d1, l1) = (rng.gen_range(0..10), letter(rng));
    let (d2, l2, d3) = (rng.gen_range(0..10), letter(rng), rng.gen_range(0..10));
    format!("H{d1}{l1} {d2}{l2}{d3}")
}

/// A plausible Montréal resident located inside the city's bounding box.
pub fn fake_person<R: Rng>(rng: &mut R) -> NewPerson {
    let firstname = pick(rng, FIRSTNAMES);
    let lastname = pick(rng, LASTNAMES);
    let email = format!(
        "{}.{}{}@example.com",
        firstname.to_lowercase(),
        lastname.to_lowercase(),
        rng.gen_range(1..1000)
    );

    NewPerson {
        firstname: firstname.to_string(),
        lastname: lastname.to_string(),
        address: format!("{} {}", rng.gen_range(1..10_000), pick(rng, STREETS)),
        city: "Montréal".to_string(),
        postal_code: postal_code(rng),
        country: "Canada".to_string(),
        email,
        phone: format!("514-555-{:04}", rng.gen_range(0..10_000)),
        location: GeoPoint::new(rng.gen_range(LATITUDES), rng.gen_range(LONGITUDES)),
    }
}
