//! Demo catalog for a fresh install.

use chrono::NaiveDateTime;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::*;
use crate::store::{Store, StoreError};

const DEMO_CATALOG: &str = include_str!("../fixtures/seed.json");

#[derive(Debug, Deserialize)]
struct SeedService {
    name: String,
    category: ServiceCategory,
    price: u64,
    duration: Minutes,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedMember {
    name: String,
    role: String,
    specialties: Vec<String>,
    rating: f32,
    image: String,
}

#[derive(Debug, Deserialize)]
struct SeedClient {
    full_name: String,
    email: String,
    phone: String,
    total_spent: u64,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedCatalog {
    services: Vec<SeedService>,
    staff: Vec<SeedMember>,
    clients: Vec<SeedClient>,
}

#[derive(Debug)]
pub enum SeedError {
    Parse(serde_json::Error),
    Store(StoreError),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::Parse(e) => write!(f, "bad seed catalog: {e}"),
            SeedError::Store(e) => write!(f, "seeding failed: {e}"),
        }
    }
}

impl std::error::Error for SeedError {}

impl From<serde_json::Error> for SeedError {
    fn from(e: serde_json::Error) -> Self {
        SeedError::Parse(e)
    }
}

impl From<StoreError> for SeedError {
    fn from(e: StoreError) -> Self {
        SeedError::Store(e)
    }
}

/// Load the demo services, staff and client unless the catalog already has
/// services or staff. Returns how many records were written.
pub async fn seed_catalog(store: &Store, now: NaiveDateTime) -> Result<usize, SeedError> {
    if !store.catalog_is_empty() {
        tracing::debug!("catalog not empty, skipping seed");
        return Ok(0);
    }
    let catalog: SeedCatalog = serde_json::from_str(DEMO_CATALOG)?;
    let mut written = 0;

    for s in catalog.services {
        store
            .put_service(Service {
                id: Ulid::new(),
                name: s.name,
                category: s.category,
                price: s.price,
                duration: s.duration,
                description: s.description,
                active: true,
            })
            .await?;
        written += 1;
    }
    for m in catalog.staff {
        store
            .put_member(Member {
                id: Ulid::new(),
                name: m.name,
                role: m.role,
                specialties: m.specialties,
                rating: m.rating,
                image: m.image,
                active: true,
            })
            .await?;
        written += 1;
    }
    for c in catalog.clients {
        store
            .put_client(Client {
                id: Ulid::new(),
                full_name: c.full_name,
                email: c.email,
                phone: c.phone,
                last_visit: Some(now),
                total_spent: c.total_spent,
                notes: c.notes,
            })
            .await?;
        written += 1;
    }

    tracing::info!(records = written, "seeded demo catalog");
    Ok(written)
}
