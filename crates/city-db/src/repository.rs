//! The repository interface and its `PostgreSQL` implementation.
//!
//! The engine never talks to the database directly: it emits
//! [`crate::writer::PersistRequest`]s that a writer task applies through
//! this trait. The trait keeps the engine testable against
//! [`MemoryRepository`] and makes `PostgreSQL` a deployment detail.

use chrono::{DateTime, Utc};
use city_types::WorldEvent;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// One inventory stack as persisted.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct InventoryItemRow {
    /// Item kind string.
    pub item: String,
    /// Units held.
    pub quantity: i32,
    /// Uses left on wearing items.
    pub remaining_uses: Option<i32>,
}

/// A resident's durable row plus their inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidentRow {
    /// Resident id.
    pub id: Uuid,
    /// Passport number.
    pub passport: String,
    /// Full legal name.
    pub full_name: String,
    /// Preferred name.
    pub preferred_name: String,
    /// Declared origin.
    pub origin: String,
    /// Kind string (`agent` / `human`).
    pub kind: String,
    /// Status string (`alive` / `deceased` / `departed`).
    pub status: String,
    /// World x.
    pub x: f64,
    /// World y.
    pub y: f64,
    /// Wallet balance.
    pub wallet: i64,
    /// Needs scalars.
    pub hunger: f64,
    /// Hydration.
    pub thirst: f64,
    /// Wakefulness.
    pub energy: f64,
    /// Bladder pressure.
    pub bladder: f64,
    /// Vitality.
    pub health: f64,
    /// Companionship.
    pub social: f64,
    /// Game-time of arrival, if spawned.
    pub arrived_at: Option<f64>,
    /// Wall-clock registration time.
    pub registered_at: DateTime<Utc>,
    /// Inventory stacks.
    pub inventory: Vec<InventoryItemRow>,
    /// Held job, if any.
    pub job_id: Option<Uuid>,
}

/// A petition's durable row.
#[derive(Debug, Clone, PartialEq)]
pub struct PetitionRow {
    /// Petition id.
    pub id: Uuid,
    /// Author resident id.
    pub author_id: Uuid,
    /// Category.
    pub category: String,
    /// Description.
    pub description: String,
    /// Status string (`open` / `closed`).
    pub status: String,
    /// Votes in favour.
    pub votes_for: i32,
    /// Votes against.
    pub votes_against: i32,
    /// Game-time opened.
    pub opened_at: f64,
}

/// A job posting's durable row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    /// Job id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Workplace building, if indoor.
    pub building_id: Option<Uuid>,
    /// Wage per shift.
    pub wage: i64,
    /// Shift length in game-hours.
    pub shift_hours: f64,
    /// Position cap.
    pub max_positions: i32,
    /// Police powers flag.
    pub police: bool,
    /// Description.
    pub description: String,
}

/// Periodic checkpoint summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointRow {
    /// Game-time at capture.
    pub world_time: f64,
    /// Living residents at capture.
    pub alive: i32,
}

/// The durable store the engine writes through.
///
/// All operations are idempotent where duplicates are possible: events
/// key on their id, votes on (petition, resident), so at-least-once
/// delivery from the writer queue is safe.
pub trait Repository: Send + Sync + 'static {
    /// Load every resident row (with inventory and job) at startup.
    fn load_residents(
        &self,
    ) -> impl Future<Output = Result<Vec<ResidentRow>, DbError>> + Send;

    /// Insert or update a resident row and replace their inventory.
    fn upsert_resident(
        &self,
        row: &ResidentRow,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Append one event. Duplicate ids are ignored.
    fn insert_event(
        &self,
        event: &WorldEvent,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Insert or update a petition row (tallies included).
    fn upsert_petition(
        &self,
        row: &PetitionRow,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Record a vote. Duplicate (petition, resident) pairs are ignored.
    fn insert_vote(
        &self,
        petition: Uuid,
        resident: Uuid,
        approve: bool,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Insert or update a job posting.
    fn upsert_job(&self, row: &JobRow) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Set (or clear) a resident's job assignment.
    fn set_job_assignment(
        &self,
        resident: Uuid,
        job: Option<Uuid>,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Write the current shelf quantity for an item.
    fn upsert_shop_stock(
        &self,
        item: &str,
        stock: i32,
    ) -> impl Future<Output = Result<(), DbError>> + Send;

    /// Append a checkpoint summary.
    fn insert_checkpoint(
        &self,
        row: CheckpointRow,
    ) -> impl Future<Output = Result<(), DbError>> + Send;
}

/// [`Repository`] backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Wrap a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Repository for PostgresRepository {
    async fn load_residents(&self) -> Result<Vec<ResidentRow>, DbError> {
        #[derive(sqlx::FromRow)]
        struct Base {
            id: Uuid,
            passport: String,
            full_name: String,
            preferred_name: String,
            origin: String,
            kind: String,
            status: String,
            x: f64,
            y: f64,
            wallet: i64,
            hunger: f64,
            thirst: f64,
            energy: f64,
            bladder: f64,
            health: f64,
            social: f64,
            arrived_at: Option<f64>,
            registered_at: DateTime<Utc>,
            job_id: Option<Uuid>,
        }

        let bases = sqlx::query_as::<_, Base>(
            r"SELECT r.id, r.passport, r.full_name, r.preferred_name, r.origin,
                     r.kind, r.status, r.x, r.y, r.wallet,
                     r.hunger, r.thirst, r.energy, r.bladder, r.health, r.social,
                     r.arrived_at, r.registered_at, a.job_id
              FROM residents r
              LEFT JOIN job_assignments a ON a.resident_id = r.id
              ORDER BY r.passport",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut rows = Vec::with_capacity(bases.len());
        for base in bases {
            let inventory = sqlx::query_as::<_, InventoryItemRow>(
                r"SELECT item, quantity, remaining_uses
                  FROM inventory WHERE resident_id = $1 ORDER BY item",
            )
            .bind(base.id)
            .fetch_all(&self.pool)
            .await?;

            rows.push(ResidentRow {
                id: base.id,
                passport: base.passport,
                full_name: base.full_name,
                preferred_name: base.preferred_name,
                origin: base.origin,
                kind: base.kind,
                status: base.status,
                x: base.x,
                y: base.y,
                wallet: base.wallet,
                hunger: base.hunger,
                thirst: base.thirst,
                energy: base.energy,
                bladder: base.bladder,
                health: base.health,
                social: base.social,
                arrived_at: base.arrived_at,
                registered_at: base.registered_at,
                inventory,
                job_id: base.job_id,
            });
        }
        Ok(rows)
    }

    async fn upsert_resident(&self, row: &ResidentRow) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"INSERT INTO residents
                (id, passport, full_name, preferred_name, origin, kind, status,
                 x, y, wallet, hunger, thirst, energy, bladder, health, social,
                 arrived_at, registered_at, updated_at)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,now())
              ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                x = EXCLUDED.x,
                y = EXCLUDED.y,
                wallet = EXCLUDED.wallet,
                hunger = EXCLUDED.hunger,
                thirst = EXCLUDED.thirst,
                energy = EXCLUDED.energy,
                bladder = EXCLUDED.bladder,
                health = EXCLUDED.health,
                social = EXCLUDED.social,
                arrived_at = EXCLUDED.arrived_at,
                updated_at = now()",
        )
        .bind(row.id)
        .bind(&row.passport)
        .bind(&row.full_name)
        .bind(&row.preferred_name)
        .bind(&row.origin)
        .bind(&row.kind)
        .bind(&row.status)
        .bind(row.x)
        .bind(row.y)
        .bind(row.wallet)
        .bind(row.hunger)
        .bind(row.thirst)
        .bind(row.energy)
        .bind(row.bladder)
        .bind(row.health)
        .bind(row.social)
        .bind(row.arrived_at)
        .bind(row.registered_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r"DELETE FROM inventory WHERE resident_id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        for entry in &row.inventory {
            sqlx::query(
                r"INSERT INTO inventory (resident_id, item, quantity, remaining_uses)
                  VALUES ($1, $2, $3, $4)
                  ON CONFLICT (resident_id, item) DO UPDATE SET
                    quantity = inventory.quantity + EXCLUDED.quantity",
            )
            .bind(row.id)
            .bind(&entry.item)
            .bind(entry.quantity)
            .bind(entry.remaining_uses)
            .execute(&mut *tx)
            .await?;
        }

        match row.job_id {
            Some(job) => {
                sqlx::query(
                    r"INSERT INTO job_assignments (resident_id, job_id)
                      VALUES ($1, $2)
                      ON CONFLICT (resident_id) DO UPDATE SET job_id = EXCLUDED.job_id",
                )
                .bind(row.id)
                .bind(job)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(r"DELETE FROM job_assignments WHERE resident_id = $1")
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_event(&self, event: &WorldEvent) -> Result<(), DbError> {
        let data = serde_json::to_value(&event.data)?;
        sqlx::query(
            r"INSERT INTO events
                (id, world_time, recorded_at, event_type, resident_id, target_id,
                 building_id, x, y, data_json)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(event.id.into_inner())
        .bind(event.world_time)
        .bind(event.recorded_at)
        .bind(event.kind.as_str())
        .bind(event.resident.map(city_types::ResidentId::into_inner))
        .bind(event.target.map(city_types::ResidentId::into_inner))
        .bind(event.building.map(city_types::BuildingId::into_inner))
        .bind(event.x)
        .bind(event.y)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_petition(&self, row: &PetitionRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO petitions
                (id, author_id, category, description, status, votes_for, votes_against, opened_at)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
              ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                votes_for = EXCLUDED.votes_for,
                votes_against = EXCLUDED.votes_against",
        )
        .bind(row.id)
        .bind(row.author_id)
        .bind(&row.category)
        .bind(&row.description)
        .bind(&row.status)
        .bind(row.votes_for)
        .bind(row.votes_against)
        .bind(row.opened_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_vote(
        &self,
        petition: Uuid,
        resident: Uuid,
        approve: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO petition_votes (petition_id, resident_id, approve)
              VALUES ($1, $2, $3)
              ON CONFLICT (petition_id, resident_id) DO NOTHING",
        )
        .bind(petition)
        .bind(resident)
        .bind(approve)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_job(&self, row: &JobRow) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO jobs
                (id, title, building_id, wage, shift_hours, max_positions, police, description)
              VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
              ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                wage = EXCLUDED.wage,
                shift_hours = EXCLUDED.shift_hours,
                max_positions = EXCLUDED.max_positions",
        )
        .bind(row.id)
        .bind(&row.title)
        .bind(row.building_id)
        .bind(row.wage)
        .bind(row.shift_hours)
        .bind(row.max_positions)
        .bind(row.police)
        .bind(&row.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_job_assignment(
        &self,
        resident: Uuid,
        job: Option<Uuid>,
    ) -> Result<(), DbError> {
        match job {
            Some(job) => {
                sqlx::query(
                    r"INSERT INTO job_assignments (resident_id, job_id)
                      VALUES ($1, $2)
                      ON CONFLICT (resident_id) DO UPDATE SET job_id = EXCLUDED.job_id",
                )
                .bind(resident)
                .bind(job)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(r"DELETE FROM job_assignments WHERE resident_id = $1")
                    .bind(resident)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn upsert_shop_stock(&self, item: &str, stock: i32) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO shop_stock (item, stock) VALUES ($1, $2)
              ON CONFLICT (item) DO UPDATE SET stock = EXCLUDED.stock",
        )
        .bind(item)
        .bind(stock)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_checkpoint(&self, row: CheckpointRow) -> Result<(), DbError> {
        sqlx::query(r"INSERT INTO checkpoints (world_time, alive) VALUES ($1, $2)")
            .bind(row.world_time)
            .bind(row.alive)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory [`Repository`] for tests and offline development.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: std::sync::Mutex<MemoryStore>,
}

/// Backing store for [`MemoryRepository`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Resident rows by id.
    pub residents: std::collections::BTreeMap<Uuid, ResidentRow>,
    /// Appended events in arrival order.
    pub events: Vec<WorldEvent>,
    /// Petition rows by id.
    pub petitions: std::collections::BTreeMap<Uuid, PetitionRow>,
    /// Vote rows.
    pub votes: std::collections::BTreeMap<(Uuid, Uuid), bool>,
    /// Job rows by id.
    pub jobs: std::collections::BTreeMap<Uuid, JobRow>,
    /// Shelf stock by item string.
    pub shop_stock: std::collections::BTreeMap<String, i32>,
    /// Checkpoint rows in order.
    pub checkpoints: Vec<CheckpointRow>,
}

impl MemoryRepository {
    /// Create an empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a closure against the backing store (test inspection).
    pub fn with_store<T>(&self, f: impl FnOnce(&MemoryStore) -> T) -> Option<T> {
        self.inner.lock().ok().map(|store| f(&store))
    }
}

impl Repository for MemoryRepository {
    async fn load_residents(&self) -> Result<Vec<ResidentRow>, DbError> {
        Ok(self
            .inner
            .lock()
            .map(|store| store.residents.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_resident(&self, row: &ResidentRow) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.residents.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn insert_event(&self, event: &WorldEvent) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock()
            && !store.events.iter().any(|e| e.id == event.id)
        {
            store.events.push(event.clone());
        }
        Ok(())
    }

    async fn upsert_petition(&self, row: &PetitionRow) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.petitions.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn insert_vote(
        &self,
        petition: Uuid,
        resident: Uuid,
        approve: bool,
    ) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.votes.entry((petition, resident)).or_insert(approve);
        }
        Ok(())
    }

    async fn upsert_job(&self, row: &JobRow) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.jobs.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn set_job_assignment(
        &self,
        resident: Uuid,
        job: Option<Uuid>,
    ) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock()
            && let Some(row) = store.residents.get_mut(&resident)
        {
            row.job_id = job;
        }
        Ok(())
    }

    async fn upsert_shop_stock(&self, item: &str, stock: i32) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.shop_stock.insert(item.to_owned(), stock);
        }
        Ok(())
    }

    async fn insert_checkpoint(&self, row: CheckpointRow) -> Result<(), DbError> {
        if let Ok(mut store) = self.inner.lock() {
            store.checkpoints.push(row);
        }
        Ok(())
    }
}
