use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Owner, Property, PropertyDetails, PropertyFilters, PropertyImage, PropertyTrace};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

use super::change_set::PendingChange;
use super::error::{StoreError, StoreResult, TransactionError};
use super::repositories::{
    OwnerRepository, PropertyImageRepository, PropertyRepository, PropertyTraceRepository,
};
use super::unit_of_work::{ensure_active, UnitOfWork, UnitOfWorkFactory};

// ============================================================================
// PostgreSQL Backend
// ============================================================================
//
// One UnitOfWork holds at most one open `sqlx::Transaction`. Every repository
// of that UnitOfWork runs its statements on the transaction while it is open
// and on the pool otherwise. Dropping an open transaction rolls it back.
//
// ============================================================================

/// Connect with exponential backoff on transient failures, then migrate
pub async fn connect_with_retry(
    url: &str,
    max_connections: u32,
    attempts: u32,
) -> StoreResult<PgPool> {
    let config = RetryConfig {
        max_attempts: attempts.max(1),
        ..RetryConfig::default()
    };

    let pool = match retry_on_transient(config, |attempt| async move {
        tracing::debug!(attempt, "Connecting to PostgreSQL");
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(StoreError::database("connecting to database"))
    })
    .await
    {
        RetryResult::Success(pool) => pool,
        RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => return Err(error),
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(max_connections, "PostgreSQL pool ready, migrations applied");

    Ok(pool)
}

pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    fn create(&self) -> Box<dyn UnitOfWork> {
        Box::new(PgUnitOfWork::new(self.pool.clone()))
    }
}

// ============================================================================
// Rows
// ============================================================================

const PROPERTY_COLUMNS: &str = "p.id, p.name, p.address, p.price, p.code_internal, p.year, \
     p.owner_id, p.is_deleted, p.created_at, p.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct PropertyRow {
    id: Uuid,
    name: String,
    address: String,
    price: Decimal,
    code_internal: String,
    year: i32,
    owner_id: Uuid,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<PropertyRow> for Property {
    fn from(row: PropertyRow) -> Self {
        Property {
            id: row.id,
            name: row.name,
            address: row.address,
            price: row.price,
            code_internal: row.code_internal,
            year: row.year,
            owner_id: row.owner_id,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    property: PropertyRow,
    owner_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OwnerRow {
    id: Uuid,
    name: String,
    address: String,
    birth_date: NaiveDate,
    photo: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OwnerRow> for Owner {
    fn from(row: OwnerRow) -> Self {
        Owner {
            id: row.id,
            name: row.name,
            address: row.address,
            birth_date: row.birth_date,
            photo: row.photo,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    property_id: Uuid,
    file: String,
    enabled: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for PropertyImage {
    fn from(row: ImageRow) -> Self {
        PropertyImage {
            id: row.id,
            property_id: row.property_id,
            file: row.file,
            enabled: row.enabled,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TraceRow {
    id: Uuid,
    property_id: Uuid,
    event_date: DateTime<Utc>,
    name: String,
    value: Decimal,
    tax: Decimal,
    created_at: DateTime<Utc>,
}

impl From<TraceRow> for PropertyTrace {
    fn from(row: TraceRow) -> Self {
        PropertyTrace {
            id: row.id,
            property_id: row.property_id,
            event_date: row.event_date,
            name: row.name,
            value: row.value,
            tax: row.tax,
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Default)]
struct SessionState {
    transaction: Option<Transaction<'static, Postgres>>,
    pending: Vec<PendingChange>,
}

struct PgSession {
    pool: PgPool,
    state: Mutex<SessionState>,
}

/// Run a built query on the open transaction, or on the pool when Idle
macro_rules! on_session {
    ($session:expr, $state:expr, $query:expr, $fetch:ident) => {
        match $state.transaction.as_mut() {
            Some(tx) => $query.$fetch(&mut **tx).await,
            None => $query.$fetch(&$session.pool).await,
        }
    };
}

impl PgSession {
    async fn stage(&self, change: PendingChange) {
        self.state.lock().await.pending.push(change);
    }
}

/// Translate a unique violation on a property write into a duplicate code
fn property_write_error(code: &str) -> impl FnOnce(sqlx::Error) -> StoreError {
    let code = code.to_string();
    move |source| {
        if let sqlx::Error::Database(db) = &source {
            if db.is_unique_violation() {
                return StoreError::DuplicateCode(code);
            }
        }
        StoreError::database("writing property")(source)
    }
}

async fn write_change(conn: &mut PgConnection, change: &PendingChange) -> StoreResult<()> {
    tracing::trace!(change = change.kind(), "Writing change");
    match change {
        PendingChange::InsertOwner(owner) => {
            sqlx::query(
                "INSERT INTO owners (id, name, address, birth_date, photo, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(owner.id)
            .bind(&owner.name)
            .bind(&owner.address)
            .bind(owner.birth_date)
            .bind(&owner.photo)
            .bind(owner.created_at)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::database("inserting owner"))?;
        }
        PendingChange::InsertProperty(property) => {
            sqlx::query(
                "INSERT INTO properties \
                 (id, name, address, price, code_internal, year, owner_id, is_deleted, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(property.id)
            .bind(&property.name)
            .bind(&property.address)
            .bind(property.price)
            .bind(&property.code_internal)
            .bind(property.year)
            .bind(property.owner_id)
            .bind(property.is_deleted)
            .bind(property.created_at)
            .bind(property.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(property_write_error(&property.code_internal))?;
        }
        PendingChange::UpdateProperty(property) => {
            let result = sqlx::query(
                "UPDATE properties SET name = $2, address = $3, price = $4, code_internal = $5, \
                 year = $6, owner_id = $7, is_deleted = $8, updated_at = $9 \
                 WHERE id = $1 AND NOT is_deleted",
            )
            .bind(property.id)
            .bind(&property.name)
            .bind(&property.address)
            .bind(property.price)
            .bind(&property.code_internal)
            .bind(property.year)
            .bind(property.owner_id)
            .bind(property.is_deleted)
            .bind(property.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(property_write_error(&property.code_internal))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("Property", property.id));
            }
        }
        PendingChange::InsertImage(image) => {
            sqlx::query(
                "INSERT INTO property_images (id, property_id, file, enabled, is_deleted, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(image.id)
            .bind(image.property_id)
            .bind(&image.file)
            .bind(image.enabled)
            .bind(image.is_deleted)
            .bind(image.created_at)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::database("inserting property image"))?;
        }
        PendingChange::InsertTrace(trace) => {
            sqlx::query(
                "INSERT INTO property_traces (id, property_id, event_date, name, value, tax, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(trace.id)
            .bind(trace.property_id)
            .bind(trace.event_date)
            .bind(&trace.name)
            .bind(trace.value)
            .bind(trace.tax)
            .bind(trace.created_at)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::database("inserting property trace"))?;
        }
    }
    Ok(())
}

/// Escape LIKE wildcards so user text matches literally
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// ============================================================================
// Unit of Work
// ============================================================================

pub struct PgUnitOfWork {
    session: std::sync::Arc<PgSession>,
    properties: OnceLock<PgPropertyRepository>,
    owners: OnceLock<PgOwnerRepository>,
    images: OnceLock<PgPropertyImageRepository>,
    traces: OnceLock<PgPropertyTraceRepository>,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self {
            session: std::sync::Arc::new(PgSession {
                pool,
                state: Mutex::new(SessionState::default()),
            }),
            properties: OnceLock::new(),
            owners: OnceLock::new(),
            images: OnceLock::new(),
            traces: OnceLock::new(),
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn properties(&self) -> &dyn PropertyRepository {
        self.properties.get_or_init(|| PgPropertyRepository {
            session: self.session.clone(),
        })
    }

    fn owners(&self) -> &dyn OwnerRepository {
        self.owners.get_or_init(|| PgOwnerRepository {
            session: self.session.clone(),
        })
    }

    fn property_images(&self) -> &dyn PropertyImageRepository {
        self.images.get_or_init(|| PgPropertyImageRepository {
            session: self.session.clone(),
        })
    }

    fn property_traces(&self) -> &dyn PropertyTraceRepository {
        self.traces.get_or_init(|| PgPropertyTraceRepository {
            session: self.session.clone(),
        })
    }

    async fn save_changes(&self, cancel: &CancellationToken) -> StoreResult<usize> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        let changes = std::mem::take(&mut state.pending);
        let count = changes.len();
        if count == 0 {
            return Ok(0);
        }

        match state.transaction.as_mut() {
            Some(tx) => {
                for change in &changes {
                    write_change(&mut **tx, change).await?;
                }
            }
            None => {
                // no explicit transaction: flush the batch in an implicit one
                let mut tx = self
                    .session
                    .pool
                    .begin()
                    .await
                    .map_err(StoreError::database("starting implicit transaction"))?;
                for change in &changes {
                    write_change(&mut *tx, change).await?;
                }
                tx.commit()
                    .await
                    .map_err(StoreError::database("committing implicit transaction"))?;
            }
        }

        tracing::debug!(flushed = count, "Saved pending changes");
        Ok(count)
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        if state.transaction.is_some() {
            return Err(TransactionError::AlreadyOpen.into());
        }

        let tx = self
            .session
            .pool
            .begin()
            .await
            .map_err(StoreError::database("beginning transaction"))?;
        state.transaction = Some(tx);
        Ok(())
    }

    async fn commit_transaction(&self, cancel: &CancellationToken) -> StoreResult<()> {
        let tx = self
            .session
            .state
            .lock()
            .await
            .transaction
            .take()
            .ok_or(TransactionError::NotOpen("commit"))?;

        // dropping the taken transaction rolls it back
        ensure_active(cancel)?;
        tx.commit()
            .await
            .map_err(StoreError::database("committing transaction"))?;

        tracing::debug!("Committed transaction");
        Ok(())
    }

    async fn rollback_transaction(&self, _cancel: &CancellationToken) -> StoreResult<()> {
        let tx = {
            let mut state = self.session.state.lock().await;
            state.pending.clear();
            state
                .transaction
                .take()
                .ok_or(TransactionError::NotOpen("rollback"))?
        };

        tx.rollback()
            .await
            .map_err(StoreError::database("rolling back transaction"))?;

        tracing::debug!("Rolled back transaction");
        Ok(())
    }
}

// ============================================================================
// Repositories
// ============================================================================

struct PgPropertyRepository {
    session: std::sync::Arc<PgSession>,
}

/// Filtered listing, ordered by name ignoring case with the id as tiebreak
fn listing_query(filters: &PropertyFilters) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT ");
    query.push(PROPERTY_COLUMNS);
    query.push(
        ", o.name AS owner_name FROM properties p \
         LEFT JOIN owners o ON o.id = p.owner_id WHERE NOT p.is_deleted",
    );
    if let Some(term) = filters.name_term() {
        query.push(" AND p.name ILIKE ").push_bind(like_pattern(term));
    }
    if let Some(term) = filters.address_term() {
        query.push(" AND p.address ILIKE ").push_bind(like_pattern(term));
    }
    if let Some(min) = filters.min_price {
        query.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filters.max_price {
        query.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(min) = filters.min_year {
        query.push(" AND p.year >= ").push_bind(min);
    }
    if let Some(max) = filters.max_year {
        query.push(" AND p.year <= ").push_bind(max);
    }
    if let Some(owner_id) = filters.owner_id {
        query.push(" AND p.owner_id = ").push_bind(owner_id);
    }
    query
        .push(" ORDER BY LOWER(p.name), p.id LIMIT ")
        .push_bind(filters.limit() as i64)
        .push(" OFFSET ")
        .push_bind(filters.offset() as i64);
    query
}

#[async_trait]
impl PropertyRepository for PgPropertyRepository {
    async fn get_with_filters(
        &self,
        filters: &PropertyFilters,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyDetails>> {
        ensure_active(cancel)?;

        let mut query = listing_query(filters);

        let mut state = self.session.state.lock().await;
        let rows: Vec<ListingRow> = on_session!(
            self.session,
            state,
            query.build_query_as::<ListingRow>(),
            fetch_all
        )
        .map_err(StoreError::database("listing properties"))?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.property.id).collect();
        let images: Vec<ImageRow> = on_session!(
            self.session,
            state,
            sqlx::query_as::<_, ImageRow>(
                "SELECT id, property_id, file, enabled, is_deleted, created_at \
                 FROM property_images \
                 WHERE property_id = ANY($1) AND enabled AND NOT is_deleted \
                 ORDER BY created_at"
            )
            .bind(&ids),
            fetch_all
        )
        .map_err(StoreError::database("loading property images"))?;

        let mut images: Vec<PropertyImage> = images.into_iter().map(PropertyImage::from).collect();
        let details = rows
            .into_iter()
            .map(|row| {
                let property = Property::from(row.property);
                let (own, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut images)
                    .into_iter()
                    .partition(|image| image.property_id == property.id);
                images = rest;
                PropertyDetails {
                    property,
                    owner_name: row.owner_name,
                    images: own,
                }
            })
            .collect();

        Ok(details)
    }

    async fn create(&self, property: Property, cancel: &CancellationToken) -> StoreResult<Property> {
        ensure_active(cancel)?;
        self.session
            .stage(PendingChange::InsertProperty(property.clone()))
            .await;
        Ok(property)
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Property> {
        ensure_active(cancel)?;
        let sql = format!(
            "SELECT {} FROM properties p WHERE p.id = $1 AND NOT p.is_deleted",
            PROPERTY_COLUMNS
        );

        let mut state = self.session.state.lock().await;
        let row: Option<PropertyRow> = on_session!(
            self.session,
            state,
            sqlx::query_as::<_, PropertyRow>(&sql).bind(id),
            fetch_optional
        )
        .map_err(StoreError::database("loading property"))?;

        row.map(Property::from)
            .ok_or_else(|| StoreError::not_found("Property", id))
    }

    async fn update(&self, property: &Property, cancel: &CancellationToken) -> StoreResult<()> {
        ensure_active(cancel)?;
        self.session
            .stage(PendingChange::UpdateProperty(property.clone()))
            .await;
        Ok(())
    }

    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        on_session!(
            self.session,
            state,
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM properties WHERE id = $1 AND NOT is_deleted)"
            )
            .bind(id),
            fetch_one
        )
        .map_err(StoreError::database("checking property"))
    }

    async fn code_internal_exists(
        &self,
        code: &str,
        exclude_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        on_session!(
            self.session,
            state,
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM properties \
                 WHERE code_internal = $1 AND NOT is_deleted \
                 AND ($2::uuid IS NULL OR id <> $2))"
            )
            .bind(code)
            .bind(exclude_id),
            fetch_one
        )
        .map_err(StoreError::database("checking internal code"))
    }
}

struct PgOwnerRepository {
    session: std::sync::Arc<PgSession>,
}

#[async_trait]
impl OwnerRepository for PgOwnerRepository {
    async fn exists(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<bool> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        on_session!(
            self.session,
            state,
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM owners WHERE id = $1)")
                .bind(id),
            fetch_one
        )
        .map_err(StoreError::database("checking owner"))
    }

    async fn get_by_id(&self, id: Uuid, cancel: &CancellationToken) -> StoreResult<Owner> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        let row: Option<OwnerRow> = on_session!(
            self.session,
            state,
            sqlx::query_as::<_, OwnerRow>(
                "SELECT id, name, address, birth_date, photo, created_at FROM owners WHERE id = $1"
            )
            .bind(id),
            fetch_optional
        )
        .map_err(StoreError::database("loading owner"))?;

        row.map(Owner::from)
            .ok_or_else(|| StoreError::not_found("Owner", id))
    }

    async fn create(&self, owner: Owner, cancel: &CancellationToken) -> StoreResult<Owner> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertOwner(owner.clone())).await;
        Ok(owner)
    }
}

struct PgPropertyImageRepository {
    session: std::sync::Arc<PgSession>,
}

#[async_trait]
impl PropertyImageRepository for PgPropertyImageRepository {
    async fn create(&self, image: PropertyImage, cancel: &CancellationToken) -> StoreResult<PropertyImage> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertImage(image.clone())).await;
        Ok(image)
    }
}

struct PgPropertyTraceRepository {
    session: std::sync::Arc<PgSession>,
}

#[async_trait]
impl PropertyTraceRepository for PgPropertyTraceRepository {
    async fn create(&self, trace: PropertyTrace, cancel: &CancellationToken) -> StoreResult<PropertyTrace> {
        ensure_active(cancel)?;
        self.session.stage(PendingChange::InsertTrace(trace.clone())).await;
        Ok(trace)
    }

    async fn list_for_property(
        &self,
        property_id: Uuid,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<PropertyTrace>> {
        ensure_active(cancel)?;
        let mut state = self.session.state.lock().await;
        let rows: Vec<TraceRow> = on_session!(
            self.session,
            state,
            sqlx::query_as::<_, TraceRow>(
                "SELECT id, property_id, event_date, name, value, tax, created_at \
                 FROM property_traces WHERE property_id = $1 ORDER BY event_date, created_at"
            )
            .bind(property_id),
            fetch_all
        )
        .map_err(StoreError::database("loading property traces"))?;

        Ok(rows.into_iter().map(PropertyTrace::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("villa"), "%villa%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_non_database_write_error_is_not_duplicate() {
        let error = property_write_error("MIA001")(sqlx::Error::RowNotFound);

        assert!(matches!(error, StoreError::Database { .. }));
    }

    #[test]
    fn test_listing_orders_by_name_ignoring_case() {
        let filters = PropertyFilters {
            name: Some("villa".to_string()),
            ..Default::default()
        };

        let query = listing_query(&filters);

        assert!(query.sql().contains("p.name ILIKE $1"));
        assert!(query.sql().contains(" ORDER BY LOWER(p.name), p.id LIMIT $2 OFFSET $3"));
    }

    #[test]
    fn test_traces_cannot_be_dropped_with_their_property() {
        let schema = include_str!("../../migrations/20250101000000_initial_schema.sql");
        let traces = schema
            .split("CREATE TABLE")
            .find(|table| table.contains("property_traces"))
            .unwrap();

        assert!(traces.contains("REFERENCES properties (id) ON DELETE RESTRICT"));
        assert!(!traces.contains("CASCADE"));
    }

    #[test]
    fn test_property_row_conversion() {
        let now = Utc::now();
        let row = PropertyRow {
            id: Uuid::new_v4(),
            name: "Beach House".to_string(),
            address: "1 Ocean Drive".to_string(),
            price: Decimal::new(45_000_000, 2),
            code_internal: "MIA002".to_string(),
            year: 2018,
            owner_id: Uuid::new_v4(),
            is_deleted: false,
            created_at: now,
            updated_at: None,
        };
        let id = row.id;

        let property = Property::from(row);

        assert_eq!(property.id, id);
        assert_eq!(property.price, Decimal::from(450_000));
        assert_eq!(property.code_internal, "MIA002");
    }
}
