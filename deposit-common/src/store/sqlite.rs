//! SQLite-backed resource store
//!
//! Resources are kept as JSON bodies next to their kind and an integer
//! version. Outgoing references are mirrored into `resource_links` so that
//! inverse lookups are a single indexed query.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{mint_id, retry_on_lock, IncomingLinks, ResourceStore, StoreError, StoreResult};
use crate::events::{ChangeKind, NotificationBus, ResourceNotification};
use crate::model::{Resource, ResourceId, ResourceKind};

/// Default bound on retries of "database is locked" errors
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

pub struct SqliteResourceStore {
    pool: SqlitePool,
    base_uri: String,
    max_lock_wait_ms: u64,
    notifications: Option<NotificationBus>,
}

impl SqliteResourceStore {
    /// Open (or create) a database file
    pub async fn open(db_path: &Path, base_uri: impl Into<String>) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Cannot create {}: {}", parent.display(), e)))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        tracing::debug!("Connecting to database: {}", db_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&db_url)
            .await?;

        // WAL allows concurrent readers with one writer
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        Self::from_pool(pool, base_uri).await
    }

    /// Use an existing pool, creating the tables if needed
    pub async fn from_pool(pool: SqlitePool, base_uri: impl Into<String>) -> StoreResult<Self> {
        init_tables(&pool).await?;
        Ok(Self {
            pool,
            base_uri: base_uri.into(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
            notifications: None,
        })
    }

    pub fn with_notifications(mut self, bus: NotificationBus) -> Self {
        self.notifications = Some(bus);
        self
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn announce(&self, id: ResourceId, kind: ResourceKind, change: ChangeKind) {
        if let Some(bus) = &self.notifications {
            bus.publish_lossy(ResourceNotification::new(id, kind, change));
        }
    }

    async fn current_version(&self, id: &ResourceId) -> StoreResult<Option<(ResourceKind, i64)>> {
        let row = sqlx::query("SELECT kind, version FROM resources WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let kind: String = row.get("kind");
                let version: i64 = row.get("version");
                Ok(Some((kind.parse()?, version)))
            }
            None => Ok(None),
        }
    }

    async fn insert_once(&self, id: &ResourceId, resource: &Resource) -> StoreResult<()> {
        let body = serde_json::to_string(resource)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO resources (id, kind, version, body, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(resource.kind().as_str())
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(id.clone()));
        }

        write_links(&mut tx, id, resource).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_once(&self, id: &ResourceId, resource: &Resource) -> StoreResult<()> {
        let expected = resource.version().and_then(|v| v.parse::<i64>().ok());
        let (kind, actual) = self
            .current_version(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if kind != resource.kind() {
            return Err(StoreError::KindMismatch {
                id: Some(id.clone()),
                expected: kind,
                actual: resource.kind(),
            });
        }

        let conflict = || StoreError::Conflict {
            id: id.clone(),
            expected: resource.version().map(str::to_string),
            actual: Some(actual.to_string()),
        };
        let expected = expected.ok_or_else(&conflict)?;

        let body = serde_json::to_string(resource)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE resources
            SET body = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .bind(expected)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Someone else committed between our version check and the write
            return Err(conflict());
        }

        sqlx::query("DELETE FROM resource_links WHERE source_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        write_links(&mut tx, id, resource).await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn init_tables(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            version INTEGER NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_links (
            source_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            target_id TEXT NOT NULL,
            PRIMARY KEY (source_id, relation, target_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_resource_links_target ON resource_links(target_id)")
        .execute(pool)
        .await?;

    tracing::info!("Resource store tables initialized (resources, resource_links)");
    Ok(())
}

async fn write_links(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &ResourceId,
    resource: &Resource,
) -> StoreResult<()> {
    for (relation, target) in resource.references() {
        sqlx::query(
            "INSERT OR IGNORE INTO resource_links (source_id, relation, target_id) VALUES (?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(relation)
        .bind(target.as_str())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl ResourceStore for SqliteResourceStore {
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource> {
        let row = sqlx::query("SELECT version, body FROM resources WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let version: i64 = row.get("version");
        let body: String = row.get("body");

        let mut resource: Resource = serde_json::from_str(&body)?;
        resource.set_id(id.clone());
        resource.set_version(Some(version.to_string()));
        Ok(resource)
    }

    async fn create(&self, mut resource: Resource) -> StoreResult<ResourceId> {
        let kind = resource.kind();
        let id = match resource.id() {
            Some(id) => id.clone(),
            None => mint_id(&self.base_uri, kind),
        };
        resource.set_id(id.clone());
        resource.set_version(None);

        let (id_ref, resource_ref) = (&id, &resource);
        retry_on_lock("create", self.max_lock_wait_ms, move || {
            self.insert_once(id_ref, resource_ref)
        })
        .await?;

        tracing::debug!(resource = %id, kind = %kind, "Created resource");
        self.announce(id.clone(), kind, ChangeKind::Created);
        Ok(id)
    }

    async fn update(&self, resource: Resource) -> StoreResult<()> {
        let id = resource.id().cloned().ok_or(StoreError::MissingId)?;
        let kind = resource.kind();

        let (id_ref, resource_ref) = (&id, &resource);
        retry_on_lock("update", self.max_lock_wait_ms, move || {
            self.update_once(id_ref, resource_ref)
        })
        .await?;

        tracing::debug!(resource = %id, kind = %kind, "Updated resource");
        self.announce(id, kind, ChangeKind::Modified);
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> StoreResult<()> {
        let (kind, _) = self
            .current_version(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM resource_links WHERE source_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.announce(id.clone(), kind, ChangeKind::Deleted);
        Ok(())
    }

    async fn incoming(&self, id: &ResourceId) -> StoreResult<IncomingLinks> {
        let rows = sqlx::query("SELECT source_id, relation FROM resource_links WHERE target_id = ?")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut links = IncomingLinks::new();
        for row in rows {
            let source: String = row.get("source_id");
            let relation: String = row.get("relation");
            links.entry(relation).or_default().insert(ResourceId::from(source));
        }
        Ok(links)
    }
}
