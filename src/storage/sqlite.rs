//! SQLite storage using SQLx.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use super::{ModuleDescriptor, Storage, StorageError};
use crate::config::{AiConfig, IrcConfig};
use crate::moderation::ModerationConfig;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

type ModuleRow = (i64, String, String, String, bool, String);
type ModerationRow = (String, bool, i64, i64, i64);

/// Database handle with connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Connection acquire timeout - prevents a wedged database from blocking reloads forever.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (creating if needed) the database at `path` and run migrations.
    /// `":memory:"` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let (options, max_connections) = if path == ":memory:" {
            // Shared-cache name unique per call so parallel tests never collide.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:slirc-relay-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .create_if_missing(true);
            (options, 1)
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            (options, 4)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        info!(path = %path, "Database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations checked/applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a module row.
    pub async fn save_module(&self, module: &ModuleDescriptor) -> Result<(), StorageError> {
        let settings = serde_json::to_string(&module.settings)
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO modules (id, name, trigger, kind, enabled, settings)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                trigger = excluded.trigger,
                kind = excluded.kind,
                enabled = excluded.enabled,
                settings = excluded.settings
            "#,
        )
        .bind(module.id)
        .bind(&module.name)
        .bind(&module.trigger)
        .bind(&module.kind)
        .bind(module.enabled)
        .bind(settings)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns whether a row was changed.
    pub async fn set_module_enabled(&self, id: i64, enabled: bool) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE modules SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_module(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert or replace the moderation row for a channel.
    pub async fn save_moderation(&self, config: &ModerationConfig) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO channel_moderation
                (channel, enabled, flood_threshold, flood_timeframe_secs, caps_percentage)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(channel) DO UPDATE SET
                enabled = excluded.enabled,
                flood_threshold = excluded.flood_threshold,
                flood_timeframe_secs = excluded.flood_timeframe_secs,
                caps_percentage = excluded.caps_percentage
            "#,
        )
        .bind(&config.channel)
        .bind(config.enabled)
        .bind(i64::from(config.flood_threshold))
        .bind(config.flood_timeframe_secs as i64)
        .bind(i64::from(config.caps_percentage))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_connection_settings(&self, irc: &IrcConfig) -> Result<(), StorageError> {
        self.save_singleton("connection_settings", irc).await
    }

    pub async fn save_ai_settings(&self, ai: &AiConfig) -> Result<(), StorageError> {
        self.save_singleton("ai_settings", ai).await
    }

    /// First-run seeding: copy settings and rows from the config file into
    /// empty tables. Existing rows win.
    pub async fn seed(
        &self,
        irc: &IrcConfig,
        ai: &AiConfig,
        modules: &[ModuleDescriptor],
        moderation: &[ModerationConfig],
    ) -> Result<(), StorageError> {
        if self.load_singleton::<IrcConfig>("connection_settings").await?.is_none() {
            self.save_connection_settings(irc).await?;
            info!("Seeded connection settings from config file");
        }
        if self.load_singleton::<AiConfig>("ai_settings").await?.is_none() {
            self.save_ai_settings(ai).await?;
        }

        let (module_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM modules")
            .fetch_one(&self.pool)
            .await?;
        if module_count == 0 {
            for module in modules {
                self.save_module(module).await?;
            }
        }

        let (moderation_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM channel_moderation")
                .fetch_one(&self.pool)
                .await?;
        if moderation_count == 0 {
            for config in moderation {
                self.save_moderation(config).await?;
            }
        }
        Ok(())
    }

    async fn save_singleton<T: serde::Serialize>(
        &self,
        table: &'static str,
        value: &T,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_string(value).map_err(|e| StorageError::Invalid(e.to_string()))?;
        let sql = format!(
            "INSERT INTO {table} (id, body, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at"
        );
        sqlx::query(&sql)
            .bind(body)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_singleton<T: serde::de::DeserializeOwned>(
        &self,
        table: &'static str,
    ) -> Result<Option<T>, StorageError> {
        let sql = format!("SELECT body FROM {table} WHERE id = 1");
        let row: Option<(String,)> = sqlx::query_as(&sql).fetch_optional(&self.pool).await?;
        row.map(|(body,)| {
            serde_json::from_str(&body)
                .map_err(|e| StorageError::Invalid(format!("{table}: {e}")))
        })
        .transpose()
    }
}

fn module_from_row(row: ModuleRow) -> Result<ModuleDescriptor, StorageError> {
    let (id, name, trigger, kind, enabled, settings) = row;
    let settings = serde_json::from_str(&settings)
        .map_err(|e| StorageError::Invalid(format!("module {id} settings: {e}")))?;
    Ok(ModuleDescriptor {
        id,
        name,
        trigger,
        kind,
        enabled,
        settings,
    })
}

fn moderation_from_row(row: ModerationRow) -> Result<ModerationConfig, StorageError> {
    let (channel, enabled, threshold, timeframe, caps) = row;
    let invalid = |field: &str, value: i64| {
        StorageError::Invalid(format!("{channel}: {field} = {value}"))
    };
    Ok(ModerationConfig {
        flood_threshold: u32::try_from(threshold).map_err(|_| invalid("flood_threshold", threshold))?,
        flood_timeframe_secs: u64::try_from(timeframe)
            .map_err(|_| invalid("flood_timeframe_secs", timeframe))?,
        caps_percentage: u8::try_from(caps)
            .ok()
            .filter(|pct| *pct <= 100)
            .ok_or_else(|| invalid("caps_percentage", caps))?,
        enabled,
        channel,
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn enabled_modules(&self) -> Result<Vec<ModuleDescriptor>, StorageError> {
        let rows: Vec<ModuleRow> = sqlx::query_as(
            "SELECT id, name, trigger, kind, enabled, settings FROM modules WHERE enabled = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(module_from_row).collect()
    }

    async fn module(&self, id: i64) -> Result<Option<ModuleDescriptor>, StorageError> {
        let row: Option<ModuleRow> = sqlx::query_as(
            "SELECT id, name, trigger, kind, enabled, settings FROM modules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(module_from_row).transpose()
    }

    async fn moderation_configs(&self) -> Result<Vec<ModerationConfig>, StorageError> {
        let rows: Vec<ModerationRow> = sqlx::query_as(
            "SELECT channel, enabled, flood_threshold, flood_timeframe_secs, caps_percentage \
             FROM channel_moderation ORDER BY channel",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(moderation_from_row).collect()
    }

    async fn connection_settings(&self) -> Result<IrcConfig, StorageError> {
        self.load_singleton("connection_settings")
            .await?
            .ok_or(StorageError::NotFound("connection_settings"))
    }

    async fn ai_settings(&self) -> Result<AiConfig, StorageError> {
        Ok(self.load_singleton("ai_settings").await?.unwrap_or_default())
    }
}
