use crate::db::schema::{MIGRATIONS, MIGRATIONS_TABLE, Migration};
use crate::db::{SqlitePool, encode_ts};
use crate::error::PollsError;
use chrono::Utc;
use std::collections::HashSet;
use tracing::info;

/// Applied/pending state of one migration, as shown by `migrate --list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub version: i64,
    pub name: &'static str,
    pub applied: bool,
}

pub struct Migrator<'a> {
    pool: &'a SqlitePool,
    migrations: &'a [Migration],
}

impl<'a> Migrator<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            migrations: MIGRATIONS,
        }
    }

    /// Run an explicit migration list instead of the built-in one.
    pub fn with_migrations(pool: &'a SqlitePool, migrations: &'a [Migration]) -> Self {
        Self { pool, migrations }
    }

    async fn ensure_table(&self) -> Result<(), PollsError> {
        sqlx::query(MIGRATIONS_TABLE).execute(self.pool).await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<HashSet<i64>, PollsError> {
        self.ensure_table().await?;
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM schema_migrations")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn status(&self) -> Result<Vec<MigrationState>, PollsError> {
        let applied = self.applied_versions().await?;
        Ok(self
            .migrations
            .iter()
            .map(|m| MigrationState {
                version: m.version,
                name: m.name,
                applied: applied.contains(&m.version),
            })
            .collect())
    }

    /// Apply every pending migration in version order, one transaction each.
    /// Returns the names of the migrations that ran.
    pub async fn run(&self) -> Result<Vec<&'static str>, PollsError> {
        let applied = self.applied_versions().await?;
        let mut ran = Vec::new();

        for migration in self.migrations.iter().filter(|m| !applied.contains(&m.version)) {
            info!(version = migration.version, name = migration.name, "applying migration");
            self.apply(migration).await?;
            ran.push(migration.name);
        }

        if ran.is_empty() {
            info!("no migrations to apply");
        }
        Ok(ran)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), PollsError> {
        let wrap = |source| PollsError::Migration {
            version: migration.version,
            name: migration.name,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(wrap)?;
        for stmt in migration.sql.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&mut *tx).await.map_err(wrap)?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(encode_ts(Utc::now()))
            .execute(&mut *tx)
            .await
            .map_err(wrap)?;
        tx.commit().await.map_err(wrap)?;
        Ok(())
    }
}
