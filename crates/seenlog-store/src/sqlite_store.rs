//! SQLite-backed seen store

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use seenlog_schema::SeenRecord;
use tokio::task;

use crate::{merge_payload, SeenStore, StoreError};

#[derive(Clone)]
pub struct SqliteSeenStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSeenStore {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("failed to lock sqlite connection".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("sqlite task failed: {e}")))?
    }
}

#[async_trait]
impl SeenStore for SqliteSeenStore {
    async fn list_seen(&self, user_id: &str) -> Result<HashSet<String>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT episode_id FROM seen_records WHERE user_id = ?1")?;
            let rows = stmt.query_map([&user_id], |row| row.get::<_, String>(0))?;

            let mut ids = HashSet::new();
            for row in rows {
                ids.insert(row?);
            }
            Ok(ids)
        })
        .await
    }

    async fn get(
        &self,
        user_id: &str,
        episode_id: &str,
    ) -> Result<Option<SeenRecord>, StoreError> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    r#"SELECT payload, updated_at FROM seen_records
                       WHERE user_id = ?1 AND episode_id = ?2"#,
                    params![user_id, episode_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let Some((payload, updated_at)) = row else {
                return Ok(None);
            };
            let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|e| StoreError::Backend(format!("bad updated_at: {e}")))?
                .with_timezone(&Utc);
            Ok(Some(SeenRecord {
                user_id,
                episode_id,
                payload: serde_json::from_str(&payload)?,
                updated_at,
            }))
        })
        .await
    }

    async fn upsert(
        &self,
        user_id: &str,
        episode_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT payload FROM seen_records WHERE user_id = ?1 AND episode_id = ?2",
                    params![user_id, episode_id],
                    |row| row.get(0),
                )
                .optional()?;

            let merged = match existing {
                Some(raw) => merge_payload(serde_json::from_str(&raw)?, payload),
                None => payload,
            };

            tx.execute(
                r#"INSERT INTO seen_records (user_id, episode_id, payload, updated_at)
                   VALUES (?1, ?2, ?3, ?4)
                   ON CONFLICT(user_id, episode_id)
                   DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at"#,
                params![
                    user_id,
                    episode_id,
                    serde_json::to_string(&merged)?,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, user_id: &str, episode_id: &str) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let episode_id = episode_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM seen_records WHERE user_id = ?1 AND episode_id = ?2",
                params![user_id, episode_id],
            )?;
            Ok(())
        })
        .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Migrations
// ─────────────────────────────────────────────────────────────────────────────

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS __seenlog_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"#,
    )?;

    let applied: HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM __seenlog_schema_version")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let migrations: Vec<(i64, &str)> = vec![(
        1,
        r#"
        CREATE TABLE IF NOT EXISTS seen_records (
            user_id TEXT NOT NULL,
            episode_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, episode_id)
        );
        "#,
    )];

    for (version, sql) in migrations {
        if applied.contains(&version) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __seenlog_schema_version(version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}
