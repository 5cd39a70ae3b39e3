//! SQLite database for file metadata.

use std::path::Path;

use chrono::{DateTime, Utc};
use common::state::FileMetadata;
use common::sync_path;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};

use crate::error::Result;

fn from_row(row: &SqliteRow) -> FileMetadata {
    let millis: i64 = row.get("last_modified");
    FileMetadata {
        path: row.get("path"),
        hash: row.get("hash"),
        size: row.get::<i64, _>("size").max(0) as u64,
        last_modified: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
    }
}

/// SQLite connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        // a second connection would open a second, empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Insert or replace the metadata of a file.
    pub async fn upsert_file(&self, meta: &FileMetadata) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO files (path, datasite, hash, size, last_modified, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                hash = excluded.hash,
                size = excluded.size,
                last_modified = excluded.last_modified,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&meta.path)
        .bind(sync_path::datasite_of(&meta.path))
        .bind(&meta.hash)
        .bind(meta.size as i64)
        .bind(meta.last_modified.timestamp_millis())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_file(&self, path: &str) -> Result<Option<FileMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT path, hash, size, last_modified
            FROM files
            WHERE path = ?
            "#,
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(from_row))
    }

    /// Delete the metadata of a file, returning whether it existed.
    pub async fn delete_file(&self, path: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM files WHERE path = ?
            "#,
        )
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every file at or below `dir`, in path order.
    pub async fn list_files(&self, dir: &str) -> Result<Vec<FileMetadata>> {
        let rows = if dir.is_empty() {
            sqlx::query(
                r#"
                SELECT path, hash, size, last_modified
                FROM files
                ORDER BY path
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            let prefix = format!("{}/", dir);
            sqlx::query(
                r#"
                SELECT path, hash, size, last_modified
                FROM files
                WHERE path = ? OR substr(path, 1, ?) = ?
                ORDER BY path
                "#,
            )
            .bind(dir)
            .bind(prefix.chars().count() as i64)
            .bind(&prefix)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.iter().map(from_row).collect())
    }

    pub async fn list_datasites(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT datasite FROM files ORDER BY datasite
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("datasite")).collect())
    }

    /// Whether any file still points at `hash`.
    pub async fn hash_in_use(&self, hash: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM files WHERE hash = ? LIMIT 1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
impl Database {
    pub async fn count_files(&self) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, contents: &str) -> FileMetadata {
        FileMetadata::from_bytes(path, contents.as_bytes())
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.unwrap();

        let file = meta("a@x.org/notes.txt", "hello");
        db.upsert_file(&file).await.unwrap();

        let stored = db.get_file("a@x.org/notes.txt").await.unwrap().unwrap();
        assert_eq!(stored.hash, file.hash);
        assert_eq!(stored.size, 5);
        assert_eq!(
            stored.last_modified.timestamp_millis(),
            file.last_modified.timestamp_millis()
        );
        assert!(db.hash_in_use(&file.hash).await.unwrap());

        assert!(db.delete_file("a@x.org/notes.txt").await.unwrap());
        assert!(!db.delete_file("a@x.org/notes.txt").await.unwrap());
        assert!(db.get_file("a@x.org/notes.txt").await.unwrap().is_none());
        assert!(!db.hash_in_use(&file.hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_file(&meta("a@x.org/f", "v1")).await.unwrap();
        db.upsert_file(&meta("a@x.org/f", "version 2")).await.unwrap();

        let stored = db.get_file("a@x.org/f").await.unwrap().unwrap();
        assert_eq!(stored.size, 9);
        assert_eq!(db.count_files().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_prefix_exact() {
        let db = Database::in_memory().await.unwrap();
        for path in [
            "a@x.org/app/x",
            "a@x.org/app/sub/y",
            "a@x.org/apple",
            "a_x.org/app/z",
            "b@x.org/f",
        ] {
            db.upsert_file(&meta(path, path)).await.unwrap();
        }

        let paths: Vec<_> = db
            .list_files("a@x.org/app")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(paths, vec!["a@x.org/app/sub/y", "a@x.org/app/x"]);

        assert_eq!(db.list_files("").await.unwrap().len(), 5);
        assert_eq!(
            db.list_datasites().await.unwrap(),
            vec!["a@x.org", "a_x.org", "b@x.org"]
        );
    }
}
