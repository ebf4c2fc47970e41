//! Local registry of Docker environments.
//!
//! The registry is a SQLite database under the eposctl home directory. It
//! records every environment deployed on the Docker substrate together with
//! its derived URLs and published ports, and tracks which TTL files have
//! been ingested into each environment. Kubernetes environments are not
//! recorded here; the Helm release store is authoritative for those.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tokio::fs;

use crate::{error::EposctlError, EposctlResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Migrator for the environment registry database.
pub static REGISTRY_MIGRATOR: Migrator = sqlx::migrate!("lib/store/migrations");

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A registry row describing one Docker environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRecord {
    /// The name of the environment.
    pub name: String,

    /// Directory holding the environment's rendered artifacts.
    pub directory: Option<String>,

    /// URL of the platform GUI.
    pub gui_url: String,

    /// URL of the public API.
    pub api_url: String,

    /// URL of the backoffice UI, when the backoffice is enabled.
    pub backoffice_url: Option<String>,

    /// Published port of the platform GUI.
    pub gui_port: u16,

    /// Published port of the API gateway.
    pub api_port: u16,

    /// Published port of the backoffice UI, when the backoffice is enabled.
    pub backoffice_port: Option<u16>,

    /// When the environment was first deployed.
    pub created_at: DateTime<Utc>,

    /// When the environment was last deployed or updated.
    pub modified_at: DateTime<Utc>,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Opens the registry database at the given path, creating the file and
/// running migrations as needed.
pub async fn init_registry(db_path: impl AsRef<Path>) -> EposctlResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Create an empty database file if it doesn't exist
    if !db_path.exists() {
        fs::File::create(&db_path).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await?;

    REGISTRY_MIGRATOR.run(&pool).await?;

    Ok(pool)
}

/// Inserts an environment record, or refreshes everything but `created_at`
/// when a record of the same name already exists.
pub async fn upsert_environment(
    pool: &Pool<Sqlite>,
    record: &EnvironmentRecord,
) -> EposctlResult<()> {
    sqlx::query(
        r#"
        INSERT INTO environments (
            name, directory, gui_url, api_url, backoffice_url,
            gui_port, api_port, backoffice_port, created_at, modified_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            directory = excluded.directory,
            gui_url = excluded.gui_url,
            api_url = excluded.api_url,
            backoffice_url = excluded.backoffice_url,
            gui_port = excluded.gui_port,
            api_port = excluded.api_port,
            backoffice_port = excluded.backoffice_port,
            modified_at = excluded.modified_at
        "#,
    )
    .bind(&record.name)
    .bind(&record.directory)
    .bind(&record.gui_url)
    .bind(&record.api_url)
    .bind(&record.backoffice_url)
    .bind(record.gui_port as i64)
    .bind(record.api_port as i64)
    .bind(record.backoffice_port.map(|port| port as i64))
    .bind(record.created_at.to_rfc3339())
    .bind(record.modified_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches one environment record by name.
pub async fn get_environment(
    pool: &Pool<Sqlite>,
    name: &str,
) -> EposctlResult<Option<EnvironmentRecord>> {
    let row = sqlx::query(
        r#"
        SELECT name, directory, gui_url, api_url, backoffice_url,
               gui_port, api_port, backoffice_port, created_at, modified_at
        FROM environments
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(|row| record_from_row(&row)).transpose()
}

/// Lists all environment records, ordered by name.
pub async fn list_environments(pool: &Pool<Sqlite>) -> EposctlResult<Vec<EnvironmentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT name, directory, gui_url, api_url, backoffice_url,
               gui_port, api_port, backoffice_port, created_at, modified_at
        FROM environments
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Removes an environment record. Absence is not an error.
pub async fn delete_environment(pool: &Pool<Sqlite>, name: &str) -> EposctlResult<()> {
    sqlx::query("DELETE FROM environments WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Records a TTL file as ingested into an environment. Re-ingesting the
/// same path refreshes its timestamp.
pub async fn record_ingested_file(
    pool: &Pool<Sqlite>,
    environment: &str,
    path: &Path,
) -> EposctlResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ingested_files (environment, path, ingested_at)
        VALUES (?, ?, ?)
        ON CONFLICT(environment, path) DO UPDATE SET
            ingested_at = excluded.ingested_at
        "#,
    )
    .bind(environment)
    .bind(path.display().to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Lists the TTL paths recorded as ingested into an environment, in
/// ingestion order.
pub async fn list_ingested_files(
    pool: &Pool<Sqlite>,
    environment: &str,
) -> EposctlResult<Vec<PathBuf>> {
    let rows = sqlx::query(
        r#"
        SELECT path FROM ingested_files
        WHERE environment = ?
        ORDER BY id
        "#,
    )
    .bind(environment)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PathBuf::from(row.get::<String, _>("path")))
        .collect())
}

/// Forgets all ingested-file records of an environment.
pub async fn clear_ingested_files(pool: &Pool<Sqlite>, environment: &str) -> EposctlResult<()> {
    sqlx::query("DELETE FROM ingested_files WHERE environment = ?")
        .bind(environment)
        .execute(pool)
        .await?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> EposctlResult<EnvironmentRecord> {
    Ok(EnvironmentRecord {
        name: row.get::<String, _>("name"),
        directory: row.get::<Option<String>, _>("directory"),
        gui_url: row.get::<String, _>("gui_url"),
        api_url: row.get::<String, _>("api_url"),
        backoffice_url: row.get::<Option<String>, _>("backoffice_url"),
        gui_port: row.get::<i64, _>("gui_port") as u16,
        api_port: row.get::<i64, _>("api_port") as u16,
        backoffice_port: row
            .get::<Option<i64>, _>("backoffice_port")
            .map(|port| port as u16),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        modified_at: parse_timestamp(&row.get::<String, _>("modified_at"))?,
    })
}

/// Parses a timestamp column, accepting both the RFC 3339 form this module
/// writes and the `CURRENT_TIMESTAMP` form SQLite writes as a default.
fn parse_timestamp(raw: &str) -> EposctlResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let parsed =
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(EposctlError::custom)?;
    Ok(parsed.and_utc())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(name: &str) -> EnvironmentRecord {
        EnvironmentRecord {
            name: name.to_string(),
            directory: Some(format!("/tmp/{}", name)),
            gui_url: "http://localhost:32000".to_string(),
            api_url: "http://localhost:33000/api/v1".to_string(),
            backoffice_url: Some("http://localhost:34000/backoffice".to_string()),
            gui_port: 32000,
            api_port: 33000,
            backoffice_port: Some(34000),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_init_registry_creates_tables() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        let tables = sqlx::query("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(&pool)
            .await?;

        let table_names: Vec<String> = tables
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        assert!(table_names.contains(&"environments".to_string()));
        assert!(table_names.contains(&"ingested_files".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn test_environment_upsert_and_get_round_trip() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        let record = sample_record("e1");
        upsert_environment(&pool, &record).await?;

        let fetched = get_environment(&pool, "e1").await?.unwrap();
        assert_eq!(fetched.name, "e1");
        assert_eq!(fetched.api_url, record.api_url);
        assert_eq!(fetched.backoffice_port, Some(34000));

        assert!(get_environment(&pool, "missing").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_refreshes_everything_but_created_at() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        let original = sample_record("e1");
        upsert_environment(&pool, &original).await?;

        let mut updated = sample_record("e1");
        updated.api_port = 40123;
        updated.api_url = "http://localhost:40123/api/v1".to_string();
        upsert_environment(&pool, &updated).await?;

        let fetched = get_environment(&pool, "e1").await?.unwrap();
        assert_eq!(fetched.api_port, 40123);
        assert_eq!(fetched.created_at, original.created_at);

        let all = list_environments(&pool).await?;
        assert_eq!(all.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_environment_is_idempotent() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        upsert_environment(&pool, &sample_record("e1")).await?;
        delete_environment(&pool, "e1").await?;
        delete_environment(&pool, "e1").await?;

        assert!(get_environment(&pool, "e1").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_list_environments_is_ordered_by_name() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        upsert_environment(&pool, &sample_record("zeta")).await?;
        upsert_environment(&pool, &sample_record("alpha")).await?;

        let names: Vec<String> = list_environments(&pool)
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn test_ingested_files_record_list_clear() -> EposctlResult<()> {
        let temp_dir = tempdir()?;
        let pool = init_registry(temp_dir.path().join("registry.db")).await?;

        let first = Path::new("/data/a.ttl");
        let second = Path::new("/data/b.ttl");

        record_ingested_file(&pool, "e1", first).await?;
        record_ingested_file(&pool, "e1", second).await?;
        // Re-ingesting the same path must not produce a second row.
        record_ingested_file(&pool, "e1", first).await?;
        record_ingested_file(&pool, "other", first).await?;

        let files = list_ingested_files(&pool, "e1").await?;
        assert_eq!(files, vec![PathBuf::from(first), PathBuf::from(second)]);

        clear_ingested_files(&pool, "e1").await?;
        assert!(list_ingested_files(&pool, "e1").await?.is_empty());
        assert_eq!(list_ingested_files(&pool, "other").await?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_parse_timestamp_accepts_sqlite_default_form() -> EposctlResult<()> {
        let parsed = parse_timestamp("2025-06-10 12:00:00")?;
        assert_eq!(parsed.to_rfc3339(), "2025-06-10T12:00:00+00:00");

        assert!(parse_timestamp("not a timestamp").is_err());

        Ok(())
    }
}
