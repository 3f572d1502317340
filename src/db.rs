use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

use crate::error::AppResult;

pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
) -> AppResult<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url);
    opts.max_connections(max_connections.max(1)).sqlx_logging(false);
    let db = Database::connect(opts).await?;

    // sqlx already turns on `foreign_keys` for every pooled sqlite connection.
    for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
        db.execute(Statement::from_string(db.get_database_backend(), pragma.to_string())).await?;
    }

    Migrator::up(&db, None).await?;
    tracing::debug!("migrations applied");
    Ok(db)
}

/// Fresh in-memory database with the full schema. A single pooled
/// connection keeps every query on the same in-memory file.
#[cfg(test)]
pub async fn test_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// Migrated database in a temporary file, opened through the same pool setup
/// as the server. Keep the returned `TempDir` alive for the test's duration.
#[cfg(test)]
pub async fn file_db() -> (tempfile::TempDir, DatabaseConnection) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("boxoffice.db").display());
    let db = connect_and_migrate(&url, 5).await.unwrap();
    (dir, db)
}
