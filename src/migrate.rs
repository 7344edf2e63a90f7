use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per logical server name; the sync pipeline overwrites rows in
    // place and never deletes them.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS servers (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '',
            repository TEXT NOT NULL DEFAULT '{}',
            packages TEXT NOT NULL DEFAULT '[]',
            remotes TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'unknown',
            is_latest INTEGER NOT NULL DEFAULT 1,
            embedding BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual table over name + description.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='servers_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE servers_fts USING fts5(
                name,
                description
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_servers_status ON servers(status)")
        .execute(pool)
        .await?;

    Ok(())
}
