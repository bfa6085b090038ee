use anyhow::{ensure, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades the store to version `n + 1`.
const SCHEMAS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

fn latest_version() -> i32 {
    SCHEMAS.len() as i32
}

/// Brings the key-value schema up to date inside one transaction, tracking
/// progress in SQLite's `user_version`.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("could not read store schema version")?;
    let latest = latest_version();

    ensure!(
        found <= latest,
        "store was written by a newer build (schema {found}, this build knows {latest})"
    );
    if found == latest {
        return Ok(());
    }

    let tx = conn.transaction().context("could not begin schema upgrade")?;
    for (index, script) in SCHEMAS.iter().enumerate().skip(found.max(0) as usize) {
        tx.execute_batch(script)
            .with_context(|| format!("schema script v{} failed", index + 1))?;
    }
    tx.pragma_update(None, "user_version", latest)
        .context("could not record store schema version")?;
    tx.commit().context("could not commit schema upgrade")?;

    info!("Store schema upgraded from v{found} to v{latest}");
    Ok(())
}
