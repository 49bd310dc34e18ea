use rusqlite::Connection;

use crate::models::SHARED_OWNER_ID;

const SCHEMA: &str = include_str!("schema.sql");

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Owner row for single-tenant deployments. The hash is not a valid PHC string,
    // so this account can never log in.
    conn.execute(
        "INSERT OR IGNORE INTO users (id, email, password_hash) VALUES (?1, ?2, '!')",
        rusqlite::params![SHARED_OWNER_ID, format!("{SHARED_OWNER_ID}@localhost")],
    )?;

    Ok(())
}
