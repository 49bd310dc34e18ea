use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Session, User};

pub const SESSION_DURATION_DAYS: i64 = 30;

pub fn create_session(pool: &DbPool, user_id: &str) -> AppResult<Session> {
    let conn = pool.get()?;
    let id = Uuid::new_v4().to_string();
    let token = generate_token();
    let now = Utc::now();
    let expires_at = (now + Duration::days(SESSION_DURATION_DAYS))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    let created_at = now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, user_id, token, expires_at, created_at],
    )?;

    tracing::debug!(user_id, "session created");

    Ok(Session {
        id,
        user_id: user_id.to_string(),
        token,
        expires_at,
        created_at,
    })
}

pub fn validate_session(pool: &DbPool, token: &str) -> AppResult<(Session, User)> {
    let conn = pool.get()?;
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    let mut stmt = conn.prepare(
        "SELECT s.id, s.user_id, s.token, s.expires_at, s.created_at,
                u.id, u.email, u.password_hash, u.created_at
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > ?2",
    )?;

    let result = stmt.query_row(rusqlite::params![token, now], |row| {
        let session = Session {
            id: row.get(0)?,
            user_id: row.get(1)?,
            token: row.get(2)?,
            expires_at: row.get(3)?,
            created_at: row.get(4)?,
        };
        let user = User {
            id: row.get(5)?,
            email: row.get(6)?,
            password_hash: row.get(7)?,
            created_at: row.get(8)?,
        };
        Ok((session, user))
    });

    match result {
        Ok(pair) => Ok(pair),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(AppError::Unauthorized),
        Err(e) => Err(AppError::Database(e)),
    }
}

pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", rusqlite::params![token])?;
    Ok(())
}

/// Drops sessions past their expiry. Returns how many were removed.
pub fn purge_expired(pool: &DbPool) -> AppResult<usize> {
    let conn = pool.get()?;
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let removed = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        rusqlite::params![now],
    )?;
    Ok(removed)
}

/// Background loop that periodically removes expired sessions.
pub async fn run_session_sweeper(pool: DbPool) {
    tracing::info!("Session sweeper background task started");

    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(60 * 60)).await;

        match purge_expired(&pool) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Session sweeper: purged expired sessions"),
            Err(e) => tracing::error!("Session sweeper: {e}"),
        }
    }
}

fn generate_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    use rand::RngCore;
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
