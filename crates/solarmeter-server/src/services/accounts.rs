use uuid::Uuid;

use crate::auth::password;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{User, SHARED_OWNER_ID};

const MIN_PASSWORD_LEN: usize = 8;

/// Create an account. The id is a random v4 UUID so ids can't be guessed or enumerated.
pub fn register(pool: &DbPool, email: &str, plain_password: &str) -> AppResult<User> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if plain_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = password::hash_password(plain_password)?;
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();

    let conn = pool.get()?;
    let result = conn.execute(
        "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, email, password_hash, now],
    );

    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(AppError::DuplicateUser);
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    tracing::info!(user_id = %id, "user registered");

    Ok(User {
        id,
        email: email.to_string(),
        password_hash,
        created_at: now,
    })
}

/// Check credentials. Unknown email and wrong password are indistinguishable to the caller.
pub fn authenticate(pool: &DbPool, email: &str, plain_password: &str) -> AppResult<User> {
    let conn = pool.get()?;

    let user_result = conn.query_row(
        "SELECT id, email, password_hash, created_at FROM users WHERE email = ?1 AND id != ?2",
        rusqlite::params![email.trim(), SHARED_OWNER_ID],
        |row| {
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    );

    let user = match user_result {
        Ok(u) => u,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            tracing::debug!("login for unknown email");
            return Err(AppError::InvalidCredentials);
        }
        Err(e) => return Err(AppError::Database(e)),
    };

    if !password::verify_password(plain_password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    Ok(user)
}
