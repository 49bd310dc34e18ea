use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Owner id of the household history used when the server runs single-tenant.
pub const SHARED_OWNER_ID: &str = "shared";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserPublic {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Whose reading history a request operates on. Resolved once per request by the
/// auth middleware; every reading query is filtered by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingOwner(pub String);

impl ReadingOwner {
    pub fn for_user(user: &User, multi_tenant: bool) -> Self {
        if multi_tenant {
            Self(user.id.clone())
        } else {
            Self(SHARED_OWNER_ID.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub meter_reading: f64,
    pub daily_generation: f64,
    pub created_at: String,
    pub updated_at: String,
}

pub fn row_to_reading(row: &rusqlite::Row) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        meter_reading: row.get(3)?,
        daily_generation: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub const READING_COLUMNS: &str =
    "id, user_id, date, meter_reading, daily_generation, created_at, updated_at";
