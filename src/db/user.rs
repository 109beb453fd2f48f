use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use super::role::Role;
use crate::permissions::Permission;

const USER_SELECT: &str = "SELECT u.id, u.email, u.username, u.password_hash, u.confirmed,
        u.member_since, u.last_seen,
        r.id AS role_id, r.name AS role_name, r.permissions AS role_permissions,
        r.is_default AS role_is_default
    FROM users u JOIN roles r ON r.id = u.role_id";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// An account together with its role.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    /// Argon2 PHC string. Never serialized.
    pub password_hash: String,
    pub confirmed: bool,
    pub role: Role,
    pub member_since: String,
    pub last_seen: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    password_hash: String,
    confirmed: i32,
    member_since: String,
    last_seen: String,
    role_id: i64,
    role_name: String,
    role_permissions: i64,
    role_is_default: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            confirmed: row.confirmed != 0,
            role: Role {
                id: row.role_id,
                name: row.role_name,
                permissions: Permission::from_bits(row.role_permissions as u32),
                is_default: row.role_is_default != 0,
            },
            member_since: row.member_since,
            last_seen: row.last_seen,
        }
    }
}

/// Fields required to register an account.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role_id: i64,
}

/// User view for listings. Does not carry the password verifier.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub confirmed: bool,
    pub member_since: String,
    pub last_seen: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.name.clone(),
            confirmed: user.confirmed,
            member_since: user.member_since.clone(),
            last_seen: user.last_seen.clone(),
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new unconfirmed user. Returns the user ID.
    pub async fn insert(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (email, username, password_hash, role_id, confirmed) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(user.email)
        .bind(user.username)
        .bind(user.password_hash)
        .bind(user.role_id)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("{USER_SELECT} WHERE u.id = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Case-insensitive lookup by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let sql = format!("{USER_SELECT} WHERE u.email = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    pub async fn email_taken(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    pub async fn username_taken(&self, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Flip `confirmed` to true. Returns false when the row was already
    /// confirmed (or does not exist), so at most one caller observes the transition.
    pub async fn mark_confirmed(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET confirmed = 1 WHERE id = ? AND confirmed = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record activity for a user. Returns the new `last_seen`, or None if
    /// the user no longer exists.
    pub async fn ping(&self, id: i64) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE users SET last_seen = datetime('now') WHERE id = ? RETURNING last_seen",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List all users (for the admin dashboard).
    pub async fn list(&self) -> Result<Vec<UserSummary>, sqlx::Error> {
        let sql = format!("{USER_SELECT} ORDER BY u.id");
        let rows: Vec<UserRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(User::from)
            .map(|user| UserSummary::from(&user))
            .collect())
    }
}
