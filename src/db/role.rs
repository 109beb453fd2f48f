use sqlx::sqlite::SqlitePool;

use crate::permissions::Permission;

/// Roles inserted at startup: (name, permissions, is_default).
const SEED_ROLES: [(&str, Permission, bool); 3] = [
    (
        "User",
        Permission::REVIEW
            .union(Permission::PUBLISH)
            .union(Permission::UPLOAD),
        true,
    ),
    (
        "Moderator",
        Permission::REVIEW
            .union(Permission::PUBLISH)
            .union(Permission::UPLOAD)
            .union(Permission::MODERATE),
        false,
    ),
    ("Administrator", Permission::ALL, false),
];

/// Name of the role granted to the configured administrator email.
pub const ADMINISTRATOR_ROLE: &str = "Administrator";

#[derive(Clone)]
pub struct RoleStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub permissions: Permission,
    pub is_default: bool,
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    permissions: i64,
    is_default: i32,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            permissions: Permission::from_bits(row.permissions as u32),
            is_default: row.is_default != 0,
        }
    }
}

impl RoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the built-in roles, or bring existing rows back in line with them.
    pub async fn seed(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for (name, permissions, is_default) in SEED_ROLES {
            sqlx::query(
                "INSERT INTO roles (name, permissions, is_default) VALUES (?, ?, ?)
                 ON CONFLICT(name) DO UPDATE SET permissions = excluded.permissions, is_default = excluded.is_default",
            )
            .bind(name)
            .bind(permissions.bits() as i64)
            .bind(is_default as i32)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// The role assigned to new registrations.
    pub async fn default_role(&self) -> Result<Option<Role>, sqlx::Error> {
        let row: Option<RoleRow> = sqlx::query_as(
            "SELECT id, name, permissions, is_default FROM roles WHERE is_default = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Role::from))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, sqlx::Error> {
        let row: Option<RoleRow> =
            sqlx::query_as("SELECT id, name, permissions, is_default FROM roles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Role::from))
    }
}
