mod role;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use role::{ADMINISTRATOR_ROLE, Role, RoleStore};
pub use user::{NewUser, User, UserStore, UserSummary};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path, migrate it and seed the roles.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // An in-memory database lives only as long as its connection, and
        // shared-cache writers fail with "locked" instead of waiting.
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(&url).await?;

        let db = Self { pool };
        db.migrate().await?;
        db.roles().seed().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE roles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL,
                    permissions INTEGER NOT NULL DEFAULT 0,
                    is_default INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE INDEX idx_roles_is_default ON roles(is_default)",
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    confirmed INTEGER NOT NULL DEFAULT 0,
                    role_id INTEGER NOT NULL REFERENCES roles(id),
                    member_since TEXT NOT NULL DEFAULT (datetime('now')),
                    last_seen TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_email ON users(email)",
                "CREATE INDEX idx_users_username ON users(username)",
                "CREATE INDEX idx_users_role_id ON users(role_id)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the role store.
    pub fn roles(&self) -> RoleStore {
        RoleStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permission;

    async fn insert(db: &Database, email: &str, username: &str) -> i64 {
        let role = db.roles().default_role().await.unwrap().unwrap();
        db.users()
            .insert(&NewUser {
                email,
                username,
                password_hash: "not-a-real-hash",
                role_id: role.id,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = insert(&db, "alice@example.com", "alice").await;

        let user = db
            .users()
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");
        assert!(!user.confirmed);
        assert_eq!(user.role.name, "User");

        let user = db.users().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert!(db.users().username_taken("ALICE").await.unwrap());
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let db = Database::open(":memory:").await.unwrap();
        let id = insert(&db, "Alice@Example.com", "alice").await;

        let user = db
            .users()
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert!(db.users().email_taken("ALICE@EXAMPLE.COM").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();
        let role = db.roles().default_role().await.unwrap().unwrap();

        insert(&db, "alice@example.com", "alice").await;
        let result = db
            .users()
            .insert(&NewUser {
                email: "alice@example.com",
                username: "alice2",
                password_hash: "x",
                role_id: role.id,
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_confirmed_only_once() {
        let db = Database::open(":memory:").await.unwrap();
        let id = insert(&db, "alice@example.com", "alice").await;

        assert!(db.users().mark_confirmed(id).await.unwrap());
        assert!(!db.users().mark_confirmed(id).await.unwrap());
        assert!(db.users().find_by_id(id).await.unwrap().unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_ping_updates_last_seen() {
        let db = Database::open(":memory:").await.unwrap();
        let id = insert(&db, "alice@example.com", "alice").await;

        sqlx::query("UPDATE users SET last_seen = '2000-01-01 00:00:00' WHERE id = ?")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        let last_seen = db.users().ping(id).await.unwrap().unwrap();
        assert_ne!(last_seen, "2000-01-01 00:00:00");

        let user = db.users().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.last_seen, last_seen);
        assert!(!user.confirmed);
    }

    #[tokio::test]
    async fn test_ping_missing_user() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.users().ping(4242).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seeded_roles() {
        let db = Database::open(":memory:").await.unwrap();

        let counts: (i64, i64) = sqlx::query_as("SELECT COUNT(*), SUM(is_default) FROM roles")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(counts, (3, 1));

        let admin = db.roles().find_by_name("Administrator").await.unwrap().unwrap();
        assert_eq!(admin.permissions, Permission::ALL);

        let moderator = db.roles().find_by_name("Moderator").await.unwrap().unwrap();
        assert!(moderator.permissions.contains(Permission::MODERATE));
        assert!(!moderator.permissions.contains(Permission::ADMIN));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();

        db.roles().seed().await.unwrap();
        db.roles().seed().await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roles")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 3);
        let default = db.roles().default_role().await.unwrap().unwrap();
        assert_eq!(default.name, "User");
    }

    #[tokio::test]
    async fn test_list_users() {
        let db = Database::open(":memory:").await.unwrap();
        insert(&db, "alice@example.com", "alice").await;
        insert(&db, "bob@example.com", "bob").await;

        let users = db.users().list().await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[1].role, "User");
    }
}
