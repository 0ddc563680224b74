use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{info, instrument};

use crate::auth::Role;
use crate::config::DatabaseConfig;

/// Raw `users` row; the role column is free text in the schema.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    username: String,
    hashed_password: String,
    role: String,
}

/// A user with its role resolved to the closed enum.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i32,
    pub username: String,
    pub hashed_password: String,
    pub role: Role,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| anyhow!("unknown role '{}' for user '{}'", row.role, row.username))?;
        Ok(UserRecord {
            id: row.id,
            username: row.username,
            hashed_password: row.hashed_password,
            role,
        })
    }
}

/// A registered robot and its folder name under the data root.
#[derive(Debug, Clone, FromRow)]
pub struct RobotRecord {
    pub id: i32,
    pub robot_folder: String,
}

/// PostgreSQL-backed registry of users, robots and ownership links.
///
/// Robots and links are created by an external administrative process;
/// this service reads them and only ever mutates `users.hashed_password`.
pub struct DirectoryStore {
    pool: PgPool,
}

impl DirectoryStore {
    /// Create a new store with a connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, hashed_password, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query user by username")?;

        row.map(UserRecord::try_from).transpose()
    }

    #[instrument(skip(self, hashed_password))]
    pub async fn update_password(&self, user_id: i32, hashed_password: &str) -> Result<()> {
        sqlx::query("UPDATE users SET hashed_password = $1 WHERE id = $2")
            .bind(hashed_password)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update password")?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn robot_by_folder(&self, robot_folder: &str) -> Result<Option<RobotRecord>> {
        sqlx::query_as::<_, RobotRecord>(
            "SELECT id, robot_folder FROM robots WHERE robot_folder = $1",
        )
        .bind(robot_folder)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query robot by folder")
    }

    /// All registered robots, in registration order.
    #[instrument(skip(self))]
    pub async fn list_robots(&self) -> Result<Vec<RobotRecord>> {
        sqlx::query_as::<_, RobotRecord>("SELECT id, robot_folder FROM robots ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list robots")
    }

    /// Robots the given user holds an ownership link to.
    #[instrument(skip(self))]
    pub async fn robots_linked_to(&self, user_id: i32) -> Result<Vec<RobotRecord>> {
        sqlx::query_as::<_, RobotRecord>(
            r#"
            SELECT r.id, r.robot_folder
            FROM robots r
            INNER JOIN user_robots ur ON ur.robot_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list linked robots")
    }

    #[instrument(skip(self))]
    pub async fn link_exists(&self, user_id: i32, robot_id: i32) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM user_robots WHERE user_id = $1 AND robot_id = $2)",
        )
        .bind(user_id)
        .bind(robot_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query ownership link")?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_row_resolves_known_role() {
        let row = UserRow {
            id: 7,
            username: "tech".to_string(),
            hashed_password: "$2b$04$hash".to_string(),
            role: "maintenance".to_string(),
        };
        let record = UserRecord::try_from(row).unwrap();
        assert_eq!(record.role, Role::Maintenance);
        assert_eq!(record.username, "tech");
    }

    #[test]
    fn test_user_row_rejects_unknown_role() {
        let row = UserRow {
            id: 7,
            username: "tech".to_string(),
            hashed_password: String::new(),
            role: "operator".to_string(),
        };
        let err = UserRecord::try_from(row).unwrap_err();
        assert!(err.to_string().contains("unknown role"));
    }
}
