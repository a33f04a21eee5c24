//! Staff users mirrored from the cloud.
//!
//! The pull engine owns these rows; the only local mutation is the admin
//! PIN update, which the cloud is told about through the outbox like any
//! other local write.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::User;

use crate::error::DbResult;

const SELECT_COLUMNS: &str =
    "id, tenant_id, name, role, pin_hash, permissions, max_discount, is_active, updated_at";

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Active users that can log in with a PIN (non-null hash).
    ///
    /// PIN verification iterates this set; the MRU cache in the auth layer
    /// keeps the common case short.
    pub async fn list_pin_candidates(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM users \
             WHERE is_active = 1 AND pin_hash IS NOT NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Stores a new PIN hash. Part of the admin PIN-update transaction.
    pub async fn set_pin_hash(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        pin_hash: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query("UPDATE users SET pin_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(pin_hash)
            .bind(Utc::now())
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Test seeding helper: inserts a user row directly.
    pub async fn insert(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, tenant_id, name, role, pin_hash, permissions,
                               max_discount, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&user.id)
        .bind(&user.tenant_id)
        .bind(&user.name)
        .bind(&user.role)
        .bind(&user.pin_hash)
        .bind(&user.permissions)
        .bind(user.max_discount)
        .bind(user.is_active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
