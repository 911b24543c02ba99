use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::User;
use crate::db::StoreError;

/// Persistence of user accounts. `username` uniqueness is enforced here, and
/// a losing insert must come back as `StoreError::DuplicateUsername`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn insert(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;
    async fn update_username(&self, id: i64, username: &str)
        -> Result<Option<User>, StoreError>;
    /// Returns `false` when no such user existed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"SELECT id, username, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(StoreError::from_user_write)
    }

    async fn update_username(
        &self,
        id: i64,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET username = $1
            WHERE id = $2
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(StoreError::from_user_write)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::UserStore;
    use crate::auth::repo_types::User;
    use crate::db::StoreError;

    /// In-process `UserStore` with the same uniqueness rule as the schema.
    #[derive(Default)]
    pub struct MemoryUserStore {
        inner: Mutex<Inner>,
    }

    #[derive(Default)]
    struct Inner {
        next_id: i64,
        users: Vec<User>,
    }

    impl MemoryUserStore {
        pub fn count_named(&self, username: &str) -> usize {
            let inner = self.inner.lock().unwrap();
            inner.users.iter().filter(|u| u.username == username).count()
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.username == username).cloned())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
            let inner = self.inner.lock().unwrap();
            Ok(inner.users.iter().find(|u| u.id == id).cloned())
        }

        async fn insert(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.users.iter().any(|u| u.username == username) {
                return Err(StoreError::DuplicateUsername);
            }
            inner.next_id += 1;
            let user = User {
                id: inner.next_id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at: OffsetDateTime::now_utc(),
            };
            inner.users.push(user.clone());
            Ok(user)
        }

        async fn update_username(
            &self,
            id: i64,
            username: &str,
        ) -> Result<Option<User>, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            if inner
                .users
                .iter()
                .any(|u| u.username == username && u.id != id)
            {
                return Err(StoreError::DuplicateUsername);
            }
            Ok(inner.users.iter_mut().find(|u| u.id == id).map(|u| {
                u.username = username.to_string();
                u.clone()
            }))
        }

        async fn delete(&self, id: i64) -> Result<bool, StoreError> {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.users.len();
            inner.users.retain(|u| u.id != id);
            Ok(inner.users.len() < before)
        }
    }
}
