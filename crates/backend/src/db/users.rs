use api_types::{PresenceStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PgGateway, duplicate_on_unique};
use crate::gateway::{GatewayError, UserStore};

#[async_trait]
impl UserStore for PgGateway {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, GatewayError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, GatewayError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    async fn create_placeholder_user(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<User, GatewayError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(full_name)
        .fetch_one(self.pool())
        .await
        .map_err(|error| duplicate_on_unique(error, "user"))
    }

    async fn provision_user(&self, id: Uuid, email: &str) -> Result<User, GatewayError> {
        if let Some(user) = self.find_user(id).await? {
            return Ok(user);
        }

        // A placeholder created by an invitation is re-keyed to the
        // authenticated id; memberships follow through ON UPDATE CASCADE.
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET id = EXCLUDED.id
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_one(self.pool())
        .await?;
        Ok(user)
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: PresenceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, GatewayError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET status = $2, last_seen_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }
}
