use api_types::{Business, CreateBusinessRequest, UpdateBusinessRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

use super::PgGateway;
use crate::gateway::{BusinessStore, GatewayError, NewTeamMember};

#[async_trait]
impl BusinessStore for PgGateway {
    async fn list_businesses_for_user(&self, user_id: Uuid) -> Result<Vec<Business>, GatewayError> {
        let businesses = sqlx::query_as::<_, Business>(
            r#"
            SELECT b.*
            FROM businesses b
            JOIN team_members tm ON tm.business_id = b.id
            WHERE tm.user_id = $1
              AND tm.is_active
              AND b.deleted_at IS NULL
            ORDER BY tm.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(businesses)
    }

    async fn find_business(&self, id: Uuid) -> Result<Option<Business>, GatewayError> {
        let business = sqlx::query_as::<_, Business>(
            "SELECT * FROM businesses WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(business)
    }

    async fn create_business(
        &self,
        slug: &str,
        request: CreateBusinessRequest,
        owner: NewTeamMember,
    ) -> Result<Business, GatewayError> {
        let empty = || Value::Object(Map::new());
        let mut tx = self.pool().begin().await?;

        let business = sqlx::query_as::<_, Business>(
            r#"
            INSERT INTO businesses (name, slug, email, phone, website, settings, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(slug)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.website)
        .bind(request.settings.unwrap_or_else(empty))
        .bind(request.metadata.unwrap_or_else(empty))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO team_members (business_id, user_id, role, permissions, is_active, joined_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            "#,
        )
        .bind(business.id)
        .bind(owner.user_id)
        .bind(owner.role)
        .bind(Json(owner.permissions))
        .bind(owner.joined_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(business)
    }

    async fn update_business(
        &self,
        id: Uuid,
        changes: UpdateBusinessRequest,
    ) -> Result<Option<Business>, GatewayError> {
        let update_email = changes.email.is_some();
        let update_phone = changes.phone.is_some();
        let update_website = changes.website.is_some();

        let business = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses
            SET
                name = COALESCE($2, name),
                email = CASE WHEN $3 THEN $4 ELSE email END,
                phone = CASE WHEN $5 THEN $6 ELSE phone END,
                website = CASE WHEN $7 THEN $8 ELSE website END,
                metadata = COALESCE($9, metadata),
                plan_type = COALESCE($10, plan_type),
                subscription_status = COALESCE($11, subscription_status),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(update_email)
        .bind(changes.email.flatten())
        .bind(update_phone)
        .bind(changes.phone.flatten())
        .bind(update_website)
        .bind(changes.website.flatten())
        .bind(changes.metadata)
        .bind(changes.plan_type)
        .bind(changes.subscription_status)
        .fetch_optional(self.pool())
        .await?;
        Ok(business)
    }

    async fn replace_business_settings(
        &self,
        id: Uuid,
        settings: Value,
    ) -> Result<Option<Business>, GatewayError> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses
            SET settings = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(settings)
        .fetch_optional(self.pool())
        .await?;
        Ok(business)
    }

    async fn soft_delete_business(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "UPDATE businesses SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
