use api_types::{
    CreateCustomerRequest, Customer, CustomerFilters, Platform, UpdateCustomerRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use uuid::Uuid;

use super::PgGateway;
use crate::gateway::{CustomerStore, GatewayError};

/// `%term%` with LIKE metacharacters escaped.
fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl CustomerStore for PgGateway {
    async fn list_customers(
        &self,
        business_id: Uuid,
        filters: &CustomerFilters,
    ) -> Result<Vec<Customer>, GatewayError> {
        let pattern = filters.search.as_deref().map(contains_pattern);

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT *
            FROM customers
            WHERE business_id = $1
              AND deleted_at IS NULL
              AND (
                  $2::text IS NULL
                  OR name ILIKE $2
                  OR email ILIKE $2
                  OR phone ILIKE $2
              )
              AND ($3::text[] IS NULL OR tags @> $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id)
        .bind(pattern)
        .bind(filters.tags.as_deref())
        .fetch_all(self.pool())
        .await?;
        Ok(customers)
    }

    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, GatewayError> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(customer)
    }

    async fn find_customer_by_platform(
        &self,
        business_id: Uuid,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Customer>, GatewayError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT *
            FROM customers
            WHERE business_id = $1
              AND deleted_at IS NULL
              AND platform_identifiers ->> $2 = $3
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(business_id)
        .bind(platform.as_ref())
        .bind(platform_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(customer)
    }

    async fn insert_customer(
        &self,
        business_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers
                (business_id, name, email, phone, avatar_url,
                 platform_identifiers, metadata, tags, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(business_id)
        .bind(request.name)
        .bind(request.email)
        .bind(request.phone)
        .bind(request.avatar_url)
        .bind(Json(request.platform_identifiers.unwrap_or_default()))
        .bind(
            request
                .metadata
                .unwrap_or_else(|| Value::Object(Map::new())),
        )
        .bind(request.tags.unwrap_or_default())
        .bind(request.notes)
        .fetch_one(self.pool())
        .await?;
        Ok(customer)
    }

    async fn update_customer(
        &self,
        id: Uuid,
        changes: UpdateCustomerRequest,
    ) -> Result<Option<Customer>, GatewayError> {
        let update_name = changes.name.is_some();
        let update_email = changes.email.is_some();
        let update_phone = changes.phone.is_some();
        let update_avatar = changes.avatar_url.is_some();
        let update_notes = changes.notes.is_some();
        let update_sentiment = changes.sentiment_score.is_some();
        let update_rating = changes.satisfaction_rating.is_some();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET
                name = CASE WHEN $2 THEN $3 ELSE name END,
                email = CASE WHEN $4 THEN $5 ELSE email END,
                phone = CASE WHEN $6 THEN $7 ELSE phone END,
                avatar_url = CASE WHEN $8 THEN $9 ELSE avatar_url END,
                platform_identifiers = COALESCE($10, platform_identifiers),
                metadata = COALESCE($11, metadata),
                tags = COALESCE($12, tags),
                notes = CASE WHEN $13 THEN $14 ELSE notes END,
                sentiment_score = CASE WHEN $15 THEN $16 ELSE sentiment_score END,
                satisfaction_rating = CASE WHEN $17 THEN $18 ELSE satisfaction_rating END,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update_name)
        .bind(changes.name.flatten())
        .bind(update_email)
        .bind(changes.email.flatten())
        .bind(update_phone)
        .bind(changes.phone.flatten())
        .bind(update_avatar)
        .bind(changes.avatar_url.flatten())
        .bind(changes.platform_identifiers.map(Json))
        .bind(changes.metadata)
        .bind(changes.tags)
        .bind(update_notes)
        .bind(changes.notes.flatten())
        .bind(update_sentiment)
        .bind(changes.sentiment_score.flatten())
        .bind(update_rating)
        .bind(changes.satisfaction_rating.flatten())
        .fetch_optional(self.pool())
        .await?;
        Ok(customer)
    }

    async fn soft_delete_customer(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError> {
        let result = sqlx::query(
            "UPDATE customers SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn search_term_escapes_like_wildcards() {
        assert_eq!(contains_pattern("ada"), "%ada%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }
}
