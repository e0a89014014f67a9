use api_types::{NewNotification, Notification};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgGateway;
use crate::gateway::{GatewayError, NotificationStore};

#[async_trait]
impl NotificationStore for PgGateway {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, GatewayError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications
                (business_id, user_id, notification_type, title, message, action_url, action_label)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(notification.business_id)
        .bind(notification.user_id)
        .bind(notification.notification_type)
        .bind(notification.title)
        .bind(notification.message)
        .bind(notification.action_url)
        .bind(notification.action_label)
        .fetch_one(self.pool())
        .await?;
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, GatewayError> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT *
            FROM notifications
            WHERE business_id = $1 AND user_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, GatewayError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(notification)
    }
}
