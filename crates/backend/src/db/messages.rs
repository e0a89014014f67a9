use api_types::{Message, MessageStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgGateway;
use crate::gateway::{GatewayError, MessageStore, NewMessage};

#[async_trait]
impl MessageStore for PgGateway {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, GatewayError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT *
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        Ok(messages)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, GatewayError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(message)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, GatewayError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages
                (conversation_id, sender_type, sender_id, sender_name, content,
                 content_type, attachments, platform, platform_message_id, is_internal_note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.sender_type)
        .bind(message.sender_id)
        .bind(message.sender_name)
        .bind(message.content)
        .bind(message.content_type)
        .bind(message.attachments)
        .bind(message.platform)
        .bind(message.platform_message_id)
        .bind(message.is_internal_note)
        .fetch_one(self.pool())
        .await?;
        Ok(message)
    }

    async fn advance_message_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, GatewayError> {
        // Enum comparison follows declaration order, so `<` only lets status move forward.
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET
                status = $2,
                delivered_at = COALESCE(delivered_at, $3),
                read_at = CASE
                    WHEN $2 = 'read'::message_status THEN COALESCE(read_at, $3)
                    ELSE read_at
                END
            WHERE id = $1 AND status < $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(message)
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
