use std::collections::HashMap;

use api_types::{
    AssignedMember, Conversation, ConversationFilters, ConversationWithRelations, Customer,
    TeamMemberWithUser,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    PgGateway,
    team_members::{MEMBER_WITH_USER_SELECT, MemberWithUserRow},
};
use crate::gateway::{ConversationChanges, ConversationStore, GatewayError, NewConversation};

impl PgGateway {
    /// Attaches customers and assignees with one batched query each.
    async fn attach_relations(
        &self,
        conversations: Vec<Conversation>,
    ) -> Result<Vec<ConversationWithRelations>, GatewayError> {
        let customer_ids: Vec<Uuid> = conversations.iter().map(|c| c.customer_id).collect();
        let member_ids: Vec<Uuid> = conversations.iter().filter_map(|c| c.assigned_to).collect();

        let customers: HashMap<Uuid, Customer> = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE id = ANY($1)",
        )
        .bind(&customer_ids)
        .fetch_all(self.pool())
        .await?
        .into_iter()
        .map(|customer| (customer.id, customer))
        .collect();

        let members: HashMap<Uuid, AssignedMember> = if member_ids.is_empty() {
            HashMap::new()
        } else {
            let query = format!("{MEMBER_WITH_USER_SELECT} WHERE tm.id = ANY($1)");
            sqlx::query_as::<_, MemberWithUserRow>(&query)
                .bind(&member_ids)
                .fetch_all(self.pool())
                .await?
                .into_iter()
                .map(|row| {
                    let TeamMemberWithUser { member, user } = row.into();
                    (
                        member.id,
                        AssignedMember {
                            id: member.id,
                            role: member.role,
                            user,
                        },
                    )
                })
                .collect()
        };

        Ok(conversations
            .into_iter()
            .map(|conversation| ConversationWithRelations {
                customer: customers.get(&conversation.customer_id).cloned(),
                assigned_member: conversation
                    .assigned_to
                    .and_then(|id| members.get(&id).cloned()),
                conversation,
            })
            .collect())
    }
}

#[async_trait]
impl ConversationStore for PgGateway {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, GatewayError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT *
            FROM conversations
            WHERE business_id = $1
              AND deleted_at IS NULL
              AND ($2::conversation_status IS NULL OR status = $2)
              AND ($3::platform IS NULL OR platform = $3)
              AND ($4::uuid IS NULL OR assigned_to = $4)
              AND (NOT $5 OR assigned_to IS NULL)
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(business_id)
        .bind(filters.status)
        .bind(filters.platform)
        .bind(filters.assigned_to)
        .bind(filters.unassigned_only)
        .fetch_all(self.pool())
        .await?;

        self.attach_relations(conversations).await
    }

    async fn list_customer_conversations(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<Conversation>, GatewayError> {
        let conversations = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT *
            FROM conversations
            WHERE customer_id = $1 AND deleted_at IS NULL
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(self.pool())
        .await?;
        Ok(conversations)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, GatewayError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(conversation)
    }

    async fn find_conversation_with_relations(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, GatewayError> {
        let Some(conversation) = self.find_conversation(id).await? else {
            return Ok(None);
        };
        Ok(self.attach_relations(vec![conversation]).await?.pop())
    }

    async fn insert_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<Conversation, GatewayError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations
                (business_id, customer_id, platform, platform_conversation_id,
                 subject, priority, assigned_to, assigned_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(conversation.business_id)
        .bind(conversation.customer_id)
        .bind(conversation.platform)
        .bind(conversation.platform_conversation_id)
        .bind(conversation.subject)
        .bind(conversation.priority)
        .bind(conversation.assigned_to)
        .bind(conversation.assigned_type)
        .fetch_one(self.pool())
        .await?;
        Ok(conversation)
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        changes: ConversationChanges,
    ) -> Result<Option<Conversation>, GatewayError> {
        let update_platform_id = changes.platform_conversation_id.is_some();
        let update_subject = changes.subject.is_some();
        let update_assignment = changes.assignment.is_some();
        let (assigned_to, assigned_type) = changes.assignment.unzip();

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET
                platform_conversation_id =
                    CASE WHEN $2 THEN $3 ELSE platform_conversation_id END,
                subject = CASE WHEN $4 THEN $5 ELSE subject END,
                priority = COALESCE($6, priority),
                status = COALESCE($7, status),
                tags = COALESCE($8, tags),
                resolved_at = COALESCE(resolved_at, $9),
                assigned_to = CASE WHEN $10 THEN $11 ELSE assigned_to END,
                assigned_type = COALESCE($12, assigned_type),
                unread_count = COALESCE($13, unread_count),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update_platform_id)
        .bind(changes.platform_conversation_id.flatten())
        .bind(update_subject)
        .bind(changes.subject.flatten())
        .bind(changes.priority)
        .bind(changes.status)
        .bind(changes.tags)
        .bind(changes.resolved_at)
        .bind(update_assignment)
        .bind(assigned_to.flatten())
        .bind(assigned_type)
        .bind(changes.unread_count)
        .fetch_optional(self.pool())
        .await?;
        Ok(conversation)
    }

    async fn soft_delete_conversation(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, GatewayError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET deleted_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool())
        .await?;
        Ok(conversation)
    }

    async fn record_conversation_message(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        from_customer: bool,
    ) -> Result<Option<Conversation>, GatewayError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET
                total_messages = total_messages + 1,
                unread_count = unread_count + CASE WHEN $3 THEN 1 ELSE 0 END,
                last_message_at = $2,
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(from_customer)
        .fetch_optional(self.pool())
        .await?;
        Ok(conversation)
    }
}
