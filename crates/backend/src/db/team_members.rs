use api_types::{
    PresenceStatus, TeamMember, TeamMemberWithUser, UpdateTeamMemberRequest, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::{PgGateway, duplicate_on_unique};
use crate::gateway::{GatewayError, NewTeamMember, TeamStore};

/// Membership row joined with the member's user, user columns prefixed `user_`.
#[derive(sqlx::FromRow)]
pub(super) struct MemberWithUserRow {
    #[sqlx(flatten)]
    member: TeamMember,
    user_email: String,
    user_full_name: Option<String>,
    user_avatar_url: Option<String>,
    user_status: PresenceStatus,
    user_last_seen_at: Option<DateTime<Utc>>,
}

impl From<MemberWithUserRow> for TeamMemberWithUser {
    fn from(row: MemberWithUserRow) -> Self {
        let user = UserProfile {
            id: row.member.user_id,
            email: row.user_email,
            full_name: row.user_full_name,
            avatar_url: row.user_avatar_url,
            status: row.user_status,
            last_seen_at: row.user_last_seen_at,
        };
        Self {
            member: row.member,
            user,
        }
    }
}

pub(super) const MEMBER_WITH_USER_SELECT: &str = r#"
    SELECT
        tm.*,
        u.email        AS user_email,
        u.full_name    AS user_full_name,
        u.avatar_url   AS user_avatar_url,
        u.status       AS user_status,
        u.last_seen_at AS user_last_seen_at
    FROM team_members tm
    JOIN users u ON u.id = tm.user_id
"#;

#[async_trait]
impl TeamStore for PgGateway {
    async fn list_members(&self, business_id: Uuid) -> Result<Vec<TeamMemberWithUser>, GatewayError> {
        let query = format!(
            "{MEMBER_WITH_USER_SELECT} WHERE tm.business_id = $1 ORDER BY tm.created_at DESC"
        );
        let rows = sqlx::query_as::<_, MemberWithUserRow>(&query)
            .bind(business_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_member(&self, id: Uuid) -> Result<Option<TeamMemberWithUser>, GatewayError> {
        let query = format!("{MEMBER_WITH_USER_SELECT} WHERE tm.id = $1");
        let row = sqlx::query_as::<_, MemberWithUserRow>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_membership(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, GatewayError> {
        let member = sqlx::query_as::<_, TeamMember>(
            "SELECT * FROM team_members WHERE business_id = $1 AND user_id = $2",
        )
        .bind(business_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(member)
    }

    async fn insert_member(&self, member: NewTeamMember) -> Result<TeamMember, GatewayError> {
        sqlx::query_as::<_, TeamMember>(
            r#"
            INSERT INTO team_members
                (business_id, user_id, role, permissions, department, title, joined_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(member.business_id)
        .bind(member.user_id)
        .bind(member.role)
        .bind(Json(member.permissions))
        .bind(member.department)
        .bind(member.title)
        .bind(member.joined_at)
        .fetch_one(self.pool())
        .await
        .map_err(|error| duplicate_on_unique(error, "team membership"))
    }

    async fn update_member(
        &self,
        id: Uuid,
        changes: UpdateTeamMemberRequest,
    ) -> Result<Option<TeamMember>, GatewayError> {
        let update_department = changes.department.is_some();
        let update_title = changes.title.is_some();

        let member = sqlx::query_as::<_, TeamMember>(
            r#"
            UPDATE team_members
            SET
                role = COALESCE($2, role),
                permissions = COALESCE($3, permissions),
                department = CASE WHEN $4 THEN $5 ELSE department END,
                title = CASE WHEN $6 THEN $7 ELSE title END,
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.role)
        .bind(changes.permissions.map(Json))
        .bind(update_department)
        .bind(changes.department.flatten())
        .bind(update_title)
        .bind(changes.title.flatten())
        .bind(changes.is_active)
        .fetch_optional(self.pool())
        .await?;
        Ok(member)
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool, GatewayError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET
                assigned_to = NULL,
                assigned_type = CASE
                    WHEN assigned_type = 'team_member' THEN 'unassigned'::assignment_type
                    ELSE assigned_type
                END,
                updated_at = NOW()
            WHERE assigned_to = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM team_members WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
