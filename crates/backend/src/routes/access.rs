//! Tenant and capability checks shared by the handlers.
//!
//! Every business-scoped request resolves the caller's active membership
//! first; capability checks then read the membership's permission matrix.

use api_types::{
    Conversation, Customer, Message, PermissionMatrix, TeamMember, TeamMemberWithUser,
};
use axum::http::StatusCode;
use uuid::Uuid;

use super::error::{ErrorResponse, service_error};
use crate::{AppState, services::ServiceError};

pub(crate) async fn ensure_member(
    state: &AppState,
    user_id: Uuid,
    business_id: Uuid,
) -> Result<TeamMember, ErrorResponse> {
    state
        .team()
        .membership(business_id, user_id)
        .await
        .map_err(|error| service_error(error, "failed to load membership"))?
        .ok_or_else(|| ErrorResponse::new(StatusCode::FORBIDDEN, "not a member of this business"))
}

pub(crate) fn require(
    member: &TeamMember,
    capability: impl FnOnce(&PermissionMatrix) -> bool,
    message: &'static str,
) -> Result<(), ErrorResponse> {
    if capability(&member.permissions) {
        Ok(())
    } else {
        Err(ErrorResponse::new(StatusCode::FORBIDDEN, message))
    }
}

/// Membership check plus a capability in one call.
pub(crate) async fn ensure_capability(
    state: &AppState,
    user_id: Uuid,
    business_id: Uuid,
    capability: impl FnOnce(&PermissionMatrix) -> bool,
    message: &'static str,
) -> Result<TeamMember, ErrorResponse> {
    let member = ensure_member(state, user_id, business_id).await?;
    require(&member, capability, message)?;
    Ok(member)
}

/// Members without `view_all` only see conversations assigned to them.
pub(crate) fn can_view_conversation(member: &TeamMember, conversation: &Conversation) -> bool {
    let permissions = member.permissions.conversations;
    permissions.view_all
        || (permissions.view_assigned && conversation.assigned_to == Some(member.id))
}

/// Loads a live conversation the caller may see.
pub(crate) async fn conversation_access(
    state: &AppState,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<(Conversation, TeamMember), ErrorResponse> {
    let conversation = state
        .conversations()
        .find(conversation_id)
        .await
        .map_err(|error| service_error(error, "failed to load conversation"))?;
    if conversation.is_deleted() {
        return Err(service_error(
            ServiceError::NotFound("conversation"),
            "failed to load conversation",
        ));
    }

    let member = ensure_member(state, user_id, conversation.business_id).await?;
    if !can_view_conversation(&member, &conversation) {
        return Err(ErrorResponse::new(
            StatusCode::FORBIDDEN,
            "conversation is not assigned to you",
        ));
    }
    Ok((conversation, member))
}

pub(crate) async fn customer_access(
    state: &AppState,
    user_id: Uuid,
    customer_id: Uuid,
) -> Result<(Customer, TeamMember), ErrorResponse> {
    let customer = state
        .customers()
        .get(customer_id)
        .await
        .map_err(|error| service_error(error, "failed to load customer"))?;
    let member = ensure_capability(
        state,
        user_id,
        customer.business_id,
        |permissions| permissions.customers.view,
        "missing permission to view customers",
    )
    .await?;
    Ok((customer, member))
}

pub(crate) async fn message_access(
    state: &AppState,
    user_id: Uuid,
    message_id: Uuid,
) -> Result<(Message, TeamMember), ErrorResponse> {
    let message = state
        .messages()
        .get(message_id)
        .await
        .map_err(|error| service_error(error, "failed to load message"))?;
    let (_, member) = conversation_access(state, user_id, message.conversation_id).await?;
    Ok((message, member))
}

/// Loads a team member and the caller's own membership in the same business.
pub(crate) async fn team_member_access(
    state: &AppState,
    user_id: Uuid,
    member_id: Uuid,
) -> Result<(TeamMemberWithUser, TeamMember), ErrorResponse> {
    let target = state
        .team()
        .get(member_id)
        .await
        .map_err(|error| service_error(error, "failed to load team member"))?;
    let caller = ensure_member(state, user_id, target.member.business_id).await?;
    Ok((target, caller))
}

#[cfg(test)]
mod tests {
    use api_types::{AssignmentType, ConversationPriority, ConversationStatus, MemberRole, Platform};
    use chrono::Utc;

    use super::*;

    fn member(role: MemberRole) -> TeamMember {
        let now = Utc::now();
        TeamMember {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role,
            permissions: role.default_permissions(),
            department: None,
            title: None,
            is_active: true,
            joined_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn conversation(assigned_to: Option<Uuid>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            platform: Platform::Whatsapp,
            platform_conversation_id: None,
            subject: None,
            priority: ConversationPriority::Normal,
            status: ConversationStatus::Open,
            assigned_to,
            assigned_type: if assigned_to.is_some() {
                AssignmentType::TeamMember
            } else {
                AssignmentType::Unassigned
            },
            tags: vec![],
            total_messages: 0,
            unread_count: 0,
            last_message_at: None,
            resolved_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn limited_agents_only_see_their_assignments() {
        let limited = member(MemberRole::LimitedAgent);
        assert!(can_view_conversation(&limited, &conversation(Some(limited.id))));
        assert!(!can_view_conversation(&limited, &conversation(None)));
        assert!(!can_view_conversation(&limited, &conversation(Some(Uuid::new_v4()))));

        let agent = member(MemberRole::Agent);
        assert!(can_view_conversation(&agent, &conversation(None)));
    }

    #[test]
    fn missing_capability_is_forbidden() {
        let agent = member(MemberRole::Agent);
        let error = require(&agent, |p| p.conversations.assign, "cannot assign").unwrap_err();
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        assert!(require(&agent, |p| p.conversations.close, "cannot close").is_ok());
    }
}
