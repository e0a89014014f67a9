use api_types::{
    ActionResponse, AssignConversationRequest, BusinessScopeQuery, Conversation,
    ConversationWithRelations, CreateConversationRequest, ListConversationsQuery,
    ListConversationsResponse, TeamMember, UpdateConversationRequest,
    UpdateConversationStatusRequest,
};
use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    routing::{patch, post},
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::{conversation_access, ensure_member, require},
    error::{ErrorResponse, service_error},
};
use crate::{AppState, auth::RequestContext, mutation_definition::MutationBuilder};

pub fn mutation()
-> MutationBuilder<Conversation, CreateConversationRequest, UpdateConversationRequest> {
    MutationBuilder::new("conversations")
        .list(list_conversations)
        .get(get_conversation)
        .create(create_conversation)
        .update(update_conversation)
        .delete(delete_conversation)
        .action("assign", post(assign_conversation))
        .action("status", patch(update_status))
        .action("read", post(mark_as_read))
}

pub fn router() -> axum::Router<AppState> {
    mutation().router()
}

fn require_assign(member: &TeamMember) -> Result<(), ErrorResponse> {
    require(
        member,
        |permissions| permissions.conversations.assign,
        "missing permission to assign conversations",
    )
}

fn require_close(member: &TeamMember) -> Result<(), ErrorResponse> {
    require(
        member,
        |permissions| permissions.conversations.close,
        "missing permission to close conversations",
    )
}

#[instrument(
    name = "conversations.list_conversations",
    skip(state, ctx),
    fields(business_id = %query.business_id, user_id = %ctx.user.id)
)]
async fn list_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<ListConversationsResponse>, ErrorResponse> {
    let member = ensure_member(&state, ctx.user.id, query.business_id).await?;

    let mut filters = query.filters();
    let permissions = member.permissions.conversations;
    if !permissions.view_all {
        if !permissions.view_assigned || filters.unassigned_only {
            return Ok(Json(ListConversationsResponse {
                conversations: Vec::new(),
            }));
        }
        filters.assigned_to = Some(member.id);
    }

    let conversations = state
        .conversations()
        .list(query.business_id, &filters)
        .await
        .map_err(|error| service_error(error, "failed to list conversations"))?;
    Ok(Json(ListConversationsResponse { conversations }))
}

#[instrument(
    name = "conversations.get_conversation",
    skip(state, ctx),
    fields(conversation_id = %conversation_id, user_id = %ctx.user.id)
)]
async fn get_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationWithRelations>, ErrorResponse> {
    conversation_access(&state, ctx.user.id, conversation_id).await?;

    let conversation = state
        .conversations()
        .get(conversation_id)
        .await
        .map_err(|error| service_error(error, "failed to load conversation"))?;
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.create_conversation",
    skip(state, ctx, payload),
    fields(business_id = %query.business_id, user_id = %ctx.user.id, platform = %payload.platform)
)]
async fn create_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, ErrorResponse> {
    let member = ensure_member(&state, ctx.user.id, query.business_id).await?;
    if payload.assigned_to.is_some() {
        require_assign(&member)?;
    }

    let conversation = state
        .conversations()
        .create(query.business_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to create conversation"))?;
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.update_conversation",
    skip(state, ctx, payload),
    fields(conversation_id = %conversation_id, user_id = %ctx.user.id)
)]
async fn update_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<UpdateConversationRequest>,
) -> Result<Json<Conversation>, ErrorResponse> {
    let (_, member) = conversation_access(&state, ctx.user.id, conversation_id).await?;
    if payload.status.is_some_and(|status| status.is_closing()) {
        require_close(&member)?;
    }

    let conversation = state
        .conversations()
        .update(conversation_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to update conversation"))?;
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.assign_conversation",
    skip(state, ctx, payload),
    fields(
        conversation_id = %conversation_id,
        user_id = %ctx.user.id,
        assignment_type = %payload.assignment_type,
    )
)]
async fn assign_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<AssignConversationRequest>,
) -> Result<Json<Conversation>, ErrorResponse> {
    let (_, member) = conversation_access(&state, ctx.user.id, conversation_id).await?;
    require_assign(&member)?;

    let conversation = state
        .conversations()
        .assign(conversation_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to assign conversation"))?;

    tracing::info!(
        assigned_to = ?conversation.assigned_to,
        "conversation assigned"
    );
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.update_status",
    skip(state, ctx, payload),
    fields(conversation_id = %conversation_id, user_id = %ctx.user.id, status = %payload.status)
)]
async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<UpdateConversationStatusRequest>,
) -> Result<Json<Conversation>, ErrorResponse> {
    let (_, member) = conversation_access(&state, ctx.user.id, conversation_id).await?;
    if payload.status.is_closing() {
        require_close(&member)?;
    }

    let conversation = state
        .conversations()
        .update_status(conversation_id, payload.status)
        .await
        .map_err(|error| service_error(error, "failed to update conversation status"))?;
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.mark_as_read",
    skip(state, ctx),
    fields(conversation_id = %conversation_id, user_id = %ctx.user.id)
)]
async fn mark_as_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, ErrorResponse> {
    conversation_access(&state, ctx.user.id, conversation_id).await?;

    let conversation = state
        .conversations()
        .mark_as_read(conversation_id)
        .await
        .map_err(|error| service_error(error, "failed to mark conversation as read"))?;
    Ok(Json(conversation))
}

#[instrument(
    name = "conversations.delete_conversation",
    skip(state, ctx),
    fields(conversation_id = %conversation_id, user_id = %ctx.user.id)
)]
async fn delete_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    let (_, member) = conversation_access(&state, ctx.user.id, conversation_id).await?;
    require_assign(&member)?;

    state
        .conversations()
        .delete(conversation_id)
        .await
        .map_err(|error| service_error(error, "failed to delete conversation"))?;
    Ok(Json(ActionResponse::new("Conversation deleted")))
}
