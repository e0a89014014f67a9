use api_types::{
    ActionResponse, CreateMessageRequest, ListMessagesQuery, ListMessagesResponse, Message,
    SenderType,
};
use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    routing::post,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::{conversation_access, message_access, require},
    error::{ErrorResponse, service_error},
};
use crate::{
    AppState,
    auth::RequestContext,
    mutation_definition::{MutationBuilder, NoUpdate},
};

pub fn mutation() -> MutationBuilder<Message, CreateMessageRequest, NoUpdate> {
    MutationBuilder::new("messages")
        .list(list_messages)
        .get(get_message)
        .create(create_message)
        .delete(delete_message)
        .action("read", post(mark_as_read))
        .action("delivered", post(mark_as_delivered))
}

pub fn router() -> axum::Router<AppState> {
    mutation().router()
}

#[instrument(
    name = "messages.list_messages",
    skip(state, ctx),
    fields(conversation_id = %query.conversation_id, user_id = %ctx.user.id)
)]
async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<ListMessagesResponse>, ErrorResponse> {
    conversation_access(&state, ctx.user.id, query.conversation_id).await?;

    let messages = state
        .messages()
        .list(query.conversation_id, query.limit, query.offset)
        .await
        .map_err(|error| service_error(error, "failed to list messages"))?;
    Ok(Json(ListMessagesResponse { messages }))
}

#[instrument(
    name = "messages.get_message",
    skip(state, ctx),
    fields(message_id = %message_id, user_id = %ctx.user.id)
)]
async fn get_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ErrorResponse> {
    let (message, _) = message_access(&state, ctx.user.id, message_id).await?;
    Ok(Json(message))
}

#[instrument(
    name = "messages.create_message",
    skip(state, ctx, payload),
    fields(
        conversation_id = %payload.conversation_id,
        user_id = %ctx.user.id,
        sender_type = ?payload.sender_type,
    )
)]
async fn create_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(mut payload): Json<CreateMessageRequest>,
) -> Result<Json<Message>, ErrorResponse> {
    let (_, member) = conversation_access(&state, ctx.user.id, payload.conversation_id).await?;
    require(
        &member,
        |permissions| permissions.conversations.reply,
        "missing permission to reply to conversations",
    )?;

    if payload.sender_type == SenderType::Agent {
        payload.sender_id.get_or_insert(ctx.user.id);
        if payload.sender_name.is_none() {
            payload.sender_name = ctx.user.full_name.clone();
        }
    }

    let message = state
        .messages()
        .create(payload)
        .await
        .map_err(|error| service_error(error, "failed to create message"))?;
    Ok(Json(message))
}

#[instrument(
    name = "messages.mark_as_read",
    skip(state, ctx),
    fields(message_id = %message_id, user_id = %ctx.user.id)
)]
async fn mark_as_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ErrorResponse> {
    message_access(&state, ctx.user.id, message_id).await?;

    let message = state
        .messages()
        .mark_as_read(message_id)
        .await
        .map_err(|error| service_error(error, "failed to mark message as read"))?;
    Ok(Json(message))
}

#[instrument(
    name = "messages.mark_as_delivered",
    skip(state, ctx),
    fields(message_id = %message_id, user_id = %ctx.user.id)
)]
async fn mark_as_delivered(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>, ErrorResponse> {
    message_access(&state, ctx.user.id, message_id).await?;

    let message = state
        .messages()
        .mark_as_delivered(message_id)
        .await
        .map_err(|error| service_error(error, "failed to mark message as delivered"))?;
    Ok(Json(message))
}

#[instrument(
    name = "messages.delete_message",
    skip(state, ctx),
    fields(message_id = %message_id, user_id = %ctx.user.id)
)]
async fn delete_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    let (_, member) = message_access(&state, ctx.user.id, message_id).await?;
    require(
        &member,
        |permissions| permissions.conversations.assign,
        "missing permission to delete messages",
    )?;

    state
        .messages()
        .delete(message_id)
        .await
        .map_err(|error| service_error(error, "failed to delete message"))?;
    Ok(Json(ActionResponse::new("Message deleted")))
}
