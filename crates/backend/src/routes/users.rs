use api_types::{
    BusinessScopeQuery, ListNotificationsResponse, Notification, UpdatePresenceStatusRequest,
    User,
};
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::{get, patch, post},
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::ensure_member,
    error::{ErrorResponse, service_error},
};
use crate::{AppState, auth::RequestContext};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/me/status", patch(update_status))
        .route("/notifications", get(list_notifications))
        .route("/notifications/{id}/read", post(mark_notification_read))
}

#[instrument(name = "users.get_me", skip(state, ctx), fields(user_id = %ctx.user.id))]
async fn get_me(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<User>, ErrorResponse> {
    let user = state
        .users()
        .me(ctx.user.id)
        .await
        .map_err(|error| service_error(error, "failed to load user"))?;
    Ok(Json(user))
}

#[instrument(
    name = "users.update_status",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user.id, status = ?payload.status)
)]
async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<UpdatePresenceStatusRequest>,
) -> Result<Json<User>, ErrorResponse> {
    let user = state
        .users()
        .set_status(ctx.user.id, payload.status)
        .await
        .map_err(|error| service_error(error, "failed to update status"))?;
    Ok(Json(user))
}

#[instrument(
    name = "notifications.list",
    skip(state, ctx),
    fields(business_id = %query.business_id, user_id = %ctx.user.id)
)]
async fn list_notifications(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
) -> Result<Json<ListNotificationsResponse>, ErrorResponse> {
    ensure_member(&state, ctx.user.id, query.business_id).await?;

    let notifications = state
        .users()
        .list_notifications(query.business_id, ctx.user.id)
        .await
        .map_err(|error| service_error(error, "failed to list notifications"))?;
    Ok(Json(ListNotificationsResponse { notifications }))
}

#[instrument(
    name = "notifications.mark_read",
    skip(state, ctx),
    fields(notification_id = %notification_id, user_id = %ctx.user.id)
)]
async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, ErrorResponse> {
    let notification = state
        .users()
        .mark_notification_read(notification_id, ctx.user.id)
        .await
        .map_err(|error| service_error(error, "failed to update notification"))?;
    Ok(Json(notification))
}
