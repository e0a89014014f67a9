use api_types::{
    ActionResponse, Business, CreateBusinessRequest, ListBusinessesResponse,
    UpdateBusinessRequest,
};
use axum::{
    Json,
    extract::{Extension, Path, State},
    routing::patch,
};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::{ensure_capability, ensure_member},
    error::{ErrorResponse, service_error},
};
use crate::{AppState, auth::RequestContext, mutation_definition::MutationBuilder};

pub fn mutation() -> MutationBuilder<Business, CreateBusinessRequest, UpdateBusinessRequest> {
    MutationBuilder::new("businesses")
        .list(list_businesses)
        .get(get_business)
        .create(create_business)
        .update(update_business)
        .delete(delete_business)
        .action("settings", patch(update_settings))
}

pub fn router() -> axum::Router<AppState> {
    mutation().router()
}

async fn ensure_settings_editor(
    state: &AppState,
    user_id: Uuid,
    business_id: Uuid,
) -> Result<(), ErrorResponse> {
    ensure_capability(
        state,
        user_id,
        business_id,
        |permissions| permissions.settings.edit,
        "missing permission to edit business settings",
    )
    .await
    .map(|_| ())
}

#[instrument(name = "businesses.list_businesses", skip(state, ctx), fields(user_id = %ctx.user.id))]
async fn list_businesses(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<ListBusinessesResponse>, ErrorResponse> {
    let businesses = state
        .businesses()
        .list_for_user(ctx.user.id)
        .await
        .map_err(|error| service_error(error, "failed to list businesses"))?;
    Ok(Json(ListBusinessesResponse { businesses }))
}

#[instrument(
    name = "businesses.get_business",
    skip(state, ctx),
    fields(business_id = %business_id, user_id = %ctx.user.id)
)]
async fn get_business(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(business_id): Path<Uuid>,
) -> Result<Json<Business>, ErrorResponse> {
    ensure_member(&state, ctx.user.id, business_id).await?;

    let business = state
        .businesses()
        .get(business_id)
        .await
        .map_err(|error| service_error(error, "failed to load business"))?;
    Ok(Json(business))
}

#[instrument(name = "businesses.create_business", skip(state, ctx, payload), fields(user_id = %ctx.user.id))]
async fn create_business(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateBusinessRequest>,
) -> Result<Json<Business>, ErrorResponse> {
    let business = state
        .businesses()
        .create(ctx.user.id, payload)
        .await
        .map_err(|error| service_error(error, "failed to create business"))?;

    tracing::info!(business_id = %business.id, slug = %business.slug, "business created");
    Ok(Json(business))
}

#[instrument(
    name = "businesses.update_business",
    skip(state, ctx, payload),
    fields(business_id = %business_id, user_id = %ctx.user.id)
)]
async fn update_business(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(business_id): Path<Uuid>,
    Json(payload): Json<UpdateBusinessRequest>,
) -> Result<Json<Business>, ErrorResponse> {
    ensure_settings_editor(&state, ctx.user.id, business_id).await?;

    let business = state
        .businesses()
        .update(business_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to update business"))?;
    Ok(Json(business))
}

#[instrument(
    name = "businesses.update_settings",
    skip(state, ctx, payload),
    fields(business_id = %business_id, user_id = %ctx.user.id)
)]
async fn update_settings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(business_id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Result<Json<Business>, ErrorResponse> {
    ensure_settings_editor(&state, ctx.user.id, business_id).await?;

    let business = state
        .businesses()
        .update_settings(business_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to update business settings"))?;
    Ok(Json(business))
}

#[instrument(
    name = "businesses.delete_business",
    skip(state, ctx),
    fields(business_id = %business_id, user_id = %ctx.user.id)
)]
async fn delete_business(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(business_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    ensure_settings_editor(&state, ctx.user.id, business_id).await?;

    state
        .businesses()
        .delete(business_id)
        .await
        .map_err(|error| service_error(error, "failed to delete business"))?;
    Ok(Json(ActionResponse::new("Business deleted")))
}
