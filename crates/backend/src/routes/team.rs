use api_types::{
    ActionResponse, BusinessScopeQuery, InviteTeamMemberRequest, ListTeamMembersResponse,
    PermissionMatrix, TeamMember, TeamMemberWithUser, UpdateMemberRoleRequest,
    UpdateTeamMemberRequest,
};
use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    routing::{patch, post},
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::{ensure_capability, require, team_member_access},
    error::{ErrorResponse, service_error},
};
use crate::{
    AppState,
    auth::RequestContext,
    mutation_definition::{MutationBuilder, NoCreate},
};

pub fn mutation() -> MutationBuilder<TeamMember, NoCreate, UpdateTeamMemberRequest> {
    MutationBuilder::new("team")
        .list(list_members)
        .get(get_member)
        .update(update_member)
        .delete(remove_member)
        .action("role", patch(update_role))
        .action("activate", post(activate_member))
        .action("deactivate", post(deactivate_member))
}

/// Invitations are posted to `/team/invite` rather than `/team`.
pub fn router() -> axum::Router<AppState> {
    mutation()
        .router()
        .route("/team/invite", post(invite_member))
}

/// Loads the target member and checks the caller's capability in the
/// member's business.
async fn edit_access(
    state: &AppState,
    user_id: Uuid,
    member_id: Uuid,
    capability: impl FnOnce(&PermissionMatrix) -> bool,
    message: &'static str,
) -> Result<TeamMemberWithUser, ErrorResponse> {
    let (target, caller) = team_member_access(state, user_id, member_id).await?;
    require(&caller, capability, message)?;
    Ok(target)
}

#[instrument(
    name = "team.list_members",
    skip(state, ctx),
    fields(business_id = %query.business_id, user_id = %ctx.user.id)
)]
async fn list_members(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
) -> Result<Json<ListTeamMembersResponse>, ErrorResponse> {
    ensure_capability(
        &state,
        ctx.user.id,
        query.business_id,
        |permissions| permissions.team.view,
        "missing permission to view the team",
    )
    .await?;

    let members = state
        .team()
        .list(query.business_id)
        .await
        .map_err(|error| service_error(error, "failed to list team members"))?;
    Ok(Json(ListTeamMembersResponse { members }))
}

#[instrument(
    name = "team.get_member",
    skip(state, ctx),
    fields(member_id = %member_id, user_id = %ctx.user.id)
)]
async fn get_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<TeamMemberWithUser>, ErrorResponse> {
    let (target, _) = team_member_access(&state, ctx.user.id, member_id).await?;
    Ok(Json(target))
}

#[instrument(
    name = "team.invite_member",
    skip(state, ctx, payload),
    fields(business_id = %query.business_id, user_id = %ctx.user.id, role = %payload.role)
)]
async fn invite_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
    Json(payload): Json<InviteTeamMemberRequest>,
) -> Result<Json<TeamMemberWithUser>, ErrorResponse> {
    ensure_capability(
        &state,
        ctx.user.id,
        query.business_id,
        |permissions| permissions.team.invite,
        "missing permission to invite team members",
    )
    .await?;

    let member = state
        .team()
        .invite(query.business_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to invite team member"))?;

    tracing::info!(member_id = %member.member.id, "team member invited");
    Ok(Json(member))
}

#[instrument(
    name = "team.update_member",
    skip(state, ctx, payload),
    fields(member_id = %member_id, user_id = %ctx.user.id)
)]
async fn update_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
    Json(payload): Json<UpdateTeamMemberRequest>,
) -> Result<Json<TeamMember>, ErrorResponse> {
    edit_access(
        &state,
        ctx.user.id,
        member_id,
        |permissions| permissions.team.edit,
        "missing permission to edit team members",
    )
    .await?;

    let member = state
        .team()
        .update(member_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to update team member"))?;
    Ok(Json(member))
}

#[instrument(
    name = "team.update_role",
    skip(state, ctx, payload),
    fields(member_id = %member_id, user_id = %ctx.user.id, role = %payload.role)
)]
async fn update_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> Result<Json<TeamMember>, ErrorResponse> {
    edit_access(
        &state,
        ctx.user.id,
        member_id,
        |permissions| permissions.team.edit,
        "missing permission to edit team members",
    )
    .await?;

    let member = state
        .team()
        .update_role(member_id, payload.role)
        .await
        .map_err(|error| service_error(error, "failed to update team member role"))?;
    Ok(Json(member))
}

#[instrument(
    name = "team.activate_member",
    skip(state, ctx),
    fields(member_id = %member_id, user_id = %ctx.user.id)
)]
async fn activate_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    edit_access(
        &state,
        ctx.user.id,
        member_id,
        |permissions| permissions.team.edit,
        "missing permission to edit team members",
    )
    .await?;

    state
        .team()
        .activate(member_id)
        .await
        .map_err(|error| service_error(error, "failed to activate team member"))?;
    Ok(Json(ActionResponse::new("Team member activated")))
}

#[instrument(
    name = "team.deactivate_member",
    skip(state, ctx),
    fields(member_id = %member_id, user_id = %ctx.user.id)
)]
async fn deactivate_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    edit_access(
        &state,
        ctx.user.id,
        member_id,
        |permissions| permissions.team.edit,
        "missing permission to edit team members",
    )
    .await?;

    state
        .team()
        .deactivate(member_id)
        .await
        .map_err(|error| service_error(error, "failed to deactivate team member"))?;
    Ok(Json(ActionResponse::new("Team member deactivated")))
}

#[instrument(
    name = "team.remove_member",
    skip(state, ctx),
    fields(member_id = %member_id, user_id = %ctx.user.id)
)]
async fn remove_member(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(member_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    edit_access(
        &state,
        ctx.user.id,
        member_id,
        |permissions| permissions.team.remove,
        "missing permission to remove team members",
    )
    .await?;

    state
        .team()
        .remove(member_id)
        .await
        .map_err(|error| service_error(error, "failed to remove team member"))?;
    Ok(Json(ActionResponse::new("Team member removed")))
}
