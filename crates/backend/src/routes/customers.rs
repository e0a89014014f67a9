use api_types::{
    ActionResponse, AddCustomerNoteRequest, BusinessScopeQuery, CreateCustomerRequest, Customer,
    CustomerLookupRequest, CustomerTagsRequest, ListConversationsByCustomerResponse,
    ListCustomersQuery, ListCustomersResponse, UpdateCustomerRequest,
};
use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    routing::{get, post},
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    access::{can_view_conversation, customer_access, ensure_capability, require},
    error::{ErrorResponse, service_error},
};
use crate::{AppState, auth::RequestContext, mutation_definition::MutationBuilder};

pub fn mutation() -> MutationBuilder<Customer, CreateCustomerRequest, UpdateCustomerRequest> {
    MutationBuilder::new("customers")
        .list(list_customers)
        .get(get_customer)
        .create(create_customer)
        .update(update_customer)
        .delete(delete_customer)
        .action("notes", post(add_note))
        .action("tags", post(add_tags).delete(remove_tags))
        .action("conversations", get(list_customer_conversations))
}

pub fn router() -> axum::Router<AppState> {
    mutation()
        .router()
        .route("/customers/lookup", post(lookup_customer))
}

/// Loads the customer and requires the edit capability in its business.
async fn edit_access(
    state: &AppState,
    user_id: Uuid,
    customer_id: Uuid,
) -> Result<Customer, ErrorResponse> {
    let (customer, member) = customer_access(state, user_id, customer_id).await?;
    require(
        &member,
        |permissions| permissions.customers.edit,
        "missing permission to edit customers",
    )?;
    Ok(customer)
}

#[instrument(
    name = "customers.list_customers",
    skip(state, ctx),
    fields(business_id = %query.business_id, user_id = %ctx.user.id)
)]
async fn list_customers(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<ListCustomersResponse>, ErrorResponse> {
    ensure_capability(
        &state,
        ctx.user.id,
        query.business_id,
        |permissions| permissions.customers.view,
        "missing permission to view customers",
    )
    .await?;

    let customers = state
        .customers()
        .list(query.business_id, &query.filters())
        .await
        .map_err(|error| service_error(error, "failed to list customers"))?;
    Ok(Json(ListCustomersResponse { customers }))
}

#[instrument(
    name = "customers.get_customer",
    skip(state, ctx),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn get_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Customer>, ErrorResponse> {
    let (customer, _) = customer_access(&state, ctx.user.id, customer_id).await?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.create_customer",
    skip(state, ctx, payload),
    fields(business_id = %query.business_id, user_id = %ctx.user.id)
)]
async fn create_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    ensure_capability(
        &state,
        ctx.user.id,
        query.business_id,
        |permissions| permissions.customers.edit,
        "missing permission to edit customers",
    )
    .await?;

    let customer = state
        .customers()
        .create(query.business_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to create customer"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.lookup_customer",
    skip(state, ctx, payload),
    fields(business_id = %query.business_id, user_id = %ctx.user.id, platform = %payload.platform)
)]
async fn lookup_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<BusinessScopeQuery>,
    Json(payload): Json<CustomerLookupRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    ensure_capability(
        &state,
        ctx.user.id,
        query.business_id,
        |permissions| permissions.customers.edit,
        "missing permission to edit customers",
    )
    .await?;

    let customer = state
        .customers()
        .find_or_create_by_platform(
            query.business_id,
            payload.platform,
            &payload.platform_id,
            payload.customer,
        )
        .await
        .map_err(|error| service_error(error, "failed to look up customer"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.update_customer",
    skip(state, ctx, payload),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn update_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    edit_access(&state, ctx.user.id, customer_id).await?;

    let customer = state
        .customers()
        .update(customer_id, payload)
        .await
        .map_err(|error| service_error(error, "failed to update customer"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.delete_customer",
    skip(state, ctx),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn delete_customer(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ErrorResponse> {
    let (_, member) = customer_access(&state, ctx.user.id, customer_id).await?;
    require(
        &member,
        |permissions| permissions.customers.delete,
        "missing permission to delete customers",
    )?;

    state
        .customers()
        .delete(customer_id)
        .await
        .map_err(|error| service_error(error, "failed to delete customer"))?;
    Ok(Json(ActionResponse::new("Customer deleted")))
}

#[instrument(
    name = "customers.add_note",
    skip(state, ctx, payload),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn add_note(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<AddCustomerNoteRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    edit_access(&state, ctx.user.id, customer_id).await?;

    let customer = state
        .customers()
        .add_note(customer_id, &payload.note)
        .await
        .map_err(|error| service_error(error, "failed to add customer note"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.add_tags",
    skip(state, ctx, payload),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn add_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<CustomerTagsRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    edit_access(&state, ctx.user.id, customer_id).await?;

    let customer = state
        .customers()
        .add_tags(customer_id, &payload.tags)
        .await
        .map_err(|error| service_error(error, "failed to add customer tags"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.remove_tags",
    skip(state, ctx, payload),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn remove_tags(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<CustomerTagsRequest>,
) -> Result<Json<Customer>, ErrorResponse> {
    edit_access(&state, ctx.user.id, customer_id).await?;

    let customer = state
        .customers()
        .remove_tags(customer_id, &payload.tags)
        .await
        .map_err(|error| service_error(error, "failed to remove customer tags"))?;
    Ok(Json(customer))
}

#[instrument(
    name = "customers.list_customer_conversations",
    skip(state, ctx),
    fields(customer_id = %customer_id, user_id = %ctx.user.id)
)]
async fn list_customer_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<ListConversationsByCustomerResponse>, ErrorResponse> {
    let (_, member) = customer_access(&state, ctx.user.id, customer_id).await?;

    let conversations = state
        .customers()
        .conversations(customer_id)
        .await
        .map_err(|error| service_error(error, "failed to list customer conversations"))?
        .into_iter()
        .filter(|conversation| can_view_conversation(&member, conversation))
        .collect();
    Ok(Json(ListConversationsByCustomerResponse { conversations }))
}
