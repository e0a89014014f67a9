//! Route builder for resource endpoints.
//!
//! `MutationBuilder` wires the conventional CRUD routes of a resource
//! (`/{table}` and `/{table}/{id}`) plus per-row actions
//! (`/{table}/{id}/{action}`), and records which request types each
//! resource accepts so `generate-types` can emit a matching client map.
//!
//! ```ignore
//! pub fn mutation() -> MutationBuilder<Customer, CreateCustomerRequest, UpdateCustomerRequest> {
//!     MutationBuilder::new("customers")
//!         .list(list_customers)
//!         .get(get_customer)
//!         .create(create_customer)
//!         .update(update_customer)
//!         .delete(delete_customer)
//!         .action("notes", post(add_note))
//! }
//! ```

use std::marker::PhantomData;

use axum::{Json, handler::Handler, routing::MethodRouter};
use ts_rs::TS;

use crate::AppState;

/// Implemented for extractor tuples whose last element is `Json<T>`, tying
/// the declared create/update type to what the handler actually parses.
/// The first element is axum's handler marker.
pub trait HasJsonPayload<T> {}

impl<M, T> HasJsonPayload<T> for (M, Json<T>) {}
impl<M, A, T> HasJsonPayload<T> for (M, A, Json<T>) {}
impl<M, A, B, T> HasJsonPayload<T> for (M, A, B, Json<T>) {}
impl<M, A, B, C, T> HasJsonPayload<T> for (M, A, B, C, Json<T>) {}
impl<M, A, B, C, D, T> HasJsonPayload<T> for (M, A, B, C, D, Json<T>) {}
impl<M, A, B, C, D, E0, T> HasJsonPayload<T> for (M, A, B, C, D, E0, Json<T>) {}

/// Resource metadata consumed by `generate-types`.
#[derive(Debug)]
pub struct MutationDefinition {
    pub table: &'static str,
    pub row_type: String,
    pub create_type: Option<String>,
    pub update_type: Option<String>,
    pub actions: Vec<&'static str>,
}

/// Marker for resources without a create endpoint.
pub struct NoCreate;

/// Marker for resources without an update endpoint.
pub struct NoUpdate;

/// TypeScript name of a payload slot; `None` for the missing-endpoint markers.
pub trait PayloadType {
    fn type_name() -> Option<String>;
}

impl<T: TS> PayloadType for T {
    fn type_name() -> Option<String> {
        Some(T::name())
    }
}

impl PayloadType for NoCreate {
    fn type_name() -> Option<String> {
        None
    }
}

impl PayloadType for NoUpdate {
    fn type_name() -> Option<String> {
        None
    }
}

/// `E` is the row type, `C`/`U` the create and update payloads (or the
/// `NoCreate`/`NoUpdate` markers).
pub struct MutationBuilder<E, C = NoCreate, U = NoUpdate> {
    table: &'static str,
    base_route: MethodRouter<AppState>,
    id_route: MethodRouter<AppState>,
    actions: Vec<(&'static str, MethodRouter<AppState>)>,
    _phantom: PhantomData<fn() -> (E, C, U)>,
}

impl<E: TS + Send + Sync + 'static> MutationBuilder<E, NoCreate, NoUpdate> {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            base_route: MethodRouter::new(),
            id_route: MethodRouter::new(),
            actions: Vec::new(),
            _phantom: PhantomData,
        }
    }
}

impl<E: TS, C, U> MutationBuilder<E, C, U> {
    /// GET /{table}
    pub fn list<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, AppState> + Clone + Send + 'static,
        T: 'static,
    {
        self.base_route = self.base_route.get(handler);
        self
    }

    /// GET /{table}/{id}
    pub fn get<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, AppState> + Clone + Send + 'static,
        T: 'static,
    {
        self.id_route = self.id_route.get(handler);
        self
    }

    /// DELETE /{table}/{id}
    pub fn delete<H, T>(mut self, handler: H) -> Self
    where
        H: Handler<T, AppState> + Clone + Send + 'static,
        T: 'static,
    {
        self.id_route = self.id_route.delete(handler);
        self
    }

    /// Any method on /{table}/{id}/{name}.
    pub fn action(mut self, name: &'static str, route: MethodRouter<AppState>) -> Self {
        self.actions.push((name, route));
        self
    }

    pub fn router(self) -> axum::Router<AppState> {
        let base_path = format!("/{}", self.table);
        let id_path = format!("/{}/{{id}}", self.table);

        let mut router = axum::Router::new()
            .route(&base_path, self.base_route)
            .route(&id_path, self.id_route);
        for (name, route) in self.actions {
            router = router.route(&format!("/{}/{{id}}/{name}", self.table), route);
        }
        router
    }
}

impl<E: TS, U> MutationBuilder<E, NoCreate, U> {
    /// POST /{table}
    pub fn create<C, H, T>(self, handler: H) -> MutationBuilder<E, C, U>
    where
        C: TS,
        H: Handler<T, AppState> + Clone + Send + 'static,
        T: HasJsonPayload<C> + 'static,
    {
        MutationBuilder {
            table: self.table,
            base_route: self.base_route.post(handler),
            id_route: self.id_route,
            actions: self.actions,
            _phantom: PhantomData,
        }
    }
}

impl<E: TS, C> MutationBuilder<E, C, NoUpdate> {
    /// PATCH /{table}/{id}
    pub fn update<U, H, T>(self, handler: H) -> MutationBuilder<E, C, U>
    where
        U: TS,
        H: Handler<T, AppState> + Clone + Send + 'static,
        T: HasJsonPayload<U> + 'static,
    {
        MutationBuilder {
            table: self.table,
            base_route: self.base_route,
            id_route: self.id_route.patch(handler),
            actions: self.actions,
            _phantom: PhantomData,
        }
    }
}

impl<E: TS, C: PayloadType, U: PayloadType> MutationBuilder<E, C, U> {
    pub fn definition(&self) -> MutationDefinition {
        MutationDefinition {
            table: self.table,
            row_type: E::name(),
            create_type: C::type_name(),
            update_type: U::type_name(),
            actions: self.actions.iter().map(|(name, _)| *name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use api_types::{CreateCustomerRequest, Customer, UpdateCustomerRequest};
    use axum::routing::post;

    use super::*;

    async fn noop() {}

    #[test]
    fn definition_names_declared_payloads() {
        let definition = MutationBuilder::<Customer>::new("customers")
            .action("notes", post(noop))
            .definition();
        assert_eq!(definition.row_type, "Customer");
        assert_eq!(definition.create_type, None);
        assert_eq!(definition.update_type, None);
        assert_eq!(definition.actions, vec!["notes"]);

        assert_eq!(CreateCustomerRequest::type_name().as_deref(), Some("CreateCustomerRequest"));
        assert_eq!(UpdateCustomerRequest::type_name().as_deref(), Some("UpdateCustomerRequest"));
    }
}
