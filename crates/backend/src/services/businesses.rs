use api_types::{Business, CreateBusinessRequest, MemberRole, UpdateBusinessRequest};
use chrono::Utc;
use serde_json::Value;
use utils::slug::generate_slug;
use uuid::Uuid;

use super::ServiceError;
use crate::gateway::{Gateway, NewTeamMember};

pub struct BusinessService<'a> {
    gateway: &'a Gateway,
}

impl<'a> BusinessService<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Business>, ServiceError> {
        Ok(self.gateway.businesses.list_businesses_for_user(user_id).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Business, ServiceError> {
        self.gateway
            .businesses
            .find_business(id)
            .await?
            .ok_or(ServiceError::NotFound("business"))
    }

    /// Creates the business with `user_id` as its active owner.
    pub async fn create(
        &self,
        user_id: Uuid,
        request: CreateBusinessRequest,
    ) -> Result<Business, ServiceError> {
        if request.name.trim().is_empty() {
            return Err(ServiceError::Validation("business name is required".to_string()));
        }
        for (field, value) in [("settings", &request.settings), ("metadata", &request.metadata)] {
            if value.as_ref().is_some_and(|value| !value.is_object()) {
                return Err(ServiceError::Validation(format!("{field} must be an object")));
            }
        }

        let slug = generate_slug(&request.name);
        let owner = NewTeamMember {
            business_id: Uuid::nil(),
            user_id,
            role: MemberRole::Owner,
            permissions: MemberRole::Owner.default_permissions(),
            department: None,
            title: None,
            joined_at: Some(Utc::now()),
        };

        Ok(self
            .gateway
            .businesses
            .create_business(&slug, request, owner)
            .await?)
    }

    pub async fn update(
        &self,
        id: Uuid,
        changes: UpdateBusinessRequest,
    ) -> Result<Business, ServiceError> {
        if changes.metadata.as_ref().is_some_and(|value| !value.is_object()) {
            return Err(ServiceError::Validation("metadata must be an object".to_string()));
        }
        self.gateway
            .businesses
            .update_business(id, changes)
            .await?
            .ok_or(ServiceError::NotFound("business"))
    }

    /// Shallow-merges `patch` into the stored settings: top-level keys of the
    /// patch replace the stored ones, everything else is kept.
    pub async fn update_settings(&self, id: Uuid, patch: Value) -> Result<Business, ServiceError> {
        let Value::Object(patch) = patch else {
            return Err(ServiceError::Validation("settings must be an object".to_string()));
        };

        let business = self.get(id).await?;
        let mut settings = match business.settings {
            Value::Object(existing) => existing,
            _ => Default::default(),
        };
        settings.extend(patch);

        self.gateway
            .businesses
            .replace_business_settings(id, Value::Object(settings))
            .await?
            .ok_or(ServiceError::NotFound("business"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if self
            .gateway
            .businesses
            .soft_delete_business(id, Utc::now())
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound("business"))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn acme(gateway: &Gateway) -> (Business, Uuid) {
        let owner = gateway
            .users
            .provision_user(Uuid::new_v4(), "owner@acme.com")
            .await
            .unwrap();
        let business = BusinessService::new(gateway)
            .create(
                owner.id,
                CreateBusinessRequest {
                    name: "Acme Store!".into(),
                    settings: Some(json!({"timezone": "UTC", "theme": "light"})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (business, owner.id)
    }

    #[tokio::test]
    async fn creator_becomes_owner() {
        let gateway = Gateway::memory();
        let (business, owner_id) = acme(&gateway).await;

        assert_eq!(business.slug, "acme-store");
        let membership = gateway
            .team
            .find_membership(business.id, owner_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, MemberRole::Owner);
        assert!(membership.is_active);
        assert!(membership.permissions.billing.edit);

        let listed = BusinessService::new(&gateway)
            .list_for_user(owner_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn settings_are_merged_shallowly() {
        let gateway = Gateway::memory();
        let (business, _) = acme(&gateway).await;

        let updated = BusinessService::new(&gateway)
            .update_settings(business.id, json!({"theme": "dark", "locale": "en"}))
            .await
            .unwrap();
        assert_eq!(
            updated.settings,
            json!({"timezone": "UTC", "theme": "dark", "locale": "en"})
        );
    }

    #[tokio::test]
    async fn non_object_settings_are_rejected() {
        let gateway = Gateway::memory();
        let (business, _) = acme(&gateway).await;

        let error = BusinessService::new(&gateway)
            .update_settings(business.id, json!(["nope"]))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn deleted_business_disappears() {
        let gateway = Gateway::memory();
        let (business, owner_id) = acme(&gateway).await;
        let service = BusinessService::new(&gateway);

        service.delete(business.id).await.unwrap();
        assert!(matches!(
            service.get(business.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.list_for_user(owner_id).await.unwrap().is_empty());
        assert!(matches!(
            service.delete(business.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
