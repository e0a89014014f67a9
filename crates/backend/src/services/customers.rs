use api_types::{
    Conversation, CreateCustomerRequest, Customer, CustomerFilters, Platform,
    UpdateCustomerRequest,
};
use chrono::Utc;
use uuid::Uuid;

use super::ServiceError;
use crate::gateway::Gateway;

pub struct CustomerService<'a> {
    gateway: &'a Gateway,
}

impl<'a> CustomerService<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(
        &self,
        business_id: Uuid,
        filters: &CustomerFilters,
    ) -> Result<Vec<Customer>, ServiceError> {
        Ok(self
            .gateway
            .customers
            .list_customers(business_id, filters)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Customer, ServiceError> {
        self.gateway
            .customers
            .find_customer(id)
            .await?
            .ok_or(ServiceError::NotFound("customer"))
    }

    pub async fn create(
        &self,
        business_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<Customer, ServiceError> {
        let request = CreateCustomerRequest {
            tags: request.tags.map(dedupe),
            ..request
        };
        Ok(self
            .gateway
            .customers
            .insert_customer(business_id, request)
            .await?)
    }

    pub async fn update(
        &self,
        id: Uuid,
        mut changes: UpdateCustomerRequest,
    ) -> Result<Customer, ServiceError> {
        validate_scores(
            changes.sentiment_score.flatten(),
            changes.satisfaction_rating.flatten(),
        )?;
        changes.tags = changes.tags.map(dedupe);
        self.gateway
            .customers
            .update_customer(id, changes)
            .await?
            .ok_or(ServiceError::NotFound("customer"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if self
            .gateway
            .customers
            .soft_delete_customer(id, Utc::now())
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound("customer"))
        }
    }

    /// Returns the customer owning `(platform, platform_id)` or creates one.
    /// Lookup and insert are not atomic; two concurrent first contacts can
    /// create two customers.
    pub async fn find_or_create_by_platform(
        &self,
        business_id: Uuid,
        platform: Platform,
        platform_id: &str,
        data: Option<CreateCustomerRequest>,
    ) -> Result<Customer, ServiceError> {
        if platform_id.trim().is_empty() {
            return Err(ServiceError::Validation("platform id is required".to_string()));
        }

        if let Some(existing) = self
            .gateway
            .customers
            .find_customer_by_platform(business_id, platform, platform_id)
            .await?
        {
            return Ok(existing);
        }

        let data = data.unwrap_or_default();
        let mut identifiers = data.platform_identifiers.clone().unwrap_or_default();
        *identifiers.slot_mut(platform) = Some(platform_id.to_string());

        self.create(
            business_id,
            CreateCustomerRequest {
                platform_identifiers: Some(identifiers),
                ..data
            },
        )
        .await
    }

    pub async fn add_note(&self, id: Uuid, note: &str) -> Result<Customer, ServiceError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(ServiceError::Validation("note must not be empty".to_string()));
        }
        let customer = self.get(id).await?;
        self.update(
            id,
            UpdateCustomerRequest {
                notes: Some(Some(customer.appended_notes(note))),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn add_tags(&self, id: Uuid, tags: &[String]) -> Result<Customer, ServiceError> {
        let customer = self.get(id).await?;
        self.replace_tags(id, customer.merged_tags(tags)).await
    }

    pub async fn remove_tags(&self, id: Uuid, tags: &[String]) -> Result<Customer, ServiceError> {
        let customer = self.get(id).await?;
        self.replace_tags(id, customer.without_tags(tags)).await
    }

    async fn replace_tags(&self, id: Uuid, tags: Vec<String>) -> Result<Customer, ServiceError> {
        self.update(
            id,
            UpdateCustomerRequest {
                tags: Some(tags),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn conversations(&self, id: Uuid) -> Result<Vec<Conversation>, ServiceError> {
        let customer = self.get(id).await?;
        Ok(self
            .gateway
            .conversations
            .list_customer_conversations(customer.id)
            .await?)
    }
}

fn dedupe(tags: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !unique.contains(&tag) {
            unique.push(tag);
        }
    }
    unique
}

fn validate_scores(sentiment: Option<f64>, rating: Option<i32>) -> Result<(), ServiceError> {
    if sentiment.is_some_and(|score| !(-1.0..=1.0).contains(&score)) {
        return Err(ServiceError::Validation(
            "sentiment_score must be between -1 and 1".to_string(),
        ));
    }
    if rating.is_some_and(|rating| !(1..=5).contains(&rating)) {
        return Err(ServiceError::Validation(
            "satisfaction_rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use api_types::PlatformIdentifiers;

    use super::*;

    #[tokio::test]
    async fn find_or_create_is_stable_per_platform_id() {
        let gateway = Gateway::memory();
        let service = CustomerService::new(&gateway);
        let business_id = Uuid::new_v4();

        let first = service
            .find_or_create_by_platform(business_id, Platform::Whatsapp, "+15550001", None)
            .await
            .unwrap();
        let second = service
            .find_or_create_by_platform(business_id, Platform::Whatsapp, "+15550001", None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(
            first.platform_identifiers,
            PlatformIdentifiers::single(Platform::Whatsapp, "+15550001")
        );

        let other_platform = service
            .find_or_create_by_platform(business_id, Platform::Telegram, "+15550001", None)
            .await
            .unwrap();
        assert_ne!(other_platform.id, first.id);
    }

    #[tokio::test]
    async fn soft_deleted_customer_is_not_reused() {
        let gateway = Gateway::memory();
        let service = CustomerService::new(&gateway);
        let business_id = Uuid::new_v4();

        let first = service
            .find_or_create_by_platform(business_id, Platform::Sms, "42", None)
            .await
            .unwrap();
        service.delete(first.id).await.unwrap();

        let replacement = service
            .find_or_create_by_platform(business_id, Platform::Sms, "42", None)
            .await
            .unwrap();
        assert_ne!(replacement.id, first.id);
        assert!(matches!(
            service.get(first.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn notes_and_tags_accumulate() {
        let gateway = Gateway::memory();
        let service = CustomerService::new(&gateway);
        let customer = service
            .create(
                Uuid::new_v4(),
                CreateCustomerRequest {
                    name: Some("Ada".into()),
                    tags: Some(vec!["vip".into(), "vip".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(customer.tags, vec!["vip"]);

        service.add_note(customer.id, "first order").await.unwrap();
        let noted = service.add_note(customer.id, "asked for refund").await.unwrap();
        assert_eq!(
            noted.notes.as_deref(),
            Some("first order\n\n---\n\nasked for refund")
        );

        let tagged = service
            .add_tags(customer.id, &["returning".into(), "vip".into()])
            .await
            .unwrap();
        assert_eq!(tagged.tags, vec!["vip", "returning"]);

        let untagged = service
            .remove_tags(customer.id, &["vip".into(), "absent".into()])
            .await
            .unwrap();
        assert_eq!(untagged.tags, vec!["returning"]);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let gateway = Gateway::memory();
        let service = CustomerService::new(&gateway);
        let customer = service
            .create(Uuid::new_v4(), CreateCustomerRequest::default())
            .await
            .unwrap();

        let error = service
            .update(
                customer.id,
                UpdateCustomerRequest {
                    satisfaction_rating: Some(Some(9)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation(_)));
    }
}
