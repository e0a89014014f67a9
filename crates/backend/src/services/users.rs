use api_types::{Notification, PresenceStatus, User};
use chrono::Utc;
use uuid::Uuid;

use super::ServiceError;
use crate::gateway::Gateway;

pub struct UserService<'a> {
    gateway: &'a Gateway,
}

impl<'a> UserService<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    pub async fn me(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.gateway
            .users
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    /// Persists the presence status and refreshes `last_seen_at`.
    pub async fn set_status(
        &self,
        user_id: Uuid,
        status: PresenceStatus,
    ) -> Result<User, ServiceError> {
        self.gateway
            .users
            .set_user_status(user_id, status, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("user"))
    }

    pub async fn list_notifications(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self
            .gateway
            .notifications
            .list_notifications(business_id, user_id)
            .await?)
    }

    /// Marks one of the caller's notifications read. Notifications of other
    /// users are reported as missing.
    pub async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, ServiceError> {
        self.gateway
            .notifications
            .mark_notification_read(id, user_id, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("notification"))
    }
}

#[cfg(test)]
mod tests {
    use api_types::NewNotification;

    use super::*;

    #[tokio::test]
    async fn status_change_refreshes_last_seen() {
        let gateway = Gateway::memory();
        let user = gateway
            .users
            .provision_user(Uuid::new_v4(), "ada@acme.com")
            .await
            .unwrap();
        assert_eq!(user.status, PresenceStatus::Offline);

        let online = UserService::new(&gateway)
            .set_status(user.id, PresenceStatus::Online)
            .await
            .unwrap();
        assert_eq!(online.status, PresenceStatus::Online);
        assert!(online.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn foreign_notification_cannot_be_marked() {
        let gateway = Gateway::memory();
        let business_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let notification = gateway
            .notifications
            .insert_notification(NewNotification::conversation_assigned(
                business_id,
                owner,
                Uuid::new_v4(),
            ))
            .await
            .unwrap();
        let service = UserService::new(&gateway);

        assert!(matches!(
            service
                .mark_notification_read(notification.id, Uuid::new_v4())
                .await,
            Err(ServiceError::NotFound("notification"))
        ));

        let read = service
            .mark_notification_read(notification.id, owner)
            .await
            .unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(
            service.list_notifications(business_id, owner).await.unwrap().len(),
            1
        );
    }
}
