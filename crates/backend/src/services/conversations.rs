//! Conversation lifecycle: creation, assignment, status transitions, read
//! state and soft deletion. Every mutation is published on the business's
//! conversation topic.

use api_types::{
    AssignConversationRequest, AssignmentType, ChangeTable, Conversation, ConversationFilters,
    ConversationStatus, ConversationWithRelations, CreateConversationRequest, Topic,
    UpdateConversationRequest,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ServiceError;
use crate::{
    gateway::{ConversationChanges, Gateway, NewConversation},
    notifier::AssignmentNotifier,
    realtime::{ChangeSink, publish_delete, publish_insert, publish_update},
};

pub struct ConversationService<'a> {
    gateway: &'a Gateway,
    sink: &'a dyn ChangeSink,
    notifier: &'a AssignmentNotifier,
}

impl<'a> ConversationService<'a> {
    pub fn new(
        gateway: &'a Gateway,
        sink: &'a dyn ChangeSink,
        notifier: &'a AssignmentNotifier,
    ) -> Self {
        Self {
            gateway,
            sink,
            notifier,
        }
    }

    pub async fn list(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, ServiceError> {
        Ok(self
            .gateway
            .conversations
            .list_conversations(business_id, filters)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ConversationWithRelations, ServiceError> {
        self.gateway
            .conversations
            .find_conversation_with_relations(id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))
    }

    /// The bare row, for access checks.
    pub async fn find(&self, id: Uuid) -> Result<Conversation, ServiceError> {
        self.gateway
            .conversations
            .find_conversation(id)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))
    }

    pub async fn create(
        &self,
        business_id: Uuid,
        request: CreateConversationRequest,
    ) -> Result<Conversation, ServiceError> {
        let customer = self
            .gateway
            .customers
            .find_customer(request.customer_id)
            .await?
            .filter(|customer| customer.business_id == business_id)
            .ok_or(ServiceError::NotFound("customer"))?;

        if let Some(member_id) = request.assigned_to {
            self.ensure_business_member(business_id, member_id).await?;
        }

        let conversation = self
            .gateway
            .conversations
            .insert_conversation(NewConversation::from_request(customer.business_id, request))
            .await?;

        publish_insert(
            self.sink,
            Topic::BusinessConversations(business_id),
            ChangeTable::Conversations,
            &conversation,
        );
        if let Some(member_id) = conversation.assigned_to {
            self.notifier.dispatch(business_id, conversation.id, member_id);
        }
        Ok(conversation)
    }

    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateConversationRequest,
    ) -> Result<Conversation, ServiceError> {
        let now = Utc::now();
        let changes = ConversationChanges {
            platform_conversation_id: request.platform_conversation_id,
            subject: request.subject,
            priority: request.priority,
            status: request.status,
            tags: request.tags,
            resolved_at: resolved_stamp(request.status, now),
            ..Default::default()
        };
        self.apply(id, changes).await
    }

    /// Points the conversation at a team member, the bot or nobody. Target
    /// and type are written together; a team member target must belong to
    /// the conversation's business.
    pub async fn assign(
        &self,
        id: Uuid,
        request: AssignConversationRequest,
    ) -> Result<Conversation, ServiceError> {
        let current = self.find(id).await?;

        let target = match request.assignment_type {
            AssignmentType::Unassigned => None,
            AssignmentType::TeamMember => Some(request.team_member_id.ok_or_else(|| {
                ServiceError::Validation(
                    "team_member_id is required for team_member assignment".to_string(),
                )
            })?),
            AssignmentType::AiBot | AssignmentType::RoundRobin => request.team_member_id,
        };

        if let Some(member_id) = target {
            self.ensure_business_member(current.business_id, member_id)
                .await?;
        }

        let conversation = self
            .apply_from(
                &current,
                ConversationChanges {
                    assignment: Some((target, request.assignment_type)),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(member_id) = target {
            self.notifier
                .dispatch(conversation.business_id, conversation.id, member_id);
        }
        Ok(conversation)
    }

    /// Any status may follow any other. Resolving stamps `resolved_at` once;
    /// later transitions never clear it.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<Conversation, ServiceError> {
        self.apply(
            id,
            ConversationChanges {
                status: Some(status),
                resolved_at: resolved_stamp(Some(status), Utc::now()),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn mark_as_read(&self, id: Uuid) -> Result<Conversation, ServiceError> {
        self.apply(
            id,
            ConversationChanges {
                unread_count: Some(0),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let conversation = self
            .gateway
            .conversations
            .soft_delete_conversation(id, Utc::now())
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        publish_delete(
            self.sink,
            Topic::BusinessConversations(conversation.business_id),
            ChangeTable::Conversations,
            &conversation,
        );
        Ok(())
    }

    /// Counts a newly stored message against the conversation.
    pub async fn record_message(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        from_customer: bool,
    ) -> Result<Conversation, ServiceError> {
        let conversation = self
            .gateway
            .conversations
            .record_conversation_message(id, at, from_customer)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        publish_update(
            self.sink,
            Topic::BusinessConversations(conversation.business_id),
            ChangeTable::Conversations,
            &conversation,
            None,
        );
        Ok(conversation)
    }

    async fn apply(&self, id: Uuid, changes: ConversationChanges) -> Result<Conversation, ServiceError> {
        let current = self.find(id).await?;
        self.apply_from(&current, changes).await
    }

    async fn apply_from(
        &self,
        current: &Conversation,
        changes: ConversationChanges,
    ) -> Result<Conversation, ServiceError> {
        let conversation = self
            .gateway
            .conversations
            .update_conversation(current.id, changes)
            .await?
            .ok_or(ServiceError::NotFound("conversation"))?;

        publish_update(
            self.sink,
            Topic::BusinessConversations(conversation.business_id),
            ChangeTable::Conversations,
            &conversation,
            Some(current),
        );
        Ok(conversation)
    }

    async fn ensure_business_member(
        &self,
        business_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), ServiceError> {
        match self.gateway.team.find_member(member_id).await? {
            Some(member) if member.member.business_id == business_id => Ok(()),
            _ => Err(ServiceError::NotFound("team member")),
        }
    }
}

fn resolved_stamp(status: Option<ConversationStatus>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (status == Some(ConversationStatus::Resolved)).then_some(now)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use api_types::{
        ChangeEvent, ChangeEventType, CreateBusinessRequest, CreateCustomerRequest,
        InviteTeamMemberRequest, MemberRole, Platform,
    };

    use super::*;
    use crate::services::{BusinessService, CustomerService, TeamService};

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<(Topic, ChangeEvent)>>,
    }

    impl RecordingSink {
        pub(crate) fn kinds(&self) -> Vec<ChangeEventType> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(_, event)| event.event_type)
                .collect()
        }
    }

    impl ChangeSink for RecordingSink {
        fn publish(&self, topic: Topic, event: ChangeEvent) {
            self.events.lock().unwrap().push((topic, event));
        }
    }

    pub(crate) struct Fixture {
        pub(crate) gateway: Gateway,
        pub(crate) sink: RecordingSink,
        pub(crate) notifier: AssignmentNotifier,
        pub(crate) business_id: Uuid,
        pub(crate) owner_id: Uuid,
        pub(crate) customer_id: Uuid,
    }

    impl Fixture {
        pub(crate) async fn new() -> Self {
            let gateway = Gateway::memory();
            let owner = gateway
                .users
                .provision_user(Uuid::new_v4(), "owner@acme.com")
                .await
                .unwrap();
            let business = BusinessService::new(&gateway)
                .create(
                    owner.id,
                    CreateBusinessRequest {
                        name: "Acme".into(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let customer = CustomerService::new(&gateway)
                .create(
                    business.id,
                    CreateCustomerRequest {
                        name: Some("Ada".into()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            let notifier = AssignmentNotifier::new(gateway.clone());
            Self {
                gateway,
                sink: RecordingSink::default(),
                notifier,
                business_id: business.id,
                owner_id: owner.id,
                customer_id: customer.id,
            }
        }

        pub(crate) fn conversations(&self) -> ConversationService<'_> {
            ConversationService::new(&self.gateway, &self.sink, &self.notifier)
        }

        pub(crate) async fn conversation(&self) -> Conversation {
            self.conversations()
                .create(
                    self.business_id,
                    CreateConversationRequest {
                        customer_id: self.customer_id,
                        platform: Platform::Whatsapp,
                        platform_conversation_id: None,
                        subject: Some("Order #1001".into()),
                        priority: None,
                        assigned_to: None,
                    },
                )
                .await
                .unwrap()
        }

        pub(crate) async fn agent(&self, email: &str) -> (Uuid, Uuid) {
            let invited = TeamService::new(&self.gateway)
                .invite(
                    self.business_id,
                    InviteTeamMemberRequest {
                        email: email.to_string(),
                        full_name: None,
                        role: MemberRole::Agent,
                        department: None,
                        title: None,
                    },
                )
                .await
                .unwrap();
            (invited.member.id, invited.user.id)
        }
    }

    #[tokio::test]
    async fn assigning_a_member_sets_both_fields_and_notifies() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let (member_id, user_id) = fixture.agent("agent@acme.com").await;

        let assigned = fixture
            .conversations()
            .assign(
                conversation.id,
                AssignConversationRequest {
                    team_member_id: Some(member_id),
                    assignment_type: AssignmentType::TeamMember,
                },
            )
            .await
            .unwrap();
        assert_eq!(assigned.assigned_to, Some(member_id));
        assert_eq!(assigned.assigned_type, AssignmentType::TeamMember);

        fixture.notifier.wait_idle().await;
        let notifications = fixture
            .gateway
            .notifications
            .list_notifications(fixture.business_id, user_id)
            .await
            .unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "New conversation assigned");

        let listed = fixture
            .conversations()
            .get(conversation.id)
            .await
            .unwrap();
        assert_eq!(listed.assigned_member.map(|member| member.id), Some(member_id));
    }

    #[tokio::test]
    async fn team_member_assignment_requires_target() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;

        let error = fixture
            .conversations()
            .assign(
                conversation.id,
                AssignConversationRequest {
                    team_member_id: None,
                    assignment_type: AssignmentType::TeamMember,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn unassigning_ignores_supplied_id() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let (member_id, _) = fixture.agent("agent@acme.com").await;
        let service = fixture.conversations();

        service
            .assign(
                conversation.id,
                AssignConversationRequest {
                    team_member_id: Some(member_id),
                    assignment_type: AssignmentType::TeamMember,
                },
            )
            .await
            .unwrap();
        let cleared = service
            .assign(
                conversation.id,
                AssignConversationRequest {
                    team_member_id: Some(member_id),
                    assignment_type: AssignmentType::Unassigned,
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.assigned_to, None);
        assert_eq!(cleared.assigned_type, AssignmentType::Unassigned);
    }

    #[tokio::test]
    async fn member_of_other_business_is_not_assignable() {
        let fixture = Fixture::new().await;
        let other = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let (foreign_member, _) = other.agent("agent@other.com").await;

        let error = fixture
            .conversations()
            .assign(
                conversation.id,
                AssignConversationRequest {
                    team_member_id: Some(foreign_member),
                    assignment_type: AssignmentType::TeamMember,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::NotFound("team member")));
    }

    #[tokio::test]
    async fn resolved_stamp_is_kept_across_reopen() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let service = fixture.conversations();

        let resolved = service
            .update_status(conversation.id, ConversationStatus::Resolved)
            .await
            .unwrap();
        let stamp = resolved.resolved_at.expect("resolved stamp");

        let reopened = service
            .update_status(conversation.id, ConversationStatus::Open)
            .await
            .unwrap();
        assert_eq!(reopened.status, ConversationStatus::Open);
        assert_eq!(reopened.resolved_at, Some(stamp));

        let again = service
            .update_status(conversation.id, ConversationStatus::Resolved)
            .await
            .unwrap();
        assert_eq!(again.resolved_at, Some(stamp));
    }

    #[tokio::test]
    async fn mark_as_read_is_idempotent() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let service = fixture.conversations();

        service
            .record_message(conversation.id, Utc::now(), true)
            .await
            .unwrap();
        let read = service.mark_as_read(conversation.id).await.unwrap();
        assert_eq!(read.unread_count, 0);
        assert_eq!(read.total_messages, 1);
        let again = service.mark_as_read(conversation.id).await.unwrap();
        assert_eq!(again.unread_count, 0);
    }

    #[tokio::test]
    async fn soft_deleted_conversation_vanishes_and_publishes_delete() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let service = fixture.conversations();

        service.delete(conversation.id).await.unwrap();

        assert!(matches!(
            service.get(conversation.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(
            service
                .list(fixture.business_id, &ConversationFilters::default())
                .await
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            service.delete(conversation.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(
            fixture.sink.kinds(),
            vec![ChangeEventType::Insert, ChangeEventType::Delete]
        );
    }

    #[tokio::test]
    async fn list_orders_by_latest_message_with_silent_conversations_last() {
        let fixture = Fixture::new().await;
        let service = fixture.conversations();
        let silent = fixture.conversation().await;
        let older = fixture.conversation().await;
        let newer = fixture.conversation().await;

        let now = Utc::now();
        service
            .record_message(older.id, now - chrono::Duration::minutes(5), true)
            .await
            .unwrap();
        service.record_message(newer.id, now, true).await.unwrap();

        let ids: Vec<Uuid> = service
            .list(fixture.business_id, &ConversationFilters::default())
            .await
            .unwrap()
            .iter()
            .map(ConversationWithRelations::id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id, silent.id]);
    }

    #[tokio::test]
    async fn customer_of_other_business_is_rejected() {
        let fixture = Fixture::new().await;
        let other = Fixture::new().await;

        let error = fixture
            .conversations()
            .create(
                fixture.business_id,
                CreateConversationRequest {
                    customer_id: other.customer_id,
                    platform: Platform::Email,
                    platform_conversation_id: None,
                    subject: None,
                    priority: None,
                    assigned_to: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::NotFound("customer")));
    }
}
