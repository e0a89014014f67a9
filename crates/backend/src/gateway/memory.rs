//! In-process gateway used by tests and `BACKEND_STORAGE=memory`.
//!
//! Rows live in `DashMap`s keyed by id. Each row remembers its insertion
//! sequence so listings break timestamp ties the way an append-only table
//! would. Uniqueness that Postgres enforces with constraints (user e-mail,
//! one membership per business and user) is enforced here with index maps.

use std::sync::atomic::{AtomicU64, Ordering};

use api_types::{
    AssignedMember, AssignmentType, Business, Conversation, ConversationFilters, ConversationWithRelations,
    CreateBusinessRequest, CreateCustomerRequest, Customer, CustomerFilters, Message,
    MessageStatus, NewNotification, Notification, Platform, PresenceStatus, TeamMember,
    TeamMemberWithUser, UpdateBusinessRequest, UpdateCustomerRequest, UpdateTeamMemberRequest,
    User, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    BusinessStore, ConversationChanges, ConversationStore, CustomerStore, GatewayError,
    MessageStore, NewConversation, NewMessage, NewTeamMember, NotificationStore, TeamStore,
    UserStore,
};

struct Row<T> {
    seq: u64,
    value: T,
}

struct Table<T> {
    rows: DashMap<Uuid, Row<T>>,
    seq: AtomicU64,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }
}

impl<T: Clone> Table<T> {
    fn insert(&self, id: Uuid, value: T) -> T {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.rows.insert(
            id,
            Row {
                seq,
                value: value.clone(),
            },
        );
        value
    }

    fn get(&self, id: Uuid) -> Option<T> {
        self.rows.get(&id).map(|row| row.value.clone())
    }

    fn find(&self, id: Uuid, predicate: impl FnOnce(&T) -> bool) -> Option<T> {
        self.get(id).filter(predicate)
    }

    /// Mutates the row when `predicate` holds and returns the new value.
    fn modify(
        &self,
        id: Uuid,
        predicate: impl FnOnce(&T) -> bool,
        apply: impl FnOnce(&mut T),
    ) -> Option<T> {
        let mut row = self.rows.get_mut(&id)?;
        if !predicate(&row.value) {
            return None;
        }
        apply(&mut row.value);
        Some(row.value.clone())
    }

    fn remove(&self, id: Uuid) -> Option<T> {
        self.rows.remove(&id).map(|(_, row)| row.value)
    }

    /// Matching rows in insertion order.
    fn scan(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut rows: Vec<(u64, T)> = self
            .rows
            .iter()
            .filter(|row| predicate(&row.value))
            .map(|row| (row.seq, row.value.clone()))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, value)| value).collect()
    }
}

#[derive(Default)]
pub struct MemoryGateway {
    users: Table<User>,
    users_by_email: DashMap<String, Uuid>,
    businesses: Table<Business>,
    members: Table<TeamMember>,
    memberships: DashMap<(Uuid, Uuid), Uuid>,
    customers: Table<Customer>,
    conversations: Table<Conversation>,
    messages: Table<Message>,
    notifications: Table<Notification>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl MemoryGateway {
    fn profile(&self, user_id: Uuid) -> Result<UserProfile, GatewayError> {
        self.users
            .get(user_id)
            .map(UserProfile::from)
            .ok_or_else(|| {
                GatewayError::Unavailable(format!("membership references missing user {user_id}"))
            })
    }

    fn with_user(&self, member: TeamMember) -> Result<TeamMemberWithUser, GatewayError> {
        let user = self.profile(member.user_id)?;
        Ok(TeamMemberWithUser { member, user })
    }

    fn with_relations(&self, conversation: Conversation) -> ConversationWithRelations {
        let customer = self.customers.get(conversation.customer_id);
        let assigned_member = conversation
            .assigned_to
            .and_then(|member_id| self.members.get(member_id))
            .and_then(|member| {
                let user = self.profile(member.user_id).ok()?;
                Some(AssignedMember {
                    id: member.id,
                    role: member.role,
                    user,
                })
            });
        ConversationWithRelations {
            conversation,
            customer,
            assigned_member,
        }
    }

    fn build_member(&self, member: NewTeamMember) -> Result<TeamMember, GatewayError> {
        let id = Uuid::new_v4();
        match self.memberships.entry((member.business_id, member.user_id)) {
            Entry::Occupied(_) => return Err(GatewayError::Duplicate("team membership")),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let now = Utc::now();
        Ok(self.members.insert(
            id,
            TeamMember {
                id,
                business_id: member.business_id,
                user_id: member.user_id,
                role: member.role,
                permissions: member.permissions,
                department: member.department,
                title: member.title,
                is_active: true,
                joined_at: member.joined_at,
                created_at: now,
                updated_at: now,
            },
        ))
    }

    fn rekey_user(&self, from: Uuid, to: Uuid) {
        if let Some(mut user) = self.users.remove(from) {
            user.id = to;
            self.users_by_email.insert(user.email.clone(), to);
            self.users.insert(to, user);
        }
        for member in self.members.scan(|member| member.user_id == from) {
            self.memberships.remove(&(member.business_id, from));
            self.memberships.insert((member.business_id, to), member.id);
            self.members.modify(member.id, |_| true, |row| row.user_id = to);
        }
        for notification in self.notifications.scan(|row| row.user_id == from) {
            self.notifications
                .modify(notification.id, |_| true, |row| row.user_id = to);
        }
    }
}

#[async_trait]
impl UserStore for MemoryGateway {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, GatewayError> {
        Ok(self.users.get(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, GatewayError> {
        let id = self.users_by_email.get(email).map(|entry| *entry.value());
        Ok(id.and_then(|id| self.users.get(id)))
    }

    async fn create_placeholder_user(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<User, GatewayError> {
        let id = Uuid::new_v4();
        match self.users_by_email.entry(email.to_string()) {
            Entry::Occupied(_) => return Err(GatewayError::Duplicate("user")),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        Ok(self.users.insert(
            id,
            User {
                id,
                email: email.to_string(),
                full_name: full_name.map(str::to_string),
                avatar_url: None,
                status: PresenceStatus::Offline,
                last_seen_at: None,
                created_at: Utc::now(),
            },
        ))
    }

    async fn provision_user(&self, id: Uuid, email: &str) -> Result<User, GatewayError> {
        if let Some(user) = self.users.get(id) {
            return Ok(user);
        }

        let existing = self.users_by_email.get(email).map(|entry| *entry.value());
        if let Some(placeholder) = existing {
            self.rekey_user(placeholder, id);
            return self
                .users
                .get(id)
                .ok_or_else(|| GatewayError::Unavailable(format!("user {id} vanished")));
        }

        self.users_by_email.insert(email.to_string(), id);
        Ok(self.users.insert(
            id,
            User {
                id,
                email: email.to_string(),
                full_name: None,
                avatar_url: None,
                status: PresenceStatus::Offline,
                last_seen_at: None,
                created_at: Utc::now(),
            },
        ))
    }

    async fn set_user_status(
        &self,
        id: Uuid,
        status: PresenceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, GatewayError> {
        Ok(self.users.modify(
            id,
            |_| true,
            |user| {
                user.status = status;
                user.last_seen_at = Some(at);
            },
        ))
    }
}

#[async_trait]
impl BusinessStore for MemoryGateway {
    async fn list_businesses_for_user(&self, user_id: Uuid) -> Result<Vec<Business>, GatewayError> {
        let memberships = self
            .members
            .scan(|member| member.user_id == user_id && member.is_active);
        Ok(memberships
            .into_iter()
            .filter_map(|member| {
                self.businesses
                    .find(member.business_id, |business| business.deleted_at.is_none())
            })
            .collect())
    }

    async fn find_business(&self, id: Uuid) -> Result<Option<Business>, GatewayError> {
        Ok(self
            .businesses
            .find(id, |business| business.deleted_at.is_none()))
    }

    async fn create_business(
        &self,
        slug: &str,
        request: CreateBusinessRequest,
        owner: NewTeamMember,
    ) -> Result<Business, GatewayError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let business = self.businesses.insert(
            id,
            Business {
                id,
                name: request.name,
                slug: slug.to_string(),
                email: request.email,
                phone: request.phone,
                website: request.website,
                settings: request.settings.unwrap_or_else(empty_object),
                metadata: request.metadata.unwrap_or_else(empty_object),
                plan_type: Default::default(),
                subscription_status: Default::default(),
                deleted_at: None,
                created_at: now,
                updated_at: now,
            },
        );

        if let Err(error) = self.build_member(NewTeamMember {
            business_id: id,
            ..owner
        }) {
            self.businesses.remove(id);
            return Err(error);
        }

        Ok(business)
    }

    async fn update_business(
        &self,
        id: Uuid,
        changes: UpdateBusinessRequest,
    ) -> Result<Option<Business>, GatewayError> {
        Ok(self.businesses.modify(
            id,
            |business| business.deleted_at.is_none(),
            |business| {
                if let Some(name) = changes.name {
                    business.name = name;
                }
                if let Some(email) = changes.email {
                    business.email = email;
                }
                if let Some(phone) = changes.phone {
                    business.phone = phone;
                }
                if let Some(website) = changes.website {
                    business.website = website;
                }
                if let Some(metadata) = changes.metadata {
                    business.metadata = metadata;
                }
                if let Some(plan_type) = changes.plan_type {
                    business.plan_type = plan_type;
                }
                if let Some(subscription_status) = changes.subscription_status {
                    business.subscription_status = subscription_status;
                }
                business.updated_at = Utc::now();
            },
        ))
    }

    async fn replace_business_settings(
        &self,
        id: Uuid,
        settings: Value,
    ) -> Result<Option<Business>, GatewayError> {
        Ok(self.businesses.modify(
            id,
            |business| business.deleted_at.is_none(),
            |business| {
                business.settings = settings;
                business.updated_at = Utc::now();
            },
        ))
    }

    async fn soft_delete_business(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError> {
        Ok(self
            .businesses
            .modify(
                id,
                |business| business.deleted_at.is_none(),
                |business| business.deleted_at = Some(at),
            )
            .is_some())
    }
}

#[async_trait]
impl TeamStore for MemoryGateway {
    async fn list_members(&self, business_id: Uuid) -> Result<Vec<TeamMemberWithUser>, GatewayError> {
        let mut members = self
            .members
            .scan(|member| member.business_id == business_id);
        members.reverse();
        members.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        members
            .into_iter()
            .map(|member| self.with_user(member))
            .collect()
    }

    async fn find_member(&self, id: Uuid) -> Result<Option<TeamMemberWithUser>, GatewayError> {
        self.members
            .get(id)
            .map(|member| self.with_user(member))
            .transpose()
    }

    async fn find_membership(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, GatewayError> {
        let id = self
            .memberships
            .get(&(business_id, user_id))
            .map(|entry| *entry.value());
        Ok(id.and_then(|id| self.members.get(id)))
    }

    async fn insert_member(&self, member: NewTeamMember) -> Result<TeamMember, GatewayError> {
        self.build_member(member)
    }

    async fn update_member(
        &self,
        id: Uuid,
        changes: UpdateTeamMemberRequest,
    ) -> Result<Option<TeamMember>, GatewayError> {
        Ok(self.members.modify(
            id,
            |_| true,
            |member| {
                if let Some(role) = changes.role {
                    member.role = role;
                }
                if let Some(permissions) = changes.permissions {
                    member.permissions = permissions;
                }
                if let Some(department) = changes.department {
                    member.department = department;
                }
                if let Some(title) = changes.title {
                    member.title = title;
                }
                if let Some(is_active) = changes.is_active {
                    member.is_active = is_active;
                }
                member.updated_at = Utc::now();
            },
        ))
    }

    async fn delete_member(&self, id: Uuid) -> Result<bool, GatewayError> {
        let Some(member) = self.members.remove(id) else {
            return Ok(false);
        };
        self.memberships.remove(&(member.business_id, member.user_id));
        for conversation in self.conversations.scan(|row| row.assigned_to == Some(id)) {
            self.conversations.modify(
                conversation.id,
                |_| true,
                |row| {
                    row.assigned_to = None;
                    if row.assigned_type == AssignmentType::TeamMember {
                        row.assigned_type = AssignmentType::Unassigned;
                    }
                    row.updated_at = Utc::now();
                },
            );
        }
        Ok(true)
    }
}

#[async_trait]
impl CustomerStore for MemoryGateway {
    async fn list_customers(
        &self,
        business_id: Uuid,
        filters: &CustomerFilters,
    ) -> Result<Vec<Customer>, GatewayError> {
        let mut customers = self.customers.scan(|customer| {
            customer.business_id == business_id
                && customer.deleted_at.is_none()
                && filters.matches(customer)
        });
        customers.reverse();
        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(customers)
    }

    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, GatewayError> {
        Ok(self
            .customers
            .find(id, |customer| customer.deleted_at.is_none()))
    }

    async fn find_customer_by_platform(
        &self,
        business_id: Uuid,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Customer>, GatewayError> {
        Ok(self
            .customers
            .scan(|customer| {
                customer.business_id == business_id
                    && customer.deleted_at.is_none()
                    && customer.platform_identifiers.matches(platform, platform_id)
            })
            .into_iter()
            .next())
    }

    async fn insert_customer(
        &self,
        business_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Ok(self.customers.insert(
            id,
            Customer {
                id,
                business_id,
                name: request.name,
                email: request.email,
                phone: request.phone,
                avatar_url: request.avatar_url,
                platform_identifiers: request.platform_identifiers.unwrap_or_default(),
                metadata: request.metadata.unwrap_or_else(empty_object),
                tags: request.tags.unwrap_or_default(),
                notes: request.notes,
                sentiment_score: None,
                satisfaction_rating: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            },
        ))
    }

    async fn update_customer(
        &self,
        id: Uuid,
        changes: UpdateCustomerRequest,
    ) -> Result<Option<Customer>, GatewayError> {
        Ok(self.customers.modify(
            id,
            |customer| customer.deleted_at.is_none(),
            |customer| {
                if let Some(name) = changes.name {
                    customer.name = name;
                }
                if let Some(email) = changes.email {
                    customer.email = email;
                }
                if let Some(phone) = changes.phone {
                    customer.phone = phone;
                }
                if let Some(avatar_url) = changes.avatar_url {
                    customer.avatar_url = avatar_url;
                }
                if let Some(platform_identifiers) = changes.platform_identifiers {
                    customer.platform_identifiers = platform_identifiers;
                }
                if let Some(metadata) = changes.metadata {
                    customer.metadata = metadata;
                }
                if let Some(tags) = changes.tags {
                    customer.tags = tags;
                }
                if let Some(notes) = changes.notes {
                    customer.notes = notes;
                }
                if let Some(sentiment_score) = changes.sentiment_score {
                    customer.sentiment_score = sentiment_score;
                }
                if let Some(satisfaction_rating) = changes.satisfaction_rating {
                    customer.satisfaction_rating = satisfaction_rating;
                }
                customer.updated_at = Utc::now();
            },
        ))
    }

    async fn soft_delete_customer(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError> {
        Ok(self
            .customers
            .modify(
                id,
                |customer| customer.deleted_at.is_none(),
                |customer| customer.deleted_at = Some(at),
            )
            .is_some())
    }
}

/// Most recent activity first, conversations without messages last.
fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| match (a.last_message_at, b.last_message_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.created_at.cmp(&a.created_at),
    });
}

#[async_trait]
impl ConversationStore for MemoryGateway {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, GatewayError> {
        let mut conversations = self.conversations.scan(|conversation| {
            conversation.business_id == business_id
                && !conversation.is_deleted()
                && filters.matches(conversation)
        });
        conversations.reverse();
        sort_by_recent_activity(&mut conversations);
        Ok(conversations
            .into_iter()
            .map(|conversation| self.with_relations(conversation))
            .collect())
    }

    async fn list_customer_conversations(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<Conversation>, GatewayError> {
        let mut conversations = self.conversations.scan(|conversation| {
            conversation.customer_id == customer_id && !conversation.is_deleted()
        });
        conversations.reverse();
        sort_by_recent_activity(&mut conversations);
        Ok(conversations)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, GatewayError> {
        Ok(self
            .conversations
            .find(id, |conversation| !conversation.is_deleted()))
    }

    async fn find_conversation_with_relations(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, GatewayError> {
        Ok(self
            .conversations
            .find(id, |conversation| !conversation.is_deleted())
            .map(|conversation| self.with_relations(conversation)))
    }

    async fn insert_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<Conversation, GatewayError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Ok(self.conversations.insert(
            id,
            Conversation {
                id,
                business_id: conversation.business_id,
                customer_id: conversation.customer_id,
                platform: conversation.platform,
                platform_conversation_id: conversation.platform_conversation_id,
                subject: conversation.subject,
                priority: conversation.priority,
                status: Default::default(),
                assigned_to: conversation.assigned_to,
                assigned_type: conversation.assigned_type,
                tags: Vec::new(),
                total_messages: 0,
                unread_count: 0,
                last_message_at: None,
                resolved_at: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            },
        ))
    }

    async fn update_conversation(
        &self,
        id: Uuid,
        changes: ConversationChanges,
    ) -> Result<Option<Conversation>, GatewayError> {
        Ok(self.conversations.modify(
            id,
            |conversation| !conversation.is_deleted(),
            |conversation| {
                if let Some(platform_conversation_id) = changes.platform_conversation_id {
                    conversation.platform_conversation_id = platform_conversation_id;
                }
                if let Some(subject) = changes.subject {
                    conversation.subject = subject;
                }
                if let Some(priority) = changes.priority {
                    conversation.priority = priority;
                }
                if let Some(status) = changes.status {
                    conversation.status = status;
                }
                if let Some(tags) = changes.tags {
                    conversation.tags = tags;
                }
                if conversation.resolved_at.is_none() {
                    conversation.resolved_at = changes.resolved_at;
                }
                if let Some((assigned_to, assigned_type)) = changes.assignment {
                    conversation.assigned_to = assigned_to;
                    conversation.assigned_type = assigned_type;
                }
                if let Some(unread_count) = changes.unread_count {
                    conversation.unread_count = unread_count;
                }
                conversation.updated_at = Utc::now();
            },
        ))
    }

    async fn soft_delete_conversation(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, GatewayError> {
        Ok(self.conversations.modify(
            id,
            |conversation| !conversation.is_deleted(),
            |conversation| conversation.deleted_at = Some(at),
        ))
    }

    async fn record_conversation_message(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        from_customer: bool,
    ) -> Result<Option<Conversation>, GatewayError> {
        Ok(self.conversations.modify(
            id,
            |conversation| !conversation.is_deleted(),
            |conversation| {
                conversation.total_messages += 1;
                if from_customer {
                    conversation.unread_count += 1;
                }
                conversation.last_message_at = Some(at);
                conversation.updated_at = Utc::now();
            },
        ))
    }
}

#[async_trait]
impl MessageStore for MemoryGateway {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, GatewayError> {
        let mut messages = self
            .messages
            .scan(|message| message.conversation_id == conversation_id);
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, GatewayError> {
        Ok(self.messages.get(id))
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, GatewayError> {
        let id = Uuid::new_v4();
        Ok(self.messages.insert(
            id,
            Message {
                id,
                conversation_id: message.conversation_id,
                sender_type: message.sender_type,
                sender_id: message.sender_id,
                sender_name: message.sender_name,
                content: message.content,
                content_type: message.content_type,
                attachments: message.attachments,
                platform: message.platform,
                platform_message_id: message.platform_message_id,
                status: MessageStatus::Sent,
                is_internal_note: message.is_internal_note,
                delivered_at: None,
                read_at: None,
                created_at: Utc::now(),
            },
        ))
    }

    async fn advance_message_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, GatewayError> {
        Ok(self.messages.modify(
            id,
            |message| message.status.can_advance_to(status),
            |message| {
                message.status = status;
                message.delivered_at.get_or_insert(at);
                if status == MessageStatus::Read {
                    message.read_at.get_or_insert(at);
                }
            },
        ))
    }

    async fn delete_message(&self, id: Uuid) -> Result<bool, GatewayError> {
        Ok(self.messages.remove(id).is_some())
    }
}

#[async_trait]
impl NotificationStore for MemoryGateway {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, GatewayError> {
        let id = Uuid::new_v4();
        Ok(self.notifications.insert(
            id,
            Notification {
                id,
                business_id: notification.business_id,
                user_id: notification.user_id,
                notification_type: notification.notification_type,
                title: notification.title,
                message: notification.message,
                action_url: notification.action_url,
                action_label: notification.action_label,
                read_at: None,
                created_at: Utc::now(),
            },
        ))
    }

    async fn list_notifications(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, GatewayError> {
        let mut notifications = self.notifications.scan(|notification| {
            notification.business_id == business_id && notification.user_id == user_id
        });
        notifications.reverse();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, GatewayError> {
        Ok(self.notifications.modify(
            id,
            |notification| notification.user_id == user_id,
            |notification| {
                notification.read_at.get_or_insert(at);
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use api_types::{MemberRole, PermissionMatrix};

    use super::*;

    fn owner(business_id: Uuid, user_id: Uuid) -> NewTeamMember {
        NewTeamMember {
            business_id,
            user_id,
            role: MemberRole::Owner,
            permissions: PermissionMatrix::for_role(MemberRole::Owner),
            department: None,
            title: None,
            joined_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn second_membership_for_same_pair_is_duplicate() {
        let gateway = MemoryGateway::default();
        let business_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        gateway
            .insert_member(owner(business_id, user_id))
            .await
            .unwrap();
        let error = gateway
            .insert_member(owner(business_id, user_id))
            .await
            .unwrap_err();
        assert!(matches!(error, GatewayError::Duplicate(_)));
    }

    #[tokio::test]
    async fn provisioning_claims_placeholder_and_its_memberships() {
        let gateway = MemoryGateway::default();
        let business_id = Uuid::new_v4();
        let placeholder = gateway
            .create_placeholder_user("a@x.com", Some("Ada"))
            .await
            .unwrap();
        gateway
            .insert_member(owner(business_id, placeholder.id))
            .await
            .unwrap();

        let real_id = Uuid::new_v4();
        let user = gateway.provision_user(real_id, "a@x.com").await.unwrap();

        assert_eq!(user.id, real_id);
        assert_eq!(user.full_name.as_deref(), Some("Ada"));
        assert!(gateway.find_user(placeholder.id).await.unwrap().is_none());
        let membership = gateway
            .find_membership(business_id, real_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.user_id, real_id);
    }

    fn customer_message(conversation_id: Uuid) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_type: api_types::SenderType::Customer,
            sender_id: None,
            sender_name: None,
            content: "hi".into(),
            content_type: Default::default(),
            attachments: Value::Array(Vec::new()),
            platform: Platform::Whatsapp,
            platform_message_id: None,
            is_internal_note: false,
        }
    }

    #[tokio::test]
    async fn messages_with_equal_timestamps_page_by_id() {
        let gateway = MemoryGateway::default();
        let conversation_id = Uuid::new_v4();
        let at = Utc::now();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let message = gateway
                .insert_message(customer_message(conversation_id))
                .await
                .unwrap();
            gateway
                .messages
                .modify(message.id, |_| true, |row| row.created_at = at);
            ids.push(message.id);
        }
        ids.sort();

        let first = gateway.list_messages(conversation_id, 2, 0).await.unwrap();
        let second = gateway.list_messages(conversation_id, 2, 2).await.unwrap();
        let paged: Vec<Uuid> = first.iter().chain(&second).map(|m| m.id).collect();
        assert_eq!(paged, ids);
    }

    #[tokio::test]
    async fn message_status_never_moves_backwards() {
        let gateway = MemoryGateway::default();
        let message = gateway
            .insert_message(customer_message(Uuid::new_v4()))
            .await
            .unwrap();

        let read = gateway
            .advance_message_status(message.id, MessageStatus::Read, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.status, MessageStatus::Read);
        assert!(read.read_at.is_some() && read.delivered_at.is_some());

        let regressed = gateway
            .advance_message_status(message.id, MessageStatus::Delivered, Utc::now())
            .await
            .unwrap();
        assert!(regressed.is_none());
    }
}
