//! Background delivery of assignment notifications.

use api_types::NewNotification;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::gateway::Gateway;

/// Writes a `conversation_assigned` notification for the assignee without
/// holding up the assignment response. Failures are logged and dropped.
#[derive(Clone)]
pub struct AssignmentNotifier {
    gateway: Gateway,
    tracker: TaskTracker,
}

impl AssignmentNotifier {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            tracker: TaskTracker::new(),
        }
    }

    pub fn dispatch(&self, business_id: Uuid, conversation_id: Uuid, member_id: Uuid) {
        let gateway = self.gateway.clone();
        self.tracker.spawn(async move {
            let member = match gateway.team.find_member(member_id).await {
                Ok(Some(member)) => member,
                Ok(None) => {
                    tracing::warn!(%member_id, %conversation_id, "assignee vanished before notification");
                    return;
                }
                Err(error) => {
                    tracing::warn!(?error, %member_id, "failed to load assignee for notification");
                    return;
                }
            };

            let notification = NewNotification::conversation_assigned(
                business_id,
                member.member.user_id,
                conversation_id,
            );
            if let Err(error) = gateway.notifications.insert_notification(notification).await {
                tracing::warn!(?error, %conversation_id, "failed to create assignment notification");
            }
        });
    }

    /// Waits for every dispatched notification to finish.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
