//! Client-side lists kept consistent with server change events.

use api_types::{ConversationWithRelations, Message};
use uuid::Uuid;

mod conversations;
mod messages;

pub use conversations::ConversationProjection;
pub use messages::MessageProjection;

/// Side effects the UI reacts to, beyond re-rendering a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A conversation appeared in the list.
    NewConversation(Box<ConversationWithRelations>),
    /// A customer message arrived in the open conversation.
    IncomingMessageCue { conversation_id: Uuid, message_id: Uuid },
}

impl UiEvent {
    pub(crate) fn incoming(message: &Message) -> Self {
        Self::IncomingMessageCue {
            conversation_id: message.conversation_id,
            message_id: message.id,
        }
    }
}
