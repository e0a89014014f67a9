//! API types shared between the backend and the realtime client.
//!
//! This crate contains:
//! - Row types (e.g., `Conversation`, `TeamMember`) - the API representation of database entities
//! - Request types (e.g., `InviteTeamMemberRequest`, `AssignConversationRequest`) - API input types
//! - Shared enums (e.g., `MemberRole`, `ConversationStatus`, `Platform`)
//! - The role permission matrix and the realtime wire frames

use serde::{Deserialize, Deserializer};

pub mod business;
pub mod conversation;
pub mod customer;
pub mod message;
pub mod notification;
pub mod permissions;
pub mod platform;
pub mod realtime;
pub mod response;
pub mod team_member;
pub mod user;

pub use business::*;
pub use conversation::*;
pub use customer::*;
pub use message::*;
pub use notification::*;
pub use permissions::*;
pub use platform::*;
pub use realtime::*;
pub use response::*;
pub use team_member::*;
pub use user::*;

/// Default page size for list endpoints that paginate.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

pub fn some_if_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Deserializes a comma separated query value (`tags=a,b`) into a list,
/// dropping empty segments.
pub fn comma_separated<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }))
}
