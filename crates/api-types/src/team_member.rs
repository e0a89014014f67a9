use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::{PermissionMatrix, UserProfile, some_if_present};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Type,
    TS,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[sqlx(type_name = "member_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Manager,
    Agent,
    LimitedAgent,
}

impl MemberRole {
    /// Parses a role name, treating anything unrecognised as `Agent`.
    pub fn parse_lenient(name: &str) -> Self {
        Self::from_str(name).unwrap_or(Self::Agent)
    }

    pub fn default_permissions(self) -> PermissionMatrix {
        PermissionMatrix::for_role(self)
    }
}

/// Team membership row: one user's role within one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, TS)]
pub struct TeamMember {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    #[sqlx(json)]
    pub permissions: PermissionMatrix,
    pub department: Option<String>,
    pub title: Option<String>,
    pub is_active: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership joined with the member's user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct TeamMemberWithUser {
    #[serde(flatten)]
    pub member: TeamMember,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct InviteTeamMemberRequest {
    pub email: String,
    #[serde(default)]
    #[ts(optional)]
    pub full_name: Option<String>,
    pub role: MemberRole,
    #[serde(default)]
    #[ts(optional)]
    pub department: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateTeamMemberRequest {
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<MemberRole>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub permissions: Option<PermissionMatrix>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub department: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateMemberRoleRequest {
    pub role: MemberRole,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessScopeQuery {
    pub business_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListTeamMembersResponse {
    pub members: Vec<TeamMemberWithUser>,
}
