use api_types::{
    InviteTeamMemberRequest, MemberRole, TeamMember, TeamMemberWithUser, UpdateTeamMemberRequest,
    permissions_for,
};
use chrono::Utc;
use utils::validation::is_valid_email;
use uuid::Uuid;

use super::ServiceError;
use crate::gateway::{Gateway, GatewayError, NewTeamMember};

pub struct TeamService<'a> {
    gateway: &'a Gateway,
}

impl<'a> TeamService<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self, business_id: Uuid) -> Result<Vec<TeamMemberWithUser>, ServiceError> {
        Ok(self.gateway.team.list_members(business_id).await?)
    }

    pub async fn get(&self, member_id: Uuid) -> Result<TeamMemberWithUser, ServiceError> {
        self.gateway
            .team
            .find_member(member_id)
            .await?
            .ok_or(ServiceError::NotFound("team member"))
    }

    /// Active membership of `user_id` in `business_id`, if any.
    pub async fn membership(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, ServiceError> {
        let member = self
            .gateway
            .team
            .find_membership(business_id, user_id)
            .await?;
        Ok(member.filter(|member| member.is_active))
    }

    /// Adds a user to the business by e-mail, creating a placeholder user
    /// when the address is unknown. The invitee is not contacted.
    pub async fn invite(
        &self,
        business_id: Uuid,
        request: InviteTeamMemberRequest,
    ) -> Result<TeamMemberWithUser, ServiceError> {
        let email = request.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(ServiceError::Validation("invalid email address".to_string()));
        }

        let user = match self.gateway.users.find_user_by_email(&email).await? {
            Some(user) => {
                if self
                    .gateway
                    .team
                    .find_membership(business_id, user.id)
                    .await?
                    .is_some()
                {
                    return Err(already_member());
                }
                user
            }
            None => {
                self.gateway
                    .users
                    .create_placeholder_user(&email, request.full_name.as_deref())
                    .await?
            }
        };

        let member = self
            .gateway
            .team
            .insert_member(NewTeamMember {
                business_id,
                user_id: user.id,
                role: request.role,
                permissions: permissions_for(request.role.as_ref()),
                department: request.department,
                title: request.title,
                joined_at: Some(Utc::now()),
            })
            .await
            .map_err(|error| match error {
                GatewayError::Duplicate(_) => already_member(),
                other => other.into(),
            })?;

        Ok(TeamMemberWithUser {
            member,
            user: user.into(),
        })
    }

    pub async fn update(
        &self,
        member_id: Uuid,
        mut changes: UpdateTeamMemberRequest,
    ) -> Result<TeamMember, ServiceError> {
        if let (Some(role), None) = (changes.role, changes.permissions.as_ref()) {
            changes.permissions = Some(role.default_permissions());
        }
        self.gateway
            .team
            .update_member(member_id, changes)
            .await?
            .ok_or(ServiceError::NotFound("team member"))
    }

    pub async fn update_role(
        &self,
        member_id: Uuid,
        role: MemberRole,
    ) -> Result<TeamMember, ServiceError> {
        self.update(
            member_id,
            UpdateTeamMemberRequest {
                role: Some(role),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn activate(&self, member_id: Uuid) -> Result<TeamMember, ServiceError> {
        self.set_active(member_id, true).await
    }

    pub async fn deactivate(&self, member_id: Uuid) -> Result<TeamMember, ServiceError> {
        self.set_active(member_id, false).await
    }

    async fn set_active(&self, member_id: Uuid, is_active: bool) -> Result<TeamMember, ServiceError> {
        self.update(
            member_id,
            UpdateTeamMemberRequest {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn remove(&self, member_id: Uuid) -> Result<(), ServiceError> {
        if self.gateway.team.delete_member(member_id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("team member"))
        }
    }
}

fn already_member() -> ServiceError {
    ServiceError::Conflict("user is already a team member".to_string())
}
