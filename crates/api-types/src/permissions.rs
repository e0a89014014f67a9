//! Default capability matrix granted to each team role.
//!
//! The matrix is fixed; a membership may carry an explicit override, but a
//! role change always re-derives it from here.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::MemberRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ConversationPermissions {
    pub view_all: bool,
    pub view_assigned: bool,
    pub reply: bool,
    pub assign: bool,
    pub close: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct CustomerPermissions {
    pub view: bool,
    pub edit: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct TeamPermissions {
    pub view: bool,
    pub invite: bool,
    pub edit: bool,
    pub remove: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct SettingsPermissions {
    pub view: bool,
    pub edit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct BillingPermissions {
    pub view: bool,
    pub edit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct PermissionMatrix {
    pub conversations: ConversationPermissions,
    pub customers: CustomerPermissions,
    pub team: TeamPermissions,
    pub settings: SettingsPermissions,
    pub billing: BillingPermissions,
}

impl PermissionMatrix {
    pub const fn for_role(role: MemberRole) -> Self {
        match role {
            MemberRole::Owner => Self {
                conversations: ConversationPermissions {
                    view_all: true,
                    view_assigned: true,
                    reply: true,
                    assign: true,
                    close: true,
                },
                customers: CustomerPermissions {
                    view: true,
                    edit: true,
                    delete: true,
                },
                team: TeamPermissions {
                    view: true,
                    invite: true,
                    edit: true,
                    remove: true,
                },
                settings: SettingsPermissions {
                    view: true,
                    edit: true,
                },
                billing: BillingPermissions {
                    view: true,
                    edit: true,
                },
            },
            MemberRole::Admin => Self {
                conversations: ConversationPermissions {
                    view_all: true,
                    view_assigned: true,
                    reply: true,
                    assign: true,
                    close: true,
                },
                customers: CustomerPermissions {
                    view: true,
                    edit: true,
                    delete: true,
                },
                team: TeamPermissions {
                    view: true,
                    invite: true,
                    edit: true,
                    remove: true,
                },
                settings: SettingsPermissions {
                    view: true,
                    edit: true,
                },
                billing: BillingPermissions {
                    view: true,
                    edit: false,
                },
            },
            MemberRole::Manager => Self {
                conversations: ConversationPermissions {
                    view_all: true,
                    view_assigned: true,
                    reply: true,
                    assign: true,
                    close: true,
                },
                customers: CustomerPermissions {
                    view: true,
                    edit: true,
                    delete: false,
                },
                team: TeamPermissions {
                    view: true,
                    invite: true,
                    edit: false,
                    remove: false,
                },
                settings: SettingsPermissions {
                    view: true,
                    edit: false,
                },
                billing: BillingPermissions {
                    view: false,
                    edit: false,
                },
            },
            MemberRole::Agent => Self {
                conversations: ConversationPermissions {
                    view_all: true,
                    view_assigned: true,
                    reply: true,
                    assign: false,
                    close: true,
                },
                customers: CustomerPermissions {
                    view: true,
                    edit: true,
                    delete: false,
                },
                team: TeamPermissions {
                    view: true,
                    invite: false,
                    edit: false,
                    remove: false,
                },
                settings: SettingsPermissions {
                    view: false,
                    edit: false,
                },
                billing: BillingPermissions {
                    view: false,
                    edit: false,
                },
            },
            MemberRole::LimitedAgent => Self {
                conversations: ConversationPermissions {
                    view_all: false,
                    view_assigned: true,
                    reply: true,
                    assign: false,
                    close: true,
                },
                customers: CustomerPermissions {
                    view: true,
                    edit: false,
                    delete: false,
                },
                team: TeamPermissions {
                    view: true,
                    invite: false,
                    edit: false,
                    remove: false,
                },
                settings: SettingsPermissions {
                    view: false,
                    edit: false,
                },
                billing: BillingPermissions {
                    view: false,
                    edit: false,
                },
            },
        }
    }
}

/// Resolves a role name to its matrix. Unknown names get the agent matrix.
pub fn permissions_for(role_name: &str) -> PermissionMatrix {
    PermissionMatrix::for_role(MemberRole::parse_lenient(role_name))
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn summary_columns_match_role_table() {
        // (role, conversations.view_all, conversations.assign, customers.delete, team.edit, billing.view)
        let expected = [
            ("owner", true, true, true, true, true),
            ("admin", true, true, true, true, true),
            ("manager", true, true, false, false, false),
            ("agent", true, false, false, false, false),
            ("limited_agent", false, false, false, false, false),
        ];

        for (role, view_all, assign, customer_delete, team_edit, billing_view) in expected {
            let matrix = permissions_for(role);
            assert_eq!(matrix.conversations.view_all, view_all, "{role}");
            assert_eq!(matrix.conversations.assign, assign, "{role}");
            assert_eq!(matrix.customers.delete, customer_delete, "{role}");
            assert_eq!(matrix.team.edit, team_edit, "{role}");
            assert_eq!(matrix.billing.view, billing_view, "{role}");
        }
    }

    #[test]
    fn admin_can_view_but_not_edit_billing() {
        let admin = PermissionMatrix::for_role(MemberRole::Admin);
        let owner = PermissionMatrix::for_role(MemberRole::Owner);
        assert!(admin.billing.view);
        assert!(!admin.billing.edit);
        assert!(owner.billing.view && owner.billing.edit);
    }

    #[test]
    fn limited_agent_sees_assigned_only() {
        let matrix = PermissionMatrix::for_role(MemberRole::LimitedAgent);
        assert!(!matrix.conversations.view_all);
        assert!(matrix.conversations.view_assigned);
        assert!(!matrix.customers.edit);
    }

    #[test]
    fn manager_can_invite_but_not_edit_team() {
        let matrix = PermissionMatrix::for_role(MemberRole::Manager);
        assert!(matrix.team.invite);
        assert!(!matrix.team.edit);
        assert!(!matrix.team.remove);
        assert!(matrix.settings.view && !matrix.settings.edit);
    }

    #[test]
    fn unknown_role_falls_back_to_agent() {
        let agent = PermissionMatrix::for_role(MemberRole::Agent);
        assert_eq!(permissions_for("superuser"), agent);
        assert_eq!(permissions_for(""), agent);
        assert_eq!(permissions_for("OWNER"), agent);
    }

    #[test]
    fn every_role_resolves_by_name() {
        for role in MemberRole::iter() {
            assert_eq!(
                permissions_for(role.as_ref()),
                PermissionMatrix::for_role(role)
            );
        }
    }

    #[test]
    fn matrix_serializes_with_group_keys() {
        let json = serde_json::to_value(PermissionMatrix::for_role(MemberRole::Agent)).unwrap();
        assert_eq!(json["conversations"]["assign"], false);
        assert_eq!(json["team"]["view"], true);
        assert_eq!(json["billing"]["edit"], false);
    }
}
