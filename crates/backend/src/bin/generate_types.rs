use std::{env, fmt::Write as _, fs, path::PathBuf};

use anyhow::Context as _;
use api_types::*;
use backend::{mutation_definition::MutationDefinition, routes::mutation_definitions};
use ts_rs::TS;

const DEFAULT_OUTPUT: &str = "shared/inbox-types.ts";

fn declarations() -> Vec<String> {
    vec![
        PlanType::decl(),
        SubscriptionStatus::decl(),
        Business::decl(),
        CreateBusinessRequest::decl(),
        UpdateBusinessRequest::decl(),
        ListBusinessesResponse::decl(),
        MemberRole::decl(),
        ConversationPermissions::decl(),
        CustomerPermissions::decl(),
        TeamPermissions::decl(),
        SettingsPermissions::decl(),
        BillingPermissions::decl(),
        PermissionMatrix::decl(),
        TeamMember::decl(),
        TeamMemberWithUser::decl(),
        InviteTeamMemberRequest::decl(),
        UpdateTeamMemberRequest::decl(),
        UpdateMemberRoleRequest::decl(),
        ListTeamMembersResponse::decl(),
        User::decl(),
        UserProfile::decl(),
        UpdatePresenceStatusRequest::decl(),
        Platform::decl(),
        PlatformIdentifiers::decl(),
        Customer::decl(),
        CreateCustomerRequest::decl(),
        UpdateCustomerRequest::decl(),
        CustomerLookupRequest::decl(),
        AddCustomerNoteRequest::decl(),
        CustomerTagsRequest::decl(),
        ListCustomersResponse::decl(),
        ConversationStatus::decl(),
        AssignmentType::decl(),
        ConversationPriority::decl(),
        Conversation::decl(),
        AssignedMember::decl(),
        ConversationWithRelations::decl(),
        CreateConversationRequest::decl(),
        UpdateConversationRequest::decl(),
        AssignConversationRequest::decl(),
        UpdateConversationStatusRequest::decl(),
        ListConversationsResponse::decl(),
        ListConversationsByCustomerResponse::decl(),
        SenderType::decl(),
        ContentType::decl(),
        MessageStatus::decl(),
        Message::decl(),
        CreateMessageRequest::decl(),
        ListMessagesResponse::decl(),
        NotificationType::decl(),
        Notification::decl(),
        ListNotificationsResponse::decl(),
        PresenceStatus::decl(),
        ChangeEventType::decl(),
        ChangeTable::decl(),
        ChangeEvent::decl(),
        PresencePayload::decl(),
        PresenceEventKind::decl(),
        PresenceEvent::decl(),
        TypingPayload::decl(),
        ClientFrame::decl(),
        ServerFrame::decl(),
        ActionResponse::decl(),
        HealthResponse::decl(),
    ]
}

fn render_mutations(definitions: &[MutationDefinition]) -> String {
    let mut out = String::from("export const MUTATIONS = {\n");
    for definition in definitions {
        let actions = definition
            .actions
            .iter()
            .map(|action| format!("\"{action}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "  {table}: {{ row: \"{row}\", create: {create}, update: {update}, actions: [{actions}] }},",
            table = definition.table,
            row = definition.row_type,
            create = quoted_or_null(definition.create_type.as_deref()),
            update = quoted_or_null(definition.update_type.as_deref()),
        );
    }
    out.push_str("} as const;\n");
    out
}

fn quoted_or_null(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), |value| format!("\"{value}\""))
}

fn main() -> anyhow::Result<()> {
    let output = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let mut contents = String::from("// This file was generated by `generate-types`. Do not edit.\n\n");
    for declaration in declarations() {
        contents.push_str("export ");
        contents.push_str(&declaration);
        contents.push_str("\n\n");
    }
    contents.push_str(&render_mutations(&mutation_definitions()));

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&output, contents).with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {}", output.display());
    Ok(())
}
