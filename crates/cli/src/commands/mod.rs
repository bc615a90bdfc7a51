pub mod chat;
pub mod group;
pub mod init;
pub mod send;
pub mod status;

use huddle_core::message::{Message, Role};

/// One line of transcript output for a persisted message.
pub fn format_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => format!("@{}", message.sender),
        Role::Agent => format!("@{}", message.agent_key()),
        Role::System => "system".to_string(),
        Role::ToolCall | Role::ToolResult | Role::ToolError => {
            format!("{} @{}", message.role.as_str(), message.agent_key())
        }
    };
    format!("[{}] {who}: {}", message.id, message.content)
}

/// What the user can do about a chain that halted without reaching them.
pub fn halt_hint(reason: &str, agent_key: Option<&str>) -> Option<String> {
    match reason {
        "ambiguous" => Some("Please tag only ONE agent per message.".to_string()),
        "non_member" | "unknown_agent" => Some(format!(
            "Unknown or non-member agent '@{}'",
            agent_key.unwrap_or("?")
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(role: Role, sender: &str, content: &str) -> Message {
        Message {
            id: 7,
            group_id: "g".into(),
            sender: sender.into(),
            role,
            content: content.into(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn formats_agent_and_system_lines() {
        assert_eq!(
            format_message(&message(Role::Agent, "writer", "done @user")),
            "[7] @writer: done @user"
        );
        assert_eq!(
            format_message(&message(Role::System, "system", "Chain cut off")),
            "[7] system: Chain cut off"
        );
    }

    #[test]
    fn halts_the_user_can_fix_get_a_hint() {
        assert_eq!(
            halt_hint("ambiguous", None).as_deref(),
            Some("Please tag only ONE agent per message.")
        );
        assert_eq!(
            halt_hint("non_member", Some("stranger")).as_deref(),
            Some("Unknown or non-member agent '@stranger'")
        );
        assert_eq!(halt_hint("user_addressed", None), None);
    }

    #[test]
    fn tool_lines_name_the_role() {
        let line = format_message(&message(Role::ToolResult, "analyst", "Tool result: x"));
        assert_eq!(line, "[7] tool_result @analyst: Tool result: x");
    }
}
