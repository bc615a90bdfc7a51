//! System prompt rendering for [`LlmAgent`](crate::llm_agent::LlmAgent).
//!
//! The prompt tells the model who it is, who else is in the group, what it
//! can call, what happened recently, which documents were handed to it, and
//! the JSON action format it must answer in.

use huddle_core::agent::{AgentSpec, RosterEntry, TurnContext};
use huddle_core::document::DocumentRef;
use huddle_core::mcp::McpToolInfo;
use huddle_core::message::{Message, Role};
use huddle_core::tool::ToolDefinition;
use std::fmt::Write;

const MAX_TOOL_DESCRIPTION: usize = 100;

/// Render the full system prompt for one turn.
pub fn system_prompt(
    spec: &AgentSpec,
    turn: &TurnContext,
    tools: &[ToolDefinition],
    mcp_tools: &[McpToolInfo],
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Agent: {} ({})", spec.key, spec.name);
    let description = if spec.description.is_empty() {
        "General purpose"
    } else {
        spec.description.as_str()
    };
    let _ = writeln!(out, "Specialty: {description}");
    let _ = writeln!(out, "Capabilities: {}", capabilities(tools, mcp_tools));

    if !mcp_tools.is_empty() {
        out.push_str(&mcp_block(mcp_tools));
    }

    out.push_str("\nGroup members:\n");
    out.push_str(&roster_lines(&spec.key, &turn.roster));

    if !turn.history.is_empty() {
        out.push_str(&history_block(&turn.history));
    }

    if !turn.documents.is_empty() {
        out.push_str(&documents_block(&turn.documents));
    }

    out.push_str(ACTION_FORMAT);
    let _ = write!(
        out,
        "- When another agent tags you (@{}), continue their workflow.\n",
        spec.key
    );
    out
}

/// The user-turn message carrying the routed content.
pub fn user_prompt(content: &str) -> String {
    format!("User prompt: {content}")
}

/// Follow-up sent when a final reply does not tag exactly one participant.
pub fn repair_prompt(mention_count: usize) -> String {
    let problem = if mention_count == 0 {
        "did not tag anyone".to_string()
    } else {
        format!("tagged {mention_count} participants")
    };
    format!(
        "Your reply {problem}. Every reply must contain exactly one @mention: \
         @user when you are done or need input, or one group member to hand off. \
         Answer again with the same JSON format."
    )
}

fn capabilities(tools: &[ToolDefinition], mcp_tools: &[McpToolInfo]) -> String {
    let mut parts = Vec::new();
    if !tools.is_empty() {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        parts.push(format!("tools [{}]", names.join(", ")));
    }
    if !mcp_tools.is_empty() {
        let mut servers: Vec<&str> = mcp_tools.iter().map(|t| t.server.as_str()).collect();
        servers.dedup();
        parts.push(format!("MCP servers [{}]", servers.join(", ")));
    }
    if parts.is_empty() {
        "conversation only".into()
    } else {
        parts.join("; ")
    }
}

fn mcp_block(mcp_tools: &[McpToolInfo]) -> String {
    let mut out = String::from("\nMCP tools available to you:\n");
    let mut current_server: Option<&str> = None;
    for tool in mcp_tools {
        if current_server != Some(tool.server.as_str()) {
            let _ = writeln!(out, "Server: {}", tool.server);
            current_server = Some(tool.server.as_str());
        }
        let params = tool.parameter_summary();
        let params = if params.is_empty() {
            "none".to_string()
        } else {
            params.join(", ")
        };
        let _ = writeln!(
            out,
            "  - {}: {}\n    Params: {params}",
            tool.name,
            clip(&tool.description, MAX_TOOL_DESCRIPTION)
        );
    }
    out.push_str("Parameters marked with * are required.\n");
    out
}

/// One line per group member; the agent itself is marked.
pub fn roster_lines(self_key: &str, roster: &[RosterEntry]) -> String {
    if roster.is_empty() {
        return "(no members)\n".into();
    }
    let mut out = String::new();
    for member in roster {
        let marker = if member.key == self_key { " (you)" } else { "" };
        let emoji = if member.emoji.is_empty() {
            String::new()
        } else {
            format!("{} ", member.emoji)
        };
        let _ = writeln!(
            out,
            "- @{}{marker}: {emoji}{}. {}",
            member.key, member.name, member.description
        );
    }
    out
}

/// Recent history, one line per message.
pub fn history_block(history: &[Message]) -> String {
    let mut out = format!(
        "\n=== CONVERSATION HISTORY (last {} messages) ===\n",
        history.len()
    );
    for msg in history {
        let line = match msg.role {
            Role::User => format!("User: {}", msg.content),
            Role::Agent => format!("{}: {}", msg.agent_key(), msg.content),
            Role::System => format!("[System]: {}", msg.content),
            other => format!("[{other}]: {}", msg.content),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("=== END HISTORY ===\n");
    out
}

fn documents_block(documents: &[DocumentRef]) -> String {
    let mut out = String::from("\n=== DOCUMENTS SHARED WITH YOU ===\n");
    for doc in documents {
        let _ = writeln!(out, "Document {} ({})", doc.document_id, doc.filename);
        if !doc.summary.is_empty() {
            let _ = writeln!(out, "Summary: {}", doc.summary);
        }
        if !doc.excerpt.is_empty() {
            let _ = writeln!(out, "Content:\n{}", doc.excerpt);
        }
    }
    out.push_str("=== END DOCUMENTS ===\n");
    out
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}...")
}

const ACTION_FORMAT: &str = r#"
Reply with exactly one JSON object:
- final:     {"action":"final","text":"<reply>"}
- call_tool: {"action":"call_tool","tool_name":"<tool>","kwargs":{...}}
- call_mcp:  {"action":"call_mcp","server":"<server>","tool":"<tool>","params":{...}}

Rules:
- Default to "final" for normal conversation.
- Only call tools registered under you. If another member owns the tool, hand off with "final" and tag them.
- Never return more than one JSON object.
- Every final reply must contain exactly one @mention: @user when the work is done or you need input, otherwise the member who should act next.
- Only tag members listed above.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use huddle_core::message::NewMessage;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry::from(
                &AgentSpec::new("analyst", "Analyst").with_description("Crunches numbers"),
            ),
            RosterEntry::from(
                &AgentSpec::new("writer", "Writer").with_description("Drafts reports"),
            ),
        ]
    }

    #[test]
    fn roster_marks_self() {
        let lines = roster_lines("writer", &roster());
        assert!(lines.contains("- @analyst: Analyst. Crunches numbers"));
        assert!(lines.contains("- @writer (you): Writer."));
    }

    #[test]
    fn history_block_labels_roles() {
        let history = vec![
            NewMessage::user("g", "@analyst numbers?").into_message(1, Utc::now()),
            NewMessage::agent("g", "analyst", "42 @user").into_message(2, Utc::now()),
            NewMessage::system("g", "Chain stopped").into_message(3, Utc::now()),
            NewMessage::new("g", "analyst", Role::ToolResult, "Tool result: sum")
                .into_message(4, Utc::now()),
        ];
        let block = history_block(&history);
        assert!(block.contains("User: @analyst numbers?"));
        assert!(block.contains("analyst: 42 @user"));
        assert!(block.contains("[System]: Chain stopped"));
        assert!(block.contains("[tool_result]: Tool result: sum"));
    }

    #[test]
    fn system_prompt_includes_all_sections() {
        let spec = AgentSpec::new("writer", "Writer");
        let turn = TurnContext {
            group_id: "g".into(),
            agent_key: "writer".into(),
            content: "draft it".into(),
            history: vec![NewMessage::user("g", "hello").into_message(1, Utc::now())],
            roster: roster(),
            documents: vec![DocumentRef {
                document_id: "doc-1".into(),
                filename: "brief.txt".into(),
                target_agent: "writer".into(),
                summary: "Project brief".into(),
                excerpt: "Ship by Friday".into(),
                message_id: 1,
            }],
            request_timeout: None,
        };
        let tools = vec![ToolDefinition {
            name: "spellcheck".into(),
            description: "Checks spelling".into(),
            parameters: serde_json::json!({}),
        }];
        let mcp = vec![McpToolInfo {
            server: "files".into(),
            name: "read".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({"properties": {"path": {}}, "required": ["path"]}),
        }];

        let prompt = system_prompt(&spec, &turn, &tools, &mcp);
        assert!(prompt.contains("Agent: writer (Writer)"));
        assert!(prompt.contains("Specialty: General purpose"));
        assert!(prompt.contains("tools [spellcheck]"));
        assert!(prompt.contains("Params: path*"));
        assert!(prompt.contains("User: hello"));
        assert!(prompt.contains("Ship by Friday"));
        assert!(prompt.contains(r#"{"action":"call_mcp""#));
    }

    #[test]
    fn repair_prompt_describes_problem() {
        assert!(repair_prompt(0).contains("did not tag anyone"));
        assert!(repair_prompt(2).contains("tagged 2 participants"));
    }

    #[test]
    fn clip_long_descriptions() {
        let long = "x".repeat(150);
        assert_eq!(clip(&long, 100).len(), 103);
        assert_eq!(clip("short", 100), "short");
    }
}
