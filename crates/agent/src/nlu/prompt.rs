use std::fmt::Write;

use crate::context::ConversationContext;

/// Number of trailing conversation turns rendered into the prompt.
pub const HISTORY_WINDOW: usize = 3;

const SYSTEM_INSTRUCTION: &str = r#"You are a natural-language analyzer for a task and productivity chatbot.

Analyze the user's text and return:
1. The primary intent (a single string, e.g. 'find_task', 'create_reminder', 'get_help')
2. The entities mentioned (a list of objects with name and value)
3. Which information you need to look up (user history, task details, external search)

Response format:
{
  "intent": "string",
  "entities": [{"name": "string", "value": "string"}],
  "requires_task_info": boolean,
  "requires_user_history": boolean,
  "requires_external_info": boolean,
  "search_query": "string" (optional)
}

ANSWER ONLY WITH THE JSON FORMAT ABOVE."#;

pub fn build_prompt(text: &str, context: Option<&ConversationContext>) -> String {
    let context_block = context.map(render_context).unwrap_or_default();
    format!("{SYSTEM_INSTRUCTION}\n{context_block}\nUSER TEXT: {text}")
}

fn render_context(context: &ConversationContext) -> String {
    if context.is_empty() {
        return String::new();
    }

    let mut block = String::from("\n=== CONTEXT ===\n");

    if let Some(task) = &context.task {
        let _ = writeln!(block, "Active task: {}", task.title.as_deref().unwrap_or("Untitled"));
        let _ = writeln!(
            block,
            "Description: {}",
            task.description.as_deref().unwrap_or("No description")
        );
        if let Some(status) = &task.status {
            let _ = writeln!(block, "Status: {status}");
        }
        if let Some(due_date) = &task.due_date {
            let _ = writeln!(block, "Due date: {due_date}");
        }
    }

    if !context.recent_history.is_empty() {
        block.push_str("\nRecent conversation:\n");
        let skip = context.recent_history.len().saturating_sub(HISTORY_WINDOW);
        for turn in context.recent_history.iter().skip(skip) {
            let _ = writeln!(block, "User: {}", turn.user);
            let _ = writeln!(block, "Bot: {}", turn.bot);
        }
    }

    block.push_str("=== END OF CONTEXT ===\n");
    block
}

#[cfg(test)]
mod tests {
    use super::build_prompt;
    use crate::context::{ConversationContext, HistoryTurn, TaskContext};

    #[test]
    fn prompt_without_context_ends_with_user_text() {
        let prompt = build_prompt("remind me tomorrow", None);
        assert!(prompt.contains("\"requires_external_info\": boolean"));
        assert!(!prompt.contains("=== CONTEXT ==="));
        assert!(prompt.ends_with("USER TEXT: remind me tomorrow"));
    }

    #[test]
    fn task_context_renders_defaults_and_optional_fields() {
        let context = ConversationContext::with_task(TaskContext {
            status: Some("in_progress".to_owned()),
            ..TaskContext::with_id("task-1")
        });

        let prompt = build_prompt("what's left?", Some(&context));
        assert!(prompt.contains("Active task: Untitled\n"));
        assert!(prompt.contains("Description: No description\n"));
        assert!(prompt.contains("Status: in_progress\n"));
        assert!(!prompt.contains("Due date:"));
        assert!(prompt.contains("=== END OF CONTEXT ==="));
    }

    #[test]
    fn only_the_last_three_turns_are_rendered() {
        let context = ConversationContext {
            task: None,
            recent_history: (1..=5)
                .map(|index| HistoryTurn { user: format!("u{index}"), bot: format!("b{index}") })
                .collect(),
        };

        let prompt = build_prompt("next", Some(&context));
        assert!(!prompt.contains("User: u2\n"));
        assert!(prompt.contains("User: u3\nBot: b3\nUser: u4\nBot: b4\nUser: u5\nBot: b5\n"));
    }

    #[test]
    fn empty_context_is_skipped() {
        let prompt = build_prompt("hi", Some(&ConversationContext::default()));
        assert!(!prompt.contains("=== CONTEXT ==="));
    }
}
