use crate::llm::chat::PromptEntry;
use crate::models::chat::{ ChatMessage, Role };

/// Turns stored history plus the newly submitted text into the prompt
/// sequence for one turn: system instruction, every prior message in order,
/// then the new message. History is forwarded whole.
pub fn build_prompt(system_prompt: &str, history: &[ChatMessage], new_message: &str) -> Vec<PromptEntry> {
    let mut prompt = Vec::with_capacity(history.len() + 2);
    prompt.push(PromptEntry::system(system_prompt));

    for msg in history {
        let entry = match msg.role {
            Role::User => PromptEntry::human(msg.content.as_str()),
            Role::Assistant => PromptEntry::model(msg.content.as_str()),
        };
        prompt.push(entry);
    }

    prompt.push(PromptEntry::human(new_message));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::PromptRole;
    use chrono::Utc;

    fn stored(id: i64, role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            conversation_id: 1,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_is_wrapped_by_system_and_new_message() {
        let history = vec![stored(1, Role::User, "A"), stored(2, Role::Assistant, "B")];
        let prompt = build_prompt("persona", &history, "C");

        assert_eq!(
            prompt,
            vec![
                PromptEntry::system("persona"),
                PromptEntry::human("A"),
                PromptEntry::model("B"),
                PromptEntry::human("C")
            ]
        );
    }

    #[test]
    fn empty_history_yields_system_and_message() {
        let prompt = build_prompt("persona", &[], "Hello");
        let roles: Vec<PromptRole> = prompt.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![PromptRole::System, PromptRole::Human]);
        assert_eq!(prompt[1].content, "Hello");
    }

    #[test]
    fn long_history_is_not_truncated_or_deduplicated() {
        let history: Vec<ChatMessage> = (0..200)
            .map(|i| stored(i, if i % 2 == 0 { Role::User } else { Role::Assistant }, "same"))
            .collect();
        let prompt = build_prompt("persona", &history, "same");
        assert_eq!(prompt.len(), 202);
        assert_eq!(prompt[200].role, PromptRole::Model);
    }
}
