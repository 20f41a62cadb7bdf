//! Context assembly for the generation call: persona, long-horizon memory
//! block, short-horizon channel turns, then the triggering message.

use crate::generation::{ContextEntry, EntryRole};
use murmur_memory::{Role, Turn};

/// Built-in persona, used when the config does not override it.
fn default_persona(agent_name: &str, user_name: &str) -> String {
    format!(
        "You are {agent_name}, a regular in this chat. Keep replies short, \
casual and in lowercase with minimal punctuation, one to three sentences. \
You are talking with {user_name}; use their name occasionally, not every \
time. Stay in character and never sound like an assistant."
    )
}

/// Assemble the ordered role-tagged entries for one generation call.
///
/// `memory_block` comes from the memory store's context renderer; when empty
/// the section is omitted entirely rather than framed with empty markers.
pub fn build_entries(
    persona_override: Option<&str>,
    agent_name: &str,
    user_name: &str,
    memory_block: &str,
    turns: &[Turn],
    user_message: &str,
) -> Vec<ContextEntry> {
    let mut system = match persona_override {
        Some(p) => p.replace("{user_name}", user_name),
        None => default_persona(agent_name, user_name),
    };
    if !memory_block.is_empty() {
        system.push_str("\n\n");
        system.push_str(memory_block);
    }

    let mut entries = vec![ContextEntry::new(EntryRole::System, system)];
    for turn in turns {
        let role = match turn.role {
            Role::User => EntryRole::User,
            Role::Assistant => EntryRole::Assistant,
        };
        entries.push(ContextEntry::new(role, turn.text.clone()));
    }
    entries.push(ContextEntry::new(EntryRole::User, user_message));
    entries
}
