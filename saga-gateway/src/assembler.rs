//! Builds the message list submitted for completion.

use crate::persona::BotIdentity;
use crate::provider::Message;
use crate::session::{FactMap, Session};

/// Label opening the facts context entry.
pub const FACTS_LABEL: &str = "User facts remembered: ";

/// Render remembered facts as a single system entry.
pub fn facts_context(facts: &FactMap) -> Message {
    // A Map of JSON values always serializes
    let rendered = serde_json::to_string(facts).unwrap_or_else(|_| "{}".to_string());
    Message::system(format!("{}{}", FACTS_LABEL, rendered))
}

/// Extend the session history for a new user message.
///
/// 1. Empty history → system preamble for `mode`.
/// 2. Non-empty facts → facts context entry (added on every such turn).
/// 3. The user message, verbatim.
pub fn assemble(identity: &BotIdentity, mode: &str, session: &Session, user_text: &str) -> Vec<Message> {
    let mut messages = session.messages.clone();

    if messages.is_empty() {
        messages.push(Message::system(identity.system_preamble(mode)));
    }

    if !session.facts.is_empty() {
        messages.push(facts_context(&session.facts));
    }

    messages.push(Message::user(user_text));
    messages
}
