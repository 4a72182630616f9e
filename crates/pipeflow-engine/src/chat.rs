//! Conversational responder.
//!
//! Chat-only inputs bypass the plan DAG entirely.  The engine delegates to a
//! [`ChatResponder`] collaborator (typically an LLM); when that fails, a
//! deterministic keyword-group reply table answers instead.  The table is
//! matched with an [`aho_corasick`] automaton over the lowercased, padded
//! input.

use aho_corasick::AhoCorasick;
use async_trait::async_trait;
use chrono::Local;

use crate::error::Result;

/// Produces a single reply string for a conversational input.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn reply(&self, user_text: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Preset reply table
// ---------------------------------------------------------------------------

/// Reply groups, checked in priority order when several keywords match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ReplyGroup {
    Greeting,
    Identity,
    TimeOfDay,
    Thanks,
    Farewell,
    Presence,
}

/// Keyword table.  Patterns are matched against the lowercased input padded
/// with spaces, so word-ish keywords carry their own boundaries.
const KEYWORDS: [(&str, ReplyGroup); 24] = [
    (" hello ", ReplyGroup::Greeting),
    (" hi ", ReplyGroup::Greeting),
    (" hey ", ReplyGroup::Greeting),
    ("good morning", ReplyGroup::Greeting),
    ("good afternoon", ReplyGroup::Greeting),
    ("good evening", ReplyGroup::Greeting),
    ("你好", ReplyGroup::Greeting),
    ("who are you", ReplyGroup::Identity),
    ("what can you do", ReplyGroup::Identity),
    ("what are you", ReplyGroup::Identity),
    ("你是谁", ReplyGroup::Identity),
    ("what time", ReplyGroup::TimeOfDay),
    ("current time", ReplyGroup::TimeOfDay),
    ("几点", ReplyGroup::TimeOfDay),
    (" thank", ReplyGroup::Thanks),
    ("谢谢", ReplyGroup::Thanks),
    (" bye ", ReplyGroup::Farewell),
    ("goodbye", ReplyGroup::Farewell),
    ("see you", ReplyGroup::Farewell),
    ("再见", ReplyGroup::Farewell),
    ("are you there", ReplyGroup::Presence),
    ("are you busy", ReplyGroup::Presence),
    ("how are you", ReplyGroup::Presence),
    ("在吗", ReplyGroup::Presence),
];

/// Deterministic fallback responder backed by the keyword table.
pub struct PresetResponder {
    matcher: AhoCorasick,
    groups: Vec<ReplyGroup>,
}

impl PresetResponder {
    /// Build the automaton once.
    pub fn new() -> Self {
        let patterns: Vec<&str> = KEYWORDS.iter().map(|(k, _)| *k).collect();
        let groups: Vec<ReplyGroup> = KEYWORDS.iter().map(|(_, g)| *g).collect();
        Self {
            matcher: AhoCorasick::new(patterns).expect("keyword table is valid"),
            groups,
        }
    }

    /// The preset reply for an input, never failing.
    pub fn preset(&self, user_text: &str) -> String {
        let padded = format!(" {} ", user_text.to_lowercase());

        let group = self
            .matcher
            .find_iter(&padded)
            .map(|m| self.groups[m.pattern().as_usize()])
            .min();

        match group {
            Some(ReplyGroup::Greeting) => {
                "Hello! Great to see you. I can run tasks for you — what would you like to do?"
                    .to_string()
            }
            Some(ReplyGroup::Identity) => {
                "I'm a task assistant. I can search for information, process text and images, \
                 translate, and chain tools together to get things done."
                    .to_string()
            }
            Some(ReplyGroup::TimeOfDay) => {
                format!("It is {} right now.", Local::now().format("%H:%M"))
            }
            Some(ReplyGroup::Thanks) => {
                "You're welcome! Happy to help — just ask if anything else comes up.".to_string()
            }
            Some(ReplyGroup::Farewell) => {
                "Goodbye! Have a great day, and come back any time.".to_string()
            }
            Some(ReplyGroup::Presence) => {
                "I'm here and ready to help. What do you need?".to_string()
            }
            None => {
                "I understand the question, but I need a bit more detail to help. Tell me what \
                 you want to do, or try asking me to search for something."
                    .to_string()
            }
        }
    }
}

impl Default for PresetResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatResponder for PresetResponder {
    async fn reply(&self, user_text: &str) -> Result<String> {
        Ok(self.preset(user_text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
