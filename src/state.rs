//! UI-agnostic conversation types
//!
//! Transcript entries and session settings shared by the session state
//! machine, the completion client and the terminal front end.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a transcript entry's author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    /// Wire name to role; roles this app does not model yield `None`
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(ChatRole::System),
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

/// One entry of the in-memory transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub id: u64,
    pub role: ChatRole,
    pub content: String,
}

/// The wire form of an entry: role and content only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl From<&TranscriptEntry> for ChatMessage {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            role: entry.role,
            content: entry.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Friend,
    Guide,
    Therapist,
    Scholar,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Friend => "friend",
            Persona::Guide => "guide",
            Persona::Therapist => "therapist",
            Persona::Scholar => "scholar",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "friend" => Some(Persona::Friend),
            "guide" => Some(Persona::Guide),
            "therapist" => Some(Persona::Therapist),
            "scholar" => Some(Persona::Scholar),
            _ => None,
        }
    }

    pub fn all() -> Vec<Persona> {
        vec![Persona::Friend, Persona::Guide, Persona::Therapist, Persona::Scholar]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::Friend => "Friend",
            Persona::Guide => "Guide",
            Persona::Therapist => "Therapist",
            Persona::Scholar => "Scholar",
        }
    }

    /// The system directive injected whenever the configuration changes
    pub fn directive(&self) -> String {
        format!("Act as {}", self.as_str())
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl ResponseLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseLength::Short => "short",
            ResponseLength::Medium => "medium",
            ResponseLength::Long => "long",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "short" => Some(ResponseLength::Short),
            "medium" => Some(ResponseLength::Medium),
            "long" => Some(ResponseLength::Long),
            _ => None,
        }
    }

    pub fn all() -> Vec<ResponseLength> {
        vec![ResponseLength::Short, ResponseLength::Medium, ResponseLength::Long]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResponseLength::Short => "Short",
            ResponseLength::Medium => "Medium",
            ResponseLength::Long => "Long",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            ResponseLength::Short => 500,
            ResponseLength::Medium => 1500,
            ResponseLength::Long => 3000,
        }
    }

    /// Token budget for a length given as free text; unknown values get the medium budget
    pub fn max_tokens_for(value: &str) -> u32 {
        Self::from_str(value)
            .unwrap_or(ResponseLength::Medium)
            .max_tokens()
    }
}

impl fmt::Display for ResponseLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active persona and response length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub persona: Persona,
    pub response_length: ResponseLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_token_budgets() {
        assert_eq!(ResponseLength::max_tokens_for("short"), 500);
        assert_eq!(ResponseLength::max_tokens_for("medium"), 1500);
        assert_eq!(ResponseLength::max_tokens_for("long"), 3000);
        assert_eq!(ResponseLength::max_tokens_for("epic"), 1500);
        assert_eq!(ResponseLength::max_tokens_for(""), 1500);
    }

    #[test]
    fn test_persona_directive() {
        assert_eq!(Persona::Guide.directive(), "Act as guide");
        assert_eq!(Persona::Scholar.directive(), "Act as scholar");
    }

    #[test]
    fn test_persona_parse_is_case_insensitive() {
        assert_eq!(Persona::from_str("Therapist"), Some(Persona::Therapist));
        assert_eq!(Persona::from_str(" FRIEND "), Some(Persona::Friend));
        assert_eq!(Persona::from_str("pirate"), None);
    }

    #[test]
    fn test_message_strips_id() {
        let entry = TranscriptEntry {
            id: 42,
            role: ChatRole::User,
            content: "Hello".to_string(),
        };
        let json = serde_json::to_value(ChatMessage::from(&entry)).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "Hello"}));
    }
}
