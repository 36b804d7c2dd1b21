use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name in the provider's chat history format.
    pub fn provider_role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// One prior turn as the provider expects it: `{ role, parts: [{ text }] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTurn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

impl ProviderTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role: role.provider_role().to_string(),
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

impl From<&Message> for ProviderTurn {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.text.as_str())
    }
}

/// Ordered, append-only chat transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) -> &Message {
        self.messages.push(Message {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        self.messages.as_slice()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn to_provider_turns(&self) -> Vec<ProviderTurn> {
        self.messages.iter().map(ProviderTurn::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn provider_turns_use_model_role_for_assistant() -> anyhow::Result<()> {
        let mut transcript = Transcript::new();
        transcript.push(Role::Assistant, "Hello! Ask me anything.");
        transcript.push(Role::User, "which background for a visa photo?");

        let turns = serde_json::to_value(transcript.to_provider_turns())?;
        assert_eq!(
            turns,
            json!([
                {"role": "model", "parts": [{"text": "Hello! Ask me anything."}]},
                {"role": "user", "parts": [{"text": "which background for a visa photo?"}]},
            ])
        );
        Ok(())
    }

    #[test]
    fn push_assigns_distinct_ids_in_order() {
        let mut transcript = Transcript::new();
        let first = transcript.push(Role::User, "one").id.clone();
        let second = transcript.push(Role::User, "two").id.clone();
        assert_ne!(first, second);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().map(|m| m.text.as_str()), Some("two"));
        assert_eq!(transcript.messages()[0].id, first);
    }
}
