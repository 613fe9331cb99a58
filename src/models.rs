use crate::types::{Language, Timestamp};
use serde::{Deserialize, Serialize};

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";

// ============================================================================
// Transcript
// ============================================================================

/// One resolved increment of a streamed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToken {
    pub content: String,
    pub role: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    pub loading: bool,
    pub response_time: String,
    pub chunks: Vec<MessageToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub role: String,
    pub timestamp: Timestamp,
    pub meta: MessageMeta,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            content: content.into(),
            role: role.into(),
            timestamp,
            meta: MessageMeta::default(),
        }
    }

    /// Empty, still-loading entry that streamed deltas are folded into.
    pub fn placeholder(timestamp: Timestamp) -> Self {
        Self {
            content: String::new(),
            role: String::new(),
            timestamp,
            meta: MessageMeta {
                loading: true,
                ..MessageMeta::default()
            },
        }
    }

    pub fn is_loading(&self) -> bool {
        self.meta.loading
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ROLE_ASSISTANT
    }

    /// Number of streamed increments, used as a token count.
    pub fn token_count(&self) -> usize {
        self.meta.chunks.len()
    }

    pub fn formatted_timestamp(&self, language: Language) -> String {
        self.timestamp.format_local(language)
    }

    /// Append one delta; content and role only ever grow.
    pub fn push_delta(&mut self, content: &str, role: &str, at: Timestamp) {
        self.content.push_str(content);
        self.role.push_str(role);
        self.meta.chunks.push(MessageToken {
            content: content.to_string(),
            role: role.to_string(),
            timestamp: at,
        });
    }

    pub fn to_request_message(&self) -> RequestMessage {
        RequestMessage {
            role: self.role.clone(),
            content: self.content.clone(),
        }
    }
}

/// Caller-supplied message for a new submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageParams {
    pub role: String,
    pub content: String,
}

impl ChatMessageParams {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn into_message(self, timestamp: Timestamp) -> ChatMessage {
        ChatMessage::new(self.role, self.content, timestamp)
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn streaming<'a>(
        model: impl Into<String>,
        history: impl IntoIterator<Item = &'a ChatMessage>,
    ) -> Self {
        Self {
            model: model.into(),
            messages: history
                .into_iter()
                .map(ChatMessage::to_request_message)
                .collect(),
            stream: true,
        }
    }

    /// Same body, answered with a single JSON response.
    pub fn buffered<'a>(
        model: impl Into<String>,
        history: impl IntoIterator<Item = &'a ChatMessage>,
    ) -> Self {
        Self {
            stream: false,
            ..Self::streaming(model, history)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub message: RequestMessage,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Body of a non-streaming completion response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<CompletionChoice>,
}

impl CompletionPayload {
    pub fn first_message(&self) -> Option<&RequestMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChoice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Body of one streamed `data:` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<DeltaChoice>,
}

impl DeltaPayload {
    /// `(content, role)` of the first choice, missing parts as empty strings.
    pub fn increment(&self) -> Option<(&str, &str)> {
        let delta = &self.choices.first()?.delta;
        Some((
            delta.content.as_deref().unwrap_or(""),
            delta.role.as_deref().unwrap_or(""),
        ))
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first()?.finish_reason.as_deref()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_delta_appends() {
        let mut message = ChatMessage::placeholder(Timestamp::from_millis(1));
        message.push_delta("", "assistant", Timestamp::from_millis(2));
        message.push_delta("Hel", "", Timestamp::from_millis(3));
        message.push_delta("lo", "", Timestamp::from_millis(4));

        assert_eq!(message.content, "Hello");
        assert_eq!(message.role, "assistant");
        assert_eq!(message.token_count(), 3);
        assert!(message.is_assistant());
        assert!(message.is_loading());
    }

    #[test]
    fn test_delta_payload_parsing() {
        let json = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-3.5-turbo",
            "choices":[{"delta":{"content":"Hi"},"index":0,"finish_reason":null}]}"#;
        let payload: DeltaPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.increment(), Some(("Hi", "")));
        assert_eq!(payload.finish_reason(), None);

        let stop: DeltaPayload =
            serde_json::from_str(r#"{"choices":[{"delta":{},"index":0,"finish_reason":"stop"}]}"#)
                .unwrap();
        assert_eq!(stop.increment(), Some(("", "")));
        assert_eq!(stop.finish_reason(), Some("stop"));

        let empty: DeltaPayload = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(empty.increment(), None);
    }

    #[test]
    fn test_request_serialization() {
        let history = vec![
            ChatMessageParams::system("Be brief").into_message(Timestamp::from_millis(1)),
            ChatMessageParams::user("Hi").into_message(Timestamp::from_millis(1)),
        ];
        let request = ChatCompletionRequest::streaming("gpt-4", &history);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert!(json["messages"][1].get("meta").is_none());
    }

    #[test]
    fn test_buffered_request_and_response() {
        let history = vec![ChatMessageParams::user("Hi").into_message(Timestamp::from_millis(1))];
        let request = ChatCompletionRequest::buffered("gpt-4", &history);
        assert!(!request.stream);
        assert_eq!(request.messages.len(), 1);

        let json = r#"{"id":"chatcmpl-2","object":"chat.completion","choices":[
            {"index":0,"message":{"role":"assistant","content":"Hello!"},"finish_reason":"stop"}]}"#;
        let payload: CompletionPayload = serde_json::from_str(json).unwrap();
        let message = payload.first_message().unwrap();
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "Hello!");
    }

    #[test]
    fn test_meta_uses_camel_case() {
        let message = ChatMessage::placeholder(Timestamp::from_millis(5));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["meta"]["loading"], true);
        assert_eq!(json["meta"]["responseTime"], "");
        assert_eq!(json["timestamp"], 5);
    }

    #[test]
    fn test_blank_params() {
        assert!(ChatMessageParams::user("   \n").is_blank());
        assert!(!ChatMessageParams::user("hi").is_blank());
    }
}
