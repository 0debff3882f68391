use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    #[serde(rename = "me")]
    Me,
    #[serde(rename = "other")]
    Counterpart,
}

/// When a message was sent.
///
/// New messages carry the instant itself. Conversations written by the older
/// screen stored a pre-rendered label like `"Mon, 1 Jan at 09:00"`; those are
/// kept as-is and shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SentAt {
    Instant(DateTime<FixedOffset>),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    #[serde(rename = "user")]
    pub sender: Sender,
    #[serde(rename = "timestamp")]
    pub sent_at: SentAt,
}

impl Message {
    pub fn new(id: String, text: String, sender: Sender, sent_at: DateTime<FixedOffset>) -> Self {
        Self {
            id,
            text,
            sender,
            sent_at: SentAt::Instant(sent_at),
        }
    }

    pub fn is_outgoing(&self) -> bool {
        self.sender == Sender::Me
    }
}

pub fn encode_conversation(messages: &[Message]) -> serde_json::Result<String> {
    serde_json::to_string(messages)
}

pub fn decode_conversation(payload: &str) -> serde_json::Result<Vec<Message>> {
    serde_json::from_str(payload)
}
