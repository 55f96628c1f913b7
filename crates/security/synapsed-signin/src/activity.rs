//! Minimal activity model used by the sign-in orchestrator
//!
//! Only the fields the orchestrator reads or writes are modelled. Channel
//! specific payloads ride along in `value`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a conversational activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    /// User or bot message
    Message,
    /// Named event
    Event,
    /// Request/response interaction with a short reply window
    Invoke,
    /// Membership change in a conversation
    ConversationUpdate,
    /// Anything this crate does not interpret
    #[serde(other)]
    Unknown,
}

/// Participant in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelAccount {
    /// Channel specific account id
    pub id: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    /// Account with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Conversation reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationAccount {
    /// Conversation id
    pub id: String,
}

/// An incoming or outgoing conversational activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity id assigned by the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Activity kind
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    /// Event or invoke name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Channel the activity arrived on
    pub channel_id: String,
    /// Sender
    pub from: ChannelAccount,
    /// Receiver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    /// Conversation the activity belongs to
    pub conversation: ConversationAccount,
    /// Channel timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Activity {
    fn base(
        activity_type: ActivityType,
        channel_id: impl Into<String>,
        from: impl Into<String>,
        conversation: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            activity_type,
            name: None,
            text: None,
            value: None,
            channel_id: channel_id.into(),
            from: ChannelAccount::new(from),
            recipient: None,
            conversation: ConversationAccount {
                id: conversation.into(),
            },
            timestamp: None,
        }
    }

    /// Build a message activity
    pub fn message(
        channel_id: impl Into<String>,
        from: impl Into<String>,
        conversation: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut activity = Self::base(ActivityType::Message, channel_id, from, conversation);
        activity.text = Some(text.into());
        activity
    }

    /// Build a named event activity
    pub fn event(
        channel_id: impl Into<String>,
        from: impl Into<String>,
        conversation: impl Into<String>,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        let mut activity = Self::base(ActivityType::Event, channel_id, from, conversation);
        activity.name = Some(name.into());
        activity.value = Some(value);
        activity
    }

    /// Set the activity id
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Build a text reply addressed back into this activity's conversation
    pub fn reply_text(&self, text: impl Into<String>) -> Self {
        Self {
            id: None,
            activity_type: ActivityType::Message,
            name: None,
            text: Some(text.into()),
            value: None,
            channel_id: self.channel_id.clone(),
            from: self.recipient.clone().unwrap_or_default(),
            recipient: Some(self.from.clone()),
            conversation: self.conversation.clone(),
            timestamp: Some(Utc::now()),
        }
    }

    /// True for an event activity carrying the given name
    pub fn is_event_named(&self, name: &str) -> bool {
        self.activity_type == ActivityType::Event && self.name.as_deref() == Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let activity = Activity::event("teams", "u1", "c1", "signin/done", json!({"a": 1}));
        let wire = serde_json::to_value(&activity).unwrap();

        assert_eq!(wire["type"], "event");
        assert_eq!(wire["channelId"], "teams");
        assert_eq!(wire["from"]["id"], "u1");
        assert!(wire.get("text").is_none());
        assert!(activity.is_event_named("signin/done"));
        assert!(!activity.is_event_named("other"));
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let activity: Activity = serde_json::from_value(json!({
            "type": "typing",
            "channelId": "web",
            "from": {"id": "u1"},
            "conversation": {"id": "c1"}
        }))
        .unwrap();
        assert_eq!(activity.activity_type, ActivityType::Unknown);
    }

    #[test]
    fn test_reply_swaps_parties() {
        let mut incoming = Activity::message("web", "u1", "c1", "hi");
        incoming.recipient = Some(ChannelAccount::new("bot"));

        let reply = incoming.reply_text("hello");
        assert_eq!(reply.from.id, "bot");
        assert_eq!(reply.recipient.unwrap().id, "u1");
        assert_eq!(reply.conversation.id, "c1");
    }
}
