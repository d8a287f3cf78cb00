//! Channel reference types.

use serde::{Deserialize, Serialize};

/// Kind of channel a message is delivered to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelKind {
    /// Regular text channel.
    #[default]
    Text,

    /// Thread nested under a parent channel.
    Thread {
        /// Parent channel ID that owns the send endpoint.
        parent_id: String,
    },
}

/// A reference to the channel a delivery targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel ID.
    pub id: String,

    /// Channel kind.
    #[serde(default)]
    pub kind: ChannelKind,
}

impl ChannelRef {
    /// Reference a regular text channel.
    pub fn text(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::Text,
        }
    }

    /// Reference a thread under `parent_id`.
    pub fn thread(id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ChannelKind::Thread {
                parent_id: parent_id.into(),
            },
        }
    }

    /// ID of the channel that owns the send endpoint.
    ///
    /// Threads share their parent's endpoint.
    pub fn endpoint_channel_id(&self) -> &str {
        match &self.kind {
            ChannelKind::Text => &self.id,
            ChannelKind::Thread { parent_id } => parent_id,
        }
    }

    /// Thread ID to attach to outgoing payloads, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match &self.kind {
            ChannelKind::Text => None,
            ChannelKind::Thread { .. } => Some(&self.id),
        }
    }
}
