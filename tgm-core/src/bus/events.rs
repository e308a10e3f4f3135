//! Cross events exchanged between the chat side and the voice side

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlates a request sent to the other side with its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event produced by the chat side for the voice side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// Someone in chat asked who is connected to the voice server
    UserListRequested { request_id: RequestId },
}

/// Event produced by the voice side for the chat side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceEvent {
    /// A user connected to the voice server
    UserJoined { username: String },
    /// A user disconnected from the voice server
    UserLeft { username: String },
    /// Answer to [`ChatEvent::UserListRequested`], echoing its id
    UserListFetched {
        request_id: RequestId,
        usernames: Vec<String>,
    },
}

impl VoiceEvent {
    /// Request id this event answers, if it is a response
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            VoiceEvent::UserListFetched { request_id, .. } => Some(*request_id),
            VoiceEvent::UserJoined { .. } | VoiceEvent::UserLeft { .. } => None,
        }
    }
}
