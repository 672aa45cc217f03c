use ahash::AHashMap;
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Oldest messages are evicted past this per-route capacity.
pub const CHAT_HISTORY_CAPACITY: usize = 50;
/// Message text is truncated to this many characters before storage.
pub const CHAT_TEXT_MAX_CHARS: usize = 500;

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub route_id: String,
    pub author: String,
    pub text: String,
    pub author_session_id: String,
    pub timestamp_ms: i64,
}

/// Per-route bounded chat history. Messages are never mutated after append
/// and only leave by capacity eviction; nothing survives a restart.
#[derive(Debug, Default)]
pub struct ChatRelay {
    rooms: AHashMap<String, VecDeque<ChatMessage>>,
}

impl ChatRelay {
    pub fn new() -> ChatRelay {
        ChatRelay {
            rooms: AHashMap::new(),
        }
    }

    pub fn history(&self, route_id: &str) -> Vec<ChatMessage> {
        self.rooms
            .get(route_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append a message, truncating its text and evicting the oldest entry
    /// when the room is at capacity. Returns the stored message for fan-out.
    pub fn append(
        &mut self,
        route_id: &str,
        author: &str,
        text: &str,
        author_session_id: &str,
        now_ms: i64,
    ) -> ChatMessage {
        let capped: String = text.chars().take(CHAT_TEXT_MAX_CHARS).collect();

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            route_id: route_id.to_string(),
            author: author.to_string(),
            text: capped,
            author_session_id: author_session_id.to_string(),
            timestamp_ms: now_ms,
        };

        let room = self.rooms.entry(route_id.to_string()).or_default();
        room.push_back(message.clone());
        if room.len() > CHAT_HISTORY_CAPACITY {
            room.pop_front();
        }

        message
    }
}
