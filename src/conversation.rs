//! Short-lived conversations between channel users and the AI backend.
//!
//! A conversation is keyed by `(user, channel)` and stays active while the
//! user keeps talking to the bot at least once per [`CONVERSATION_TTL`].
//! While active, earlier turns are sent as context; once it lapses the next
//! addressed message starts from scratch.

use relay_proto::irc_to_lower;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::ai::AiBackend;
use crate::error::AiError;

/// Idle time after which a conversation is forgotten.
pub const CONVERSATION_TTL: Duration = Duration::from_secs(60);
/// Turns kept per conversation (user and assistant each count as one).
pub const MAX_TURNS: usize = 20;
/// Sent to the channel when the backend produces nothing usable.
pub const APOLOGY: &str = "I'm sorry, I couldn't generate a response at this time.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

/// Case-folded `(user, channel)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub user: String,
    pub channel: String,
}

impl ConversationKey {
    pub fn new(user: &str, channel: &str) -> Self {
        Self {
            user: irc_to_lower(user),
            channel: irc_to_lower(channel),
        }
    }
}

#[derive(Debug)]
struct Conversation {
    last_interaction: Instant,
    turns: Vec<Turn>,
}

/// Everything a backend call needs, detached from the tracker so the call
/// can run on another task.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub key: ConversationKey,
    /// Reply target as it appeared on the wire.
    pub channel: String,
    pub user: String,
    pub prompt: String,
    pub history: Vec<Turn>,
}

/// Whether a channel message mentions `nick` (case-insensitive).
pub fn is_addressed(text: &str, nick: &str) -> bool {
    !nick.is_empty() && irc_to_lower(text).contains(&irc_to_lower(nick))
}

#[derive(Debug)]
pub struct ConversationTracker {
    sessions: HashMap<ConversationKey, Conversation>,
    ttl: Duration,
}

impl Default for ConversationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::with_ttl(CONVERSATION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
        }
    }

    /// Active means the last interaction is strictly younger than the TTL.
    pub fn is_active(&self, user: &str, channel: &str, now: Instant) -> bool {
        self.sessions
            .get(&ConversationKey::new(user, channel))
            .is_some_and(|c| now.saturating_duration_since(c.last_interaction) < self.ttl)
    }

    /// Start a backend call: look up or create the conversation, refresh
    /// its timestamp and snapshot the history to send.
    pub fn begin(&mut self, user: &str, channel: &str, text: &str, now: Instant) -> GenerationRequest {
        let key = ConversationKey::new(user, channel);
        let ttl = self.ttl;
        let conversation = self.sessions.entry(key.clone()).or_insert_with(|| Conversation {
            last_interaction: now,
            turns: Vec::new(),
        });
        if now.saturating_duration_since(conversation.last_interaction) >= ttl {
            // Lapsed but not yet swept: start over.
            conversation.turns.clear();
        }
        conversation.last_interaction = now;

        GenerationRequest {
            key,
            channel: channel.to_string(),
            user: user.to_string(),
            prompt: text.to_string(),
            history: conversation.turns.clone(),
        }
    }

    /// Finish a backend call. On success the exchange is appended to the
    /// history and the reply returned; on failure `None`. Sweeps afterwards.
    pub fn complete(
        &mut self,
        request: &GenerationRequest,
        outcome: Result<String, AiError>,
        now: Instant,
    ) -> Option<String> {
        let reply = match outcome {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(user = %request.user, channel = %request.channel, "Backend returned an empty reply");
                None
            }
            Err(e) => {
                warn!(user = %request.user, channel = %request.channel, error = %e, code = e.error_code(), "Backend call failed");
                None
            }
        };

        if let Some(reply) = &reply
            && let Some(conversation) = self.sessions.get_mut(&request.key)
        {
            conversation.turns.push(Turn::user(&request.prompt));
            conversation.turns.push(Turn::assistant(reply));
            let excess = conversation.turns.len().saturating_sub(MAX_TURNS);
            conversation.turns.drain(..excess);
        }

        self.sweep(now);
        reply
    }

    /// Run one addressed message through `backend` inline.
    pub async fn addressed_message(
        &mut self,
        backend: &dyn AiBackend,
        user: &str,
        channel: &str,
        text: &str,
    ) -> Option<String> {
        let request = self.begin(user, channel, text, Instant::now());
        let outcome = backend.generate(&request.prompt, &request.history).await;
        self.complete(&request, outcome, Instant::now())
    }

    /// Drop lapsed conversations; returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions
            .retain(|_, c| now.saturating_duration_since(c.last_interaction) < ttl);
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!(removed, "Expired conversations swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
