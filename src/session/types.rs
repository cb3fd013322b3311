use tokio::sync::oneshot;

use crate::conversation::GenerationRequest;
use crate::error::AiError;
use crate::moderation::ModerationConfig;
use crate::relay::Intent;
use crate::storage::ModuleDescriptor;

/// Messages the session actor accepts besides inbound protocol events.
#[derive(Debug)]
pub enum SessionInput {
    /// Observer request; fire-and-forget.
    Intent(Intent),
    ReloadModeration(Vec<ModerationConfig>),
    ReloadModules(Vec<ModuleDescriptor>),
    ReloadModule {
        id: i64,
        descriptor: Option<ModuleDescriptor>,
    },
    Inspect {
        reply_tx: oneshot::Sender<SessionSnapshot>,
    },
    /// Clear all state, acknowledge, stop.
    Shutdown {
        ack_tx: oneshot::Sender<()>,
    },
}

/// Result of a backend call run off the actor.
pub(super) type Completion = (GenerationRequest, Result<String, AiError>);

/// Point-in-time view of the actor, for operators and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub nick: String,
    pub channels: Vec<String>,
    pub conversations: usize,
    pub flood_windows: usize,
    pub modules: Vec<i64>,
}
