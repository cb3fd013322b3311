use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::types::{SessionInput, SessionSnapshot};
use crate::error::SessionError;
use crate::moderation::ModerationConfig;
use crate::relay::Intent;
use crate::storage::ModuleDescriptor;

/// Cloneable handle to a running session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionInput>,
}

impl SessionHandle {
    pub(super) fn new(tx: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self { tx }
    }

    fn post(&self, input: SessionInput) -> Result<(), SessionError> {
        self.tx.send(input).map_err(|_| SessionError::Closed)
    }

    /// Queue an observer intent. Returns once queued; the effect shows up
    /// later as relay notifications.
    pub fn submit(&self, intent: Intent) -> Result<(), SessionError> {
        self.post(SessionInput::Intent(intent))
    }

    pub fn reload_moderation(&self, configs: Vec<ModerationConfig>) -> Result<(), SessionError> {
        self.post(SessionInput::ReloadModeration(configs))
    }

    pub fn reload_modules(&self, descriptors: Vec<ModuleDescriptor>) -> Result<(), SessionError> {
        self.post(SessionInput::ReloadModules(descriptors))
    }

    pub fn reload_module(&self, id: i64, descriptor: Option<ModuleDescriptor>) -> Result<(), SessionError> {
        self.post(SessionInput::ReloadModule { id, descriptor })
    }

    pub async fn inspect(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(SessionInput::Inspect { reply_tx })?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Ask the actor to clear its state and stop; waits for the
    /// acknowledgement up to `limit`.
    pub async fn shutdown(&self, limit: Duration) -> Result<(), SessionError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.post(SessionInput::Shutdown { ack_tx })?;
        match tokio::time::timeout(limit, ack_rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::ShutdownTimeout),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
