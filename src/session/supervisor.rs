//! Owns the current session and its lifecycle.
//!
//! Connect builds a fresh [`SessionContext`] from storage; disconnect tears
//! it down. At most one connect or reconnect runs at a time; a second
//! caller gets [`SessionError::ConnectInProgress`] instead of waiting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::context::{SessionContext, SessionParams};
use super::handle::SessionHandle;
use crate::ai;
use crate::config::ModerationSettings;
use crate::error::SessionError;
use crate::plugins::PluginCatalog;
use crate::relay::Hub;
use crate::storage::Storage;

/// Clears the in-flight flag when the connect attempt ends, however it ends.
struct ConnectGuard<'a>(&'a AtomicBool);

impl<'a> ConnectGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::ConnectInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Supervisor {
    storage: Arc<dyn Storage>,
    hub: Hub,
    catalog: PluginCatalog,
    moderation: ModerationSettings,
    current: Mutex<Option<SessionContext>>,
    connecting: AtomicBool,
}

impl Supervisor {
    pub fn new(
        storage: Arc<dyn Storage>,
        hub: Hub,
        catalog: PluginCatalog,
        moderation: ModerationSettings,
    ) -> Self {
        Self {
            storage,
            hub,
            catalog,
            moderation,
            current: Mutex::new(None),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Handle to the live session, if any.
    pub async fn current(&self) -> Option<SessionHandle> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|ctx| ctx.is_alive())
            .map(|ctx| ctx.handle().clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.current().await.is_some()
    }

    /// Start a fresh session from the stored connection settings.
    pub async fn connect(&self) -> Result<SessionHandle, SessionError> {
        let _guard = ConnectGuard::acquire(&self.connecting)?;
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(SessionContext::is_alive) {
            return Err(SessionError::AlreadyConnected);
        }
        // A session that ended on its own leaves a finished context behind.
        if let Some(stale) = current.take() {
            let _ = stale.stop().await;
        }
        self.start_locked(&mut current).await
    }

    /// Tear down the live session. Observers are told it is gone.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let context = self.current.lock().await.take();
        match context {
            Some(ctx) if ctx.is_alive() => {
                info!(server = %ctx.server(), "Disconnecting session");
                ctx.stop().await
            }
            Some(ctx) => {
                let _ = ctx.stop().await;
                Err(SessionError::NotConnected)
            }
            None => Err(SessionError::NotConnected),
        }
    }

    /// Disconnect (if connected) and connect again as a fresh session.
    pub async fn reconnect(&self) -> Result<SessionHandle, SessionError> {
        let _guard = ConnectGuard::acquire(&self.connecting)?;
        let mut current = self.current.lock().await;
        if let Some(ctx) = current.take()
            && let Err(e) = ctx.stop().await
        {
            warn!(error = %e, "Previous session did not stop cleanly");
        }
        self.start_locked(&mut current).await
    }

    async fn start_locked(&self, slot: &mut Option<SessionContext>) -> Result<SessionHandle, SessionError> {
        let irc = self.storage.connection_settings().await?;
        let ai_config = self.storage.ai_settings().await?;
        let modules = self.storage.enabled_modules().await?;
        let moderation = self.storage.moderation_configs().await?;

        info!(server = %irc.server, port = irc.port, nick = %irc.nick, tls = irc.tls, "Starting session");
        let context = SessionContext::start(
            SessionParams {
                irc,
                ai: ai::from_config(&ai_config),
                catalog: self.catalog.clone(),
                modules,
                moderation_settings: self.moderation.clone(),
                moderation,
            },
            self.hub.clone(),
        );
        let handle = context.handle().clone();
        *slot = Some(context);
        Ok(handle)
    }

    /// Re-read moderation configs and hand them to the live session.
    /// Returns how many channel configs were loaded.
    pub async fn reload_moderation(&self) -> Result<usize, SessionError> {
        let configs = self.storage.moderation_configs().await?;
        let count = configs.len();
        let handle = self.current().await.ok_or(SessionError::NotConnected)?;
        handle.reload_moderation(configs)?;
        Ok(count)
    }

    /// Re-read enabled modules and reload them all.
    pub async fn reload_modules(&self) -> Result<usize, SessionError> {
        let descriptors = self.storage.enabled_modules().await?;
        let count = descriptors.len();
        let handle = self.current().await.ok_or(SessionError::NotConnected)?;
        handle.reload_modules(descriptors)?;
        Ok(count)
    }

    /// Reload one module from storage; a missing or disabled module is unloaded.
    pub async fn reload_module(&self, id: i64) -> Result<(), SessionError> {
        let descriptor = self.storage.module(id).await?;
        let handle = self.current().await.ok_or(SessionError::NotConnected)?;
        handle.reload_module(id, descriptor)
    }

    /// Disconnect if connected; used at process exit.
    pub async fn shutdown(&self) {
        match self.disconnect().await {
            Ok(()) | Err(SessionError::NotConnected) => {}
            Err(e) => warn!(error = %e, "Session did not shut down cleanly"),
        }
    }
}
