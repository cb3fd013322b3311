//! One upstream session: adapter task, actor task and the handle to them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, warn};

use super::actor::{ActorInputs, SessionActor};
use super::handle::SessionHandle;
use crate::adapter::{IrcAdapter, command_channel};
use crate::ai::AiBackend;
use crate::config::{IrcConfig, ModerationSettings};
use crate::error::{AdapterError, SessionError};
use crate::moderation::{ModerationConfig, ModerationEngine};
use crate::plugins::{PluginCatalog, PluginRegistry};
use crate::relay::{Hub, RelayBroadcaster};
use crate::state::SessionState;
use crate::storage::ModuleDescriptor;
use crate::telemetry::spans;

/// How long teardown waits for each task.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a fresh session is built from.
pub struct SessionParams {
    pub irc: IrcConfig,
    pub ai: Arc<dyn AiBackend>,
    pub catalog: PluginCatalog,
    pub modules: Vec<ModuleDescriptor>,
    pub moderation_settings: ModerationSettings,
    pub moderation: Vec<ModerationConfig>,
}

/// A live session. Dropping it without [`SessionContext::stop`] cancels the
/// adapter; the actor then clears up when the adapter reports the disconnect.
pub struct SessionContext {
    handle: SessionHandle,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
    actor: JoinHandle<()>,
    adapter: JoinHandle<Result<(), AdapterError>>,
    server: String,
}

impl SessionContext {
    /// Spawn the adapter and actor tasks.
    pub fn start(params: SessionParams, hub: Hub) -> Self {
        let span = spans::session(&params.irc.server, &params.irc.nick);
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (plugin_tx, plugin_rx) = mpsc::unbounded_channel();
        let (adapter_handle, commands_rx) = command_channel();

        let mut moderation = ModerationEngine::new(&params.moderation_settings);
        moderation.replace_configs(params.moderation);

        // Plugin constructors may capture the runtime, so load inside it.
        let mut plugins = PluginRegistry::new(params.catalog, plugin_tx);
        plugins.load(params.modules);

        let actor = SessionActor::new(
            SessionState::new(&params.irc.nick),
            moderation,
            plugins,
            RelayBroadcaster::new(hub),
            adapter_handle,
            params.ai,
        );
        let actor = tokio::spawn(
            actor
                .run(ActorInputs {
                    events: events_rx,
                    inputs: inputs_rx,
                    plugin_output: plugin_rx,
                })
                .instrument(span.clone()),
        );

        let server = params.irc.server.clone();
        let adapter = IrcAdapter::new(params.irc, events_tx, commands_rx, cancel.clone());
        let adapter = tokio::spawn(adapter.run().instrument(span));

        Self {
            handle: SessionHandle::new(inputs_tx),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            actor,
            adapter,
            server,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// The actor is still accepting input.
    pub fn is_alive(&self) -> bool {
        !self.actor.is_finished()
    }

    /// Stop the adapter, have the actor clear its state, wait for both.
    pub async fn stop(self) -> Result<(), SessionError> {
        self.cancel.cancel();

        let cleared = if self.is_alive() {
            self.handle.shutdown(STOP_TIMEOUT).await
        } else {
            Ok(())
        };
        // An actor that already stopped on its own cleared before exiting.
        let cleared = match cleared {
            Err(SessionError::Closed) => Ok(()),
            other => other,
        };

        match tokio::time::timeout(STOP_TIMEOUT, self.adapter).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "Adapter ended with error"),
            Ok(Err(e)) => warn!(error = %e, "Adapter task failed"),
            Err(_) => warn!("Adapter did not stop in time"),
        }
        if tokio::time::timeout(STOP_TIMEOUT, self.actor).await.is_err() {
            warn!("Session actor did not stop in time");
        }
        cleared
    }
}

