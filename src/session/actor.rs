//! The single writer for everything a session knows.
//!
//! One task owns roster state, moderation windows, conversations, the
//! plugin registry and the relay broadcaster. Protocol events, observer
//! intents, plugin output and backend completions all arrive as messages
//! and are processed one at a time.

use chrono::Utc;
use relay_proto::{is_channel_name, split_text};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{Completion, SessionInput, SessionSnapshot};
use crate::adapter::AdapterHandle;
use crate::ai::AiBackend;
use crate::conversation::{APOLOGY, ConversationTracker, GenerationRequest, is_addressed};
use crate::error::AiError;
use crate::event::{InboundEvent, OutboundCommand};
use crate::metrics;
use crate::moderation::ModerationEngine;
use crate::plugins::{PluginOutput, PluginRegistry, parse_command};
use crate::relay::{Intent, RelayBroadcaster};
use crate::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Receiving ends the actor drains.
pub struct ActorInputs {
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
    pub inputs: mpsc::UnboundedReceiver<SessionInput>,
    pub plugin_output: mpsc::UnboundedReceiver<PluginOutput>,
}

pub struct SessionActor {
    state: SessionState,
    moderation: ModerationEngine,
    conversations: ConversationTracker,
    plugins: PluginRegistry,
    relay: RelayBroadcaster,
    adapter: AdapterHandle,
    ai: Arc<dyn AiBackend>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl SessionActor {
    pub fn new(
        state: SessionState,
        moderation: ModerationEngine,
        plugins: PluginRegistry,
        relay: RelayBroadcaster,
        adapter: AdapterHandle,
        ai: Arc<dyn AiBackend>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            state,
            moderation,
            conversations: ConversationTracker::new(),
            plugins,
            relay,
            adapter,
            ai,
            completions_tx,
            completions_rx,
        }
    }

    /// The main actor loop. Ends on disconnect or shutdown.
    pub async fn run(mut self, mut rx: ActorInputs) {
        loop {
            let flow = tokio::select! {
                event = rx.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        self.teardown("adapter gone");
                        Flow::Stop
                    }
                },
                input = rx.inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => {
                        self.teardown("all handles dropped");
                        Flow::Stop
                    }
                },
                Some(output) = rx.plugin_output.recv() => {
                    debug!(module_id = output.module_id, target = %output.target, "Plugin output");
                    self.say(&output.target, &output.text);
                    Flow::Continue
                }
                Some((request, outcome)) = self.completions_rx.recv() => {
                    self.finish_generation(request, outcome);
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }
        debug!("Session actor stopped");
    }

    // ========================================================================
    // Protocol events
    // ========================================================================

    fn handle_event(&mut self, event: InboundEvent) -> Flow {
        metrics::record_inbound_event(event.kind());

        if let Some(field) = event.missing_field() {
            warn!(kind = event.kind(), field, "Dropping malformed event");
            return Flow::Continue;
        }

        match &event {
            InboundEvent::Disconnected { reason } => {
                self.teardown(reason);
                return Flow::Stop;
            }
            InboundEvent::Connected { server, port, nick } => {
                self.relay.connected(server, *port, nick);
            }
            InboundEvent::Message { target, nick, text } => {
                self.on_message(target, nick, text);
                return Flow::Continue;
            }
            _ => {}
        }

        let applied = self.state.apply(&event);
        for departure in &applied.departures {
            self.moderation.forget(&departure.channel, &departure.nick);
        }
        for command in &applied.commands {
            self.send(command.clone());
        }
        self.relay.publish_changes(&self.state, &applied);
        Flow::Continue
    }

    /// Moderation, relay, plugins and the AI, in that order.
    fn on_message(&mut self, target: &str, nick: &str, text: &str) {
        let now = Instant::now();

        if !is_channel_name(target) {
            // Query: filed under the other party.
            self.relay.record_message(nick, nick, text, Utc::now());
            return;
        }

        let verdict = self.moderation.inspect_at(target, nick, text, now);
        if let Some(reason) = verdict.kick_reason() {
            info!(channel = %target, nick = %nick, verdict = verdict.as_str(), "Moderation kick");
            metrics::record_moderation_kick(verdict.as_str());
            self.send(OutboundCommand::Kick {
                channel: target.to_string(),
                nick: nick.to_string(),
                reason: reason.to_string(),
            });
            return;
        }

        self.relay.record_message(target, nick, text, Utc::now());

        let dispatched = self.plugins.dispatch_command(text, target, nick);
        let is_command = dispatched || parse_command(text).is_some();
        if !is_command && !self.state.is_self(nick) && is_addressed(text, self.state.nick()) {
            self.start_generation(nick, target, text, now);
        }

        self.plugins.dispatch_message(target, nick, text);
        self.conversations.sweep(now);
        self.moderation.prune(now);
    }

    fn start_generation(&mut self, nick: &str, channel: &str, text: &str, now: Instant) {
        let request = self.conversations.begin(nick, channel, text, now);
        let ai = Arc::clone(&self.ai);
        let tx = self.completions_tx.clone();
        debug!(backend = ai.name(), user = %nick, channel = %channel, turns = request.history.len(), "Starting generation");
        tokio::spawn(async move {
            let outcome = ai.generate(&request.prompt, &request.history).await;
            let _ = tx.send((request, outcome));
        });
    }

    fn finish_generation(&mut self, request: GenerationRequest, outcome: Result<String, AiError>) {
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.error_code(),
        };
        metrics::record_ai_request(label);

        let reply = self
            .conversations
            .complete(&request, outcome, Instant::now())
            .unwrap_or_else(|| APOLOGY.to_string());
        self.say(&request.channel, &reply);
    }

    // ========================================================================
    // Other inputs
    // ========================================================================

    fn handle_input(&mut self, input: SessionInput) -> Flow {
        match input {
            SessionInput::Intent(intent) => self.on_intent(intent),
            SessionInput::ReloadModeration(configs) => {
                info!(channels = configs.len(), "Reloading moderation configs");
                self.moderation.replace_configs(configs);
            }
            SessionInput::ReloadModules(descriptors) => {
                self.plugins.load(descriptors);
            }
            SessionInput::ReloadModule { id, descriptor } => {
                if let Err(e) = self.plugins.reload_module(id, descriptor) {
                    warn!(module_id = id, error = %e, "Module reload failed; previous instance kept");
                }
            }
            SessionInput::Inspect { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }
            SessionInput::Shutdown { ack_tx } => {
                self.teardown("shutdown requested");
                let _ = ack_tx.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_intent(&mut self, intent: Intent) {
        debug!(kind = intent.kind(), "Observer intent");
        match intent {
            Intent::SendMessage { target, text } => self.say(&target, &text),
            other => self.send(other.to_command()),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn send(&self, command: OutboundCommand) {
        if !self.adapter.send(command) {
            debug!("Adapter gone; dropping outbound command");
        }
    }

    /// Send text as ourselves. The server does not echo it, so it is
    /// recorded and relayed here.
    fn say(&mut self, target: &str, text: &str) {
        let nick = self.state.nick().to_string();
        for line in split_text(text) {
            self.send(OutboundCommand::Privmsg {
                target: target.to_string(),
                text: line.clone(),
            });
            self.relay.record_message(target, &nick, &line, Utc::now());
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            nick: self.state.nick().to_string(),
            channels: self.state.channel_names(),
            conversations: self.conversations.len(),
            flood_windows: self.moderation.tracked_windows(),
            modules: self.plugins.loaded_ids(),
        }
    }

    /// Forget everything this session knew.
    fn teardown(&mut self, reason: &str) {
        info!(reason = %reason, "Tearing down session state");
        self.state.clear();
        self.conversations.clear();
        self.moderation.clear_windows();
        self.plugins.clear();
        self.relay.disconnected();
    }
}
