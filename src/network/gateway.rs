//! Gateway - WebSocket listener for web observers.
//!
//! Each accepted observer gets its own task speaking JSON frames. Observers
//! read from the relay [`Hub`] and turn their requests into session intents;
//! they never touch session state directly.

use futures_util::{SinkExt, StreamExt};
use relay_proto::irc_to_lower;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics;
use crate::relay::{Envelope, Hub, Intent, Notification};
use crate::session::Supervisor;
use crate::telemetry::spans;

/// Observer to relay frame, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Init {
        #[serde(default)]
        token: Option<String>,
    },
    JoinChannel {
        channel: String,
    },
    PartChannel {
        channel: String,
    },
    SendMessage {
        target: String,
        text: String,
    },
    GetTopic {
        channel: String,
    },
    SetTopic {
        channel: String,
        text: String,
    },
    ListRoster {
        channel: String,
    },
    GetHistory {
        channel: String,
    },
    OpenQuery {
        nick: String,
    },
}

/// The Gateway accepts observer connections and spawns one task per observer.
pub struct Gateway {
    listener: TcpListener,
    config: GatewayConfig,
    supervisor: Arc<Supervisor>,
}

impl Gateway {
    pub async fn bind(config: GatewayConfig, supervisor: Arc<Supervisor>) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.address)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: config.address,
                source,
            })?;
        info!(address = %config.address, "Observer gateway bound");
        Ok(Self {
            listener,
            config,
            supervisor,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept observers until `cancel` fires.
    #[instrument(skip_all, name = "gateway")]
    pub async fn run(self, cancel: CancellationToken) {
        let allow_origins = Arc::new(self.config.allow_origins.clone());
        let token = self.config.token.clone();

        loop {
            let (stream, addr) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Observer accept failed");
                        continue;
                    }
                },
            };

            let allowed = Arc::clone(&allow_origins);
            let supervisor = Arc::clone(&self.supervisor);
            let token = token.clone();
            let cancel = cancel.child_token();
            let id = Uuid::new_v4().to_string();
            let span = spans::observer(&id, &addr.to_string());

            tokio::spawn(
                async move {
                    let ws = match handshake(stream, addr, &allowed).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            debug!(error = %e, "Observer handshake failed");
                            return;
                        }
                    };
                    info!("Observer connected");
                    metrics::observer_connected();
                    let observer = Observer::new(supervisor, token);
                    if let Err(e) = observer.serve(ws, cancel).await {
                        debug!(error = %e, code = e.error_code(), "Observer connection ended with error");
                    }
                    metrics::observer_disconnected();
                    info!("Observer disconnected");
                }
                .instrument(span),
            );
        }
        info!("Observer gateway stopped");
    }
}

async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    allowed: &[String],
) -> Result<WebSocketStream<TcpStream>, GatewayError> {
    let origin_check = |req: &http::Request<()>, response: http::Response<()>| {
        if allowed.is_empty() {
            return Ok(response);
        }
        if let Some(origin) = req.headers().get("Origin")
            && let Ok(origin) = origin.to_str()
            && allowed.iter().any(|a| a == origin || a == "*")
        {
            return Ok(response);
        }
        warn!(%addr, "Observer origin rejected");
        Err(http::Response::builder()
            .status(http::StatusCode::FORBIDDEN)
            .body(Some("origin not allowed".to_string()))
            .unwrap_or_default())
    };
    Ok(accept_hdr_async(stream, origin_check).await?)
}

/// Per-observer view: which rooms it follows and whether it has authenticated.
struct Observer {
    supervisor: Arc<Supervisor>,
    token: Option<String>,
    authorized: bool,
    /// Case-folded room names.
    rooms: HashSet<String>,
}

impl Observer {
    fn new(supervisor: Arc<Supervisor>, token: Option<String>) -> Self {
        Self {
            authorized: token.is_none(),
            supervisor,
            token,
            rooms: HashSet::new(),
        }
    }

    fn hub(&self) -> &Hub {
        self.supervisor.hub()
    }

    fn wants(&self, envelope: &Envelope) -> bool {
        self.authorized && envelope.room.as_ref().is_none_or(|room| self.rooms.contains(room))
    }

    async fn serve(
        mut self,
        mut ws: WebSocketStream<TcpStream>,
        cancel: CancellationToken,
    ) -> Result<(), GatewayError> {
        // Subscribe before any snapshot is sent so nothing falls in between.
        let mut updates = self.hub().subscribe();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                frame = ws.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    let replies = match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(frame) => self.handle_frame(frame).await,
                        Err(e) => {
                            debug!(error = %e, "Unparseable observer frame");
                            vec![Notification::error(format!("Invalid frame: {e}"))]
                        }
                    };
                    send_all(&mut ws, &replies).await?;
                }
                update = updates.recv() => match update {
                    Ok(envelope) => {
                        if self.wants(&envelope) {
                            send_all(&mut ws, std::slice::from_ref(&envelope.notification)).await?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Observer lagged, resending snapshot");
                        if self.authorized {
                            let snapshot = self.snapshot();
                            send_all(&mut ws, &snapshot).await?;
                        }
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
            }
        }
    }

    async fn handle_frame(&mut self, frame: ClientFrame) -> Vec<Notification> {
        if let ClientFrame::Init { token } = frame {
            return self.init(token);
        }
        if !self.authorized {
            return vec![Notification::error("Not initialized")];
        }

        match frame {
            ClientFrame::Init { .. } => Vec::new(),
            ClientFrame::JoinChannel { channel } => self.join_channel(channel).await,
            ClientFrame::PartChannel { channel } => {
                self.rooms.remove(&irc_to_lower(&channel));
                if self.hub().find_channel(&channel).is_some() {
                    self.submit(Intent::PartChannel { channel }).await
                } else {
                    Vec::new()
                }
            }
            ClientFrame::SendMessage { target, text } => {
                if target.is_empty() || text.is_empty() {
                    return vec![Notification::error("Target and text are required")];
                }
                self.submit(Intent::SendMessage { target, text }).await
            }
            ClientFrame::GetTopic { channel } => {
                let mut replies = self.submit(Intent::GetTopic { channel: channel.clone() }).await;
                if let Some(text) = self.hub().topic(&channel) {
                    replies.push(Notification::Topic { channel, text });
                }
                replies
            }
            ClientFrame::SetTopic { channel, text } => self.submit(Intent::SetTopic { channel, text }).await,
            ClientFrame::ListRoster { channel } => {
                let mut replies = self.submit(Intent::ListRoster { channel: channel.clone() }).await;
                let users = self.hub().roster(&channel);
                replies.push(Notification::Roster { channel, users });
                replies
            }
            ClientFrame::GetHistory { channel } => {
                let messages = self.hub().history(&channel);
                vec![Notification::History { channel, messages }]
            }
            ClientFrame::OpenQuery { nick } => {
                if nick.is_empty() {
                    return vec![Notification::error("Nick is required")];
                }
                self.rooms.insert(irc_to_lower(&nick));
                let messages = self.hub().history(&nick);
                vec![
                    Notification::JoinedChannel { channel: nick.clone() },
                    Notification::History { channel: nick, messages },
                ]
            }
        }
    }

    fn init(&mut self, token: Option<String>) -> Vec<Notification> {
        if let Some(expected) = &self.token
            && token.as_deref() != Some(expected.as_str())
        {
            warn!("Observer presented a bad token");
            return vec![Notification::error("Unauthorized")];
        }
        self.authorized = true;

        // Follow the first channel so a fresh page has something to show.
        if let Some(first) = self.hub().channels().first() {
            self.rooms.insert(irc_to_lower(first));
        }
        self.snapshot()
    }

    async fn join_channel(&mut self, channel: String) -> Vec<Notification> {
        if channel.is_empty() {
            return vec![Notification::error("Channel is required")];
        }
        if let Some(display) = self.hub().find_channel(&channel) {
            self.rooms.insert(irc_to_lower(&display));
            return self.room_snapshot(&display);
        }

        let mut replies = self.submit(Intent::JoinChannel { channel: channel.clone() }).await;
        if replies.is_empty() {
            // Roster and topic arrive as broadcasts once the server confirms.
            self.rooms.insert(irc_to_lower(&channel));
            replies.push(Notification::JoinedChannel { channel });
        }
        replies
    }

    /// Hand an intent to the live session. Returns an error frame if there is none.
    async fn submit(&self, intent: Intent) -> Vec<Notification> {
        let kind = intent.kind();
        let Some(handle) = self.supervisor.current().await else {
            debug!(intent = kind, "Intent rejected, no session");
            return vec![Notification::error("Not connected")];
        };
        match handle.submit(intent) {
            Ok(()) => Vec::new(),
            Err(e) => vec![Notification::error(e.to_string())],
        }
    }

    /// Status, channel list and every followed channel that still exists.
    fn snapshot(&self) -> Vec<Notification> {
        let hub = self.hub();
        let channels = hub.channels();
        let mut frames = vec![
            hub.status().to_notification(),
            Notification::ChannelList {
                channels: channels.clone(),
            },
        ];
        for channel in channels.iter().filter(|c| self.rooms.contains(&irc_to_lower(c))) {
            frames.extend(self.room_snapshot(channel));
        }
        frames
    }

    fn room_snapshot(&self, channel: &str) -> Vec<Notification> {
        let hub = self.hub();
        let mut frames = vec![
            Notification::JoinedChannel {
                channel: channel.to_string(),
            },
            Notification::Roster {
                channel: channel.to_string(),
                users: hub.roster(channel),
            },
            Notification::History {
                channel: channel.to_string(),
                messages: hub.history(channel),
            },
        ];
        if let Some(text) = hub.topic(channel) {
            frames.push(Notification::Topic {
                channel: channel.to_string(),
                text,
            });
        }
        frames
    }
}

async fn send_all(
    ws: &mut WebSocketStream<TcpStream>,
    notifications: &[Notification],
) -> Result<(), GatewayError> {
    for notification in notifications {
        let json = serde_json::to_string(notification)?;
        ws.send(Message::Text(json)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IrcConfig, ModerationSettings};
    use crate::plugins::PluginCatalog;
    use crate::relay::RelayBroadcaster;
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn supervisor() -> Arc<Supervisor> {
        let storage = MemoryStorage::new(IrcConfig::new("127.0.0.1", 6667, "relay"));
        Arc::new(Supervisor::new(
            Arc::new(storage),
            Hub::new(),
            PluginCatalog::builtin(),
            ModerationSettings::default(),
        ))
    }

    // ========================================================================
    // Frame parsing
    // ========================================================================

    #[test]
    fn parses_tagged_frames() {
        let frame: ClientFrame =
            serde_json::from_str(r##"{"type":"send_message","target":"#rust","text":"hi"}"##).unwrap();
        assert_eq!(
            frame,
            ClientFrame::SendMessage {
                target: "#rust".into(),
                text: "hi".into()
            }
        );

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"init"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Init { token: None });
    }

    #[test]
    fn rejects_unknown_frame_type() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"op_everyone"}"#).is_err());
    }

    // ========================================================================
    // Observer behavior without a session
    // ========================================================================

    #[tokio::test]
    async fn init_sends_disconnected_status_and_empty_channel_list() {
        let mut observer = Observer::new(supervisor(), None);
        let frames = observer.handle_frame(ClientFrame::Init { token: None }).await;
        assert_eq!(
            frames,
            vec![
                Notification::disconnected(),
                Notification::ChannelList { channels: vec![] }
            ]
        );
    }

    #[tokio::test]
    async fn intents_without_session_report_not_connected() {
        let mut observer = Observer::new(supervisor(), None);
        let frames = observer
            .handle_frame(ClientFrame::JoinChannel {
                channel: "#rust".into(),
            })
            .await;
        assert_eq!(frames, vec![Notification::error("Not connected")]);
        assert!(observer.rooms.is_empty());
    }

    #[tokio::test]
    async fn token_is_required_when_configured() {
        let mut observer = Observer::new(supervisor(), Some("s3cret".into()));

        let frames = observer.handle_frame(ClientFrame::GetHistory { channel: "#a".into() }).await;
        assert_eq!(frames, vec![Notification::error("Not initialized")]);

        let frames = observer
            .handle_frame(ClientFrame::Init {
                token: Some("wrong".into()),
            })
            .await;
        assert_eq!(frames, vec![Notification::error("Unauthorized")]);
        assert!(!observer.authorized);

        observer
            .handle_frame(ClientFrame::Init {
                token: Some("s3cret".into()),
            })
            .await;
        assert!(observer.authorized);
    }

    #[tokio::test]
    async fn open_query_follows_nick_and_returns_its_history() {
        let supervisor = supervisor();
        let relay = RelayBroadcaster::new(supervisor.hub().clone());
        relay.record_message("Alice", "Alice", "psst", Utc::now());

        let mut observer = Observer::new(supervisor, None);
        let frames = observer.handle_frame(ClientFrame::OpenQuery { nick: "alice".into() }).await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Notification::JoinedChannel { channel: "alice".into() });
        match &frames[1] {
            Notification::History { messages, .. } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].text, "psst");
            }
            other => panic!("expected history, got {other:?}"),
        }
        assert!(observer.rooms.contains("alice"));
    }

    #[tokio::test]
    async fn room_filter_drops_unfollowed_channels() {
        let mut observer = Observer::new(supervisor(), None);
        observer.rooms.insert("#rust".into());

        let followed = Envelope {
            room: Some("#rust".into()),
            notification: Notification::error("x"),
        };
        let other = Envelope {
            room: Some("#go".into()),
            notification: Notification::error("x"),
        };
        let global = Envelope {
            room: None,
            notification: Notification::disconnected(),
        };
        assert!(observer.wants(&followed));
        assert!(!observer.wants(&other));
        assert!(observer.wants(&global));

        observer.authorized = false;
        assert!(!observer.wants(&global));
    }
}
