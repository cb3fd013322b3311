//! Connection task for the upstream session.

use futures_util::{SinkExt, StreamExt};
use relay_proto::response::{ERR_ERRONEUSNICKNAME, ERR_NICKCOLLISION, ERR_NICKNAMEINUSE, RPL_WELCOME};
use relay_proto::{IrcCodec, Message, irc_eq};
use std::pin::pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::normalize::Normalizer;
use super::tls;
use crate::config::IrcConfig;
use crate::error::AdapterError;
use crate::event::{InboundEvent, OutboundCommand};

trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type Connection = Framed<Box<dyn Transport>, IrcCodec>;

/// Alternate nicks tried during registration before giving up.
pub const MAX_NICK_ATTEMPTS: u32 = 5;

/// Outbound side of the adapter. Commands are written in order.
#[derive(Debug, Clone)]
pub struct AdapterHandle {
    tx: mpsc::UnboundedSender<OutboundCommand>,
}

impl AdapterHandle {
    /// Queue a command; `false` once the connection task has ended.
    pub fn send(&self, command: OutboundCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub fn command_channel() -> (AdapterHandle, mpsc::UnboundedReceiver<OutboundCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AdapterHandle { tx }, rx)
}

/// Registration progress on the current connection.
struct Registration {
    /// Nick we are currently asking for or using.
    nick: String,
    registered: bool,
    reclaim_at: Option<Instant>,
    /// Alternates already sent on this connection.
    alternates: u32,
}

pub struct IrcAdapter {
    config: IrcConfig,
    events: mpsc::UnboundedSender<InboundEvent>,
    commands: mpsc::UnboundedReceiver<OutboundCommand>,
    cancel: CancellationToken,
    normalizer: Normalizer,
}

/// Why the drive loop stopped without an error.
enum Ended {
    Cancelled,
    Closed(String),
}

impl IrcAdapter {
    pub fn new(
        config: IrcConfig,
        events: mpsc::UnboundedSender<InboundEvent>,
        commands: mpsc::UnboundedReceiver<OutboundCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            events,
            commands,
            cancel,
            normalizer: Normalizer::new(),
        }
    }

    fn emit(&self, event: InboundEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Connect, register and pump messages until the connection ends or
    /// the cancellation token fires. Always finishes with a
    /// [`InboundEvent::Disconnected`].
    pub async fn run(mut self) -> Result<(), AdapterError> {
        let outcome = match self.connect_with_retry().await {
            Ok(Some(connection)) => self.drive(connection).await,
            Ok(None) => Ok(Ended::Cancelled),
            Err(e) => Err(e),
        };

        let (reason, result) = match outcome {
            Ok(Ended::Cancelled) => ("disconnected by request".to_string(), Ok(())),
            Ok(Ended::Closed(reason)) => (reason, Ok(())),
            Err(e) => {
                if matches!(e, AdapterError::NickRejected(_) | AdapterError::NickExhausted(_)) {
                    error!(
                        server = %self.config.server,
                        nick = %self.config.nick,
                        code = e.error_code(),
                        "ALERT: giving up on registration"
                    );
                }
                (e.to_string(), Err(e))
            }
        };
        info!(server = %self.config.server, reason = %reason, "Upstream connection ended");
        self.emit(InboundEvent::Disconnected { reason });
        result
    }

    async fn connect_once(&self) -> Result<Connection, AdapterError> {
        let addr = format!("{}:{}", self.config.server, self.config.port);
        let limit = self.config.connect_timeout();

        let tcp = timeout(limit, TcpStream::connect((self.config.server.as_str(), self.config.port)))
            .await
            .map_err(|_| AdapterError::Timeout(addr.clone()))?
            .map_err(|source| AdapterError::Connect {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let stream: Box<dyn Transport> = if self.config.tls {
            let connector = TlsConnector::from(tls::client_config(&self.config)?);
            let name = tls::server_name(&self.config.server)?;
            let tls = timeout(limit, connector.connect(name, tcp))
                .await
                .map_err(|_| AdapterError::Timeout(addr.clone()))?
                .map_err(|e| AdapterError::Tls(e.to_string()))?;
            Box::new(tls)
        } else {
            Box::new(tcp)
        };

        info!(addr = %addr, tls = self.config.tls, "Connected to upstream server");
        Ok(Framed::new(stream, IrcCodec::new()))
    }

    /// `Ok(None)` when cancelled while waiting between attempts.
    async fn connect_with_retry(&self) -> Result<Option<Connection>, AdapterError> {
        let attempts = self.config.connect_attempts.max(1);
        for attempt in 1..=attempts {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                result = self.connect_once() => result,
            };
            match result {
                Ok(connection) => return Ok(Some(connection)),
                Err(e) => {
                    warn!(attempt, attempts, code = e.error_code(), error = %e, "Connection attempt failed");
                }
            }
            if attempt < attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(self.config.retry_delay()) => {}
                }
            }
        }
        error!(
            server = %self.config.server,
            port = self.config.port,
            attempts,
            "ALERT: giving up on upstream connection"
        );
        Err(AdapterError::GaveUp(attempts))
    }

    async fn drive(&mut self, mut conn: Connection) -> Result<Ended, AdapterError> {
        let mut reg = Registration {
            nick: self.config.nick.clone(),
            registered: false,
            reclaim_at: None,
            alternates: 0,
        };
        conn.send(Message::nick(&reg.nick)).await?;
        conn.send(Message::user(self.config.username(), self.config.realname()))
            .await?;

        let cancel = self.cancel.clone();
        let mut cancelled = pin!(cancel.cancelled());

        loop {
            let reclaim_at = reg.reclaim_at;
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    if let Err(e) = conn.send(Message::quit("Disconnecting")).await {
                        debug!(error = %e, "Failed to send QUIT");
                    }
                    return Ok(Ended::Cancelled);
                }
                incoming = conn.next() => match incoming {
                    None => return Ok(Ended::Closed("connection closed by server".into())),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(msg)) => {
                        if !self.on_message(msg, &mut conn, &mut reg).await? {
                            return Ok(Ended::Closed("session stopped listening".into()));
                        }
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => conn.send(command.to_message()).await?,
                    None => return Ok(Ended::Closed("session closed the command queue".into())),
                },
                _ = sleep_until(reclaim_at.unwrap_or_else(Instant::now)), if reclaim_at.is_some() => {
                    reg.reclaim_at = None;
                    if !irc_eq(&reg.nick, &self.config.nick) {
                        info!(nick = %self.config.nick, "Trying to reclaim nick");
                        conn.send(Message::nick(&self.config.nick)).await?;
                    }
                }
            }
        }
    }

    /// Returns `false` when the session is gone.
    async fn on_message(
        &mut self,
        msg: Message,
        conn: &mut Connection,
        reg: &mut Registration,
    ) -> Result<bool, AdapterError> {
        match msg.command.as_str() {
            "PING" => {
                conn.send(Message::pong(msg.trailing().unwrap_or_default())).await?;
                return Ok(true);
            }
            "ERROR" => {
                warn!(reason = msg.trailing().unwrap_or_default(), "Server sent ERROR");
                return Ok(true);
            }
            ERR_NICKNAMEINUSE | ERR_ERRONEUSNICKNAME | ERR_NICKCOLLISION if reg.registered => {
                warn!(code = %msg.command, nick = msg.param(1).unwrap_or_default(), "Nick change refused");
                return Ok(true);
            }
            // An alternate built from an invalid nick is just as invalid.
            ERR_ERRONEUSNICKNAME => {
                return Err(AdapterError::NickRejected(reg.nick.clone()));
            }
            ERR_NICKNAMEINUSE | ERR_NICKCOLLISION => {
                if reg.alternates >= MAX_NICK_ATTEMPTS {
                    return Err(AdapterError::NickExhausted(reg.alternates));
                }
                reg.alternates += 1;
                reg.nick.push('_');
                info!(nick = %reg.nick, attempt = reg.alternates, "Nick unavailable, trying alternate");
                conn.send(Message::nick(&reg.nick)).await?;
                return Ok(true);
            }
            RPL_WELCOME => {
                self.on_welcome(&msg, conn, reg).await?;
                return Ok(self.emit(InboundEvent::Connected {
                    server: self.config.server.clone(),
                    port: self.config.port,
                    nick: reg.nick.clone(),
                }));
            }
            "NICK" if msg.source_nick().is_some_and(|n| irc_eq(n, &reg.nick)) => {
                if let Some(new) = msg.param(0) {
                    reg.nick = new.to_string();
                }
            }
            _ => {}
        }

        if !reg.registered {
            return Ok(true);
        }
        for event in self.normalizer.normalize(&msg) {
            if !self.emit(event) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn on_welcome(
        &mut self,
        msg: &Message,
        conn: &mut Connection,
        reg: &mut Registration,
    ) -> Result<(), AdapterError> {
        reg.registered = true;
        if let Some(accepted) = msg.param(0).filter(|n| !n.is_empty() && *n != "*") {
            reg.nick = accepted.to_string();
        }
        info!(nick = %reg.nick, server = %self.config.server, "Registered with upstream server");

        if !self.config.user_modes.is_empty() {
            conn.send(Message::mode(&reg.nick, &self.config.user_modes)).await?;
        }
        if let Some(password) = self.config.nickserv_password.as_deref().filter(|p| !p.is_empty()) {
            conn.send(Message::privmsg("NickServ", &format!("IDENTIFY {password}")))
                .await?;
        }
        if !irc_eq(&reg.nick, &self.config.nick) {
            reg.reclaim_at = Some(Instant::now() + self.config.reclaim_delay());
        }
        for channel in &self.config.channels {
            conn.send(Message::join(channel)).await?;
        }
        Ok(())
    }
}
