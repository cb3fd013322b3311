//! Integration test common infrastructure.
//!
//! Provides a scripted fake upstream IRC server and helpers for building a
//! supervisor against it with in-memory storage.

#![allow(dead_code)]

use relay_proto::Message;
use slirc_relay::config::{IrcConfig, ModerationSettings};
use slirc_relay::plugins::PluginCatalog;
use slirc_relay::relay::Hub;
use slirc_relay::session::Supervisor;
use slirc_relay::storage::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// How long any single wait in a test may take.
pub const WAIT: Duration = Duration::from_secs(5);

/// Listener standing in for the upstream IRC server.
pub struct FakeIrcServer {
    listener: TcpListener,
}

impl FakeIrcServer {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Wait for the relay to connect.
    pub async fn accept(&self) -> anyhow::Result<FakeConnection> {
        let (stream, _) = timeout(WAIT, self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(FakeConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }
}

/// Server side of one relay connection.
pub struct FakeConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FakeConnection {
    /// Send a raw line; CRLF is appended.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive a single line from the relay.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(WAIT, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("relay closed the connection");
        }
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {e}"))
    }

    /// Receive until a message with `command` arrives and return it.
    pub async fn expect(&mut self, command: &str) -> anyhow::Result<Message> {
        loop {
            let msg = self.recv().await?;
            if msg.command == command {
                return Ok(msg);
            }
        }
    }

    /// Read NICK and USER, answer with 001 for the nick the relay asked for.
    pub async fn welcome(&mut self) -> anyhow::Result<String> {
        let nick = self.expect("NICK").await?;
        let nick = nick.param(0).unwrap_or_default().to_string();
        self.expect("USER").await?;
        self.send_raw(&format!(":irc.test 001 {nick} :Welcome to the test network"))
            .await?;
        Ok(nick)
    }

    /// Confirm a JOIN with the usual burst: echo, names, end of names.
    pub async fn confirm_join(&mut self, nick: &str, channel: &str, others: &[&str]) -> anyhow::Result<()> {
        self.send_raw(&format!(":{nick}!relay@test.host JOIN {channel}")).await?;
        let mut names = vec![nick.to_string()];
        names.extend(others.iter().map(|n| n.to_string()));
        self.send_raw(&format!(":irc.test 353 {nick} = {channel} :{}", names.join(" ")))
            .await?;
        self.send_raw(&format!(":irc.test 366 {nick} {channel} :End of /NAMES list."))
            .await?;
        Ok(())
    }
}

/// Connection settings pointing at the fake server.
pub fn irc_config(port: u16, nick: &str, channels: &[&str]) -> IrcConfig {
    let mut irc = IrcConfig::new("127.0.0.1", port, nick);
    irc.channels = channels.iter().map(|c| c.to_string()).collect();
    irc.user_modes = String::new();
    irc.connect_attempts = 1;
    irc
}

/// Supervisor over `storage` with the built-in plugin catalog.
pub fn supervisor(storage: Arc<MemoryStorage>) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(
        storage,
        Hub::new(),
        PluginCatalog::builtin(),
        ModerationSettings::default(),
    ))
}

/// Poll `check` until it holds or the wait runs out.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
