//! Integration tests for the protocol adapter against a scripted server.

mod common;

use common::{FakeIrcServer, WAIT, irc_config};
use slirc_relay::adapter::{IrcAdapter, MAX_NICK_ATTEMPTS, command_channel};
use slirc_relay::error::AdapterError;
use slirc_relay::event::{InboundEvent, OutboundCommand};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn next_event(rx: &mut mpsc::UnboundedReceiver<InboundEvent>) -> InboundEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event in time")
        .expect("adapter still running")
}

#[tokio::test]
async fn test_registration_ping_and_events() {
    let server = FakeIrcServer::bind().await.unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_handle, commands) = command_channel();
    let cancel = CancellationToken::new();
    let adapter = IrcAdapter::new(irc_config(server.port(), "relay", &["#test"]), events_tx, commands, cancel.clone());
    let task = tokio::spawn(adapter.run());

    let mut conn = server.accept().await.unwrap();
    let nick = conn.welcome().await.unwrap();
    assert_eq!(nick, "relay");

    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::Connected {
            server: "127.0.0.1".into(),
            port: server.port(),
            nick: "relay".into(),
        }
    );
    let join = conn.expect("JOIN").await.unwrap();
    assert_eq!(join.param(0), Some("#test"));

    conn.send_raw("PING :irc.test").await.unwrap();
    let pong = conn.expect("PONG").await.unwrap();
    assert_eq!(pong.param(0), Some("irc.test"));

    conn.send_raw(":alice!a@test.host PRIVMSG #test :hello").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        InboundEvent::Message {
            target: "#test".into(),
            nick: "alice".into(),
            text: "hello".into(),
        }
    );

    cancel.cancel();
    conn.expect("QUIT").await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Disconnected { .. }
    ));
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_nick_in_use_takes_alternate_then_reclaims() {
    let server = FakeIrcServer::bind().await.unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_handle, commands) = command_channel();
    let mut config = irc_config(server.port(), "relay", &[]);
    config.reclaim_delay_secs = 0;
    let adapter = IrcAdapter::new(config, events_tx, commands, CancellationToken::new());
    tokio::spawn(adapter.run());

    let mut conn = server.accept().await.unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().param(0), Some("relay"));
    conn.expect("USER").await.unwrap();
    conn.send_raw(":irc.test 433 * relay :Nickname is already in use")
        .await
        .unwrap();
    assert_eq!(conn.expect("NICK").await.unwrap().param(0), Some("relay_"));

    conn.send_raw(":irc.test 001 relay_ :Welcome").await.unwrap();
    match next_event(&mut events).await {
        InboundEvent::Connected { nick, .. } => assert_eq!(nick, "relay_"),
        other => panic!("expected Connected, got {other:?}"),
    }

    // Reclaim is attempted once the delay passes.
    assert_eq!(conn.expect("NICK").await.unwrap().param(0), Some("relay"));

    // After registration a refusal is only logged; no new alternate is tried.
    conn.send_raw(":irc.test 433 relay_ relay :Nickname is already in use")
        .await
        .unwrap();
    conn.send_raw("PING :still-here").await.unwrap();
    let next = conn.recv().await.unwrap();
    assert_eq!(next.command, "PONG");
}

#[tokio::test]
async fn test_commands_are_written_in_order() {
    let server = FakeIrcServer::bind().await.unwrap();
    let (events_tx, _events) = mpsc::unbounded_channel();
    let (handle, commands) = command_channel();
    let adapter = IrcAdapter::new(irc_config(server.port(), "relay", &[]), events_tx, commands, CancellationToken::new());
    tokio::spawn(adapter.run());

    let mut conn = server.accept().await.unwrap();
    conn.welcome().await.unwrap();

    assert!(handle.send(OutboundCommand::Join {
        channel: "#one".into()
    }));
    assert!(handle.send(OutboundCommand::Privmsg {
        target: "#one".into(),
        text: "first".into()
    }));
    assert!(handle.send(OutboundCommand::Privmsg {
        target: "#one".into(),
        text: "second".into()
    }));

    assert_eq!(conn.recv().await.unwrap().command, "JOIN");
    assert_eq!(conn.recv().await.unwrap().param(1), Some("first"));
    assert_eq!(conn.recv().await.unwrap().param(1), Some("second"));
}

#[tokio::test]
async fn test_gives_up_after_configured_attempts() {
    let port = {
        let server = FakeIrcServer::bind().await.unwrap();
        server.port()
    };
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_handle, commands) = command_channel();
    let mut config = irc_config(port, "relay", &[]);
    config.connect_attempts = 2;
    config.retry_delay_secs = 0;

    let result = IrcAdapter::new(config, events_tx, commands, CancellationToken::new())
        .run()
        .await;
    assert!(matches!(result, Err(AdapterError::GaveUp(2))));
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn test_erroneous_nick_ends_registration() {
    let server = FakeIrcServer::bind().await.unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_handle, commands) = command_channel();
    let adapter = IrcAdapter::new(irc_config(server.port(), "relay", &[]), events_tx, commands, CancellationToken::new());
    let task = tokio::spawn(adapter.run());

    let mut conn = server.accept().await.unwrap();
    conn.expect("NICK").await.unwrap();
    conn.expect("USER").await.unwrap();
    conn.send_raw(":irc.test 432 * relay :Erroneous Nickname").await.unwrap();

    let result = timeout(WAIT, task).await.expect("adapter stops").unwrap();
    assert!(matches!(result, Err(AdapterError::NickRejected(nick)) if nick == "relay"));
    assert!(matches!(
        next_event(&mut events).await,
        InboundEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn test_nick_in_use_gives_up_after_bounded_alternates() {
    let server = FakeIrcServer::bind().await.unwrap();
    let (events_tx, _events) = mpsc::unbounded_channel();
    let (_handle, commands) = command_channel();
    let adapter = IrcAdapter::new(irc_config(server.port(), "relay", &[]), events_tx, commands, CancellationToken::new());
    let task = tokio::spawn(adapter.run());

    let mut conn = server.accept().await.unwrap();
    let mut nick = conn.expect("NICK").await.unwrap().param(0).unwrap_or_default().to_string();
    conn.expect("USER").await.unwrap();

    let mut alternates = 0;
    loop {
        conn.send_raw(&format!(":irc.test 433 * {nick} :Nickname is already in use"))
            .await
            .unwrap();
        match conn.expect("NICK").await {
            Ok(next) => {
                alternates += 1;
                nick = next.param(0).unwrap_or_default().to_string();
            }
            Err(_) => break,
        }
        assert!(alternates <= MAX_NICK_ATTEMPTS, "relay kept asking for nicks");
    }

    assert_eq!(alternates, MAX_NICK_ATTEMPTS);
    let result = timeout(WAIT, task).await.expect("adapter stops").unwrap();
    assert!(matches!(result, Err(AdapterError::NickExhausted(n)) if n == MAX_NICK_ATTEMPTS));
}
