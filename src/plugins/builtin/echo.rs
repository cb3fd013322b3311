//! `echo`: repeats its arguments and greets anyone saying hello.
//!
//! The smallest useful handler; new handlers start from a copy of it.

use crate::error::PluginError;
use crate::plugins::{Plugin, PluginSender};
use crate::storage::ModuleDescriptor;

pub struct Echo {
    sender: PluginSender,
}

pub fn construct(_descriptor: &ModuleDescriptor, sender: PluginSender) -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(Echo { sender }))
}

impl Plugin for Echo {
    fn handle_command(&mut self, command: &str, args: &[String], channel: &str, _user: &str) -> Result<(), PluginError> {
        if args.is_empty() {
            return self.sender.send(channel, &format!("Usage: !{command} <message>"));
        }
        self.sender.send(channel, &args.join(" "))
    }

    fn handle_message(&mut self, channel: &str, user: &str, text: &str) -> Result<(), PluginError> {
        if text.to_lowercase().contains("hello") {
            self.sender.send(channel, &format!("Hello {user}!"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn echo() -> (Box<dyn Plugin>, mpsc::UnboundedReceiver<crate::plugins::PluginOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let descriptor = ModuleDescriptor::new(1, "Echo", "!echo", "echo");
        let plugin = construct(&descriptor, PluginSender::new(1, tx)).unwrap();
        (plugin, rx)
    }

    #[test]
    fn echoes_arguments() {
        let (mut plugin, mut rx) = echo();
        plugin
            .handle_command("echo", &["hi".into(), "there".into()], "#c", "alice")
            .unwrap();
        let out = rx.try_recv().unwrap();
        assert_eq!((out.target.as_str(), out.text.as_str()), ("#c", "hi there"));
    }

    #[test]
    fn usage_without_arguments() {
        let (mut plugin, mut rx) = echo();
        plugin.handle_command("say", &[], "#c", "alice").unwrap();
        assert_eq!(rx.try_recv().unwrap().text, "Usage: !say <message>");
    }

    #[test]
    fn greets_hello() {
        let (mut plugin, mut rx) = echo();
        plugin.handle_message("#c", "alice", "well HELLO there").unwrap();
        assert_eq!(rx.try_recv().unwrap().text, "Hello alice!");
        plugin.handle_message("#c", "alice", "bye").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_session_is_reported() {
        let (mut plugin, rx) = echo();
        drop(rx);
        let err = plugin.handle_command("echo", &["x".into()], "#c", "alice").unwrap_err();
        assert_eq!(err.error_code(), "sender_closed");
    }
}
