use tokio::sync::mpsc;

use crate::error::PluginError;

/// A message a handler asked the session to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOutput {
    pub module_id: i64,
    pub target: String,
    pub text: String,
}

/// The send capability handed to a handler at construction.
///
/// Sending only queues the message; the session actor delivers it,
/// records it in history and relays it to observers.
#[derive(Debug, Clone)]
pub struct PluginSender {
    module_id: i64,
    tx: mpsc::UnboundedSender<PluginOutput>,
}

impl PluginSender {
    pub fn new(module_id: i64, tx: mpsc::UnboundedSender<PluginOutput>) -> Self {
        Self { module_id, tx }
    }

    pub fn module_id(&self) -> i64 {
        self.module_id
    }

    /// Queue `text` for `target` (a channel or a nick).
    pub fn send(&self, target: &str, text: &str) -> Result<(), PluginError> {
        self.tx
            .send(PluginOutput {
                module_id: self.module_id,
                target: target.to_string(),
                text: text.to_string(),
            })
            .map_err(|_| PluginError::SenderClosed)
    }
}

/// A loaded handler instance.
///
/// Calls are made from the session actor, one at a time. Handlers that
/// need I/O spawn it and report back through their [`PluginSender`].
pub trait Plugin: Send {
    /// `command` is the trigger, prefix stripped and lower-cased.
    fn handle_command(
        &mut self,
        _command: &str,
        _args: &[String],
        _channel: &str,
        _user: &str,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Offered every channel message, commands included.
    fn handle_message(&mut self, _channel: &str, _user: &str, _text: &str) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once when the instance is unloaded or replaced.
    fn cleanup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}
