//! Channel transports.
//!
//! The scene side only ever sees [`Bridge::request`]: submit one command,
//! maybe get a reply. `None` is the degraded path (no executor attached, or
//! the reply was unusable) and callers treat it as "this entity never got an
//! external counterpart".

use log::{debug, warn};
use thiserror::Error;

use crate::command::{Command, Reply};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("could not encode command: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode reply: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Synchronous request/reply boundary to the executor.
pub trait Bridge {
    fn request(&mut self, command: &Command) -> Option<Reply>;
}

/// Log-only stub used when no executor is connected. Every command is
/// dropped after a debug trace; every reply is `None`.
#[derive(Debug, Default)]
pub struct NullChannel;

impl Bridge for NullChannel {
    fn request(&mut self, command: &Command) -> Option<Reply> {
        match serde_json::to_string(command) {
            Ok(wire) => debug!("channel disabled, dropping {wire}"),
            Err(_) => debug!("channel disabled, dropping {command:?}"),
        }
        None
    }
}

/// The real executor boundary: serialize to a JSON line, hand it to the
/// transport closure, parse whatever comes back. The closure returning
/// `None` means the executor is gone; both codec failures degrade to `None`
/// after a warning.
pub struct JsonChannel<F> {
    transport: F,
}

impl<F> JsonChannel<F>
where
    F: FnMut(&str) -> Option<String>,
{
    pub fn new(transport: F) -> Self {
        Self { transport }
    }

    fn try_request(&mut self, command: &Command) -> Result<Option<Reply>, BridgeError> {
        let wire = serde_json::to_string(command).map_err(BridgeError::Encode)?;
        let Some(raw) = (self.transport)(&wire) else {
            return Ok(None);
        };
        let reply = serde_json::from_str(&raw).map_err(BridgeError::Decode)?;
        Ok(Some(reply))
    }
}

impl<F> Bridge for JsonChannel<F>
where
    F: FnMut(&str) -> Option<String>,
{
    fn request(&mut self, command: &Command) -> Option<Reply> {
        match self.try_request(command) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("channel request failed: {err}");
                None
            }
        }
    }
}

/// Recording channel for tests and demos. Replies deterministically the way
/// a healthy executor would: creations echo the requested name, everything
/// else acks. `fail_all` / `fail_next` script outages.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    pub commands: Vec<Command>,
    pub fail_all: bool,
    pub fail_next: usize,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the recorded commands, e.g. between test phases.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    fn reply_for(command: &Command) -> Reply {
        match command {
            Command::CreatePrimitive { name, .. }
            | Command::CreateLight { name, .. }
            | Command::CreateCamera { name, .. }
            | Command::CreateEmpty { name, .. }
            | Command::CreateMaterial { name, .. } => Reply::named(name.clone()),
            Command::CreateGeometryNodes { name, .. } => Reply {
                name: Some(name.clone()),
                modifier: Some(name.clone()),
                ..Reply::default()
            },
            Command::AddGeometryNode { node_id, .. } => Reply::named(node_id.clone()),
            _ => Reply::ok(),
        }
    }
}

impl Bridge for MemoryChannel {
    fn request(&mut self, command: &Command) -> Option<Reply> {
        if self.fail_all || self.fail_next > 0 {
            self.fail_next = self.fail_next.saturating_sub(1);
            debug!("memory channel scripted failure for {command:?}");
            return None;
        }
        let reply = Self::reply_for(command);
        self.commands.push(command.clone());
        Some(reply)
    }
}
