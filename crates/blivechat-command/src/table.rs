//! Per-variant command tables.
//!
//! Each transport variant builds one immutable [`CommandTable`] at startup:
//! a map from command tag to a plain function
//! `(payload, room context) -> Option<ChatMessage>`. Tables are never
//! shared between variants because the same logical event ("gift sent")
//! has a different wire shape on each.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use serde_json::Value;

use crate::{ChatMessage, NormalizeError};

/// What a handler knows about the room it is normalizing for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomContext {
    /// Real (long) room id. Medals from other rooms are zeroed against it.
    pub room_id: u64,
    /// Owner's user id, as a string so numeric uids and open ids compare
    /// the same way. `None` until bootstrap learns it.
    pub owner_uid: Option<String>,
}

impl RoomContext {
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            owner_uid: None,
        }
    }

    pub fn with_owner(mut self, owner_uid: impl Into<String>) -> Self {
        self.owner_uid = Some(owner_uid.into());
        self
    }

    pub fn is_owner(&self, uid: &str) -> bool {
        self.owner_uid.as_deref() == Some(uid)
    }
}

/// Signature every handler has.
///
/// `Ok(None)` means "recognised, deliberately dropped" (e.g. a free gift).
pub type CommandFn = fn(&Value, &RoomContext) -> Result<Option<ChatMessage>, NormalizeError>;

/// An immutable tag → handler map for one transport variant.
#[derive(Clone)]
pub struct CommandTable<K> {
    name: &'static str,
    handlers: HashMap<K, CommandFn>,
}

impl<K: fmt::Debug> fmt::Debug for CommandTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("name", &self.name)
            .field("tags", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Eq + Hash> CommandTable<K> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `tag`, replacing any previous one.
    pub fn with(mut self, tag: K, handler: CommandFn) -> Self {
        self.handlers.insert(tag, handler);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn contains<Q>(&self, tag: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.handlers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for `tag` against `payload`.
    ///
    /// Unknown tags yield `None` silently. Handler errors are logged and
    /// also yield `None`; they never propagate.
    pub fn dispatch<Q>(&self, tag: &Q, payload: &Value, ctx: &RoomContext) -> Option<ChatMessage>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + fmt::Debug + ?Sized,
    {
        let Some(handler) = self.handlers.get(tag) else {
            tracing::trace!(table = self.name, ?tag, "no handler for command");
            return None;
        };
        match handler(payload, ctx) {
            Ok(Some(msg)) => Some(msg),
            Ok(None) => {
                tracing::debug!(table = self.name, ?tag, "command filtered out");
                None
            }
            Err(error) => {
                tracing::warn!(table = self.name, ?tag, %error, "dropping malformed command");
                None
            }
        }
    }
}

impl CommandTable<&'static str> {
    /// Normalizes a business command object by its `cmd` tag.
    pub fn normalize(&self, command: &Value, ctx: &RoomContext) -> Option<ChatMessage> {
        let tag = command_tag(command)?;
        self.dispatch(tag, command, ctx)
    }
}

/// The `cmd` tag of a business command with any `:suffix` removed.
///
/// Upstream sometimes appends a version, e.g. `DANMU_MSG:4:0:2:2:2:0`.
pub fn command_tag(command: &Value) -> Option<&str> {
    let cmd = command.get("cmd")?.as_str()?;
    Some(cmd.split_once(':').map_or(cmd, |(head, _)| head))
}
