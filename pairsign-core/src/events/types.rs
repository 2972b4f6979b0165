//! Bridge event definitions

use serde::{Deserialize, Serialize};

use crate::protocol::Session;

/// Lifecycle events exposed to the host application
///
/// Raw protocol events are translated into these; hosts never see the
/// protocol client's own event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A session client handle was constructed and wired
    Init,

    /// A pairing URI is ready to be shown to the other side
    Uri { uri: String },

    /// A session is established (new or reused)
    Open { session: Session },

    /// The active session ended
    Close { topic: String },

    /// The active session's state changed
    StatusUpdate { session: Session },
}

impl BridgeEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Uri { .. } => "uri",
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
            Self::StatusUpdate { .. } => "status_update",
        }
    }

    /// Session topic this event refers to, if any
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Open { session } | Self::StatusUpdate { session } => Some(&session.topic),
            Self::Close { topic } => Some(topic),
            Self::Init | Self::Uri { .. } => None,
        }
    }
}
